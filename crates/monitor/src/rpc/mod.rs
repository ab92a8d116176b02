use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use watchtower_domain::{config::MonitorConfig, model::Network};

use crate::{client::JsonRpcClient, worker::MonitorError};

mod types;

pub use types::{
    decode_block, parse_quantity, ChainBlock, ChainTransaction, RpcBlock, RpcTransaction,
};

/// Read access to one chain.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn current_height(&self) -> Result<u64, MonitorError>;

    /// `Ok(None)` when the node does not have the block (yet).
    async fn block_with_transactions(&self, height: u64)
        -> Result<Option<ChainBlock>, MonitorError>;
}

pub struct JsonRpcChainProvider {
    client: JsonRpcClient,
}

impl JsonRpcChainProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, MonitorError> {
        Ok(Self {
            client: JsonRpcClient::new(url, timeout)?,
        })
    }
}

#[async_trait]
impl ChainProvider for JsonRpcChainProvider {
    async fn current_height(&self) -> Result<u64, MonitorError> {
        let raw: String = self
            .client
            .call("eth_blockNumber", Vec::<serde_json::Value>::new())
            .await?
            .ok_or_else(|| MonitorError::Rpc("eth_blockNumber returned null".into()))?;
        parse_quantity(&raw)
    }

    async fn block_with_transactions(
        &self,
        height: u64,
    ) -> Result<Option<ChainBlock>, MonitorError> {
        let raw: Option<serde_json::Value> = self
            .client
            .call("eth_getBlockByNumber", (format!("{height:#x}"), true))
            .await?;
        Ok(raw.and_then(|block| decode_block(height, block)))
    }
}

/// One provider per configured network.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: BTreeMap<Network, Arc<dyn ChainProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let mut set = Self::new();
        for (network, url) in config.rpc_urls() {
            let provider = JsonRpcChainProvider::new(url.clone(), config.rpc_timeout())?;
            set.insert(*network, Arc::new(provider));
        }
        Ok(set)
    }

    pub fn with(mut self, network: Network, provider: Arc<dyn ChainProvider>) -> Self {
        self.insert(network, provider);
        self
    }

    pub fn insert(&mut self, network: Network, provider: Arc<dyn ChainProvider>) {
        self.providers.insert(network, provider);
    }

    pub fn get(&self, network: Network) -> Option<Arc<dyn ChainProvider>> {
        self.providers.get(&network).cloned()
    }

    pub fn networks(&self) -> impl Iterator<Item = Network> + '_ {
        self.providers.keys().copied()
    }
}
