use std::collections::HashSet;

use watchtower_domain::{
    model::{SessionOptions, TxDirection},
    Address,
};

use crate::rpc::ChainTransaction;

/// Decides whether `tx` concerns the watch set and, if so, in which
/// direction. Direction is settled before the value filter runs.
pub fn classify(
    tx: &ChainTransaction,
    watch: &HashSet<Address>,
    options: &SessionOptions,
) -> Option<TxDirection> {
    let incoming = tx.to.is_some_and(|to| watch.contains(&to));
    let outgoing = watch.contains(&tx.from);

    let direction = match (incoming, outgoing) {
        (true, true) => TxDirection::InternalTx,
        (true, false) => TxDirection::Incoming,
        (false, true) if options.include_outgoing => TxDirection::Outgoing,
        _ => return None,
    };

    if tx.value < options.min_value {
        return None;
    }
    Some(direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_domain::model::Wei;

    const WATCHED: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const STRANGER: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";

    fn addr(raw: &str) -> Address {
        Address::parse(raw).unwrap()
    }

    fn watch() -> HashSet<Address> {
        HashSet::from([addr(WATCHED)])
    }

    fn tx(from: &str, to: Option<&str>, value: &str) -> ChainTransaction {
        ChainTransaction {
            hash: "0x1".into(),
            from: addr(from),
            to: to.map(addr),
            value: Wei::parse_native(value).unwrap(),
        }
    }

    #[test]
    fn incoming_transfer_matches() {
        let options = SessionOptions::default();
        assert_eq!(
            classify(&tx(STRANGER, Some(WATCHED), "0.5"), &watch(), &options),
            Some(TxDirection::Incoming)
        );
    }

    #[test]
    fn outgoing_needs_opt_in() {
        let transfer = tx(WATCHED, Some(STRANGER), "1");
        assert_eq!(classify(&transfer, &watch(), &SessionOptions::default()), None);

        let options = SessionOptions {
            include_outgoing: true,
            ..SessionOptions::default()
        };
        assert_eq!(
            classify(&transfer, &watch(), &options),
            Some(TxDirection::Outgoing)
        );
    }

    #[test]
    fn self_transfer_is_internal_even_without_outgoing() {
        assert_eq!(
            classify(&tx(WATCHED, Some(WATCHED), "1"), &watch(), &SessionOptions::default()),
            Some(TxDirection::InternalTx)
        );
    }

    #[test]
    fn unrelated_and_contract_creation_are_ignored() {
        let options = SessionOptions::default();
        assert_eq!(classify(&tx(STRANGER, Some(STRANGER), "9"), &watch(), &options), None);
        assert_eq!(classify(&tx(STRANGER, None, "9"), &watch(), &options), None);
    }

    #[test]
    fn value_filter_is_exact_at_the_boundary() {
        let options = SessionOptions {
            min_value: Wei::parse_native("0.1").unwrap(),
            ..SessionOptions::default()
        };
        assert_eq!(
            classify(&tx(STRANGER, Some(WATCHED), "0.1"), &watch(), &options),
            Some(TxDirection::Incoming)
        );
        assert_eq!(
            classify(
                &tx(STRANGER, Some(WATCHED), "0.099999999999999999"),
                &watch(),
                &options
            ),
            None
        );
    }
}
