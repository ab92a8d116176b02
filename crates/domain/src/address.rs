//! Ethereum account addresses: parsing, canonical form, EIP-55 checksums.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Number of hex characters in an address body (without the `0x` prefix).
pub const ADDRESS_HEX_LENGTH: usize = 40;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be exactly {ADDRESS_HEX_LENGTH} hex characters after 0x")]
    WrongLength,
    #[error("address contains non-hex characters")]
    NonHex,
    #[error("mixed-case address fails the EIP-55 checksum")]
    BadChecksum,
}

/// A 20-byte account address. Always compared and hashed on its bytes, so the
/// textual case used by callers never matters once parsed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses user or provider input. Single-case hex is accepted as is;
    /// mixed-case hex must carry a valid EIP-55 checksum.
    pub fn parse(input: &str) -> Result<Self, AddressFormatError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(AddressFormatError::MissingPrefix)?;

        if body.len() != ADDRESS_HEX_LENGTH {
            return Err(AddressFormatError::WrongLength);
        }
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressFormatError::NonHex);
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(body, &mut bytes).map_err(|_| AddressFormatError::NonHex)?;
        let address = Self(bytes);

        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower && address.checksum_body() != body {
            return Err(AddressFormatError::BadChecksum);
        }

        Ok(address)
    }

    /// Canonical lower-case form with `0x` prefix.
    pub fn to_canonical(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 mixed-case form with `0x` prefix.
    pub fn to_checksum(&self) -> String {
        format!("0x{}", self.checksum_body())
    }

    /// Shortened checksum form for chat messages, e.g. `0x5aAe…BeAed`.
    pub fn short(&self) -> String {
        let full = self.to_checksum();
        format!("{}…{}", &full[..6], &full[full.len() - 5..])
    }

    fn checksum_body(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        lower
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let byte = hash[i / 2];
                let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
                if c.is_ascii_alphabetic() && nibble >= 8 {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            })
            .collect()
    }
}

impl FromStr for Address {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_canonical())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn accepts_valid_checksum_and_normalizes() {
        let address = Address::parse(CHECKSUMMED).expect("valid checksum");
        assert_eq!(
            address.to_canonical(),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
        assert_eq!(address.to_checksum(), CHECKSUMMED);
    }

    #[test]
    fn eip55_vectors_round_trip() {
        for vector in [
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let address = Address::parse(vector).expect("valid vector");
            assert_eq!(address.to_checksum(), vector);
        }
    }

    #[test]
    fn single_case_input_skips_checksum() {
        let lower = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let upper = Address::parse("0X5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn rejects_bad_checksum() {
        assert_eq!(
            Address::parse("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            Err(AddressFormatError::BadChecksum)
        );
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert_eq!(
            Address::parse("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
            Err(AddressFormatError::MissingPrefix)
        );
        assert_eq!(
            Address::parse("0x1234"),
            Err(AddressFormatError::WrongLength)
        );
        assert_eq!(
            Address::parse(&format!("0x{}", "z".repeat(ADDRESS_HEX_LENGTH))),
            Err(AddressFormatError::NonHex)
        );
    }

    #[test]
    fn trims_whitespace() {
        let address = Address::parse("  0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed\n").unwrap();
        assert_eq!(address.to_checksum(), CHECKSUMMED);
    }

    #[test]
    fn short_form_keeps_both_ends() {
        let address = Address::parse(CHECKSUMMED).unwrap();
        assert_eq!(address.short(), "0x5aAe…BeAed");
    }
}
