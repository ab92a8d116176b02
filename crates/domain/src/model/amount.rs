use std::fmt;

use thiserror::Error;

/// Decimal places between the native unit (ether) and wei.
pub const NATIVE_DECIMALS: u32 = 18;

const WEI_PER_NATIVE: u128 = 10u128.pow(NATIVE_DECIMALS);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount `{0}` is not a non-negative decimal number")]
    Malformed(String),
    #[error("amount `{0}` has more than {NATIVE_DECIMALS} fractional digits")]
    TooPrecise(String),
    #[error("amount `{0}` does not fit in 128 bits of wei")]
    Overflow(String),
}

/// An amount in the chain's smallest unit. Integer arithmetic only, so
/// threshold comparisons never suffer from float rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub const fn new(wei: u128) -> Self {
        Self(wei)
    }

    pub const fn get(&self) -> u128 {
        self.0
    }

    /// Parses a JSON-RPC quantity such as `0x6f05b59d3b20000`.
    pub fn from_hex_quantity(raw: &str) -> Result<Self, AmountError> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| AmountError::Malformed(raw.to_string()))?;
        if digits.is_empty() {
            return Err(AmountError::Empty);
        }
        if digits.len() > 32 && digits.trim_start_matches('0').len() > 32 {
            return Err(AmountError::Overflow(raw.to_string()));
        }
        u128::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| AmountError::Malformed(raw.to_string()))
    }

    /// Parses a decimal amount in the native unit (`"0.5"`, `"12"`, `".25"`)
    /// exactly into wei.
    pub fn parse_native(raw: &str) -> Result<Self, AmountError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::Malformed(raw.to_string()));
        }
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(AmountError::Malformed(raw.to_string()));
        }

        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > NATIVE_DECIMALS as usize {
            return Err(AmountError::TooPrecise(raw.to_string()));
        }

        let overflow = || AmountError::Overflow(raw.to_string());
        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(WEI_PER_NATIVE)
                .ok_or_else(overflow)?
        };
        let fraction_wei = if fraction.is_empty() {
            0
        } else {
            let scale = 10u128.pow(NATIVE_DECIMALS - fraction.len() as u32);
            fraction.parse::<u128>().map_err(|_| overflow())? * scale
        };

        whole_wei
            .checked_add(fraction_wei)
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Exact decimal rendering in the native unit with trailing zeros removed.
    pub fn to_native_string(&self) -> String {
        let whole = self.0 / WEI_PER_NATIVE;
        let fraction = self.0 % WEI_PER_NATIVE;
        if fraction == 0 {
            return whole.to_string();
        }
        let padded = format!("{:0width$}", fraction, width = NATIVE_DECIMALS as usize);
        format!("{}.{}", whole, padded.trim_end_matches('0'))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_native_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_native_amounts_exactly() {
        assert_eq!(Wei::parse_native("0.5").unwrap().get(), 500_000_000_000_000_000);
        assert_eq!(Wei::parse_native("12").unwrap().get(), 12 * WEI_PER_NATIVE);
        assert_eq!(Wei::parse_native(".25").unwrap().get(), 250_000_000_000_000_000);
        assert_eq!(Wei::parse_native("0.000000000000000001").unwrap().get(), 1);
        assert_eq!(Wei::parse_native("1.500").unwrap(), Wei::parse_native("1.5").unwrap());
    }

    #[test]
    fn rejects_bad_native_amounts() {
        assert_eq!(Wei::parse_native(""), Err(AmountError::Empty));
        assert!(matches!(Wei::parse_native("-1"), Err(AmountError::Malformed(_))));
        assert!(matches!(Wei::parse_native("1e18"), Err(AmountError::Malformed(_))));
        assert!(matches!(Wei::parse_native("."), Err(AmountError::Malformed(_))));
        assert!(matches!(
            Wei::parse_native("0.0000000000000000001"),
            Err(AmountError::TooPrecise(_))
        ));
    }

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(Wei::from_hex_quantity("0x0").unwrap(), Wei::ZERO);
        assert_eq!(
            Wei::from_hex_quantity("0x6f05b59d3b20000").unwrap(),
            Wei::parse_native("0.5").unwrap()
        );
        assert!(Wei::from_hex_quantity("123").is_err());
        assert_eq!(Wei::from_hex_quantity("0x"), Err(AmountError::Empty));
    }

    #[test]
    fn formats_without_rounding() {
        assert_eq!(Wei::new(500_000_000_000_000_000).to_native_string(), "0.5");
        assert_eq!(Wei::new(3 * WEI_PER_NATIVE).to_native_string(), "3");
        assert_eq!(Wei::new(1).to_native_string(), "0.000000000000000001");
        assert_eq!(
            Wei::new(WEI_PER_NATIVE + 1).to_native_string(),
            "1.000000000000000001"
        );
    }

    #[test]
    fn borderline_amounts_compare_exactly() {
        let threshold = Wei::parse_native("0.1").unwrap();
        let just_below = Wei::new(threshold.get() - 1);
        assert!(just_below < threshold);
        assert!(Wei::parse_native("0.1").unwrap() >= threshold);
    }
}
