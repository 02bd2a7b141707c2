//! Exact conversion between human decimal strings and token base units.
//!
//! Token amounts arrive as decimal text (`"1.5"`) and leave as integers in the
//! token's smallest unit (`1_500_000` for a 6-decimal token). Both directions
//! are exact:
//!
//! - **No floating point.** Text is split into integer and fraction digits
//!   and accumulated straight into a `U256` with checked arithmetic, so any
//!   value that fits in 256 bits is accepted.
//! - **No rounding.** A value with more significant fractional digits than
//!   the token supports is rejected, never truncated.
//! - **Canonical output.** [`to_decimal_string`] strips insignificant
//!   trailing zeros and drops the point for whole values, so
//!   `to_decimal_string(to_base_units(s, d)?, d) == canonicalize(s)?`.

use std::fmt::{Debug, Display};
use std::str::FromStr;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Errors produced while normalizing a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("invalid amount format: {value:?}")]
    InvalidFormat { value: String },
    #[error("amount must be greater than 0, got {value}")]
    NonPositive { value: String },
    #[error("amount {value} has more than {decimals} decimal places")]
    ExcessPrecision { value: String, decimals: u8 },
    #[error("amount {value} does not fit in 256 bits at {decimals} decimals")]
    Overflow { value: String, decimals: u8 },
}

/// A plain decimal split into its significant digits.
///
/// `integer` has no leading zeros and `fraction` no trailing zeros, so both
/// are empty for zero.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Digits<'a> {
    negative: bool,
    integer: &'a str,
    fraction: &'a str,
}

impl Digits<'_> {
    fn is_zero(&self) -> bool {
        self.integer.is_empty() && self.fraction.is_empty()
    }

    fn canonical(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }

        let sign = if self.negative { "-" } else { "" };
        let integer = if self.integer.is_empty() { "0" } else { self.integer };

        if self.fraction.is_empty() {
            format!("{sign}{integer}")
        } else {
            format!("{sign}{integer}.{}", self.fraction)
        }
    }
}

/// Accepts an optional sign, ASCII digits and at most one point with digits
/// on at least one side. Separators, exponents and hex are rejected.
fn parse_digits(value: &str) -> Result<Digits<'_>, AmountError> {
    let invalid = || AmountError::InvalidFormat {
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if (integer.is_empty() && fraction.is_empty())
        || !all_digits(integer)
        || !all_digits(fraction)
    {
        return Err(invalid());
    }

    Ok(Digits {
        negative,
        integer: integer.trim_start_matches('0'),
        fraction: fraction.trim_end_matches('0'),
    })
}

/// Returns the canonical text form of a decimal string: no leading `+`, no
/// insignificant leading or trailing zeros, no trailing point.
pub fn canonicalize(value: &str) -> Result<String, AmountError> {
    Ok(parse_digits(value)?.canonical())
}

/// Converts a positive decimal string to base units at `decimals` precision.
///
/// `to_base_units("1.5", 6)` returns `1_500_000`. Trailing zeros beyond the
/// precision are accepted (`"1.500"` at 2 decimals is fine), significant
/// digits beyond it are not (`"1.001"` at 2 decimals fails).
pub fn to_base_units(value: &str, decimals: u8) -> Result<U256, AmountError> {
    let digits = parse_digits(value)?;

    if digits.negative || digits.is_zero() {
        return Err(AmountError::NonPositive {
            value: value.to_string(),
        });
    }

    let decimals_len = usize::from(decimals);
    if digits.fraction.len() > decimals_len {
        return Err(AmountError::ExcessPrecision {
            value: value.to_string(),
            decimals,
        });
    }

    let overflow = || AmountError::Overflow {
        value: value.to_string(),
        decimals,
    };

    let padding = decimals_len - digits.fraction.len();
    let ten = U256::from(10u8);

    let mut base_units = U256::ZERO;
    for byte in digits
        .integer
        .bytes()
        .chain(digits.fraction.bytes())
        .chain(std::iter::repeat_n(b'0', padding))
    {
        base_units = base_units
            .checked_mul(ten)
            .and_then(|scaled| scaled.checked_add(U256::from(byte - b'0')))
            .ok_or_else(overflow)?;
    }

    Ok(base_units)
}

/// Formats base units as a canonical decimal string at `decimals` precision.
///
/// `to_decimal_string(U256::from(1_500_000), 6)` returns `"1.5"`, and
/// `to_decimal_string(U256::from(2_000_000), 6)` returns `"2"`.
pub fn to_decimal_string(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);

    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{digits:0>width$}", width = decimals + 1)
    } else {
        digits
    };

    let (integer, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}

/// A positive token amount in base units, together with the canonical
/// decimal text it was derived from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAmount {
    base_units: U256,
    decimal: String,
    decimals: u8,
}

impl NormalizedAmount {
    pub fn new(value: &str, decimals: u8) -> Result<Self, AmountError> {
        let base_units = to_base_units(value, decimals)?;

        Ok(Self {
            base_units,
            decimal: to_decimal_string(base_units, decimals),
            decimals,
        })
    }

    /// Builds an amount directly from base units, e.g. an onchain balance.
    pub fn from_base_units(base_units: U256, decimals: u8) -> Self {
        Self {
            base_units,
            decimal: to_decimal_string(base_units, decimals),
            decimals,
        }
    }

    pub const fn base_units(&self) -> U256 {
        self.base_units
    }

    pub fn decimal(&self) -> &str {
        &self.decimal
    }
}

impl Debug for NormalizedAmount {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            dest,
            "NormalizedAmount({} = {} @ {})",
            self.decimal, self.base_units, self.decimals
        )
    }
}

impl Display for NormalizedAmount {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(dest, "{}", self.decimal)
    }
}

/// A decimal amount that has been checked to be a well-formed, strictly
/// positive number but not yet scaled to any token's precision.
///
/// Used to reject bad input before the token decimals are known. Holds the
/// canonical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositiveDecimal(String);

impl PositiveDecimal {
    pub fn scale_to(&self, decimals: u8) -> Result<NormalizedAmount, AmountError> {
        NormalizedAmount::new(&self.0, decimals)
    }
}

impl FromStr for PositiveDecimal {
    type Err = AmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = parse_digits(value)?;

        if digits.negative || digits.is_zero() {
            return Err(AmountError::NonPositive {
                value: value.to_string(),
            });
        }

        Ok(Self(digits.canonical()))
    }
}

impl Display for PositiveDecimal {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(dest, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn usdc_one_and_a_half() {
        assert_eq!(to_base_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
    }

    #[test]
    fn whole_amount_at_zero_decimals() {
        assert_eq!(to_base_units("42", 0).unwrap(), U256::from(42u64));
    }

    #[test]
    fn eighteen_decimals() {
        assert_eq!(
            to_base_units("7.5", 18).unwrap(),
            U256::from(7_500_000_000_000_000_000u64)
        );
    }

    #[test]
    fn trailing_zeros_beyond_precision_are_not_excess() {
        assert_eq!(to_base_units("1.500", 2).unwrap(), U256::from(150u64));
    }

    #[test]
    fn rejects_zero() {
        assert!(matches!(
            to_base_units("0", 6),
            Err(AmountError::NonPositive { .. })
        ));
        assert!(matches!(
            to_base_units("0.000", 6),
            Err(AmountError::NonPositive { .. })
        ));
    }

    #[test]
    fn rejects_negative() {
        assert!(matches!(
            to_base_units("-1", 6),
            Err(AmountError::NonPositive { .. })
        ));
    }

    #[test]
    fn rejects_excess_precision() {
        let error = to_base_units("1.001", 2).unwrap_err();
        assert_eq!(
            error,
            AmountError::ExcessPrecision {
                value: "1.001".to_string(),
                decimals: 2,
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        for input in [
            "", ".", "-", "abc", "1.2.3", "1e6", "0x10", "NaN", "1_5", "1_000.5", "1,5",
            "+-1", "1 5",
        ] {
            assert!(
                matches!(to_base_units(input, 6), Err(AmountError::InvalidFormat { .. })),
                "expected InvalidFormat for {input:?}"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            to_base_units("1", 78),
            Err(AmountError::Overflow { .. })
        ));
    }

    #[test]
    fn digit_separators_are_not_ignored() {
        assert_eq!(
            to_base_units("1_5", 6),
            Err(AmountError::InvalidFormat {
                value: "1_5".to_string(),
            })
        );
        assert!("1_000.5".parse::<PositiveDecimal>().is_err());
    }

    #[test]
    fn amounts_beyond_96_bits_are_exact() {
        let whole = "100000000000000000000000000000";
        assert_eq!(
            to_base_units(whole, 6).unwrap(),
            U256::from(10u8).pow(U256::from(35u8))
        );

        let value = U256::from(10u8).pow(U256::from(29u8)) + U256::from(1u8);
        let text = to_decimal_string(value, 18);
        assert_eq!(text, "100000000000.000000000000000001");
        assert_eq!(to_base_units(&text, 18).unwrap(), value);
        assert_eq!(canonicalize(&text).unwrap(), text);
    }

    #[test]
    fn largest_u256_fits_and_one_more_overflows() {
        let max = U256::MAX.to_string();
        assert_eq!(to_base_units(&max, 0).unwrap(), U256::MAX);

        let one_more = format!("{max}0");
        assert!(matches!(
            to_base_units(&one_more, 0),
            Err(AmountError::Overflow { .. })
        ));
        assert!(matches!(
            to_base_units(&max, 1),
            Err(AmountError::Overflow { .. })
        ));
    }

    #[test]
    fn bare_point_forms_are_accepted() {
        assert_eq!(to_base_units(".5", 1).unwrap(), U256::from(5u8));
        assert_eq!(to_base_units("5.", 1).unwrap(), U256::from(50u8));
        assert_eq!(canonicalize("+.50").unwrap(), "0.5");
        assert_eq!(canonicalize("-0.0").unwrap(), "0");
    }

    #[test]
    fn formats_fraction_and_whole() {
        assert_eq!(to_decimal_string(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(to_decimal_string(U256::from(2_000_000u64), 6), "2");
        assert_eq!(to_decimal_string(U256::from(1u64), 6), "0.000001");
        assert_eq!(to_decimal_string(U256::ZERO, 6), "0");
        assert_eq!(to_decimal_string(U256::from(1234u64), 0), "1234");
    }

    #[test]
    fn canonicalize_strips_noise() {
        assert_eq!(canonicalize("01.50").unwrap(), "1.5");
        assert_eq!(canonicalize("2.000").unwrap(), "2");
        assert_eq!(canonicalize(" 3 ").unwrap(), "3");
        assert_eq!(canonicalize("100").unwrap(), "100");
    }

    #[test]
    fn normalized_amount_keeps_canonical_text() {
        let amount = NormalizedAmount::new("1.50", 6).unwrap();
        assert_eq!(amount.base_units(), U256::from(1_500_000u64));
        assert_eq!(amount.decimal(), "1.5");
        assert_eq!(amount.to_string(), "1.5");
    }

    #[test]
    fn normalized_amount_serializes_base_units_and_text() {
        let amount = NormalizedAmount::new("1.5", 6).unwrap();
        let json = serde_json::to_value(&amount).unwrap();
        assert_eq!(json["decimal"], "1.5");
        assert_eq!(json["decimals"], 6);
    }

    #[test]
    fn positive_decimal_validates_before_scaling() {
        assert!("0".parse::<PositiveDecimal>().is_err());
        assert!("-2".parse::<PositiveDecimal>().is_err());

        let parsed: PositiveDecimal = "1.50".parse().unwrap();
        assert_eq!(parsed.to_string(), "1.5");

        let scaled = parsed.scale_to(6).unwrap();
        assert_eq!(scaled.base_units(), U256::from(1_500_000u64));
        assert!(parsed.scale_to(0).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_reproduces_canonical_text(
            integer in 0u64..1_000_000_000,
            fraction in 0u64..1_000_000,
            decimals in 6u8..=18,
        ) {
            let text = format!("{integer}.{fraction:06}");
            prop_assume!(integer > 0 || fraction > 0);

            let base = to_base_units(&text, decimals).unwrap();
            prop_assert_eq!(to_decimal_string(base, decimals), canonicalize(&text).unwrap());
        }

        #[test]
        fn excess_digits_always_rejected(
            integer in 0u64..1_000,
            decimals in 0u8..12,
        ) {
            let text = format!("{integer}.{}1", "0".repeat(usize::from(decimals)));

            prop_assert!(
                matches!(
                    to_base_units(&text, decimals),
                    Err(AmountError::ExcessPrecision { .. })
                ),
                "expected ExcessPrecision for {}",
                text
            );
        }

        #[test]
        fn base_units_roundtrip(
            limbs in any::<[u64; 4]>(),
            decimals in 0u8..=18,
        ) {
            let value = U256::from_limbs(limbs);
            prop_assume!(!value.is_zero());

            let text = to_decimal_string(value, decimals);
            prop_assert_eq!(to_base_units(&text, decimals).unwrap(), value);
        }
    }
}
