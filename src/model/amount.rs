//! Money amounts as they arrive from form answers and as they are read from the balances sheet.
//!
//! Form answers are usually bare numbers (`12.50`) while formatted sheet cells may carry a dollar
//! sign and thousands separators (`-$1,200.00`). Both parse into the same `Amount`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Neg, Sub};
use std::str::FromStr;

/// How an amount was (or should be) written.
///
/// # Examples
///  - `AmountFormat{ dollar: true, commas: true }` -> `-$60,000.00`
///  - `AmountFormat{ dollar: false, commas: false }` -> `-60000.00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountFormat {
    dollar: bool,
    commas: bool,
}

impl Default for AmountFormat {
    fn default() -> Self {
        PLAIN
    }
}

/// No dollar sign and no separators, the way the ledger expects numbers to be entered.
const PLAIN: AmountFormat = AmountFormat {
    dollar: false,
    commas: false,
};

/// A signed money amount.
///
/// The formatting that an amount was parsed with is remembered so that it can be written back the
/// same way, which means that two amounts with the same value but different formatting are not
/// `==`. Compare `value()` for numeric equality.
///
/// ```
/// # use form_ledger::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("1500").unwrap();
/// let b = Amount::from_str("$1,500.00").unwrap();
/// assert_ne!(a, b);
/// assert_eq!(a.value(), b.value());
/// assert_eq!((-a).to_string(), "-1500");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
    format: AmountFormat,
}

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self {
            value,
            format: PLAIN,
        }
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.value.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value.is_sign_negative()
    }

    /// The magnitude of the amount, keeping its formatting.
    pub fn abs(&self) -> Self {
        Self {
            value: self.value.abs(),
            format: self.format,
        }
    }

    /// The same value rendered without a dollar sign or separators.
    pub fn plain(&self) -> Self {
        Self::new(self.value)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Self {
            value: -self.value,
            format: self.format,
        }
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.value - rhs.value)
    }
}

/// An error that can occur when parsing a `String` into an `Amount`.
pub enum AmountError {
    Decimal(rust_decimal::Error),
    /// Commas that are not thousands separators, e.g. a decimal comma in `1,5`.
    Separators(String),
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Decimal(e) => Debug::fmt(e, f),
            AmountError::Separators(s) => write!(f, "Separators({s:?})"),
        }
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Decimal(e) => Display::fmt(e, f),
            AmountError::Separators(s) => {
                write!(f, "'{s}' has commas that do not separate thousands")
            }
        }
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmountError::Decimal(e) => Some(e),
            AmountError::Separators(_) => None,
        }
    }
}

/// Removes thousands separators from `digits`. Commas are only accepted between groups of three
/// digits in the integer part.
fn strip_separators(digits: &str) -> Result<String, AmountError> {
    if !digits.contains(',') {
        return Ok(digits.to_string());
    }
    let (integer, fraction) = match digits.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (digits, None),
    };
    let mut groups = integer.split(',');
    let lead = groups.next().unwrap_or_default();
    let all_digits = |g: &str| g.chars().all(|c| c.is_ascii_digit());
    let valid = (1..=3).contains(&lead.len())
        && all_digits(lead)
        && groups.all(|g| g.len() == 3 && all_digits(g))
        && !fraction.is_some_and(|f| f.contains(','));
    if !valid {
        return Err(AmountError::Separators(digits.to_string()));
    }
    let mut stripped = integer.replace(',', "");
    if let Some(fraction) = fraction {
        stripped.push('.');
        stripped.push_str(fraction);
    }
    Ok(stripped)
}

impl FromStr for Amount {
    type Err = AmountError;

    /// An empty (or blank) string parses as zero, which is how an empty balance cell is read.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let (dollar, digits) = match unsigned.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, unsigned),
        };
        let without_commas = strip_separators(digits)?;
        let commas = without_commas.len() < digits.len();

        let mut value = Decimal::from_str(&without_commas).map_err(AmountError::Decimal)?;
        if negative {
            value = -value;
        }
        Ok(Amount {
            value,
            format: AmountFormat { dollar, commas },
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.value.abs();
        let dol = if self.format.dollar { "$" } else { "" };

        if self.format.commas {
            write!(
                f,
                "{sign}{dol}{}",
                format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
            )
        } else {
            write!(f, "{sign}{dol}{num}")
        }
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_form_answer() {
        let amount = Amount::from_str("12.5").unwrap();
        assert_eq!(amount.value(), dec("12.5"));
        assert_eq!(amount.to_string(), "12.5");
    }

    #[test]
    fn test_parse_formatted_cell() {
        let amount = Amount::from_str("-$1,234,567.89").unwrap();
        assert_eq!(amount.value(), dec("-1234567.89"));
        assert_eq!(amount.to_string(), "-$1,234,567.89");
    }

    #[test]
    fn test_parse_empty_cell_is_zero() {
        assert!(Amount::from_str("").unwrap().is_zero());
        assert!(Amount::from_str("   ").unwrap().is_zero());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Amount::from_str("twelve").is_err());
    }

    #[test]
    fn test_commas_must_separate_thousands() {
        assert_eq!(Amount::from_str("1,500").unwrap().value(), dec("1500"));
        assert_eq!(Amount::from_str("12,345.6").unwrap().value(), dec("12345.6"));
        for answer in ["1,5", "1,50", "1234,567", ",500", "1,500,", "1,,500", "1.500,25"] {
            let err = Amount::from_str(answer).unwrap_err();
            assert!(matches!(err, AmountError::Separators(_)), "{answer}: {err:?}");
        }
    }

    #[test]
    fn test_negation_keeps_format() {
        let amount = Amount::from_str("$50.00").unwrap();
        assert_eq!((-amount).to_string(), "-$50.00");
        assert_eq!((-amount).plain().to_string(), "-50.00");
    }

    #[test]
    fn test_difference() {
        let stored = Amount::from_str("$100.00").unwrap();
        let submitted = Amount::from_str("150").unwrap();
        let diff = submitted - stored;
        assert_eq!(diff.value(), dec("50"));
        assert!(diff.is_positive());
        assert_eq!((stored - submitted).abs().value(), dec("50"));
    }

    #[test]
    fn test_zero_is_neither_positive_nor_negative() {
        let zero = Amount::from_str("0.00").unwrap();
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());
        assert!(!(-zero).is_negative());
    }

    #[test]
    fn test_serde() {
        let amount: Amount = serde_json::from_str("\"-$5.00\"").unwrap();
        assert_eq!(amount.value(), dec("-5"));
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"-$5.00\"");
    }
}
