use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{LedgerError, ResultLedger};

/// ISO 4217 style currency code (three uppercase ASCII letters).
///
/// The ledger never converts between currencies: it only compares codes, so
/// any syntactically valid code is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    /// Canonical currency code.
    #[must_use]
    pub fn code(&self) -> &str {
        // Construction only admits ASCII uppercase letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Trims and uppercases `input`, then checks it is exactly three letters.
    pub fn parse(input: &str) -> ResultLedger<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let bytes = normalized.as_bytes();
        match bytes {
            [a, b, c] if bytes.iter().all(u8::is_ascii_uppercase) => Ok(Self([*a, *b, *c])),
            _ => Err(LedgerError::InvalidCurrency(format!(
                "\"{}\" is not a 3-letter currency code",
                input.trim()
            ))),
        }
    }
}

/// Normalizes a user supplied currency code.
pub fn normalize_currency(input: &str) -> ResultLedger<Currency> {
    Currency::parse(input)
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Currency::parse(value)
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Currency::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uppercases_and_trims() {
        assert_eq!(normalize_currency(" usd ").unwrap().code(), "USD");
        assert_eq!(normalize_currency("Eur").unwrap().to_string(), "EUR");
    }

    #[test]
    fn parse_rejects_bad_codes() {
        for bad in ["", "US", "USDX", "U$D", "12A", "€"] {
            assert!(
                matches!(normalize_currency(bad), Err(LedgerError::InvalidCurrency(_))),
                "{bad} should be rejected"
            );
        }
    }
}
