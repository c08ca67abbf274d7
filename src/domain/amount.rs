use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents a positive monetary amount due for a checkout.
///
/// Ensures that requested amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| PaymentError::ValidationError(format!("Invalid amount '{}': {}", s, e)))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// A base58 encoded 32-byte ledger public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    pub fn parse(value: &str) -> Result<Self, PaymentError> {
        let decoded = bs58::decode(value).into_vec().map_err(|e| {
            PaymentError::ValidationError(format!("Invalid base58 key '{}': {}", value, e))
        })?;
        if decoded.len() != 32 {
            return Err(PaymentError::ValidationError(format!(
                "Invalid key '{}': expected 32 bytes, got {}",
                value,
                decoded.len()
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PublicKey {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

impl FromStr for PublicKey {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The merchant wallet that receives payments.
pub type Recipient = PublicKey;
/// An SPL token mint. Absent means the native currency.
pub type Mint = PublicKey;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_display_is_normalized() {
        let amount: Amount = "12.500".parse().unwrap();
        assert_eq!(amount.to_string(), "12.5");
        assert_eq!(amount.value(), dec!(12.5));
    }

    #[test]
    fn test_amount_rejects_garbage() {
        assert!("twelve".parse::<Amount>().is_err());
    }

    #[test]
    fn test_public_key_round_trip() {
        let key = PublicKey::from_bytes([7u8; 32]);
        let parsed = PublicKey::parse(key.as_str()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_public_key_rejects_wrong_length() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(PublicKey::parse(&short).is_err());
        assert!(PublicKey::parse("0OIl").is_err());
    }
}
