use super::amount::{Amount, Mint, PublicKey};
use super::ports::TransferStatus;
use crate::error::{PaymentError, Result};
use rand::RngCore;
use rand::rngs::OsRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    New,
    Pending,
    Confirmed,
    Valid,
    Finalized,
    Error,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Finalized | PaymentStatus::Error)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::New => "new",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Valid => "valid",
            PaymentStatus::Finalized => "finalized",
            PaymentStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// One-time key embedded in a pay request so the transfer can be located on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceKey(PublicKey);

impl ReferenceKey {
    /// Allocates a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(PublicKey::from_bytes(bytes))
    }

    pub fn parse(value: &str) -> Result<Self> {
        PublicKey::parse(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a single checkout payment attempt.
///
/// All transitions go through the methods below; each one rejects calls made
/// from a state where the transition is not allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentSession {
    pub status: PaymentStatus,
    pub reference: Option<ReferenceKey>,
    pub signature: Option<Signature>,
    pub amount_due: Option<Amount>,
    pub token: Option<Mint>,
    /// Serialized as the error's stable code.
    #[serde(serialize_with = "serialize_error_code")]
    pub error: Option<PaymentError>,
    /// Discovery attempts made since the last `begin`, `retry` or match.
    pub watchdog: u32,
    pub confirmations: u32,
}

impl PaymentSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn expect(&self, status: PaymentStatus, action: &'static str) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(PaymentError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    /// New -> Pending with a fresh reference key.
    pub fn begin(&mut self, reference: ReferenceKey) -> Result<()> {
        self.expect(PaymentStatus::New, "generate")?;
        if self.amount_due.is_none() {
            return Err(PaymentError::AmountMissing);
        }
        self.reference = Some(reference);
        self.signature = None;
        self.error = None;
        self.watchdog = 0;
        self.confirmations = 0;
        self.status = PaymentStatus::Pending;
        Ok(())
    }

    /// Counts one discovery attempt. Once the count already exceeds
    /// `max_attempts` the session times out instead, so `max_attempts + 1`
    /// lookups run before the timeout.
    pub fn record_attempt(&mut self, max_attempts: u32) -> Result<u32> {
        self.expect(PaymentStatus::Pending, "poll")?;
        if self.watchdog > max_attempts {
            self.fail(PaymentError::Timeout)?;
            return Ok(self.watchdog);
        }
        self.watchdog = self.watchdog.saturating_add(1);
        Ok(self.watchdog)
    }

    pub fn confirm(&mut self, signature: Signature) -> Result<()> {
        self.expect(PaymentStatus::Pending, "confirm")?;
        self.signature = Some(signature);
        self.watchdog = 0;
        self.status = PaymentStatus::Confirmed;
        Ok(())
    }

    pub fn mark_valid(&mut self) -> Result<()> {
        self.expect(PaymentStatus::Confirmed, "validate")?;
        self.status = PaymentStatus::Valid;
        Ok(())
    }

    /// Records a status report. Returns `true` once the transfer is final.
    pub fn observe_status(&mut self, status: &TransferStatus, required: u32) -> Result<bool> {
        self.expect(PaymentStatus::Valid, "finalize")?;
        self.confirmations = status.confirmations.unwrap_or(0);
        if self.confirmations >= required || status.finalized {
            self.status = PaymentStatus::Finalized;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn fail(&mut self, error: PaymentError) -> Result<()> {
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Confirmed | PaymentStatus::Valid => {
                self.error = Some(error);
                self.status = PaymentStatus::Error;
                Ok(())
            }
            from => Err(PaymentError::InvalidTransition {
                from,
                action: "fail",
            }),
        }
    }

    /// Error -> Pending, keeping the reference key. Returns `false` and leaves
    /// the session untouched when not in Error.
    pub fn retry(&mut self) -> bool {
        if self.status != PaymentStatus::Error {
            return false;
        }
        self.error = None;
        self.signature = None;
        self.watchdog = 0;
        self.confirmations = 0;
        self.status = PaymentStatus::Pending;
        true
    }

    /// Back to New. The amount due and token are kept for the next checkout.
    pub fn reset(&mut self) {
        *self = Self {
            amount_due: self.amount_due,
            token: self.token.take(),
            ..Self::default()
        };
    }

    /// Fraction of the required confirmations seen so far.
    pub fn progress(&self, required: u32) -> Decimal {
        match self.status {
            PaymentStatus::Finalized => Decimal::ONE,
            PaymentStatus::Valid if required > 0 => {
                Decimal::from(self.confirmations.min(required)) / Decimal::from(required)
            }
            _ => Decimal::ZERO,
        }
    }
}

fn serialize_error_code<S>(
    error: &Option<PaymentError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    error
        .as_ref()
        .map(PaymentError::code)
        .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ValidationFailure;
    use rust_decimal_macros::dec;

    fn pending() -> PaymentSession {
        let mut session = PaymentSession::new();
        session.amount_due = Some(Amount::new(dec!(12.50)).unwrap());
        session.begin(ReferenceKey::generate()).unwrap();
        session
    }

    #[test]
    fn test_reference_keys_are_unique() {
        let a = ReferenceKey::generate();
        let b = ReferenceKey::generate();
        assert_ne!(a, b);
        assert_eq!(ReferenceKey::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_begin_requires_amount() {
        let mut session = PaymentSession::new();
        assert_eq!(
            session.begin(ReferenceKey::generate()),
            Err(PaymentError::AmountMissing)
        );
        assert_eq!(session.status, PaymentStatus::New);
    }

    #[test]
    fn test_begin_only_from_new() {
        let mut session = pending();
        let result = session.begin(ReferenceKey::generate());
        assert!(matches!(
            result,
            Err(PaymentError::InvalidTransition {
                from: PaymentStatus::Pending,
                ..
            })
        ));
    }

    #[test]
    fn test_watchdog_times_out_after_bound() {
        let mut session = pending();
        for attempt in 1..=4 {
            assert_eq!(session.record_attempt(3).unwrap(), attempt);
        }
        assert_eq!(session.status, PaymentStatus::Pending);

        assert_eq!(session.record_attempt(3).unwrap(), 4);
        assert_eq!(session.status, PaymentStatus::Error);
        assert_eq!(session.error, Some(PaymentError::Timeout));
    }

    #[test]
    fn test_confirm_stores_signature_and_resets_watchdog() {
        let mut session = pending();
        session.record_attempt(10).unwrap();
        session.confirm(Signature::new("sig")).unwrap();

        assert_eq!(session.status, PaymentStatus::Confirmed);
        assert_eq!(session.signature, Some(Signature::new("sig")));
        assert_eq!(session.watchdog, 0);
        assert!(session.confirm(Signature::new("other")).is_err());
    }

    #[test]
    fn test_finalize_on_confirmations_or_flag() {
        let mut session = pending();
        session.confirm(Signature::new("sig")).unwrap();
        session.mark_valid().unwrap();

        let not_yet = TransferStatus {
            confirmations: Some(1),
            ..Default::default()
        };
        assert!(!session.observe_status(&not_yet, 2).unwrap());
        assert_eq!(session.progress(2), dec!(0.5));

        let finalized = TransferStatus {
            finalized: true,
            ..Default::default()
        };
        assert!(session.observe_status(&finalized, 2).unwrap());
        assert_eq!(session.status, PaymentStatus::Finalized);
        assert_eq!(session.progress(2), Decimal::ONE);
    }

    #[test]
    fn test_retry_only_from_error() {
        let mut session = pending();
        assert!(!session.retry());
        assert_eq!(session.status, PaymentStatus::Pending);

        let reference = session.reference.clone();
        session.record_attempt(5).unwrap();
        session
            .fail(PaymentError::Validation(ValidationFailure::SenderFrozen))
            .unwrap();
        assert!(session.retry());
        assert_eq!(session.status, PaymentStatus::Pending);
        assert_eq!(session.reference, reference);
        assert_eq!(session.watchdog, 0);
        assert!(session.error.is_none());
    }

    #[test]
    fn test_serialized_session_carries_error_code() {
        let mut session = pending();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["error"], serde_json::Value::Null);

        session
            .fail(PaymentError::Validation(ValidationFailure::SenderFrozen))
            .unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "sender-frozen");
    }

    #[test]
    fn test_fail_rejected_from_terminal_states() {
        let mut session = PaymentSession::new();
        assert!(session.fail(PaymentError::Timeout).is_err());
    }

    #[test]
    fn test_reset_keeps_amount_only() {
        let mut session = pending();
        session.confirm(Signature::new("sig")).unwrap();
        session.reset();

        assert_eq!(session.status, PaymentStatus::New);
        assert!(session.reference.is_none());
        assert!(session.signature.is_none());
        assert!(session.amount_due.is_some());
    }
}
