use super::amount::{Amount, Mint, Recipient};
use super::session::{ReferenceKey, Signature};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by ledger lookups outside of transfer validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The ledger has not indexed a matching transaction yet.
    #[error("not found")]
    NotFound,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Reasons a transfer can fail validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationFailure {
    NotFound,
    MissingMeta,
    RecipientNotFound,
    AmountNotTransferred,
    InvalidRecipient,
    MintMismatch,
    SenderFrozen,
    RecipientFrozen,
    ReferenceMissing,
    Other(String),
}

impl ValidationFailure {
    /// The ledger has not caught up with the transaction yet; validation
    /// should be attempted again shortly.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ValidationFailure::NotFound | ValidationFailure::MissingMeta
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::NotFound => "not-found",
            ValidationFailure::MissingMeta => "missing-meta",
            ValidationFailure::RecipientNotFound => "recipient-not-found",
            ValidationFailure::AmountNotTransferred => "amount-not-transferred",
            ValidationFailure::InvalidRecipient => "invalid-recipient",
            ValidationFailure::MintMismatch => "mint-mismatch",
            ValidationFailure::SenderFrozen => "sender-frozen",
            ValidationFailure::RecipientFrozen => "recipient-frozen",
            ValidationFailure::ReferenceMissing => "reference-missing",
            ValidationFailure::Other(_) => "other",
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::Other(reason) => f.write_str(reason),
            other => f.write_str(other.code()),
        }
    }
}

/// Signature status as reported by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub confirmations: Option<u32>,
    pub err: Option<String>,
    pub finalized: bool,
}

/// What a valid transfer for the current session must look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferExpectation {
    pub recipient: Recipient,
    pub amount: Amount,
    pub token: Option<Mint>,
    pub reference: ReferenceKey,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn find_reference(&self, reference: &ReferenceKey) -> Result<Signature, LedgerError>;
    async fn get_transfer_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransferStatus>, LedgerError>;
    async fn validate_transfer(
        &self,
        signature: &Signature,
        expected: &TransferExpectation,
    ) -> Result<(), ValidationFailure>;
}

pub type LedgerClientBox = Arc<dyn LedgerClient>;
