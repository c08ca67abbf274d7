use crate::domain::ports::ValidationFailure;
use crate::domain::session::PaymentStatus;
use crate::interfaces::messages::{self, Locale};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaymentError {
    #[error("Transaction timed out")]
    Timeout,
    #[error("Transfer validation failed: {0}")]
    Validation(ValidationFailure),
    #[error("Signature status query failed: {0}")]
    StatusQuery(String),
    #[error("Reference lookup failed: {0}")]
    Lookup(String),
    #[error("No amount due has been set")]
    AmountMissing,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Cannot {action} while payment is {from}")]
    InvalidTransition {
        from: PaymentStatus,
        action: &'static str,
    },
    #[error("Invalid pay request: {0}")]
    PayUrl(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Stable identifier used to look up the user-facing message.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Timeout => "timeout",
            PaymentError::Validation(failure) => failure.code(),
            PaymentError::StatusQuery(_) => "status-query",
            PaymentError::Lookup(_) => "lookup",
            PaymentError::AmountMissing => "amount-missing",
            PaymentError::ValidationError(_) => "invalid-input",
            PaymentError::InvalidTransition { .. } => "invalid-transition",
            PaymentError::PayUrl(_) => "pay-url",
            PaymentError::Config(_) => "config",
        }
    }

    /// Localized message suitable for showing to the customer or cashier.
    pub fn user_message(&self, locale: Locale) -> &'static str {
        messages::lookup(self.code(), locale)
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
