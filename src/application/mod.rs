//! Application layer containing the payment confirmation orchestration.
//!
//! This module defines the `PaymentConfirmationMachine`, which owns a single
//! payment session and drives it with a `tokio` polling task against a
//! `LedgerClient`.

pub mod machine;
