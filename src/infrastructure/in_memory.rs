use crate::domain::amount::{Amount, Mint, Recipient};
use crate::domain::ports::{
    LedgerClient, LedgerError, TransferExpectation, TransferStatus, ValidationFailure,
};
use crate::domain::session::{ReferenceKey, Signature};
use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Confirmation depth at which the simulated ledger reports a transfer as finalized.
pub const FINALITY_DEPTH: u32 = 32;

/// A transfer as a customer's wallet would submit it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTransfer {
    pub recipient: Recipient,
    pub amount: Amount,
    pub token: Option<Mint>,
    pub sender_frozen: bool,
}

impl SimulatedTransfer {
    /// A transfer that satisfies `expected` exactly.
    pub fn matching(expected: &TransferExpectation) -> Self {
        Self {
            recipient: expected.recipient.clone(),
            amount: expected.amount,
            token: expected.token.clone(),
            sender_frozen: false,
        }
    }
}

#[derive(Debug)]
struct Entry {
    reference: ReferenceKey,
    transfer: SimulatedTransfer,
    pending_meta: u32,
    confirmations: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    by_reference: HashMap<ReferenceKey, Signature>,
    transfers: HashMap<Signature, Entry>,
    indexing_lag: u32,
}

/// A thread-safe simulated ledger.
///
/// Uses `Arc<RwLock<..>>` so the CLI or a test can submit transfers while a
/// payment machine polls the same instance. Every status query advances the
/// transfer by one confirmation.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes validation of each new transfer report missing metadata `lag` times
    /// before it can succeed.
    pub fn with_indexing_lag(lag: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                indexing_lag: lag,
                ..Default::default()
            })),
        }
    }

    /// Records a transfer carrying `reference` and returns its signature.
    pub async fn submit_transfer(
        &self,
        reference: &ReferenceKey,
        transfer: SimulatedTransfer,
    ) -> Signature {
        let mut bytes = [0u8; 64];
        OsRng.fill_bytes(&mut bytes);
        let signature = Signature::new(bs58::encode(bytes).into_string());

        let mut state = self.state.write().await;
        let pending_meta = state.indexing_lag;
        state
            .by_reference
            .insert(reference.clone(), signature.clone());
        state.transfers.insert(
            signature.clone(),
            Entry {
                reference: reference.clone(),
                transfer,
                pending_meta,
                confirmations: 0,
            },
        );
        debug!(
            "Simulated ledger accepted transfer {} for {}",
            signature, reference
        );
        signature
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn find_reference(&self, reference: &ReferenceKey) -> Result<Signature, LedgerError> {
        let state = self.state.read().await;
        state
            .by_reference
            .get(reference)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    async fn get_transfer_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransferStatus>, LedgerError> {
        let mut state = self.state.write().await;
        let Some(entry) = state.transfers.get_mut(signature) else {
            return Ok(None);
        };
        entry.confirmations = (entry.confirmations + 1).min(FINALITY_DEPTH);
        Ok(Some(TransferStatus {
            confirmations: Some(entry.confirmations),
            err: None,
            finalized: entry.confirmations >= FINALITY_DEPTH,
        }))
    }

    async fn validate_transfer(
        &self,
        signature: &Signature,
        expected: &TransferExpectation,
    ) -> Result<(), ValidationFailure> {
        let mut state = self.state.write().await;
        let entry = state
            .transfers
            .get_mut(signature)
            .ok_or(ValidationFailure::NotFound)?;

        if entry.pending_meta > 0 {
            entry.pending_meta -= 1;
            return Err(ValidationFailure::MissingMeta);
        }

        let transfer = &entry.transfer;
        if entry.reference != expected.reference {
            return Err(ValidationFailure::ReferenceMissing);
        }
        if transfer.recipient != expected.recipient {
            return Err(ValidationFailure::InvalidRecipient);
        }
        if transfer.token != expected.token {
            return Err(ValidationFailure::MintMismatch);
        }
        if transfer.sender_frozen {
            return Err(ValidationFailure::SenderFrozen);
        }
        if transfer.amount.value() < expected.amount.value() {
            return Err(ValidationFailure::AmountNotTransferred);
        }
        Ok(())
    }
}
