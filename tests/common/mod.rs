#![allow(dead_code)]

use async_trait::async_trait;
use pos_pay::application::machine::{PaymentConfirmationMachine, PaymentEvent};
use pos_pay::config::PaymentConfig;
use pos_pay::domain::amount::{Amount, PublicKey};
use pos_pay::domain::ports::{
    LedgerClient, LedgerError, TransferExpectation, TransferStatus, ValidationFailure,
};
use pos_pay::domain::session::{PaymentStatus, ReferenceKey, Signature};
use pos_pay::infrastructure::connectivity::Connectivity;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::time::Instant;

/// Ledger double that replays queued responses and records every call.
///
/// Empty queues fall back to: lookups report not found, validations succeed,
/// status queries report nothing yet.
#[derive(Default)]
pub struct ScriptedLedger {
    lookups: Mutex<VecDeque<Result<Signature, LedgerError>>>,
    validations: Mutex<VecDeque<Result<(), ValidationFailure>>>,
    statuses: Mutex<VecDeque<Result<Option<TransferStatus>, LedgerError>>>,
    stall_validation: Mutex<bool>,
    lookup_gate: Mutex<Option<Arc<Notify>>>,
    pub lookup_calls: Mutex<Vec<ReferenceKey>>,
    pub validation_calls: Mutex<Vec<(Instant, TransferExpectation)>>,
    pub status_calls: Mutex<Vec<Instant>>,
}

impl ScriptedLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_lookup(&self, response: Result<Signature, LedgerError>) {
        self.lookups.lock().await.push_back(response);
    }

    pub async fn push_validation(&self, response: Result<(), ValidationFailure>) {
        self.validations.lock().await.push_back(response);
    }

    pub async fn push_status(&self, response: Result<Option<TransferStatus>, LedgerError>) {
        self.statuses.lock().await.push_back(response);
    }

    /// Makes every validation report missing metadata until cleared.
    pub async fn stall_validation(&self, stall: bool) {
        *self.stall_validation.lock().await = stall;
    }

    /// Blocks lookups until `gate` is notified.
    pub async fn gate_lookups(&self, gate: Arc<Notify>) {
        *self.lookup_gate.lock().await = Some(gate);
    }

    pub async fn lookup_count(&self) -> usize {
        self.lookup_calls.lock().await.len()
    }

    pub async fn validation_count(&self) -> usize {
        self.validation_calls.lock().await.len()
    }

    pub async fn status_count(&self) -> usize {
        self.status_calls.lock().await.len()
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn find_reference(&self, reference: &ReferenceKey) -> Result<Signature, LedgerError> {
        self.lookup_calls.lock().await.push(reference.clone());
        let gate = self.lookup_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.lookups
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(LedgerError::NotFound))
    }

    async fn get_transfer_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<TransferStatus>, LedgerError> {
        self.status_calls.lock().await.push(Instant::now());
        self.statuses.lock().await.pop_front().unwrap_or(Ok(None))
    }

    async fn validate_transfer(
        &self,
        _signature: &Signature,
        expected: &TransferExpectation,
    ) -> Result<(), ValidationFailure> {
        self.validation_calls
            .lock()
            .await
            .push((Instant::now(), expected.clone()));
        if *self.stall_validation.lock().await {
            return Err(ValidationFailure::MissingMeta);
        }
        self.validations.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

pub fn recipient() -> PublicKey {
    PublicKey::from_bytes([1u8; 32])
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn confirmations(count: u32) -> Result<Option<TransferStatus>, LedgerError> {
    Ok(Some(TransferStatus {
        confirmations: Some(count),
        err: None,
        finalized: false,
    }))
}

pub fn machine(
    ledger: &Arc<ScriptedLedger>,
    config: PaymentConfig,
    connectivity: Connectivity,
    due: Decimal,
) -> PaymentConfirmationMachine {
    let machine = PaymentConfirmationMachine::new(config, ledger.clone(), connectivity);
    machine.set_amount(amount(due)).unwrap();
    machine
}

pub fn default_machine(ledger: &Arc<ScriptedLedger>, due: Decimal) -> PaymentConfirmationMachine {
    machine(
        ledger,
        PaymentConfig::new(recipient()),
        Connectivity::default(),
        due,
    )
}

/// Collects transitions until `target` is reached, failing after a minute of
/// (virtual) time.
pub async fn wait_for_status(
    events: &mut broadcast::Receiver<PaymentEvent>,
    target: PaymentStatus,
) -> Vec<PaymentStatus> {
    let collect = async {
        let mut seen = Vec::new();
        loop {
            let PaymentEvent::StatusChanged { to, .. } = events.recv().await.unwrap();
            seen.push(to);
            if to == target {
                return seen;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), collect)
        .await
        .unwrap_or_else(|_| panic!("payment never reached {}", target))
}
