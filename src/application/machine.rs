use crate::config::PaymentConfig;
use crate::domain::amount::{Amount, Mint};
use crate::domain::ports::{LedgerClientBox, LedgerError, TransferExpectation};
use crate::domain::session::{PaymentSession, PaymentStatus, ReferenceKey, Signature};
use crate::error::{PaymentError, Result};
use crate::infrastructure::connectivity::{Connectivity, wait_until_online};
use crate::interfaces::pay_url::{TransferRequest, encode_pay_url};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    StatusChanged {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

struct MachineState {
    session: PaymentSession,
    /// Bumped whenever the active poller is replaced or cancelled. A poller only
    /// mutates the session while its captured generation is still current.
    generation: u64,
    poller: Option<JoinHandle<()>>,
}

enum Step {
    Discover {
        reference: ReferenceKey,
    },
    Validate {
        signature: Signature,
        expected: TransferExpectation,
    },
    Finalize {
        signature: Signature,
    },
}

struct Shared {
    config: PaymentConfig,
    ledger: LedgerClientBox,
    state: Mutex<MachineState>,
    events: broadcast::Sender<PaymentEvent>,
}

/// Drives a single checkout payment from request generation to finalization.
///
/// The machine owns one [`PaymentSession`] and at most one polling task. The
/// UI triggers [`generate`](Self::generate), [`retry`](Self::retry) and
/// [`init`](Self::init); everything else happens on the poller, which reads the
/// session fresh on every tick.
///
/// `generate` and `retry` spawn onto the current tokio runtime and must be
/// called from within one.
pub struct PaymentConfirmationMachine {
    shared: Arc<Shared>,
    connectivity: Connectivity,
}

impl PaymentConfirmationMachine {
    pub fn new(config: PaymentConfig, ledger: LedgerClientBox, connectivity: Connectivity) -> Self {
        let session = PaymentSession {
            token: config.token.clone(),
            ..PaymentSession::new()
        };
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            shared: Arc::new(Shared {
                config,
                ledger,
                state: Mutex::new(MachineState {
                    session,
                    generation: 0,
                    poller: None,
                }),
                events,
            }),
            connectivity,
        }
    }

    /// Sets the amount the next payment request will ask for.
    pub fn set_amount(&self, amount: Amount) -> Result<()> {
        let mut state = self.shared.state.lock();
        ensure_new(&state.session, "change amount")?;
        state.session.amount_due = Some(amount);
        Ok(())
    }

    /// Selects the token to be paid in; `None` selects the native currency.
    pub fn set_token(&self, token: Option<Mint>) -> Result<()> {
        let mut state = self.shared.state.lock();
        ensure_new(&state.session, "change token")?;
        state.session.token = token;
        Ok(())
    }

    /// Starts a fresh payment attempt with a new reference key.
    ///
    /// Any active attempt is cancelled first, whatever its state.
    pub fn generate(&self) -> Result<ReferenceKey> {
        let mut state = self.shared.state.lock();
        if state.session.amount_due.is_none() {
            return Err(PaymentError::AmountMissing);
        }

        cancel_poller(&mut state);
        let from = state.session.status;
        if from != PaymentStatus::New {
            state.session.reset();
            self.shared.emit(from, PaymentStatus::New);
        }

        let reference = ReferenceKey::generate();
        state.session.begin(reference.clone())?;
        self.shared.emit(PaymentStatus::New, PaymentStatus::Pending);
        info!(%reference, amount = ?state.session.amount_due, "Payment request generated");

        self.spawn_poller(&mut state);
        Ok(reference)
    }

    /// Restarts polling for the same reference key after an error.
    ///
    /// Returns `false` without doing anything when the payment is not in
    /// the Error state.
    pub fn retry(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.session.status != PaymentStatus::Error {
            debug!(status = %state.session.status, "Ignoring retry outside of error state");
            return false;
        }

        cancel_poller(&mut state);
        state.session.retry();
        self.shared
            .emit(PaymentStatus::Error, PaymentStatus::Pending);
        info!(reference = ?state.session.reference, "Retrying payment");

        self.spawn_poller(&mut state);
        true
    }

    /// Abandons the current attempt and returns to New.
    pub fn init(&self) {
        let mut state = self.shared.state.lock();
        cancel_poller(&mut state);
        let from = state.session.status;
        state.session.reset();
        if from != PaymentStatus::New {
            self.shared.emit(from, PaymentStatus::New);
            info!(%from, "Payment session cleared");
        }
    }

    pub fn status(&self) -> PaymentStatus {
        self.shared.state.lock().session.status
    }

    pub fn snapshot(&self) -> PaymentSession {
        self.shared.state.lock().session.clone()
    }

    pub fn reference(&self) -> Option<ReferenceKey> {
        self.shared.state.lock().session.reference.clone()
    }

    pub fn error(&self) -> Option<PaymentError> {
        self.shared.state.lock().session.error.clone()
    }

    /// Localized description of the current error, if any.
    pub fn error_message(&self) -> Option<&'static str> {
        let locale = self.shared.config.locale;
        self.error().map(|e| e.user_message(locale))
    }

    pub fn progress(&self) -> Decimal {
        let required = self.shared.config.required_confirmations;
        self.shared.state.lock().session.progress(required)
    }

    /// The transfer request URI to display as a QR code, once generated.
    pub fn pay_url(&self) -> Option<String> {
        let state = self.shared.state.lock();
        let session = &state.session;
        let reference = session.reference.clone()?;
        let config = &self.shared.config;
        let request = TransferRequest {
            recipient: config.recipient.clone(),
            amount: session.amount_due,
            token: session.token.clone(),
            reference: Some(reference),
            label: config.label.clone(),
            message: config.message.clone(),
            memo: config.memo.clone(),
        };
        Some(encode_pay_url(&request))
    }

    /// Whether a poller task is currently scheduled.
    pub fn is_polling(&self) -> bool {
        self.shared
            .state
            .lock()
            .poller
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.shared.config
    }

    fn spawn_poller(&self, state: &mut MachineState) {
        let shared = Arc::clone(&self.shared);
        let generation = state.generation;
        let online = self.connectivity.subscribe();
        state.poller = Some(tokio::spawn(shared.run(generation, online)));
    }
}

impl Drop for PaymentConfirmationMachine {
    fn drop(&mut self) {
        cancel_poller(&mut self.shared.state.lock());
    }
}

fn ensure_new(session: &PaymentSession, action: &'static str) -> Result<()> {
    if session.status == PaymentStatus::New {
        Ok(())
    } else {
        Err(PaymentError::InvalidTransition {
            from: session.status,
            action,
        })
    }
}

fn cancel_poller(state: &mut MachineState) {
    state.generation = state.generation.wrapping_add(1);
    if let Some(handle) = state.poller.take() {
        handle.abort();
    }
}

impl Shared {
    fn emit(&self, from: PaymentStatus, to: PaymentStatus) {
        info!(%from, %to, "Payment status changed");
        // No subscribers is fine.
        let _ = self.events.send(PaymentEvent::StatusChanged { from, to });
    }

    /// Applies `transition` if `generation` is still current. Returns `false`
    /// when the poller has been superseded or the transition was rejected.
    fn apply<F>(&self, generation: u64, transition: F) -> bool
    where
        F: FnOnce(&mut PaymentSession) -> Result<()>,
    {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation, "Discarding result from superseded poll");
            return false;
        }
        let from = state.session.status;
        if let Err(e) = transition(&mut state.session) {
            error!(error = %e, "Rejected payment transition");
            return false;
        }
        let to = state.session.status;
        if from != to {
            self.emit(from, to);
        }
        true
    }

    fn fail(&self, generation: u64, error: PaymentError) {
        error!(error = %error, "Payment failed");
        self.apply(generation, |session| session.fail(error));
    }

    /// Reads the session and decides what the poller does on this tick.
    fn next_step(&self, generation: u64) -> Option<Step> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        let session = &mut state.session;
        match session.status {
            PaymentStatus::Pending => {
                let attempt = match session.record_attempt(self.config.max_poll_attempts) {
                    Ok(attempt) => attempt,
                    Err(e) => {
                        error!(error = %e, "Watchdog update rejected");
                        return None;
                    }
                };
                if session.status == PaymentStatus::Error {
                    warn!(
                        attempts = self.config.max_poll_attempts,
                        "No matching transaction found, payment timed out"
                    );
                    self.emit(PaymentStatus::Pending, PaymentStatus::Error);
                    return None;
                }
                debug!(attempt, "Polling ledger for payment reference");
                Some(Step::Discover {
                    reference: session.reference.clone()?,
                })
            }
            PaymentStatus::Confirmed => Some(Step::Validate {
                signature: session.signature.clone()?,
                expected: TransferExpectation {
                    recipient: self.config.recipient.clone(),
                    amount: session.amount_due?,
                    token: session.token.clone(),
                    reference: session.reference.clone()?,
                },
            }),
            PaymentStatus::Valid => Some(Step::Finalize {
                signature: session.signature.clone()?,
            }),
            PaymentStatus::New | PaymentStatus::Finalized | PaymentStatus::Error => None,
        }
    }

    async fn run(self: Arc<Self>, generation: u64, mut online: watch::Receiver<bool>) {
        let mut delay = self.config.poll_interval;
        loop {
            if !*online.borrow_and_update() {
                warn!("Network offline, payment polling paused");
                if !wait_until_online(&mut online).await {
                    break;
                }
                info!("Network back online, resuming payment polling");
            }

            tokio::time::sleep(delay).await;
            if !*online.borrow() {
                continue;
            }

            let Some(step) = self.next_step(generation) else {
                break;
            };
            let next = match step {
                Step::Discover { reference } => self.discover(generation, &reference).await,
                Step::Validate {
                    signature,
                    expected,
                } => self.validate(generation, &signature, &expected).await,
                Step::Finalize { signature } => self.finalize(generation, &signature).await,
            };
            match next {
                Some(next) => delay = next,
                None => break,
            }
        }
        debug!(generation, "Payment poller stopped");
    }

    async fn discover(&self, generation: u64, reference: &ReferenceKey) -> Option<Duration> {
        match self.ledger.find_reference(reference).await {
            Ok(signature) => {
                info!(%signature, "Transaction found for payment reference");
                // Validation starts right away.
                self.apply(generation, |session| session.confirm(signature))
                    .then_some(Duration::ZERO)
            }
            Err(LedgerError::NotFound) => Some(self.config.poll_interval),
            Err(e) => {
                self.fail(generation, PaymentError::Lookup(e.to_string()));
                None
            }
        }
    }

    async fn validate(
        &self,
        generation: u64,
        signature: &Signature,
        expected: &TransferExpectation,
    ) -> Option<Duration> {
        match self.ledger.validate_transfer(signature, expected).await {
            Ok(()) => self
                .apply(generation, |session| session.mark_valid())
                .then_some(self.config.poll_interval),
            Err(failure) if failure.is_transient() => {
                warn!(reason = %failure, "Ledger has not caught up, retrying validation");
                Some(self.config.validation_retry_delay)
            }
            Err(failure) => {
                self.fail(generation, PaymentError::Validation(failure));
                None
            }
        }
    }

    async fn finalize(&self, generation: u64, signature: &Signature) -> Option<Duration> {
        let status = match self.ledger.get_transfer_status(signature).await {
            Ok(Some(status)) => status,
            Ok(None) => return Some(self.config.poll_interval),
            Err(e) => {
                self.fail(generation, PaymentError::StatusQuery(e.to_string()));
                return None;
            }
        };
        if let Some(err) = status.err.clone() {
            self.fail(generation, PaymentError::StatusQuery(err));
            return None;
        }

        let required = self.config.required_confirmations;
        let mut finalized = false;
        let applied = self.apply(generation, |session| {
            finalized = session.observe_status(&status, required)?;
            Ok(())
        });
        if !applied || finalized {
            return None;
        }
        debug!(confirmations = ?status.confirmations, required, "Waiting for confirmations");
        Some(self.config.poll_interval)
    }
}
