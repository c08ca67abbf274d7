use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use pos_pay::application::machine::{PaymentConfirmationMachine, PaymentEvent};
use pos_pay::config::PaymentConfig;
use pos_pay::domain::amount::{Amount, Mint, Recipient};
use pos_pay::domain::session::PaymentStatus;
use pos_pay::infrastructure::connectivity::Connectivity;
use pos_pay::infrastructure::in_memory::{InMemoryLedger, SimulatedTransfer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs one checkout payment against a simulated ledger.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Amount due for the checkout
    amount: Amount,

    /// Merchant wallet receiving the payment. Overrides POS_PAY_RECIPIENT.
    #[arg(long)]
    recipient: Option<Recipient>,

    /// SPL token mint to request instead of the native currency
    #[arg(long)]
    spl_token: Option<Mint>,

    /// Merchant label shown by the customer's wallet
    #[arg(long)]
    label: Option<String>,

    /// Confirmations needed before the payment counts as final
    #[arg(long)]
    required_confirmations: Option<u32>,

    /// Discovery polls allowed before the payment times out
    #[arg(long)]
    max_poll_attempts: Option<u32>,

    /// Delay between ledger polls, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Delay before retrying a validation the ledger has not caught up with, in milliseconds
    #[arg(long)]
    validation_retry_ms: Option<u64>,

    /// Simulate the customer paying after this delay. Without it nobody pays.
    #[arg(long)]
    pay_after_ms: Option<u64>,

    /// Amount the simulated customer sends. Defaults to the amount due.
    #[arg(long)]
    paid_amount: Option<Amount>,

    /// Validation calls that report missing metadata before the ledger catches up
    #[arg(long, default_value_t = 0)]
    indexing_lag: u32,

    /// Print the final session as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> Result<PaymentConfig> {
        let mut config = PaymentConfig::from_env_or(self.recipient.clone()).into_diagnostic()?;
        if let Some(recipient) = &self.recipient {
            config.recipient = recipient.clone();
        }
        if self.spl_token.is_some() {
            config.token = self.spl_token.clone();
        }
        if self.label.is_some() {
            config.label = self.label.clone();
        }
        if let Some(required) = self.required_confirmations {
            config.required_confirmations = required;
        }
        if let Some(attempts) = self.max_poll_attempts {
            config.max_poll_attempts = attempts;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.validation_retry_ms {
            config.validation_retry_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let ledger = InMemoryLedger::with_indexing_lag(cli.indexing_lag);
    let machine = PaymentConfirmationMachine::new(
        config.clone(),
        Arc::new(ledger.clone()),
        Connectivity::default(),
    );
    machine.set_amount(cli.amount).into_diagnostic()?;

    let mut events = machine.subscribe();
    let reference = machine.generate().into_diagnostic()?;
    if let Some(url) = machine.pay_url() {
        println!("{}", url);
    }

    match cli.pay_after_ms {
        Some(ms) => {
            let transfer = SimulatedTransfer {
                recipient: config.recipient.clone(),
                amount: cli.paid_amount.unwrap_or(cli.amount),
                token: config.token.clone(),
                sender_frozen: false,
            };
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let signature = ledger.submit_transfer(&reference, transfer).await;
                info!(%signature, "Customer wallet sent the transfer");
            });
        }
        None => warn!("No simulated payment scheduled, waiting for timeout"),
    }

    loop {
        match events.recv().await {
            Ok(PaymentEvent::StatusChanged { to, .. }) if to.is_terminal() => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed status updates"),
            Err(RecvError::Closed) => break,
        }
    }

    let session = machine.snapshot();
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&session).into_diagnostic()?
        );
    } else {
        println!("status: {}", session.status);
    }

    match session.status {
        PaymentStatus::Finalized => Ok(()),
        _ => {
            let reason = machine
                .error_message()
                .unwrap_or("Payment did not complete");
            Err(miette!("{}", reason))
        }
    }
}
