use crate::domain::amount::{Mint, Recipient};
use crate::error::{PaymentError, Result};
use crate::interfaces::messages::Locale;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;
pub const DEFAULT_VALIDATION_RETRY_DELAY: Duration = Duration::from_millis(250);
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u32 = 1;

/// Merchant and polling settings shared by every payment session.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    pub recipient: Recipient,
    /// SPL token to request. `None` requests the native currency.
    pub token: Option<Mint>,
    pub label: Option<String>,
    pub message: Option<String>,
    pub memo: Option<String>,
    pub required_confirmations: u32,
    pub poll_interval: Duration,
    /// Discovery polls allowed before the session times out.
    pub max_poll_attempts: u32,
    pub validation_retry_delay: Duration,
    pub locale: Locale,
}

impl PaymentConfig {
    pub fn new(recipient: Recipient) -> Self {
        Self {
            recipient,
            token: None,
            label: None,
            message: None,
            memo: None,
            required_confirmations: DEFAULT_REQUIRED_CONFIRMATIONS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            validation_retry_delay: DEFAULT_VALIDATION_RETRY_DELAY,
            locale: Locale::default(),
        }
    }

    /// Loads `.env` if present, then reads the `POS_PAY_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_env_or(None)
    }

    /// Like [`PaymentConfig::from_env`], using `recipient` when
    /// `POS_PAY_RECIPIENT` is not set.
    pub fn from_env_or(recipient: Option<Recipient>) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok(), recipient)
    }

    /// Same as [`PaymentConfig::from_env`], reading a specific env file.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let vars: Vec<(String, String)> = dotenvy::from_path_iter(path.as_ref())
            .map_err(|e| PaymentError::Config(e.to_string()))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PaymentError::Config(e.to_string()))?;
        Self::from_vars(
            |key| {
                vars.iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .or_else(|| std::env::var(key).ok())
            },
            None,
        )
    }

    fn from_vars<F>(var: F, fallback_recipient: Option<Recipient>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let recipient = match (var("POS_PAY_RECIPIENT"), fallback_recipient) {
            (Some(value), _) => Recipient::parse(&value)
                .map_err(|e| PaymentError::Config(format!("POS_PAY_RECIPIENT: {}", e)))?,
            (None, Some(recipient)) => recipient,
            (None, None) => {
                return Err(PaymentError::Config(
                    "POS_PAY_RECIPIENT is not set".to_string(),
                ));
            }
        };
        let mut config = Self::new(recipient);

        config.token = var("POS_PAY_SPL_TOKEN")
            .map(|v| Mint::parse(&v))
            .transpose()
            .map_err(|e| PaymentError::Config(format!("POS_PAY_SPL_TOKEN: {}", e)))?;
        config.label = var("POS_PAY_LABEL");
        config.message = var("POS_PAY_MESSAGE");
        config.memo = var("POS_PAY_MEMO");

        config.required_confirmations = parse_or_default(
            &var,
            "POS_PAY_REQUIRED_CONFIRMATIONS",
            DEFAULT_REQUIRED_CONFIRMATIONS,
        )?;
        config.max_poll_attempts =
            parse_or_default(&var, "POS_PAY_MAX_POLL_ATTEMPTS", DEFAULT_MAX_POLL_ATTEMPTS)?;
        config.poll_interval = Duration::from_millis(parse_or_default(
            &var,
            "POS_PAY_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?);
        config.validation_retry_delay = Duration::from_millis(parse_or_default(
            &var,
            "POS_PAY_VALIDATION_RETRY_MS",
            DEFAULT_VALIDATION_RETRY_DELAY.as_millis() as u64,
        )?);
        config.locale = parse_or_default(&var, "POS_PAY_LOCALE", Locale::default())?;

        Ok(config)
    }
}

fn parse_or_default<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| PaymentError::Config(format!("{}: {}", key, e))),
        None => {
            warn!("{} not set, using {} as default", key, default);
            Ok(default)
        }
    }
}
