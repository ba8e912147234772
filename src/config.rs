//! Runtime configuration loaded from the environment (and `.env`).

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    engine::{
        EngineSettings, DUE_BATCH_SIZE, MAX_CHECK_ATTEMPTS, POLL_INTERVAL, RECHECK_DELAY,
        REQUIRED_CONFIRMATIONS,
    },
    ethereum::{Chain, RetryPolicy},
    utils::validation::is_valid_address,
};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:25202";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,

    pub bind_address: String,
    pub public_url: Option<String>,
    pub cors_origins: Vec<String>,

    pub ethereum_provider_url: String,
    pub chain: Chain,
    pub rpc_retry: RetryPolicy,

    pub engine: EngineSettings,
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn millis(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parsed(name, default.as_millis() as u64).map(Duration::from_millis)
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let ethereum_provider_url = required("ETHEREUM_PROVIDER_URL")?;

        let chain = match optional("ETHEREUM_NETWORK") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "ETHEREUM_NETWORK",
                value,
            })?,
            None => Chain::Mainnet,
        };

        let cors_origins = optional("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let rpc_retry = RetryPolicy {
            max_attempts: parsed("RPC_MAX_ATTEMPTS", RetryPolicy::default().max_attempts)?,
            base_delay: millis("RPC_RETRY_DELAY_MS", RetryPolicy::default().base_delay)?,
        };

        let engine = EngineSettings {
            required_confirmations: parsed("REQUIRED_CONFIRMATIONS", REQUIRED_CONFIRMATIONS)?,
            recheck_delay: millis("RECHECK_DELAY_MS", RECHECK_DELAY)?,
            max_check_attempts: parsed("MAX_CHECK_ATTEMPTS", MAX_CHECK_ATTEMPTS)?,
            poll_interval: millis("MONITOR_POLL_INTERVAL_MS", POLL_INTERVAL)?,
            batch_size: parsed("MONITOR_BATCH_SIZE", DUE_BATCH_SIZE)?,
            // Validated when a payment is created so a bad value is reported per request.
            platform_wallet: optional("PLATFORM_WALLET_ADDRESS"),
        };

        Ok(Config {
            database_url,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            bind_address: optional("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            public_url: optional("PUBLIC_URL"),
            cors_origins,
            ethereum_provider_url,
            chain,
            rpc_retry,
            engine,
        })
    }

    /// Logs the configuration without secrets.
    pub fn log_summary(&self) {
        info!("Listening on {}", self.bind_address);
        info!(
            "Ethereum network: {} (chain id {})",
            self.chain,
            self.chain.chain_id()
        );
        info!(
            "Confirmations required: {}, recheck delay: {:?}, max checks: {}",
            self.engine.required_confirmations,
            self.engine.recheck_delay,
            self.engine.max_check_attempts
        );
        match self.engine.platform_wallet.as_deref() {
            Some(wallet) if is_valid_address(wallet) => info!("Platform wallet: {}", wallet),
            Some(wallet) => warn!(
                "PLATFORM_WALLET_ADDRESS {} is not a valid address, payments cannot be created",
                wallet
            ),
            None => warn!("PLATFORM_WALLET_ADDRESS not set, payments cannot be created"),
        }
        if self.cors_origins.is_empty() {
            warn!("CORS_ORIGINS not set, any origin is allowed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_falls_back_to_default_and_rejects_garbage() {
        env::remove_var("CRYPTO_PAY_TEST_UNSET");
        assert_eq!(parsed("CRYPTO_PAY_TEST_UNSET", 12u64), Ok(12));

        env::set_var("CRYPTO_PAY_TEST_NUMBER", " 24 ");
        assert_eq!(parsed("CRYPTO_PAY_TEST_NUMBER", 12u64), Ok(24));

        env::set_var("CRYPTO_PAY_TEST_GARBAGE", "twelve");
        assert_eq!(
            parsed("CRYPTO_PAY_TEST_GARBAGE", 12u64),
            Err(ConfigError::Invalid {
                name: "CRYPTO_PAY_TEST_GARBAGE",
                value: "twelve".to_string()
            })
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        env::set_var("CRYPTO_PAY_TEST_BLANK", "  ");
        assert_eq!(
            required("CRYPTO_PAY_TEST_BLANK"),
            Err(ConfigError::Missing("CRYPTO_PAY_TEST_BLANK"))
        );
        assert_eq!(
            millis("CRYPTO_PAY_TEST_BLANK", Duration::from_secs(5)),
            Ok(Duration::from_secs(5))
        );
    }
}
