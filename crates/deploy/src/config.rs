//! Network and credential configuration, read once at process start.
//!
//! Values are layered with figment: an optional TOML file, then the raw
//! `MAINNET_RPC_URL` / `PRIVATE_KEY` / `ETHERSCAN_API_KEY` environment
//! variables, then `REALTY_`-prefixed tunables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy_signer_local::PrivateKeySigner;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// The default name for the settings file.
pub const SETTINGS_FILENAME: &str = "Realty.toml";

/// Prefix of the environment variables holding tunables.
pub const ENV_PREFIX: &str = "REALTY_";

pub const RPC_URL_VAR: &str = "MAINNET_RPC_URL";
pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
pub const EXPLORER_API_KEY_VAR: &str = "ETHERSCAN_API_KEY";

const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_CONFIRMATIONS: u64 = 1;
const DEFAULT_GAS_BUFFER_PERCENT: u64 = 20;

/// Upper bound on the gas estimate buffer: at most 11x the estimate.
pub const MAX_GAS_BUFFER_PERCENT: u64 = 1_000;

/// Raw, unvalidated settings as merged from all sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub mainnet_rpc_url: Option<String>,
    pub private_key: Option<String>,
    pub etherscan_api_key: Option<String>,
    pub confirmation_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub confirmations: Option<u64>,
    pub gas_buffer_percent: Option<u64>,
}

impl Settings {
    /// The layered figment: `config_file` (if any) < raw credential env vars < `REALTY_*`.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new();

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::raw().only(&[RPC_URL_VAR, PRIVATE_KEY_VAR, EXPLORER_API_KEY_VAR]))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Parse the configured private key, if any. Needs no other setting.
    pub fn signer(&self) -> Result<Option<PrivateKeySigner>> {
        non_blank(&self.private_key)
            .map(|key| {
                PrivateKeySigner::from_str(key).map_err(|_| Error::InvalidConfiguration {
                    key: PRIVATE_KEY_VAR,
                    reason: "not a valid secp256k1 private key".to_string(),
                })
            })
            .transpose()
    }

    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::figment(config_file)
            .extract()
            .map_err(|e| Error::InvalidConfiguration {
                key: "settings",
                reason: e.to_string(),
            })
    }
}

/// Validated configuration passed by reference to the deployment pipeline.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub rpc_url: Url,
    /// Signing account. `None` only when loaded without requiring a signer.
    pub signer: Option<PrivateKeySigner>,
    /// Block explorer key, kept for contract verification tooling.
    pub explorer_api_key: Option<String>,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub confirmations: u64,
    pub gas_buffer_percent: u64,
}

impl NetworkConfig {
    /// Validate `settings`. Every missing required value is reported at once.
    pub fn from_settings(settings: &Settings, require_signer: bool) -> Result<Self> {
        let rpc_url = non_blank(&settings.mainnet_rpc_url);
        let private_key = non_blank(&settings.private_key);

        let mut missing = Vec::new();
        if rpc_url.is_none() {
            missing.push(RPC_URL_VAR);
        }
        if require_signer && private_key.is_none() {
            missing.push(PRIVATE_KEY_VAR);
        }

        let Some(rpc_url) = rpc_url.filter(|_| missing.is_empty()) else {
            return Err(Error::Configuration { missing });
        };

        let rpc_url = Url::parse(rpc_url).map_err(|e| Error::InvalidConfiguration {
            key: RPC_URL_VAR,
            reason: e.to_string(),
        })?;

        let signer = settings.signer()?;

        let confirmations = settings.confirmations.unwrap_or(DEFAULT_CONFIRMATIONS);
        if confirmations == 0 {
            return Err(Error::InvalidConfiguration {
                key: "confirmations",
                reason: "must be at least 1".to_string(),
            });
        }

        let gas_buffer_percent = settings
            .gas_buffer_percent
            .unwrap_or(DEFAULT_GAS_BUFFER_PERCENT);
        if gas_buffer_percent > MAX_GAS_BUFFER_PERCENT {
            return Err(Error::InvalidConfiguration {
                key: "gas_buffer_percent",
                reason: format!("must be at most {MAX_GAS_BUFFER_PERCENT}, got {gas_buffer_percent}"),
            });
        }

        let config = Self {
            rpc_url,
            signer,
            explorer_api_key: non_blank(&settings.etherscan_api_key).map(str::to_string),
            confirmation_timeout: Duration::from_secs(
                settings
                    .confirmation_timeout_secs
                    .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            ),
            poll_interval: Duration::from_millis(
                settings.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            confirmations,
            gas_buffer_percent,
        };

        tracing::debug!(
            rpc_url = %config.rpc_url,
            signer = ?config.signer.as_ref().map(|s| s.address()),
            explorer_api_key = config.explorer_api_key.is_some(),
            confirmations = config.confirmations,
            timeout_secs = config.confirmation_timeout.as_secs(),
            "Network configuration loaded"
        );

        Ok(config)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
