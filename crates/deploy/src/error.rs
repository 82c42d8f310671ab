//! Error types for the deployment pipeline.

use std::time::Duration;

use alloy_core::primitives::B256;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure that can stop a deployment run.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration values are absent. Raised before any network call.
    #[error("missing configuration values: {}", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfiguration { key: &'static str, reason: String },

    #[error("invalid amount format '{input}': {reason}")]
    InvalidAmountFormat { input: String, reason: &'static str },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// A single unit could not be deployed.
    #[error("{unit} deployment failed: {cause}")]
    DeploymentFailed { unit: String, cause: String },

    /// The confirmation wait for a unit exceeded the configured bound.
    #[error(
        "{unit} deployment timed out after {}s waiting for transaction {tx_hash}",
        .timeout.as_secs()
    )]
    DeploymentTimeout {
        unit: String,
        tx_hash: B256,
        timeout: Duration,
    },

    #[error("no signing credential configured (set PRIVATE_KEY)")]
    NoSignerConfigured,

    #[error("deployment aborted before {unit}")]
    Aborted { unit: String },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl Error {
    /// The manifest unit this error is attributed to, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Error::DeploymentFailed { unit, .. }
            | Error::DeploymentTimeout { unit, .. }
            | Error::Aborted { unit } => Some(unit),
            _ => None,
        }
    }

    pub(crate) fn deployment(unit: &str, cause: impl ToString) -> Self {
        Error::DeploymentFailed {
            unit: unit.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Failures reported by a [`ChainClient`](crate::ChainClient).
#[derive(Debug, Error)]
pub enum ChainError {
    /// The request never produced a JSON-RPC response (connection, HTTP or decoding failure).
    #[error("{method} request failed: {reason}")]
    Transport { method: String, reason: String },

    /// The node answered with a JSON-RPC error object.
    #[error("node rejected {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("transaction {0} reverted")]
    Reverted(B256),

    #[error("receipt for transaction {0} carries no contract address")]
    MissingContractAddress(B256),

    #[error("timed out after {}s waiting for transaction {tx_hash}", .timeout.as_secs())]
    Timeout { tx_hash: B256, timeout: Duration },

    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

impl ChainError {
    /// Whether retrying the same read request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport { .. })
    }
}
