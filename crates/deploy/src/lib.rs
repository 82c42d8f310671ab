//! realty-deploy - Batch deployment of upgradeable contracts.
//!
//! This crate deploys an ordered manifest of contracts, each behind a UUPS
//! (ERC-1967) proxy, and reports the resulting proxy addresses. Derived
//! parameters (ether amounts, terms digests) are computed up front and every
//! unit is checked against its build artifact before the first transaction.

pub mod artifact;
pub mod chain;
pub mod config;
pub mod derive;
mod driver;
mod error;
pub mod manifest;
pub mod rpc;
mod runner;
mod signer;
pub mod tx;

pub use artifact::{Artifact, ArtifactStore, DEFAULT_PROXY_ARTIFACT, PreparedUnit};
pub use chain::{ChainClient, RpcChainClient};
pub use config::{NetworkConfig, SETTINGS_FILENAME, Settings};
pub use derive::{ETHER_DECIMALS, derive_amount, format_amount, terms_hash};
pub use driver::{DeploymentResult, ProxyDeployer};
pub use error::{ChainError, Error, Result};
pub use manifest::{DeploymentUnit, Identities, MANIFEST_FILENAME, Manifest, ManifestArg, Role};
pub use runner::{BatchFailure, BatchRunner};
pub use signer::{configured_signer, current_signer};

/// Resolve `manifest` and check every unit against `store`.
///
/// Runs entirely offline: nothing is sent until every unit has an artifact, a
/// matching initializer and well-typed arguments.
pub fn prepare(manifest: &Manifest, store: &ArtifactStore) -> Result<Vec<PreparedUnit>> {
    let resolved = manifest.resolve()?;
    let prepared = store.prepare_all(&resolved)?;
    tracing::info!(units = prepared.len(), "Manifest prepared");
    Ok(prepared)
}
