//! UUPS proxy deployment of a single prepared unit.

use alloy_core::primitives::{Address, Bytes};
use serde::Serialize;

use crate::artifact::{Artifact, PreparedUnit};
use crate::chain::ChainClient;
use crate::error::{ChainError, Error, Result};

/// Outcome of one successfully deployed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    pub unit_name: String,
    /// Stable address users interact with; survives implementation upgrades.
    pub proxy_address: Address,
    pub implementation_address: Address,
}

/// Deploys implementations and wraps each in an ERC-1967 proxy.
///
/// The proxy constructor delegates to the initializer, so creating the proxy and
/// initializing it happen in one transaction.
#[derive(Debug)]
pub struct ProxyDeployer<C> {
    client: C,
    proxy: Artifact,
}

impl<C: ChainClient> ProxyDeployer<C> {
    pub fn new(client: C, proxy: Artifact) -> Result<Self> {
        proxy
            .ensure_proxy()
            .map_err(|reason| Error::InvalidConfiguration {
                key: "proxy artifact",
                reason,
            })?;
        Ok(Self { client, proxy })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deploy `unit` behind a fresh proxy. Calling twice yields two independent proxies.
    pub async fn deploy(&self, unit: &PreparedUnit) -> Result<DeploymentResult> {
        tracing::info!(unit = %unit.name, "Deploying implementation...");
        let implementation_address = self
            .create(&unit.name, unit.implementation_code.clone())
            .await?;
        tracing::debug!(unit = %unit.name, implementation = %implementation_address, "Implementation deployed");

        let init_code = self
            .proxy
            .proxy_creation_code(implementation_address, &unit.init_data)
            .map_err(|cause| Error::deployment(&unit.name, cause))?;

        tracing::info!(unit = %unit.name, initializer = %unit.initializer, "Deploying proxy...");
        let proxy_address = self.create(&unit.name, init_code).await?;

        Ok(DeploymentResult {
            unit_name: unit.name.clone(),
            proxy_address,
            implementation_address,
        })
    }

    async fn create(&self, unit: &str, init_code: Bytes) -> Result<Address> {
        let tx_hash = self
            .client
            .send_create(init_code)
            .await
            .map_err(|e| attribute(unit, e))?;

        tracing::debug!(unit = %unit, tx_hash = %tx_hash, "Waiting for confirmation...");

        self.client
            .wait_for_contract(tx_hash)
            .await
            .map_err(|e| attribute(unit, e))
    }
}

/// Attach the unit name to a network failure.
fn attribute(unit: &str, error: ChainError) -> Error {
    match error {
        ChainError::Timeout { tx_hash, timeout } => Error::DeploymentTimeout {
            unit: unit.to_string(),
            tx_hash,
            timeout,
        },
        other => Error::deployment(unit, other),
    }
}
