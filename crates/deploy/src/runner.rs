//! Sequential, fail-fast execution of a prepared manifest.

use std::io::Write;

use thiserror::Error;
use tokio::sync::watch;

use crate::artifact::PreparedUnit;
use crate::chain::ChainClient;
use crate::driver::{DeploymentResult, ProxyDeployer};
use crate::error::Error;

/// A batch stopped early. Units in `completed` are already on-chain and are not rolled back.
#[derive(Debug, Error)]
#[error("batch stopped with {} unit(s) deployed", .completed.len())]
pub struct BatchFailure {
    pub completed: Vec<DeploymentResult>,
    pub source: Error,
}

impl BatchFailure {
    /// Name of the unit that stopped the batch.
    pub fn failed_unit(&self) -> Option<&str> {
        self.source.unit()
    }
}

/// Runs units through a [`ProxyDeployer`] one at a time, in manifest order.
pub struct BatchRunner<C> {
    deployer: ProxyDeployer<C>,
    abort: Option<watch::Receiver<bool>>,
}

impl<C: ChainClient> BatchRunner<C> {
    pub fn new(deployer: ProxyDeployer<C>) -> Self {
        Self {
            deployer,
            abort: None,
        }
    }

    /// Stop before the next unit once `true` is sent on the channel.
    pub fn with_abort_signal(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn deployer(&self) -> &ProxyDeployer<C> {
        &self.deployer
    }

    /// Deploy every unit in order, writing `<name> deployed to: <address>` to `out`
    /// as each one is confirmed.
    ///
    /// The first failure ends the batch; later units are never attempted.
    pub async fn run_all<W: Write>(
        &self,
        units: &[PreparedUnit],
        out: &mut W,
    ) -> Result<Vec<DeploymentResult>, BatchFailure> {
        let mut completed = Vec::with_capacity(units.len());

        for (index, unit) in units.iter().enumerate() {
            if self.aborted() {
                tracing::warn!(unit = %unit.name, remaining = units.len() - index, "Batch aborted");
                return Err(BatchFailure {
                    completed,
                    source: Error::Aborted {
                        unit: unit.name.clone(),
                    },
                });
            }

            tracing::info!(
                unit = %unit.name,
                position = index + 1,
                total = units.len(),
                "Deploying unit..."
            );

            let result = match self.deployer.deploy(unit).await {
                Ok(result) => result,
                Err(source) => {
                    tracing::error!(
                        unit = %unit.name,
                        error = %source,
                        deployed = completed.len(),
                        "Unit failed, stopping batch"
                    );
                    return Err(BatchFailure { completed, source });
                }
            };

            tracing::info!(
                unit = %result.unit_name,
                proxy = %result.proxy_address,
                implementation = %result.implementation_address,
                "Unit deployed"
            );

            // Output failures never fail the batch.
            if let Err(e) = writeln!(out, "{} deployed to: {}", result.unit_name, result.proxy_address)
                .and_then(|_| out.flush())
            {
                tracing::warn!(error = %e, unit = %result.unit_name, "Failed to write deployment line");
            }

            completed.push(result);
        }

        Ok(completed)
    }

    fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|rx| *rx.borrow())
    }
}
