use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use realty_deploy::DEFAULT_PROXY_ARTIFACT;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "realty")]
#[command(
    author,
    version,
    about = "Deploy the RealtyArmy contract suite behind UUPS proxies"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "REALTY_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a settings file. Defaults to `Realty.toml` in the working directory, if present.
    #[arg(short, long, global = true, env = "REALTY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy every unit of the manifest, in order, each behind a fresh proxy.
    Deploy(DeployArgs),

    /// Resolve and check the manifest against the artifacts without sending anything.
    Plan(PlanArgs),

    /// Print the address of the configured deployer account.
    Signer,
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Manifest file (or a directory containing `Manifest.toml`).
    /// The built-in RealtyArmy suite is used when omitted.
    #[arg(short, long, env = "REALTY_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// The hardhat `artifacts/` directory.
    #[arg(short, long, env = "REALTY_ARTIFACTS", default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// Name of the ERC-1967 proxy artifact. Hardhat only emits it when a project
    /// contract imports `@openzeppelin/contracts/proxy/ERC1967/ERC1967Proxy.sol`.
    #[arg(long, env = "REALTY_PROXY_ARTIFACT", default_value = DEFAULT_PROXY_ARTIFACT)]
    pub proxy_artifact: String,
}

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Write the manifest to this path as TOML.
    #[arg(long)]
    pub save: Option<PathBuf>,
}
