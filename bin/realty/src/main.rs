//! realty deploys the RealtyArmy contract suite, each contract behind its own UUPS proxy.

mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use comfy_table::Table;
use realty_deploy::{
    ArtifactStore, BatchRunner, Manifest, NetworkConfig, PreparedUnit, ProxyDeployer,
    RpcChainClient, SETTINGS_FILENAME, Settings, configured_signer, prepare,
};
use tokio::sync::watch;

use cli::{Cli, Command, DeployArgs, ManifestArgs, PlanArgs};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger. stdout is reserved for deployment lines.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Deployment failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(settings_path(cli.config).as_deref())?;

    match cli.command {
        Command::Deploy(args) => deploy(&settings, args).await,
        Command::Plan(args) => plan(&settings, args),
        Command::Signer => {
            println!("Deployer address: {}", configured_signer(&settings)?);
            Ok(())
        }
    }
}

/// The explicit settings file, or `Realty.toml` when one exists in the working directory.
fn settings_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(SETTINGS_FILENAME);
        default.is_file().then_some(default)
    })
}

fn load_manifest(path: Option<&Path>) -> Result<Manifest> {
    match path {
        Some(path) => Ok(Manifest::load_from_file(path)?),
        None => {
            tracing::debug!("No manifest given, using the built-in RealtyArmy suite");
            Ok(Manifest::reference())
        }
    }
}

/// Load the manifest and artifacts and check every unit offline.
fn load_plan(args: &ManifestArgs) -> Result<(Manifest, ArtifactStore, Vec<PreparedUnit>)> {
    let manifest = load_manifest(args.manifest.as_deref())?;
    let store = ArtifactStore::open(&args.artifacts)?;
    let units = prepare(&manifest, &store)?;
    Ok((manifest, store, units))
}

async fn deploy(settings: &Settings, args: DeployArgs) -> Result<()> {
    // Validate configuration before anything touches the network.
    let config = NetworkConfig::from_settings(settings, true)?;
    let (_, store, units) = load_plan(&args.manifest)?;

    let proxy = store.load_proxy(&args.manifest.proxy_artifact)?;

    let client = RpcChainClient::connect(&config).await?;
    tracing::info!(
        deployer = %client.signer_address(),
        chain_id = client.chain_id(),
        units = units.len(),
        "Starting deployment..."
    );

    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current unit...");
            let _ = abort_tx.send(true);
        }
    });

    let runner = BatchRunner::new(ProxyDeployer::new(client, proxy)?).with_abort_signal(abort_rx);

    let mut stdout = std::io::stdout().lock();
    match runner.run_all(&units, &mut stdout).await {
        Ok(results) => {
            tracing::info!(deployed = results.len(), "All units deployed");
            Ok(())
        }
        Err(failure) => {
            if !failure.completed.is_empty() {
                let deployed = failure
                    .completed
                    .iter()
                    .map(|r| r.unit_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::warn!(deployed = %deployed, "Units already deployed remain on-chain");
            }
            Err(failure.into())
        }
    }
}

fn plan(settings: &Settings, args: PlanArgs) -> Result<()> {
    let (manifest, store, units) = load_plan(&args.manifest)?;
    let resolved = manifest.resolve()?;

    // Deploying needs the proxy too; report it now rather than at send time.
    let proxy = store.load_proxy(&args.manifest.proxy_artifact)?;
    tracing::info!(proxy = %proxy.name, "Proxy artifact found");

    // The signer is optional for planning.
    if let Ok(address) = configured_signer(settings) {
        tracing::info!(deployer = %address, "Deployments would be sent from this account");
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Contract", "Initializer", "Arguments"]);
    for (index, (unit, resolved)) in units.iter().zip(&resolved).enumerate() {
        let args = resolved
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            (index + 1).to_string(),
            unit.name.clone(),
            unit.initializer.clone(),
            args,
        ]);
    }

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{table}")?;

    if let Some(path) = &args.save {
        manifest.save_to_file(path)?;
    }

    Ok(())
}
