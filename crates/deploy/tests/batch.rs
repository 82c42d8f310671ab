//! End-to-end batch runs against an in-memory chain.
//!
//! Artifacts are written as a hardhat tree into a temporary directory, so the
//! whole pipeline (resolve, prepare, deploy) runs exactly as it does against a node.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256, address, keccak256};
use realty_deploy::{
    Artifact, ArtifactStore, BatchRunner, ChainClient, ChainError, DEFAULT_PROXY_ARTIFACT,
    DeploymentUnit, Error, Manifest, ManifestArg, PreparedUnit, ProxyDeployer, Role, prepare,
};
use serde_json::{Value, json};
use tempdir::TempDir;
use tokio::sync::watch;

const DEPLOYER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const BAD_ADDRESS: Address = address!("0x000000000000000000000000000000000000bAd0");
const IMPLEMENTATION_CODE: &str = "0x6080604052348015600f57600080fd5b50";
const PROXY_CODE: &str = "0x60806040526040516104ec3803806104ec";

/// Initializer parameter types of every contract in the reference suite.
const SUITE: [(&str, &[&str]); 9] = [
    ("Mortgage", &["uint256"]),
    ("DisputeResolution", &["uint256"]),
    (
        "FractionalOwnership",
        &["string", "string", "string", "uint256", "uint256", "uint256", "address"],
    ),
    ("Crowdfunding", &["address", "uint256"]),
    ("Lease", &["uint256"]),
    ("TitleRegistry", &["uint256", "address"]),
    ("MultiEscrowManager", &["address", "uint256", "uint256", "bytes32"]),
    ("PropertyManagement", &["uint256"]),
    ("SalesEscrow", &["uint256", "address"]),
];

#[derive(Default)]
struct MockState {
    sent: Vec<Bytes>,
    created: HashMap<B256, Address>,
    nonce: u64,
}

/// In-memory [`ChainClient`]: every creation lands at the next CREATE address of [`DEPLOYER`].
#[derive(Default)]
struct MockChain {
    state: Mutex<MockState>,
    /// Creations whose init code contains this pattern revert during estimation.
    reject_containing: Option<Vec<u8>>,
    /// Fail the n-th send (1-based).
    fail_at_send: Option<usize>,
    /// Never confirm anything.
    stall: bool,
    /// Raise the abort flag once this many sends went through.
    abort_after: Option<(usize, watch::Sender<bool>)>,
}

impl MockChain {
    fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl ChainClient for MockChain {
    async fn send_create(&self, init_code: Bytes) -> Result<B256, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(init_code.clone());
        let attempt = state.sent.len();

        let rejected = self
            .reject_containing
            .as_ref()
            .is_some_and(|pattern| init_code.windows(pattern.len()).any(|w| w == pattern.as_slice()));
        if rejected || self.fail_at_send == Some(attempt) {
            return Err(ChainError::Rpc {
                method: "eth_estimateGas".into(),
                code: 3,
                message: "execution reverted: invalid address".into(),
            });
        }

        let nonce = state.nonce;
        state.nonce += 1;
        let tx_hash = keccak256(nonce.to_be_bytes());
        state.created.insert(tx_hash, DEPLOYER.create(nonce));

        if let Some((after, abort)) = &self.abort_after {
            if attempt >= *after {
                let _ = abort.send(true);
            }
        }

        Ok(tx_hash)
    }

    async fn wait_for_contract(&self, tx_hash: B256) -> Result<Address, ChainError> {
        if self.stall {
            return Err(ChainError::Timeout {
                tx_hash,
                timeout: Duration::from_secs(300),
            });
        }
        self.state
            .lock()
            .unwrap()
            .created
            .get(&tx_hash)
            .copied()
            .ok_or(ChainError::MissingContractAddress(tx_hash))
    }
}

fn param(ty: &str) -> Value {
    json!({ "internalType": ty, "name": "", "type": ty })
}

fn write_artifact(root: &Path, name: &str, abi: Value, bytecode: &str) {
    let dir = root.join("contracts").join(format!("{name}.sol"));
    std::fs::create_dir_all(&dir).unwrap();
    let artifact = json!({
        "_format": "hh-sol-artifact-1",
        "contractName": name,
        "sourceName": format!("contracts/{name}.sol"),
        "abi": abi,
        "bytecode": bytecode,
        "deployedBytecode": bytecode,
        "linkReferences": {},
        "deployedLinkReferences": {}
    });
    std::fs::write(dir.join(format!("{name}.json")), artifact.to_string()).unwrap();
}

/// A hardhat `artifacts/` tree holding the reference suite and the proxy.
fn artifacts() -> TempDir {
    let dir = TempDir::new("realty-batch").unwrap();

    for (name, inputs) in SUITE {
        let abi = json!([
            {
                "type": "function",
                "name": "initialize",
                "inputs": inputs.iter().map(|ty| param(ty)).collect::<Vec<_>>(),
                "outputs": [],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "proxiableUUID",
                "inputs": [],
                "outputs": [param("bytes32")],
                "stateMutability": "view"
            },
            {
                "type": "function",
                "name": "upgradeToAndCall",
                "inputs": [param("address"), param("bytes")],
                "outputs": [],
                "stateMutability": "payable"
            }
        ]);
        write_artifact(dir.path(), name, abi, IMPLEMENTATION_CODE);
    }

    let proxy_abi = json!([{
        "type": "constructor",
        "inputs": [param("address"), param("bytes")],
        "stateMutability": "payable"
    }]);
    write_artifact(dir.path(), DEFAULT_PROXY_ARTIFACT, proxy_abi, PROXY_CODE);

    dir
}

fn runner(store: &ArtifactStore, chain: MockChain) -> BatchRunner<MockChain> {
    let proxy: Artifact = store.load(DEFAULT_PROXY_ARTIFACT).unwrap();
    BatchRunner::new(ProxyDeployer::new(chain, proxy).unwrap())
}

fn manifest_with(units: Vec<DeploymentUnit>) -> Manifest {
    Manifest {
        units,
        ..Manifest::reference()
    }
}

fn prepared(manifest: &Manifest, store: &ArtifactStore) -> Vec<PreparedUnit> {
    prepare(manifest, store).unwrap()
}

#[tokio::test]
async fn test_reference_batch_deploys_in_order() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let units = prepared(&Manifest::reference(), &store);
    let runner = runner(&store, MockChain::default());

    let mut out = Vec::new();
    let results = runner.run_all(&units, &mut out).await.unwrap();

    let names: Vec<_> = results.iter().map(|r| r.unit_name.as_str()).collect();
    let expected: Vec<_> = SUITE.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, expected);

    // One implementation and one proxy per unit.
    assert_eq!(runner.deployer().client().sent().len(), 18);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.implementation_address, DEPLOYER.create(2 * i as u64));
        assert_eq!(result.proxy_address, DEPLOYER.create(2 * i as u64 + 1));
    }

    let output = String::from_utf8(out).unwrap();
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines.len(), 9);
    for (line, result) in lines.iter().zip(&results) {
        assert_eq!(
            *line,
            format!("{} deployed to: {}", result.unit_name, result.proxy_address)
        );
    }
}

#[tokio::test]
async fn test_lease_is_initialized_with_derived_fee() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let manifest = manifest_with(vec![DeploymentUnit::new(
        "Lease",
        vec![ManifestArg::derived("fee")],
    )]);
    let units = prepared(&manifest, &store);
    let runner = runner(&store, MockChain::default());

    let mut out = Vec::new();
    let results = runner.run_all(&units, &mut out).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("Lease deployed to: {}\n", results[0].proxy_address)
    );

    // The proxy creation carries the implementation address and initialize(10^16).
    let sent = runner.deployer().client().sent();
    let proxy_code = &sent[1];
    assert!(proxy_code.starts_with(&hex_bytes(PROXY_CODE)));
    assert!(
        proxy_code
            .windows(20)
            .any(|w| w == results[0].implementation_address.as_slice())
    );
    let fee = U256::from(10_000_000_000_000_000u64).to_be_bytes::<32>();
    assert_eq!(&proxy_code[proxy_code.len() - 32 - 28..proxy_code.len() - 28], &fee);
}

#[tokio::test]
async fn test_rejected_initializer_stops_the_batch() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let manifest = manifest_with(vec![
        DeploymentUnit::new("Mortgage", vec![ManifestArg::uint(100)]),
        DeploymentUnit::new(
            "Crowdfunding",
            vec![ManifestArg::address(BAD_ADDRESS), ManifestArg::uint(300)],
        ),
        DeploymentUnit::new("Lease", vec![ManifestArg::derived("fee")]),
    ]);
    let units = prepared(&manifest, &store);
    let runner = runner(
        &store,
        MockChain {
            reject_containing: Some(BAD_ADDRESS.to_vec()),
            ..Default::default()
        },
    );

    let mut out = Vec::new();
    let failure = runner.run_all(&units, &mut out).await.unwrap_err();

    assert_eq!(failure.failed_unit(), Some("Crowdfunding"));
    assert!(matches!(failure.source, Error::DeploymentFailed { .. }));
    assert_eq!(failure.completed.len(), 1);
    assert_eq!(failure.completed[0].unit_name, "Mortgage");

    let output = String::from_utf8(out).unwrap();
    assert_eq!(output.lines().count(), 1);
    assert!(output.starts_with("Mortgage deployed to: "));

    // Mortgage (2), Crowdfunding implementation and rejected proxy; Lease never attempted.
    assert_eq!(runner.deployer().client().sent().len(), 4);
}

#[tokio::test]
async fn test_failure_keeps_earlier_units() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let units = prepared(&Manifest::reference(), &store);

    // Two sends per unit: the 9th is Lease's implementation.
    let runner = runner(
        &store,
        MockChain {
            fail_at_send: Some(9),
            ..Default::default()
        },
    );

    let mut out = Vec::new();
    let failure = runner.run_all(&units, &mut out).await.unwrap_err();

    assert_eq!(failure.failed_unit(), Some("Lease"));
    let completed: Vec<_> = failure
        .completed
        .iter()
        .map(|r| r.unit_name.as_str())
        .collect();
    assert_eq!(
        completed,
        ["Mortgage", "DisputeResolution", "FractionalOwnership", "Crowdfunding"]
    );
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 4);
    assert_eq!(runner.deployer().client().sent().len(), 9);
}

#[tokio::test]
async fn test_redeploying_creates_new_proxies() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let manifest = manifest_with(vec![DeploymentUnit::new(
        "PropertyManagement",
        vec![ManifestArg::uint(150)],
    )]);
    let units = prepared(&manifest, &store);
    let runner = runner(&store, MockChain::default());

    let first = runner.run_all(&units, &mut std::io::sink()).await.unwrap();
    let second = runner.run_all(&units, &mut std::io::sink()).await.unwrap();

    assert_ne!(first[0].proxy_address, second[0].proxy_address);
    assert_ne!(
        first[0].implementation_address,
        second[0].implementation_address
    );
}

#[tokio::test]
async fn test_unconfirmed_creation_times_out() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let units = prepared(&Manifest::reference(), &store);
    let runner = runner(
        &store,
        MockChain {
            stall: true,
            ..Default::default()
        },
    );

    let failure = runner
        .run_all(&units, &mut std::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.source,
        Error::DeploymentTimeout { ref unit, .. } if unit == "Mortgage"
    ));
    assert!(failure.completed.is_empty());
    assert_eq!(runner.deployer().client().sent().len(), 1);
}

#[tokio::test]
async fn test_abort_signal_stops_between_units() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let units = prepared(&Manifest::reference(), &store);

    let (tx, rx) = watch::channel(false);
    let runner = runner(
        &store,
        MockChain {
            abort_after: Some((2, tx)),
            ..Default::default()
        },
    )
    .with_abort_signal(rx);

    let failure = runner
        .run_all(&units, &mut std::io::sink())
        .await
        .unwrap_err();

    // The unit in flight finishes; the next one is never started.
    assert!(matches!(failure.source, Error::Aborted { ref unit } if unit == "DisputeResolution"));
    assert_eq!(failure.completed.len(), 1);
    assert_eq!(runner.deployer().client().sent().len(), 2);
}

#[tokio::test]
async fn test_mismatched_arguments_fail_before_any_send() {
    let dir = artifacts();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let mut manifest = Manifest::reference();
    manifest.units[4] = DeploymentUnit::new("Lease", vec![ManifestArg::text("0.01")]);

    let err = prepare(&manifest, &store).unwrap_err();
    assert_eq!(err.unit(), Some("Lease"));

    let mut manifest = Manifest::reference();
    manifest.units[6].args.pop();
    let err = prepare(&manifest, &store).unwrap_err();
    assert_eq!(err.unit(), Some("MultiEscrowManager"));
    assert!(err.to_string().contains("taking 3 arguments"), "{err}");

    let mut manifest = Manifest::reference();
    manifest
        .units
        .push(DeploymentUnit::new("Marketplace", vec![ManifestArg::identity(Role::Deployer)]));
    let err = prepare(&manifest, &store).unwrap_err();
    assert_eq!(err.unit(), Some("Marketplace"));
}

fn hex_bytes(code: &str) -> Vec<u8> {
    hex::decode(code.trim_start_matches("0x")).unwrap()
}
