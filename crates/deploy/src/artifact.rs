//! Hardhat build artifacts and initializer encoding.
//!
//! Artifacts are read from a hardhat `artifacts/` tree, where every contract
//! lives at `<Source>.sol/<Name>.json` next to a `<Name>.dbg.json` pointer that
//! is ignored here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use alloy_core::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_core::json_abi::{Function, JsonAbi, Param};
use alloy_core::primitives::{Address, Bytes, I256};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manifest::{ArgValue, ResolvedUnit};

/// Name of the initializer function the proxy calls atomically on creation.
pub const INITIALIZER: &str = "initialize";

/// Artifact of the ERC-1967 proxy wrapped around every implementation.
pub const DEFAULT_PROXY_ARTIFACT: &str = "ERC1967Proxy";

/// Functions a UUPS implementation must expose so the proxy can be upgraded later.
const UUPS_FUNCTIONS: [&str; 2] = ["proxiableUUID", "upgradeToAndCall"];

/// On-disk hardhat artifact format (only the fields used here).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    abi: JsonAbi,
    bytecode: String,
}

/// A compiled contract: ABI and creation bytecode.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Parse a hardhat artifact JSON document.
    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        let raw: HardhatArtifact =
            serde_json::from_str(json).map_err(|e| format!("malformed artifact: {e}"))?;

        if raw.bytecode.contains("__$") {
            return Err(format!(
                "{} has unlinked library references in its bytecode",
                raw.contract_name
            ));
        }

        let bytecode = hex::decode(raw.bytecode.trim_start_matches("0x"))
            .map_err(|e| format!("{} bytecode is not valid hex: {e}", raw.contract_name))?;

        if bytecode.is_empty() {
            return Err(format!(
                "{} has no creation bytecode (abstract contract or interface?)",
                raw.contract_name
            ));
        }

        Ok(Self {
            name: raw.contract_name,
            abi: raw.abi,
            bytecode: bytecode.into(),
        })
    }

    /// Check the artifact can sit behind a UUPS proxy.
    ///
    /// Upgradeable implementations take their parameters through the initializer,
    /// so a constructor with inputs is refused.
    pub fn ensure_uups(&self) -> std::result::Result<(), String> {
        for function in UUPS_FUNCTIONS {
            if self.abi.function(function).is_none() {
                return Err(format!(
                    "{} is not UUPS upgradeable: missing `{function}`",
                    self.name
                ));
            }
        }

        match &self.abi.constructor {
            Some(constructor) if !constructor.inputs.is_empty() => Err(format!(
                "{} declares constructor arguments; upgradeable contracts must use `{INITIALIZER}`",
                self.name
            )),
            _ => Ok(()),
        }
    }

    /// Find the `initialize` overload taking exactly `arity` arguments.
    pub fn initializer(&self, arity: usize) -> std::result::Result<&Function, String> {
        let overloads = self
            .abi
            .function(INITIALIZER)
            .ok_or_else(|| format!("{} has no `{INITIALIZER}` function", self.name))?;

        overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .ok_or_else(|| {
                let available = overloads
                    .iter()
                    .map(|f| f.signature())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{} has no `{INITIALIZER}` taking {arity} arguments (available: {available})",
                    self.name
                )
            })
    }

    /// ABI-encode the initializer call (selector included) for `args`.
    pub fn encode_initializer(
        &self,
        args: &[ArgValue],
    ) -> std::result::Result<(String, Bytes), String> {
        let function = self.initializer(args.len())?;
        let values = coerce_all(&function.inputs, args)?;
        let calldata = function
            .abi_encode_input(&values)
            .map_err(|e| format!("failed to encode {}: {e}", function.signature()))?;

        Ok((function.signature(), calldata.into()))
    }

    /// Creation code: bytecode followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, args: &[DynSolValue]) -> std::result::Result<Bytes, String> {
        let encoded = match &self.abi.constructor {
            Some(constructor) => constructor
                .abi_encode_input(args)
                .map_err(|e| format!("failed to encode {} constructor: {e}", self.name))?,
            None if args.is_empty() => Vec::new(),
            None => return Err(format!("{} has no constructor", self.name)),
        };

        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }

    /// Check the artifact is an ERC-1967 style proxy: `constructor(address, bytes)`.
    pub fn ensure_proxy(&self) -> std::result::Result<(), String> {
        let inputs: Vec<_> = self
            .abi
            .constructor
            .iter()
            .flat_map(|c| c.inputs.iter().map(|p| p.ty.as_str()))
            .collect();

        if inputs != ["address", "bytes"] {
            return Err(format!(
                "{} is not an ERC-1967 proxy: expected constructor(address,bytes), found ({})",
                self.name,
                inputs.join(",")
            ));
        }
        Ok(())
    }

    /// Creation code of a proxy pointing at `implementation` and initialized with `init_data`.
    pub fn proxy_creation_code(
        &self,
        implementation: Address,
        init_data: &Bytes,
    ) -> std::result::Result<Bytes, String> {
        self.creation_code(&[
            DynSolValue::Address(implementation),
            DynSolValue::Bytes(init_data.to_vec()),
        ])
    }
}

/// Coerce resolved manifest values into the initializer's parameter types.
fn coerce_all(params: &[Param], args: &[ArgValue]) -> std::result::Result<Vec<DynSolValue>, String> {
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, value))| {
            let ty = param
                .resolve()
                .map_err(|e| format!("unsupported parameter type {}: {e}", param.ty))?;
            coerce(value, &ty).map_err(|reason| {
                let name = if param.name.is_empty() { "_" } else { &param.name };
                format!("argument {index} ({name}: {}): {reason}", param.ty)
            })
        })
        .collect()
}

fn coerce(value: &ArgValue, ty: &DynSolType) -> std::result::Result<DynSolValue, String> {
    match (value, ty) {
        (ArgValue::Uint(v), DynSolType::Uint(bits)) => {
            if v.bit_len() > *bits {
                return Err(format!("{v} does not fit in uint{bits}"));
            }
            Ok(DynSolValue::Uint(*v, *bits))
        }
        (ArgValue::Uint(v), DynSolType::Int(bits)) => {
            // The sign bit must stay clear.
            if v.bit_len() >= *bits {
                return Err(format!("{v} does not fit in int{bits}"));
            }
            Ok(DynSolValue::Int(I256::from_raw(*v), *bits))
        }
        (ArgValue::Text(s), DynSolType::String) => Ok(DynSolValue::String(s.clone())),
        (ArgValue::Address(a), DynSolType::Address) => Ok(DynSolValue::Address(*a)),
        (ArgValue::Bool(b), DynSolType::Bool) => Ok(DynSolValue::Bool(*b)),
        (ArgValue::Digest(d), DynSolType::FixedBytes(32)) => Ok(DynSolValue::FixedBytes(*d, 32)),
        (ArgValue::Digest(d), DynSolType::Bytes) => Ok(DynSolValue::Bytes(d.to_vec())),
        (value, ty) => Err(format!(
            "cannot pass {} {value} as {}",
            value.kind(),
            ty.sol_type_name()
        )),
    }
}

/// A unit checked against its artifact and encoded, ready for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUnit {
    pub name: String,
    /// Signature of the selected initializer, e.g. `initialize(uint256)`.
    pub initializer: String,
    pub implementation_code: Bytes,
    pub init_data: Bytes,
}

/// Index of the artifacts found under a hardhat `artifacts/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    index: HashMap<String, Vec<PathBuf>>,
}

impl ArtifactStore {
    /// Walk `root` and index every contract artifact by contract name.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::InvalidConfiguration {
                key: "artifacts",
                reason: format!("{} is not a directory (run `npx hardhat compile`?)", root.display()),
            });
        }

        let mut index: HashMap<String, Vec<PathBuf>> = HashMap::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|e| Error::InvalidConfiguration {
                key: "artifacts",
                reason: format!("failed to read {}: {e}", dir.display()),
            })?;

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    // Compiler inputs, not artifacts.
                    if path.file_name().is_some_and(|n| n == "build-info") {
                        continue;
                    }
                    pending.push(path);
                    continue;
                }

                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if file_name.ends_with(".dbg.json") {
                    continue;
                }
                if let Some(name) = file_name.strip_suffix(".json") {
                    index.entry(name.to_string()).or_default().push(path.clone());
                }
            }
        }

        tracing::debug!(root = %root.display(), artifacts = index.len(), "Indexed artifacts");

        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Load the artifact of the contract called `name`.
    pub fn load(&self, name: &str) -> std::result::Result<Artifact, String> {
        let path = match self.index.get(name).map(Vec::as_slice) {
            None | Some([]) => {
                return Err(format!(
                    "no artifact named {name} under {}",
                    self.root.display()
                ));
            }
            Some([path]) => path,
            Some(paths) => {
                let candidates = paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(format!("ambiguous artifact name {name}: {candidates}"));
            }
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Artifact::from_json(&content)
    }

    /// Load the ERC-1967 proxy artifact called `name` and check its constructor.
    ///
    /// Hardhat only emits the proxy when a project contract imports it, so a
    /// missing proxy is reported with that hint.
    pub fn load_proxy(&self, name: &str) -> Result<Artifact> {
        let invalid = |reason: String| Error::InvalidConfiguration {
            key: "proxy artifact",
            reason,
        };

        if !self.contains(name) {
            return Err(invalid(format!(
                "no artifact named {name} under {}; import `@openzeppelin/contracts/proxy/ERC1967/ERC1967Proxy.sol` \
                 from a project contract and recompile",
                self.root.display()
            )));
        }

        let proxy = self.load(name).map_err(invalid)?;
        proxy.ensure_proxy().map_err(invalid)?;
        Ok(proxy)
    }

    /// Check `unit` against its artifact and encode its initializer call.
    pub fn prepare(&self, unit: &ResolvedUnit) -> Result<PreparedUnit> {
        let artifact = self
            .load(&unit.name)
            .map_err(|cause| Error::deployment(&unit.name, cause))?;
        artifact
            .ensure_uups()
            .map_err(|cause| Error::deployment(&unit.name, cause))?;
        let (initializer, init_data) = artifact
            .encode_initializer(&unit.args)
            .map_err(|cause| Error::deployment(&unit.name, cause))?;

        tracing::debug!(unit = %unit.name, initializer = %initializer, "Prepared unit");

        Ok(PreparedUnit {
            name: unit.name.clone(),
            initializer,
            implementation_code: artifact.bytecode,
            init_data,
        })
    }

    /// Prepare every unit in order, failing on the first one that does not check out.
    pub fn prepare_all(&self, units: &[ResolvedUnit]) -> Result<Vec<PreparedUnit>> {
        units.iter().map(|unit| self.prepare(unit)).collect()
    }
}
