//! The ordered list of contracts to deploy and their initializer arguments.
//!
//! A [`Manifest`] is static data: contract names, literal parameters and
//! references to derived values or identities. [`Manifest::resolve`] turns it
//! into concrete [`ResolvedUnit`]s in a single pass, before anything touches the
//! network.

use std::path::Path;

use alloy_core::primitives::{Address, B256, U256, address};
use serde::{Deserialize, Serialize};

use crate::derive::{DerivedValue, DerivedValues, Derivations};
use crate::error::{Error, Result};

/// The default file name for a saved manifest.
pub const MANIFEST_FILENAME: &str = "Manifest.toml";

/// Operator account of the reference configuration. It also collects fees.
pub const REFERENCE_OPERATOR: Address = address!("0x2467BeE786aCdd26D9BcD7759C8464463fD33549");

/// Text hashed into the `terms_hash` derived value of the reference configuration.
pub const REFERENCE_TERMS: &str = "RealtyArmy Default Escrow Terms";

/// A well-known participant referenced by manifest arguments.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Deployer,
    FeeCollector,
}

/// The addresses behind each [`Role`]. The two may be equal but are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identities {
    pub deployer: Address,
    pub fee_collector: Address,
}

impl Identities {
    pub fn get(&self, role: Role) -> Address {
        match role {
            Role::Deployer => self.deployer,
            Role::FeeCollector => self.fee_collector,
        }
    }
}

/// An unsigned integer literal of up to 256 bits.
///
/// TOML integers are signed 64-bit, so larger values are written as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UintRepr", into = "UintRepr")]
pub struct UintLiteral(pub U256);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum UintRepr {
    Int(i64),
    Decimal(String),
}

impl TryFrom<UintRepr> for UintLiteral {
    type Error = String;

    fn try_from(repr: UintRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            UintRepr::Int(value) => u64::try_from(value)
                .map(|v| Self(U256::from(v)))
                .map_err(|_| format!("unsigned literal cannot be negative: {value}")),
            UintRepr::Decimal(text) => U256::from_str_radix(text.trim(), 10)
                .map(Self)
                .map_err(|_| format!("not an unsigned 256-bit decimal: {text:?}")),
        }
    }
}

impl From<UintLiteral> for UintRepr {
    fn from(literal: UintLiteral) -> Self {
        match u64::try_from(literal.0).ok().and_then(|v| i64::try_from(v).ok()) {
            Some(value) => UintRepr::Int(value),
            None => UintRepr::Decimal(literal.0.to_string()),
        }
    }
}

/// A constant argument written directly in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Uint(UintLiteral),
    Text(String),
    Address(Address),
    Bool(bool),
}

/// One initializer argument, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestArg {
    Literal(Literal),
    /// Name of an entry in the manifest's [`Derivations`].
    Derived(String),
    Identity(Role),
}

impl ManifestArg {
    pub fn uint(value: u64) -> Self {
        Self::uint256(U256::from(value))
    }

    pub fn uint256(value: U256) -> Self {
        Self::Literal(Literal::Uint(UintLiteral(value)))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    pub fn address(value: Address) -> Self {
        Self::Literal(Literal::Address(value))
    }

    pub fn derived(key: impl Into<String>) -> Self {
        Self::Derived(key.into())
    }

    pub fn identity(role: Role) -> Self {
        Self::Identity(role)
    }
}

/// A contract to deploy behind a proxy, with its initializer arguments in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ManifestArg>,
}

impl DeploymentUnit {
    pub fn new(name: impl Into<String>, args: Vec<ManifestArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// A concrete argument value, ready to be checked against an ABI type.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ArgValue {
    #[display("{_0}")]
    Uint(U256),
    #[display("{_0:?}")]
    Text(String),
    #[display("{_0}")]
    Address(Address),
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0}")]
    Digest(B256),
}

impl ArgValue {
    /// Short description of the value's kind, for mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Uint(_) => "unsigned integer",
            ArgValue::Text(_) => "string",
            ArgValue::Address(_) => "address",
            ArgValue::Bool(_) => "bool",
            ArgValue::Digest(_) => "32-byte digest",
        }
    }
}

/// A [`DeploymentUnit`] whose references have been replaced by values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUnit {
    pub name: String,
    pub args: Vec<ArgValue>,
}

/// The full deployment plan input: identities, derivation inputs and ordered units.
///
/// Units are kept in a `Vec`; their order is the deployment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub identities: Identities,
    #[serde(default)]
    pub derivations: Derivations,
    #[serde(rename = "unit", default)]
    pub units: Vec<DeploymentUnit>,
}

impl Manifest {
    /// The nine-contract RealtyArmy suite.
    pub fn reference() -> Self {
        use ManifestArg as A;

        let mut derivations = Derivations::default();
        derivations.amounts.insert("fee".into(), "0.01".into());
        derivations.amounts.insert("share_price".into(), "1".into());
        derivations
            .digests
            .insert("terms_hash".into(), REFERENCE_TERMS.into());

        let fee_collector = || A::identity(Role::FeeCollector);

        let units = vec![
            // 1%
            DeploymentUnit::new("Mortgage", vec![A::uint(100)]),
            DeploymentUnit::new("DisputeResolution", vec![A::derived("fee")]),
            DeploymentUnit::new(
                "FractionalOwnership",
                vec![
                    A::text("Fractional Home"),
                    A::text("FRHOME"),
                    A::text("456 Realty Lane"),
                    A::uint(1000),
                    A::derived("share_price"),
                    A::uint(200),
                    fee_collector(),
                ],
            ),
            // 3%
            DeploymentUnit::new("Crowdfunding", vec![fee_collector(), A::uint(300)]),
            DeploymentUnit::new("Lease", vec![A::derived("fee")]),
            DeploymentUnit::new("TitleRegistry", vec![A::derived("fee"), fee_collector()]),
            DeploymentUnit::new(
                "MultiEscrowManager",
                vec![
                    fee_collector(),
                    A::uint(250),
                    A::uint(100),
                    A::derived("terms_hash"),
                ],
            ),
            // 1.5%
            DeploymentUnit::new("PropertyManagement", vec![A::uint(150)]),
            // 3%
            DeploymentUnit::new("SalesEscrow", vec![A::uint(300), fee_collector()]),
        ];

        Self {
            identities: Identities {
                deployer: REFERENCE_OPERATOR,
                fee_collector: REFERENCE_OPERATOR,
            },
            derivations,
            units,
        }
    }

    /// Save the manifest to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Manifest(format!("failed to serialize manifest: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Manifest(format!("failed to write manifest to {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }

    /// Load a manifest from a TOML file, or from [`MANIFEST_FILENAME`] inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Manifest(format!(
                "manifest file or directory not found: {}",
                path.display()
            )));
        }

        let manifest_path = if path.is_dir() {
            path.join(MANIFEST_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            Error::Manifest(format!(
                "failed to read manifest from {}: {e}",
                manifest_path.display()
            ))
        })?;
        let manifest: Self = toml::from_str(&content)
            .map_err(|e| Error::Manifest(format!("failed to parse manifest as TOML: {e}")))?;

        tracing::info!(path = %manifest_path.display(), units = manifest.units.len(), "Manifest loaded");
        Ok(manifest)
    }

    /// Derive every value and substitute all references, preserving unit order.
    pub fn resolve(&self) -> Result<Vec<ResolvedUnit>> {
        let derived = DerivedValues::derive(&self.derivations)?;

        self.units
            .iter()
            .map(|unit| self.resolve_unit(unit, &derived))
            .collect()
    }

    fn resolve_unit(&self, unit: &DeploymentUnit, derived: &DerivedValues) -> Result<ResolvedUnit> {
        if unit.name.trim().is_empty() {
            return Err(Error::Manifest("unit with an empty contract name".into()));
        }

        let args = unit
            .args
            .iter()
            .map(|arg| match arg {
                ManifestArg::Literal(Literal::Uint(value)) => Ok(ArgValue::Uint(value.0)),
                ManifestArg::Literal(Literal::Text(value)) => Ok(ArgValue::Text(value.clone())),
                ManifestArg::Literal(Literal::Address(value)) => Ok(ArgValue::Address(*value)),
                ManifestArg::Literal(Literal::Bool(value)) => Ok(ArgValue::Bool(*value)),
                ManifestArg::Derived(key) => match derived.get(key) {
                    Some(DerivedValue::Amount(value)) => Ok(ArgValue::Uint(value)),
                    Some(DerivedValue::Digest(digest)) => Ok(ArgValue::Digest(digest)),
                    None => Err(Error::Manifest(format!(
                        "{} references unknown derived value '{key}'",
                        unit.name
                    ))),
                },
                ManifestArg::Identity(role) => Ok(ArgValue::Address(self.identities.get(*role))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedUnit {
            name: unit.name.clone(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::{ETHER_DECIMALS, derive_amount, terms_hash};
    use tempdir::TempDir;

    #[test]
    fn test_reference_manifest_order() {
        let names: Vec<_> = Manifest::reference()
            .units
            .into_iter()
            .map(|u| u.name)
            .collect();

        assert_eq!(
            names,
            [
                "Mortgage",
                "DisputeResolution",
                "FractionalOwnership",
                "Crowdfunding",
                "Lease",
                "TitleRegistry",
                "MultiEscrowManager",
                "PropertyManagement",
                "SalesEscrow",
            ]
        );
    }

    #[test]
    fn test_reference_manifest_resolves() {
        let resolved = Manifest::reference().resolve().unwrap();
        let fee = derive_amount("0.01", ETHER_DECIMALS).unwrap();

        assert_eq!(resolved.len(), 9);
        assert_eq!(resolved[0].args, vec![ArgValue::Uint(U256::from(100))]);
        assert_eq!(resolved[1].args, vec![ArgValue::Uint(fee)]);
        assert_eq!(resolved[1].args, resolved[4].args);
        assert_eq!(
            resolved[2].args,
            vec![
                ArgValue::Text("Fractional Home".into()),
                ArgValue::Text("FRHOME".into()),
                ArgValue::Text("456 Realty Lane".into()),
                ArgValue::Uint(U256::from(1000)),
                ArgValue::Uint(derive_amount("1", ETHER_DECIMALS).unwrap()),
                ArgValue::Uint(U256::from(200)),
                ArgValue::Address(REFERENCE_OPERATOR),
            ]
        );
        assert_eq!(
            resolved[6].args[3],
            ArgValue::Digest(terms_hash(REFERENCE_TERMS))
        );
    }

    #[test]
    fn test_identities_stay_independent() {
        let mut manifest = Manifest::reference();
        let other = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
        manifest.identities.fee_collector = other;

        assert_eq!(manifest.identities.get(Role::Deployer), REFERENCE_OPERATOR);

        let resolved = manifest.resolve().unwrap();
        assert_eq!(resolved[3].args[0], ArgValue::Address(other));
    }

    #[test]
    fn test_unknown_derived_reference() {
        let mut manifest = Manifest::reference();
        manifest.units = vec![DeploymentUnit::new("Lease", vec![ManifestArg::derived("rent")])];

        let err = manifest.resolve().unwrap_err();
        assert!(err.to_string().contains("rent"), "{err}");
    }

    #[test]
    fn test_manifest_toml_round_trip() {
        let dir = TempDir::new("realty-manifest").unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);

        let manifest = Manifest::reference();
        manifest.save_to_file(&path).unwrap();

        assert_eq!(Manifest::load_from_file(&path).unwrap(), manifest);
        assert_eq!(Manifest::load_from_file(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_manifest_parses_handwritten_toml() {
        let manifest: Manifest = toml::from_str(
            r#"
            [identities]
            deployer = "0x2467BeE786aCdd26D9BcD7759C8464463fD33549"
            fee_collector = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"

            [derivations.amounts]
            fee = "0.01"

            [[unit]]
            name = "Lease"
            args = [{ derived = "fee" }]

            [[unit]]
            name = "Crowdfunding"
            args = [{ identity = "fee_collector" }, { literal = { uint = 300 } }]
            "#,
        )
        .unwrap();

        assert_eq!(
            manifest.units[1].args,
            vec![ManifestArg::identity(Role::FeeCollector), ManifestArg::uint(300)]
        );
        assert_eq!(manifest.resolve().unwrap().len(), 2);
    }

    #[test]
    fn test_large_uint_literals_survive_toml() {
        let dir = TempDir::new("realty-manifest").unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);

        let mut manifest = Manifest::reference();
        manifest.units = vec![DeploymentUnit::new(
            "Crowdfunding",
            vec![
                ManifestArg::uint256(U256::from(u64::MAX)),
                ManifestArg::uint256(U256::MAX),
                ManifestArg::uint(300),
            ],
        )];
        manifest.save_to_file(&path).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("uint = 300"), "{saved}");
        assert!(saved.contains(&format!("uint = \"{}\"", u64::MAX)), "{saved}");

        let loaded = Manifest::load_from_file(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.resolve().unwrap()[0].args[1],
            ArgValue::Uint(U256::MAX)
        );
    }

    #[test]
    fn test_negative_uint_literal_is_rejected() {
        let parsed = toml::from_str::<DeploymentUnit>(
            r#"
            name = "Mortgage"
            args = [{ literal = { uint = -1 } }]
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_missing_manifest_file() {
        assert!(Manifest::load_from_file(Path::new("/nonexistent/Manifest.toml")).is_err());
    }
}
