//! Derivation of manifest parameters from human-readable inputs.
//!
//! Amounts are scaled with exact integer arithmetic on their decimal digits, so
//! `"0.01"` ether is always `10_000_000_000_000_000` wei with no rounding.

use std::collections::BTreeMap;

use alloy_core::primitives::{B256, U256, keccak256};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Decimals of the native currency: one ether is 10^18 wei.
pub const ETHER_DECIMALS: u8 = 18;

/// Scale a decimal amount string to base units.
///
/// Accepts plain non-negative decimals (`"1"`, `"0.01"`, `".5"`, `"5."`). Signs,
/// exponents, separators and more than `decimals` fractional digits are rejected,
/// as are values that do not fit in 256 bits.
pub fn derive_amount(input: &str, decimals: u8) -> Result<U256> {
    let invalid = |reason| Error::InvalidAmountFormat {
        input: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }

    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative decimal number"));
    }

    if fraction.len() > decimals as usize {
        return Err(invalid("more fractional digits than the unit supports"));
    }

    let digits = format!("{whole}{fraction:0<width$}", width = decimals as usize);

    U256::from_str_radix(&digits, 10).map_err(|_| invalid("amount does not fit in 256 bits"))
}

/// Render base units back into a canonical decimal string.
pub fn format_amount(value: U256, decimals: u8) -> String {
    let decimals = decimals as usize;
    let padded = format!("{:0>width$}", value.to_string(), width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Keccak-256 digest of a UTF-8 string, used as an opaque terms identifier.
pub fn terms_hash(text: &str) -> B256 {
    keccak256(text.as_bytes())
}

/// Human-readable inputs for every derived value a manifest may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivations {
    /// Ether-denominated amounts, keyed by reference name.
    #[serde(default)]
    pub amounts: BTreeMap<String, String>,
    /// Texts whose keccak-256 digest is referenced.
    #[serde(default)]
    pub digests: BTreeMap<String, String>,
}

/// A value computed once per run from [`Derivations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedValue {
    Amount(U256),
    Digest(B256),
}

/// All derived values of a run, immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedValues {
    values: BTreeMap<String, DerivedValue>,
}

impl DerivedValues {
    /// Compute every amount and digest declared in `derivations`.
    pub fn derive(derivations: &Derivations) -> Result<Self> {
        let mut values = BTreeMap::new();

        for (key, amount) in &derivations.amounts {
            let value = derive_amount(amount, ETHER_DECIMALS)?;
            tracing::debug!(key = %key, amount = %amount, wei = %value, "Derived amount");
            values.insert(key.clone(), DerivedValue::Amount(value));
        }

        for (key, text) in &derivations.digests {
            let digest = terms_hash(text);
            tracing::debug!(key = %key, digest = %digest, "Derived digest");
            if values.insert(key.clone(), DerivedValue::Digest(digest)).is_some() {
                return Err(Error::Manifest(format!(
                    "derived value '{key}' is declared both as an amount and a digest"
                )));
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<DerivedValue> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
