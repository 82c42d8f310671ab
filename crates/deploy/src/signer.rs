//! Resolution of the account that signs and pays for deployments.

use alloy_core::primitives::Address;

use crate::config::{NetworkConfig, Settings};
use crate::error::{Error, Result};

/// The address derived from the configured private key. Never touches the network.
pub fn current_signer(config: &NetworkConfig) -> Result<Address> {
    config
        .signer
        .as_ref()
        .map(|signer| signer.address())
        .ok_or(Error::NoSignerConfigured)
}

/// Like [`current_signer`], straight from raw settings: only `PRIVATE_KEY` is consulted.
pub fn configured_signer(settings: &Settings) -> Result<Address> {
    settings
        .signer()?
        .map(|signer| signer.address())
        .ok_or(Error::NoSignerConfigured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;

    fn config(private_key: Option<&str>) -> NetworkConfig {
        let settings = Settings {
            mainnet_rpc_url: Some("http://localhost:8545".into()),
            private_key: private_key.map(String::from),
            ..Default::default()
        };
        NetworkConfig::from_settings(&settings, false).unwrap()
    }

    #[test]
    fn test_current_signer() {
        let config = config(Some(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ));
        assert_eq!(
            current_signer(&config).unwrap(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn test_no_signer_configured() {
        assert!(matches!(
            current_signer(&config(None)),
            Err(Error::NoSignerConfigured)
        ));
    }

    #[test]
    fn test_configured_signer_needs_no_rpc_url() {
        let settings = Settings {
            private_key: Some(
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".into(),
            ),
            ..Default::default()
        };
        assert_eq!(
            configured_signer(&settings).unwrap(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );

        assert!(matches!(
            configured_signer(&Settings::default()),
            Err(Error::NoSignerConfigured)
        ));
    }
}
