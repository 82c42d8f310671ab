//! Contract-creation transactions, signed locally with the deployer key.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{B256, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_signer_local::PrivateKeySigner;

use crate::error::ChainError;

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
}

/// Legacy transaction deploying `init_code`, replay-protected for `chain_id` (EIP-155).
pub fn creation(
    chain_id: u64,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    init_code: Bytes,
) -> TxLegacy {
    TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price,
        gas_limit,
        to: TxKind::Create,
        value: U256::ZERO,
        input: init_code,
    }
}

/// Sign `tx` and produce its network encoding and hash.
pub fn sign(
    mut tx: TxLegacy,
    signer: &PrivateKeySigner,
) -> Result<SignedTransaction, ChainError> {
    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| ChainError::Signing(e.to_string()))?;

    let signed = tx.into_signed(signature);
    let hash = *signed.hash();
    let raw = TxEnvelope::from(signed).encoded_2718();

    Ok(SignedTransaction {
        raw: raw.into(),
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{address, b256, hex, keccak256};

    /// The worked example from EIP-155.
    fn eip155_example() -> (TxLegacy, PrivateKeySigner) {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(address!("0x3535353535353535353535353535353535353535")),
            value: U256::from(1_000_000_000_000_000_000u64),
            input: Bytes::new(),
        };
        let signer = PrivateKeySigner::from_slice(&[0x46; 32]).unwrap();
        (tx, signer)
    }

    #[test]
    fn test_eip155_signature_hash() {
        let (tx, _) = eip155_example();
        assert_eq!(
            tx.signature_hash(),
            b256!("0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53")
        );
    }

    #[test]
    fn test_eip155_signed_encoding() {
        let (tx, signer) = eip155_example();
        let signed = sign(tx, &signer).unwrap();

        assert_eq!(
            hex::encode(&signed.raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(signed.hash, keccak256(&signed.raw));
    }

    #[test]
    fn test_creation_has_no_recipient() {
        let (_, signer) = eip155_example();
        let tx = creation(1, 9, 20_000_000_000, 21_000, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
        assert_eq!(tx.to, TxKind::Create);

        let signed = sign(tx, &signer).unwrap();
        // list header (2) + nonce (1) + gas price (6) + gas (3), then the empty `to`.
        assert_eq!(signed.raw[12], 0x80);
    }
}
