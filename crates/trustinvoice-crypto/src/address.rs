//! Devnet address derivation.
//!
//! EVM addresses are the last 20 bytes of `BLAKE3(public_key)`; contract
//! addresses follow the usual `CREATE` rule of the deployer and its nonce.
//! Algorand addresses are the upper-case hex of `public_key ‖ checksum`, where
//! the checksum is the last 4 bytes of `BLAKE3(public_key)`.

use alloy_primitives::Address;

use crate::error::CryptoError;
use crate::hashing::hash;
use crate::keys::PublicKey;

const ALGORAND_ADDRESS_LEN: usize = 72;

/// EVM address of a public key.
pub fn evm_address(pubkey: &PublicKey) -> String {
    let digest = hash(pubkey.as_bytes());
    format_evm_address(&Address::from_slice(&digest[12..]))
}

/// Lower-case `0x` text form used as the ledger key for an account.
pub fn format_evm_address(address: &Address) -> String {
    format!("{address:#x}")
}

/// Parse a `0x`-prefixed EVM address. Mixed case is accepted without a
/// checksum check.
pub fn parse_evm_address(address: &str) -> Result<Address, CryptoError> {
    if !address.starts_with("0x") {
        return Err(CryptoError::InvalidAddress(format!("missing 0x prefix: {}", address)));
    }
    address
        .parse::<Address>()
        .map_err(|_| CryptoError::InvalidAddress(address.to_string()))
}

/// Address of a contract deployed by `deployer` at account nonce `nonce`.
pub fn contract_address(deployer: &str, nonce: u64) -> Result<String, CryptoError> {
    Ok(format_evm_address(&parse_evm_address(deployer)?.create(nonce)))
}

/// Address of a contract created by the chain itself (no deploying account).
pub fn genesis_contract_address(index: u64) -> String {
    format_evm_address(&Address::ZERO.create(index))
}

/// Canonical (lower-case) form of an EVM address, validating its shape.
pub fn normalize_evm_address(address: &str) -> Result<String, CryptoError> {
    parse_evm_address(address).map(|a| format_evm_address(&a))
}

/// Algorand address of a public key.
pub fn algorand_address(pubkey: &PublicKey) -> String {
    algorand_address_from_bytes(pubkey.as_bytes())
}

fn algorand_address_from_bytes(bytes: &[u8; 32]) -> String {
    let digest = hash(bytes);
    let mut raw = bytes.to_vec();
    raw.extend_from_slice(&digest[28..]);
    hex::encode_upper(raw)
}

/// Account controlled by an Algorand application.
pub fn application_address(app_id: u64) -> String {
    let mut preimage = b"appID".to_vec();
    preimage.extend_from_slice(&app_id.to_be_bytes());
    algorand_address_from_bytes(&hash(&preimage))
}

/// Validate the shape and checksum of an Algorand address.
pub fn validate_algorand_address(address: &str) -> Result<(), CryptoError> {
    if address.len() != ALGORAND_ADDRESS_LEN {
        return Err(CryptoError::InvalidAddress(address.to_string()));
    }
    let raw = hex::decode(address).map_err(|_| CryptoError::InvalidAddress(address.to_string()))?;
    let (key, checksum) = raw.split_at(32);
    if hash(key)[28..] != *checksum {
        return Err(CryptoError::InvalidAddress(format!("bad checksum: {}", address)));
    }
    Ok(())
}
