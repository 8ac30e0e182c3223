pub mod error;
pub mod keys;
pub mod signing;
pub mod hashing;
pub mod address;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign, verify, Signature};
pub use hashing::{hash, invoice_hash, Hash};
pub use address::{
    algorand_address, application_address, contract_address, evm_address, genesis_contract_address,
};
