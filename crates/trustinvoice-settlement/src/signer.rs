use serde::{Deserialize, Serialize};
use trustinvoice_core::ChainFamily;
use trustinvoice_crypto::{algorand_address, evm_address, KeyPair, PublicKey, Signature};

use crate::error::SettlementError;

/// Wire form of a signed transaction: the exact payload bytes plus the
/// signer's public key and ed25519 signature over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: Vec<u8>,
    pub public_key: String,
    pub signature: String,
}

impl SignedEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, SettlementError> {
        serde_json::to_vec(self).map_err(|e| SettlementError::chain(format!("encode envelope: {}", e)))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, SettlementError> {
        serde_json::from_slice(raw)
            .map_err(|e| SettlementError::chain(format!("malformed signed transaction: {}", e)))
    }

    /// Verify the signature and return the signing key.
    pub fn verify(&self) -> Result<PublicKey, SettlementError> {
        let public_key = PublicKey::from_hex(&self.public_key)?;
        let sig_bytes = hex::decode(&self.signature)
            .map_err(|e| SettlementError::chain(format!("malformed signature: {}", e)))?;
        let signature = Signature::from_bytes(&sig_bytes)?;
        trustinvoice_crypto::verify(&self.payload, &signature, &public_key)?;
        Ok(public_key)
    }
}

/// Holder of a private key able to authorize transactions.
///
/// The engine never sees key material; it only hands payloads to a signer.
pub trait Signer: Send + Sync {
    /// Account address this signer controls on a chain family.
    fn address(&self, family: ChainFamily) -> String;

    /// Sign `payload`, returning the encoded signed transaction.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SettlementError>;
}

/// Signer backed by an in-process ed25519 key pair.
pub struct LocalSigner {
    keypair: KeyPair,
}

impl LocalSigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(KeyPair::from_seed(seed))
    }

    /// Build from a hex-encoded 32-byte seed.
    pub fn from_hex(seed_hex: &str) -> Result<Self, SettlementError> {
        Ok(Self::new(KeyPair::from_hex(seed_hex)?))
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn evm_address(&self) -> String {
        self.address(ChainFamily::Evm)
    }

    pub fn algorand_address(&self) -> String {
        self.address(ChainFamily::Algorand)
    }
}

impl Signer for LocalSigner {
    fn address(&self, family: ChainFamily) -> String {
        let public_key = self.keypair.public_key();
        match family {
            ChainFamily::Evm => evm_address(&public_key),
            ChainFamily::Algorand => algorand_address(&public_key),
        }
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SettlementError> {
        let signature = trustinvoice_crypto::sign(payload, &self.keypair);
        SignedEnvelope {
            payload: payload.to_vec(),
            public_key: self.keypair.public_key().to_hex(),
            signature: signature.to_hex(),
        }
        .encode()
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("public_key", &self.keypair.public_key().to_hex())
            .finish()
    }
}
