//! Ed25519 signing identities.
//!
//! The service identity is loaded once at startup from either a Base58
//! encoded 64-byte keypair (`secret || public`, the format wallets export)
//! or the JSON byte array written by `solana-keygen`. Intermediate buffers
//! holding secret bytes are zeroized.

use std::fmt;

use ed25519_dalek::Signer;
use zeroize::Zeroizing;

use crate::address::Pubkey;
use crate::error::SolError;

/// Anything that can produce an Ed25519 signature over a transaction message.
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn sign_message(&self, message: &[u8]) -> [u8; 64];
}

/// An in-memory Ed25519 keypair. The secret half zeroizes on drop.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Build a keypair from its 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Build a keypair from the 64-byte `secret || public` layout.
    ///
    /// Fails if the public half does not match the secret half.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, SolError> {
        let bytes: Zeroizing<[u8; 64]> =
            Zeroizing::new(bytes.try_into().map_err(|_| {
                SolError::InvalidPrivateKey(format!("expected 64 bytes, got {}", bytes.len()))
            })?);

        let signing_key = ed25519_dalek::SigningKey::from_keypair_bytes(&bytes)
            .map_err(|_| SolError::InvalidPrivateKey("public key does not match secret".into()))?;

        Ok(Self { signing_key })
    }

    /// Parse a Base58-encoded 64-byte keypair.
    pub fn from_base58(encoded: &str) -> Result<Self, SolError> {
        let bytes = Zeroizing::new(
            bs58::decode(encoded.trim())
                .into_vec()
                .map_err(|e| SolError::InvalidPrivateKey(format!("base58 decode failed: {e}")))?,
        );
        Self::from_keypair_bytes(&bytes)
    }

    /// Parse the `[12, 34, ...]` JSON array format used by keypair files.
    pub fn from_json_array(json: &str) -> Result<Self, SolError> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(json)
                .map_err(|e| SolError::InvalidPrivateKey(format!("invalid JSON keypair: {e}")))?,
        );
        Self::from_keypair_bytes(&bytes)
    }

    /// Parse either supported text format.
    pub fn parse(text: &str) -> Result<Self, SolError> {
        let text = text.trim();
        if text.starts_with('[') {
            Self::from_json_array(text)
        } else {
            Self::from_base58(text)
        }
    }
}

impl TransactionSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}
