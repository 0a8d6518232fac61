//! # Ed25519 Signatures
//!
//! Signing keys for parties and the notary. Every signature in the protocol
//! is made over the raw bytes of a [`TransactionId`].
//!
//! Signatures are deterministic: the same key signing the same id always
//! yields the same bytes.

use crate::domain::{CryptoError, DigitalSignature, Party, PublicKey, TransactionId};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

/// Ed25519 keypair.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Public half.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a transaction id.
    pub fn sign(&self, id: &TransactionId) -> DigitalSignature {
        let sig = self.signing_key.sign(id.as_bytes());
        DigitalSignature {
            by: self.public_key(),
            bytes: sig.to_bytes(),
        }
    }

    /// Secret seed, wiped when the returned buffer is dropped.
    pub fn to_seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519KeyPair({})", self.public_key().short())
    }
}

/// A node's legal identity together with its signing key.
#[derive(Debug)]
pub struct LocalIdentity {
    party: Party,
    keypair: Ed25519KeyPair,
}

impl LocalIdentity {
    /// Identity named `name` owning `keypair`.
    pub fn new(name: impl Into<String>, keypair: Ed25519KeyPair) -> Self {
        let party = Party::new(name, keypair.public_key());
        Self { party, keypair }
    }

    /// Identity with a freshly generated key.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(name, Ed25519KeyPair::generate())
    }

    /// Public identity.
    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Owning key.
    pub fn public_key(&self) -> PublicKey {
        self.party.owning_key
    }

    /// Signing key.
    pub fn keypair(&self) -> &Ed25519KeyPair {
        &self.keypair
    }
}

/// Verify `signature` over `id` against the key it claims to be from.
pub fn verify(id: &TransactionId, signature: &DigitalSignature) -> Result<(), CryptoError> {
    let verifying_key =
        VerifyingKey::from_bytes(signature.by.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig = ed25519_dalek::Signature::from_bytes(&signature.bytes);

    verifying_key
        .verify(id.as_bytes(), &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}
