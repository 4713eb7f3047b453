//! Signing identities for accounts that submit transactions.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::address::Address;

const DEV_SEED_DOMAIN: &[u8] = b"multibank-dev";

#[derive(Clone, Debug)]
pub struct Identity {
    name: String,
    signing_key: SigningKey,
}

impl Identity {
    /// Fresh random identity.
    pub fn generate(name: impl Into<String>) -> Self {
        let mut rng = OsRng;
        Self {
            name: name.into(),
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Deterministic development identity. The same name always yields the
    /// same key, which keeps configs and scripts readable. Never use these
    /// keys for anything that holds real value.
    pub fn dev(name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DEV_SEED_DOMAIN);
        hasher.update(name.as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        Self {
            name: name.to_string(),
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_signing_key(name: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            name: name.into(),
            signing_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(&self.verifying_key())
    }
}

/// Shorthand for the address of a development identity.
pub fn dev_address(name: &str) -> Address {
    Identity::dev(name).address()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_identities_are_stable_and_distinct() {
        assert_eq!(dev_address("alice"), dev_address("alice"));
        assert_ne!(dev_address("alice"), dev_address("bob"));
    }

    #[test]
    fn generated_identity_address_matches_key() {
        let id = Identity::generate("random");
        assert_eq!(id.address(), Address::from_verifying_key(&id.verifying_key()));
    }
}
