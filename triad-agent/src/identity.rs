//! Device identity and message signing
//!
//! The account address is derived from the device's ed25519 public key:
//! `0x` + hex of the first 20 bytes of SHA-256(public key). An externally
//! supplied address replaces the derived one but signing still uses the key.

use crate::error::{Result, SessionError};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use log::info;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Address bytes taken from the public key digest
const ADDRESS_BYTES: usize = 20;

pub trait IdentityProvider: Send + Sync {
    fn address(&self) -> &str;

    /// Hex-encoded public key
    fn public_key_hex(&self) -> String;

    /// Hex-encoded signature over `payload`
    fn sign(&self, payload: &[u8]) -> String;
}

pub struct Ed25519Identity {
    signing_key: SigningKey,
    address: String,
}

impl Ed25519Identity {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = derive_address(&signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Load the seed stored at `path`, or create and persist a new one
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = fs::read_to_string(path)?;
            let bytes = hex::decode(text.trim()).map_err(|e| {
                SessionError::Identity(format!("invalid key file {}: {}", path.display(), e))
            })?;
            let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                SessionError::Identity(format!(
                    "key file {} must hold 32 bytes, found {}",
                    path.display(),
                    bytes.len()
                ))
            })?;
            return Ok(Self::from_seed(seed));
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        write_seed(path, &hex::encode(identity.signing_key.to_bytes()))?;
        info!(
            "Created device key at {} (address {})",
            path.display(),
            identity.address
        );
        Ok(identity)
    }

    /// Report under a fixed address instead of the derived one
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl IdentityProvider for Ed25519Identity {
    fn address(&self) -> &str {
        &self.address
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    fn sign(&self, payload: &[u8]) -> String {
        hex::encode(self.signing_key.sign(payload).to_bytes())
    }
}

pub fn derive_address(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("0x{}", hex::encode(&digest[..ADDRESS_BYTES]))
}

/// Create the key file readable by its owner only, from the first byte
fn write_seed(path: &Path, seed_hex: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(seed_hex.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[test]
    fn test_address_is_deterministic() {
        let a = Ed25519Identity::from_seed([7u8; 32]);
        let b = Ed25519Identity::from_seed([7u8; 32]);
        let c = Ed25519Identity::from_seed([8u8; 32]);

        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
        assert!(a.address().starts_with("0x"));
        assert_eq!(a.address().len(), 2 + ADDRESS_BYTES * 2);
    }

    #[test]
    fn test_signature_verifies() {
        let identity = Ed25519Identity::from_seed([1u8; 32]);
        let signature_hex = identity.sign(b"payload");

        let bytes: [u8; 64] = hex::decode(signature_hex).unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&bytes);
        assert!(identity.verifying_key().verify(b"payload", &signature).is_ok());
        assert!(identity.verifying_key().verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_external_address_keeps_key() {
        let identity = Ed25519Identity::from_seed([2u8; 32]).with_address("user1");
        assert_eq!(identity.address(), "user1");
        assert_eq!(
            identity.public_key_hex(),
            hex::encode(Ed25519Identity::from_seed([2u8; 32]).verifying_key().as_bytes())
        );
    }

    #[test]
    fn test_key_file_persists_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("device.key");

        let created = Ed25519Identity::load_or_create(&path).unwrap();
        let loaded = Ed25519Identity::load_or_create(&path).unwrap();
        assert_eq!(created.address(), loaded.address());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        Ed25519Identity::load_or_create(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        fs::write(&path, "abcd").unwrap();

        assert!(matches!(
            Ed25519Identity::load_or_create(&path),
            Err(SessionError::Identity(_))
        ));
    }
}
