//! Key Provisioner
//!
//! Issues RSA keypairs to enrolled devices.
//!
//! # Custody
//!
//! Gatehouse generates the keypair and retains the private half on the device
//! record. Only the public half leaves the server. Devices wrap their locally
//! chosen symmetric key under that public key and send back the ciphertext,
//! which the retained private key can later unwrap. Confidentiality of the
//! transport, not possession of the key, is the trust boundary.

use tracing::debug;

use super::crypto::{encode_private, encode_public, generate_keypair};
use crate::db::schemas::RetainedPrivateKey;
use crate::types::{GatehouseError, Result};

/// Both encodings of a freshly generated keypair
#[derive(Clone, Debug)]
pub struct ProvisionedKeys {
    /// PEM `PUBLIC KEY`, returned to the device
    pub public_pem: String,
    /// PEM `RSA PRIVATE KEY`, retained server-side
    pub private_pem: RetainedPrivateKey,
}

/// Generates and encodes device keypairs
#[derive(Clone, Debug, Default)]
pub struct KeyProvisioner;

impl KeyProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Generate and encode a keypair synchronously.
    pub fn generate(&self) -> Result<ProvisionedKeys> {
        let private_key = generate_keypair()?;
        let public_pem = encode_public(&private_key.to_public_key())?;
        let private_pem = encode_private(&private_key)?;

        Ok(ProvisionedKeys {
            public_pem,
            private_pem: RetainedPrivateKey::from(private_pem),
        })
    }

    /// Generate on the blocking pool so request tasks keep making progress.
    ///
    /// Dropping the returned future abandons the result; the blocking task
    /// still runs to completion and its key is discarded.
    pub async fn generate_async(&self) -> Result<ProvisionedKeys> {
        let provisioner = self.clone();
        let keys = tokio::task::spawn_blocking(move || provisioner.generate())
            .await
            .map_err(|e| GatehouseError::KeyGeneration(format!("Key generation task failed: {e}")))??;

        debug!("Generated RSA keypair");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::crypto::{decode_public, unwrap_key, wrap_key};

    #[tokio::test]
    async fn test_provisioned_pair_matches() {
        let keys = KeyProvisioner::new().generate_async().await.unwrap();

        let public_key = decode_public(&keys.public_pem).unwrap();
        let wrapped = wrap_key(&public_key, b"0123456789abcdef0123456789abcdef").unwrap();
        let unwrapped = unwrap_key(keys.private_pem.expose(), &wrapped).unwrap();

        assert_eq!(unwrapped.as_slice(), b"0123456789abcdef0123456789abcdef");
    }

    #[tokio::test]
    async fn test_each_call_issues_a_fresh_pair() {
        let provisioner = KeyProvisioner::new();
        let first = provisioner.generate_async().await.unwrap();
        let second = provisioner.generate_async().await.unwrap();

        assert_ne!(first.public_pem, second.public_pem);
    }
}
