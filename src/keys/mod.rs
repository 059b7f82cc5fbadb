//! Device key material
//!
//! RSA keypair generation, PEM encoding and envelope unwrapping for the
//! enrollment protocol.

pub mod crypto;
pub mod provisioner;

pub use crypto::{
    decode_private, decode_public, encode_private, encode_public, generate_keypair, unwrap_key,
    wrap_key, PEM_CONTENT_TYPE, RSA_KEY_BITS,
};
pub use provisioner::{KeyProvisioner, ProvisionedKeys};
