use p256::{
    ecdsa::{Signature, SigningKey, signature::Signer as _},
    pkcs8::DecodePrivateKey,
};

use crate::error::SignError;

/// The signer holds the bytes of the PKCS#8 PEM key used for ECDSA P-256 signatures.
/// Fabric CAs hand out keys in this format, e.g. `msp/keystore/priv_sk`.
///
/// # Example
/// ```rust,ignore
/// use fabric_txflow::signer::Signer;
///
/// let signer = Signer::new(std::fs::read(keystore_path)?);
/// let signature = signer.sign_message(b"payload")?;
/// ```
#[derive(Clone)]
pub struct Signer {
    pub pkey: Vec<u8>,
}

impl Signer {
    pub fn new(pkey: impl Into<Vec<u8>>) -> Self {
        Self { pkey: pkey.into() }
    }

    /// Signs the SHA-256 digest of `message` and returns the DER encoded signature.
    ///
    /// Fabric rejects signatures with a high `s` value, so the signature is normalized.
    pub fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignError> {
        let pem = std::str::from_utf8(&self.pkey)
            .map_err(|err| SignError::InvalidKey(err.to_string()))?;
        let key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|err| SignError::InvalidKey(err.to_string()))?;
        let signature: Signature = key.sign(message);
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}
