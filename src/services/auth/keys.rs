//! ES512 (P-521) key material shared by the verifier and the issuer.
//!
//! The service is configured with a single PEM private key. The public half is
//! derived from it once at startup and used for verifying inbound tokens.

use josekit::JoseError;
use josekit::jws::ES512;
use josekit::jws::alg::ecdsa::{EcdsaJwsSigner, EcdsaJwsVerifier};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid EC P-521 private key PEM: {0}")]
    InvalidPrivateKey(#[source] JoseError),
    #[error("unable to derive EC public key: {0}")]
    InvalidPublicKey(#[source] JoseError),
    #[error("unable to generate EC key pair: {0}")]
    Generate(#[source] JoseError),
}

pub struct ServiceKeys {
    signer: EcdsaJwsSigner,
    verifier: EcdsaJwsVerifier,
}

impl std::fmt::Debug for ServiceKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("ServiceKeys")
            .field("algorithm", &"ES512")
            .finish()
    }
}

impl ServiceKeys {
    /// `pem` may be PKCS#8 (`PRIVATE KEY`) or SEC1 (`EC PRIVATE KEY`).
    pub fn from_private_pem(pem: &str) -> Result<Self, KeyError> {
        let key_pair = ES512
            .key_pair_from_pem(pem.as_bytes())
            .map_err(KeyError::InvalidPrivateKey)?;

        let signer = ES512
            .signer_from_pem(pem.as_bytes())
            .map_err(KeyError::InvalidPrivateKey)?;

        let verifier = ES512
            .verifier_from_pem(key_pair.to_pem_public_key())
            .map_err(KeyError::InvalidPublicKey)?;

        Ok(Self { signer, verifier })
    }

    /// Generate a fresh key pair, returning the keys and the private key PEM.
    pub fn generate() -> Result<(Self, String), KeyError> {
        let key_pair = ES512.generate_key_pair().map_err(KeyError::Generate)?;
        let pem = String::from_utf8_lossy(&key_pair.to_pem_private_key()).into_owned();
        let keys = Self::from_private_pem(&pem)?;
        Ok((keys, pem))
    }

    pub fn signer(&self) -> &EcdsaJwsSigner {
        &self.signer
    }

    pub fn verifier(&self) -> &EcdsaJwsVerifier {
        &self.verifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pem_round_trips() {
        let (_, pem) = ServiceKeys::generate().unwrap();
        assert!(pem.contains("PRIVATE KEY"));
        assert!(ServiceKeys::from_private_pem(&pem).is_ok());
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let err = ServiceKeys::from_private_pem("not a key").unwrap_err();
        assert!(matches!(err, KeyError::InvalidPrivateKey(_)));
    }
}
