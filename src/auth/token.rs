//! Ed25519-signed session tokens (compact JWT, `alg=EdDSA`).
//!
//! The signer holds the private key; `TokenVerifier` only ever holds public
//! keys, so components that check sessions never gain signing capability.

use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{
    Signature, Signer, SigningKey, VerifyingKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, spki::der::pem::LineEnding},
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::types::Role;

pub const TOKEN_ALG: &str = "EdDSA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl SessionTokenHeader {
    fn eddsa(kid: impl Into<String>) -> Self {
        Self {
            alg: TOKEN_ALG.to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

/// Identity snapshot carried by a session token.
///
/// Only `sub`, `jti`, `exp` and `iss` are used to authenticate; the profile
/// fields are for display and are refreshed from the store on verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub sub: String,
    pub jti: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl SessionClaims {
    /// Numeric user id from `sub`.
    ///
    /// # Errors
    /// Returns an error if `sub` is not an integer.
    pub fn user_id(&self) -> Result<i64, Error> {
        self.sub.parse().map_err(|_| Error::InvalidSubject)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse Ed25519 key")]
    KeyParse,
    #[error("failed to encode Ed25519 key")]
    KeyEncode,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid subject")]
    InvalidSubject,
    #[error("token expired")]
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Clone)]
pub struct TokenSigner {
    key: SigningKey,
    kid: String,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("kid", &self.kid)
            .field("key", &"***")
            .finish()
    }
}

impl TokenSigner {
    #[must_use]
    pub fn new(key: SigningKey, kid: impl Into<String>) -> Self {
        Self {
            key,
            kid: kid.into(),
        }
    }

    /// Fresh random key, used by `--generate-signing-key` and tests.
    #[must_use]
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::new(SigningKey::generate(&mut OsRng), kid)
    }

    /// # Errors
    /// Returns an error if the PEM is not a PKCS#8 Ed25519 private key.
    pub fn from_pkcs8_pem(pem: &str, kid: impl Into<String>) -> Result<Self, Error> {
        let key = SigningKey::from_pkcs8_pem(pem).map_err(|_| Error::KeyParse)?;
        Ok(Self::new(key, kid))
    }

    /// # Errors
    /// Returns an error if the key cannot be PEM encoded.
    pub fn to_pkcs8_pem(&self) -> Result<String, Error> {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|_| Error::KeyEncode)
    }

    /// # Errors
    /// Returns an error if the public key cannot be PEM encoded.
    pub fn public_key_pem(&self) -> Result<String, Error> {
        self.key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| Error::KeyEncode)
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Verifier trusting only this signer's public key.
    #[must_use]
    pub fn verifier(&self, issuer: impl Into<String>) -> TokenVerifier {
        TokenVerifier::new(issuer).with_key(self.kid.clone(), self.key.verifying_key())
    }

    /// # Errors
    /// Returns an error if the header or claims cannot be encoded.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, Error> {
        let header = SessionTokenHeader::eddsa(self.kid.clone());
        let header_b64 = b64e_json(&header)?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let signature: Signature = self.key.sign(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }
}

/// Public-key-only token verification.
#[derive(Clone, Debug)]
pub struct TokenVerifier {
    issuer: String,
    keys: Vec<(String, VerifyingKey)>,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            keys: Vec::new(),
        }
    }

    /// Trust another key, e.g. the previous key during rotation.
    #[must_use]
    pub fn with_key(mut self, kid: impl Into<String>, key: VerifyingKey) -> Self {
        self.keys.push((kid.into(), key));
        self
    }

    /// # Errors
    /// Returns an error if the PEM is not an SPKI Ed25519 public key.
    pub fn with_public_key_pem(self, kid: impl Into<String>, pem: &str) -> Result<Self, Error> {
        let key = VerifyingKey::from_public_key_pem(pem).map_err(|_| Error::KeyParse)?;
        Ok(self.with_key(kid, key))
    }

    fn find_by_kid(&self, kid: &str) -> Option<&VerifyingKey> {
        self.keys
            .iter()
            .find(|(candidate, _)| candidate == kid)
            .map(|(_, key)| key)
    }

    /// Check format, signature, issuer and expiry, in that order.
    ///
    /// # Errors
    /// Returns the first check that fails.
    pub fn verify(&self, token: &str, now_unix_seconds: i64) -> Result<SessionClaims, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        let header: SessionTokenHeader = b64d_json(header_b64)?;
        if header.alg != TOKEN_ALG {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let verifying_key = self
            .find_by_kid(&header.kid)
            .ok_or_else(|| Error::UnknownKid(header.kid.clone()))?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| Error::InvalidSignature)?;
        verifying_key
            .verify_strict(signing_input.as_bytes(), &signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if claims.iss != self.issuer {
            return Err(Error::InvalidIssuer);
        }
        claims.user_id()?;
        if claims.exp <= now_unix_seconds {
            return Err(Error::Expired);
        }

        Ok(claims)
    }
}
