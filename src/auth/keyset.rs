// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key set for the modern token scheme.
//!
//! Unlike the SSO provider's keys, these are not discovered over the network:
//! the key set is loaded once at startup from a JWKS document (file or inline
//! JSON) and held immutably. Key rotation ships a new document; old keys stay
//! in the set until every token signed with them has expired.
//!
//! Lookups are by the `kid` a token names in its header and must match
//! exactly one key. Zero matches and ambiguous matches are both rejected, so
//! a sloppily rotated set can never verify a token against the wrong key.

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::warn;

use super::error::AuthError;

/// One usable verification key.
struct LoadedKey {
    kid: String,
    key: DecodingKey,
    algorithm: Algorithm,
}

/// Pre-loaded verification keys for the modern token scheme.
pub struct SigningKeySet {
    keys: Vec<LoadedKey>,
}

impl SigningKeySet {
    /// Build from an already-parsed JWKS document.
    ///
    /// Entries without a `kid` or with an unsupported key type are skipped
    /// with a warning rather than failing the whole set.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = Vec::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                warn!("skipping signing key without kid");
                continue;
            };
            match jwk_to_decoding_key(jwk) {
                Ok((key, algorithm)) => keys.push(LoadedKey {
                    kid,
                    key,
                    algorithm,
                }),
                Err(e) => warn!(kid = %kid, error = %e, "skipping unusable signing key"),
            }
        }
        Self { keys }
    }

    /// Parse a JWKS document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let jwks: JwkSet = serde_json::from_str(json)
            .map_err(|e| AuthError::InternalError(format!("Invalid signing key set: {e}")))?;
        Ok(Self::from_jwks(&jwks))
    }

    /// Load a JWKS document from a file.
    pub fn from_file(path: &str) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::InternalError(format!("Failed to read signing key set {path}: {e}"))
        })?;
        Self::from_json(&json)
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no usable keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Look up the verification key a token names.
    ///
    /// Exactly one key must carry the `kid`; zero or multiple matches fail
    /// with [`AuthError::UnknownSigningKey`].
    pub fn get_decoding_key(&self, kid: &str) -> Result<(&DecodingKey, Algorithm), AuthError> {
        let mut matches = self.keys.iter().filter(|k| k.kid == kid);
        let first = matches.next().ok_or(AuthError::UnknownSigningKey)?;
        if matches.next().is_some() {
            return Err(AuthError::UnknownSigningKey);
        }
        Ok((&first.key, first.algorithm))
    }
}

/// Convert a JWK to a DecodingKey. Shared with the SSO key provider.
pub(super) fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| AuthError::InternalError(format!("Failed to create RSA key: {e}")))?;

            let alg = jwk
                .common
                .key_algorithm
                .map(|a| match a {
                    KeyAlgorithm::RS384 => Algorithm::RS384,
                    KeyAlgorithm::RS512 => Algorithm::RS512,
                    _ => Algorithm::RS256, // Default for RSA
                })
                .unwrap_or(Algorithm::RS256);

            Ok((key, alg))
        }
        AlgorithmParameters::OctetKey(_) => {
            let key = DecodingKey::from_jwk(jwk)
                .map_err(|e| AuthError::InternalError(format!("Failed to create key: {e}")))?;

            let alg = jwk
                .common
                .key_algorithm
                .map(|a| match a {
                    KeyAlgorithm::HS384 => Algorithm::HS384,
                    KeyAlgorithm::HS512 => Algorithm::HS512,
                    _ => Algorithm::HS256, // Default for octet keys
                })
                .unwrap_or(Algorithm::HS256);

            Ok((key, alg))
        }
        _ => Err(AuthError::InternalError(
            "Unsupported key type in signing key set".to_string(),
        )),
    }
}
