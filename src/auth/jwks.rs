// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OIDC discovery and JWKS caching for the legacy SSO scheme.
//!
//! The federated identity provider publishes its signing keys behind an
//! OIDC discovery document: the configured issuer is resolved to a
//! `jwks_uri` via `/.well-known/openid-configuration`, and the key set is
//! fetched from there.
//!
//! ## Caching
//!
//! - Discovery and JWKS are fetched via HTTPS with a bounded timeout
//! - The key set is cached with a TTL; a `kid` miss forces one refresh
//!   before the token is rejected, so provider-side rotation is picked up
//!   without waiting out the TTL
//! - Fetches happen outside any lock held by the identity caches

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::AuthError;
use super::keyset::jwk_to_decoding_key;

/// Default JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Bound on discovery and JWKS fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The subset of the OIDC discovery document this layer reads.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Discovers and caches the SSO provider's signing keys.
#[derive(Clone)]
pub struct OidcKeyProvider {
    /// Issuer base URL the discovery document hangs off.
    issuer: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Discovered JWKS endpoint, resolved once and kept.
    jwks_uri: Arc<RwLock<Option<String>>>,
    /// Cached JWKS
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// HTTP client
    client: reqwest::Client,
}

impl OidcKeyProvider {
    /// Create a provider for the given issuer.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            jwks_uri: Arc::new(RwLock::new(None)),
            cache: Arc::new(RwLock::new(None)),
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The configured issuer.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Resolve the JWKS endpoint from the discovery document, caching it.
    async fn discover_jwks_uri(&self) -> Result<String, AuthError> {
        {
            let uri = self.jwks_uri.read().await;
            if let Some(uri) = &*uri {
                return Ok(uri.clone());
            }
        }

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            self.issuer.trim_end_matches('/')
        );
        let document: DiscoveryDocument = self
            .client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        debug!(jwks_uri = %document.jwks_uri, "resolved SSO discovery document");

        let mut uri = self.jwks_uri.write().await;
        *uri = Some(document.jwks_uri.clone());
        Ok(document.jwks_uri)
    }

    /// Fetch JWKS (with caching).
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        // Fetch fresh JWKS
        let jwks = self.fetch_jwks().await?;

        // Update cache
        {
            let mut cache = self.cache.write().await;
            *cache = Some(CacheEntry {
                jwks: jwks.clone(),
                fetched_at: Instant::now(),
            });
        }

        Ok(jwks)
    }

    /// Fetch JWKS from the discovered endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let jwks_uri = self.discover_jwks_uri().await?;

        let response = self
            .client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UpstreamUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        Ok(jwks)
    }

    /// Get a decoding key for the given key ID.
    ///
    /// A miss against the cached set forces one refresh before giving up, so
    /// a freshly rotated provider key verifies on the first token that uses
    /// it.
    pub async fn get_decoding_key(
        &self,
        kid: &str,
    ) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;
        if let Some(found) = lookup_key(&jwks, kid)? {
            return Ok(found);
        }

        self.refresh().await?;
        let jwks = self.get_jwks().await?;
        lookup_key(&jwks, kid)?.ok_or(AuthError::UnknownSigningKey)
    }

    /// Force refresh the JWKS cache.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let jwks = self.fetch_jwks().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        if let Some(entry) = &*cache {
            entry.fetched_at.elapsed() < self.cache_ttl
        } else {
            false
        }
    }
}

/// Find the key with a matching kid in a fetched set.
fn lookup_key(
    jwks: &JwkSet,
    kid: &str,
) -> Result<Option<(DecodingKey, Algorithm)>, AuthError> {
    match jwks
        .keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
    {
        Some(jwk) => jwk_to_decoding_key(jwk).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn provider_keeps_issuer() {
        let provider = OidcKeyProvider::new("https://sso.example.edu/idp");
        assert_eq!(provider.issuer(), "https://sso.example.edu/idp");
    }

    #[test]
    fn custom_cache_ttl() {
        let provider =
            OidcKeyProvider::new("https://sso.example.edu/idp").with_cache_ttl(Duration::from_secs(60));
        assert_eq!(provider.cache_ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn cache_initially_empty() {
        let provider = OidcKeyProvider::new("https://sso.example.edu/idp");
        assert!(!provider.is_cached().await);
    }

    #[test]
    fn lookup_key_matches_kid() {
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "oct",
                "kid": "sso-1",
                "alg": "HS256",
                "k": URL_SAFE_NO_PAD.encode(b"provider-secret-material-bytes!!"),
            }]
        }))
        .unwrap();

        assert!(lookup_key(&jwks, "sso-1").unwrap().is_some());
        assert!(lookup_key(&jwks, "sso-2").unwrap().is_none());
    }
}
