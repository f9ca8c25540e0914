// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token verification across the three supported schemes.
//!
//! ## Verification Flow
//!
//! 1. Decode the payload without verification and classify the scheme by
//!    claim-key presence ([`TokenScheme::classify`])
//! 2. Dispatch to the scheme's verifier:
//!    - **Legacy SSO**: signature against the provider's discovered JWKS,
//!      audience bound to the web or mobile client by transport
//!    - **Legacy phone**: HMAC against the pre-shared secret; expiry is
//!      optional in this scheme but enforced when present
//!    - **Modern pair**: `kid` resolved against the pre-loaded key set
//!      (exactly one match), issuer compared for exact equality, `type`
//!      claim matched to the slot the token was presented in; a cookie
//!      transport additionally demands a CSRF companion whose subject
//!      matches the access token's
//! 3. Produce a [`VerifiedToken`] carrying the scheme-native identifier
//!
//! Phone-derived identifiers are not external identifiers yet; the auth
//! gate resolves them through the roster afterwards.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tracing::debug;

use super::claims::{
    normalize_groups, AuthMethod, ModernClaims, PhoneClaims, SsoClaims, TokenKind, TokenScheme,
    TokenSource, VerifiedToken,
};
use super::error::AuthError;
use super::jwks::OidcKeyProvider;
use super::keyset::SigningKeySet;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Verifies raw bearer material and extracts a verified identifier.
pub struct TokenValidator {
    /// Key provider for the legacy SSO scheme.
    sso: OidcKeyProvider,
    /// SSO audience expected for `Authorization: Bearer` transport.
    sso_mobile_audience: String,
    /// SSO audience expected for cookie transport.
    sso_web_audience: String,
    /// Pre-shared HMAC secret for the legacy phone scheme.
    phone_secret: DecodingKey,
    /// Pre-loaded key set for the modern scheme.
    keyset: SigningKeySet,
    /// Issuer the modern scheme requires, compared exactly.
    issuer: String,
}

impl TokenValidator {
    pub fn new(
        sso: OidcKeyProvider,
        sso_mobile_audience: impl Into<String>,
        sso_web_audience: impl Into<String>,
        phone_secret: &str,
        keyset: SigningKeySet,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            sso,
            sso_mobile_audience: sso_mobile_audience.into(),
            sso_web_audience: sso_web_audience.into(),
            phone_secret: DecodingKey::from_secret(phone_secret.as_bytes()),
            keyset,
            issuer: issuer.into(),
        }
    }

    /// The SSO key provider, exposed for readiness reporting.
    pub fn sso_provider(&self) -> &OidcKeyProvider {
        &self.sso
    }

    /// The first-party signing key set, exposed for readiness reporting.
    pub fn keyset(&self) -> &SigningKeySet {
        &self.keyset
    }

    /// Classify raw bearer material without verifying it.
    pub fn classify(&self, token: &str) -> Result<TokenScheme, AuthError> {
        let payload = insecure_claims(token)?;
        TokenScheme::classify(&payload).ok_or(AuthError::UnsupportedTokenType)
    }

    /// Verify raw bearer material and produce a [`VerifiedToken`].
    ///
    /// `csrf_token` is the companion token from the CSRF header; it is only
    /// consulted (and only required) when `source` is a cookie and the
    /// token classifies as modern.
    pub async fn verify(
        &self,
        token: &str,
        source: TokenSource,
        csrf_token: Option<&str>,
    ) -> Result<VerifiedToken, AuthError> {
        let payload = insecure_claims(token)?;
        let scheme = TokenScheme::classify(&payload).ok_or(AuthError::UnsupportedTokenType)?;

        match scheme {
            TokenScheme::LegacySso => self.verify_sso(token, payload, source).await,
            TokenScheme::LegacyPhone => self.verify_phone(token, payload),
            TokenScheme::Modern => self.verify_modern(token, payload, source, csrf_token).await,
        }
    }

    // =========================================================================
    // Legacy SSO
    // =========================================================================

    async fn verify_sso(
        &self,
        token: &str,
        payload: serde_json::Value,
        source: TokenSource,
    ) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::UnsupportedTokenType)?;
        let kid = header.kid.ok_or(AuthError::UnknownSigningKey)?;
        let (decoding_key, algorithm) = self.sso.get_decoding_key(&kid).await?;

        // A cookie means the web client, a bearer header the mobile client.
        let audience = match source {
            TokenSource::Cookie => &self.sso_web_audience,
            TokenSource::Header => &self.sso_mobile_audience,
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[self.sso.issuer()]);
        validation.set_audience(&[audience]);

        let token_data =
            decode::<SsoClaims>(token, &decoding_key, &validation).map_err(map_jwt_error)?;
        let claims = token_data.claims;

        let uin = claims
            .uin
            .ok_or(AuthError::MissingRequiredClaim("uiucedu_uin"))?;

        Ok(VerifiedToken {
            identifier: uin,
            method: AuthMethod::Oidc,
            email: claims.email,
            groups: normalize_groups(claims.member_of),
            claims: payload,
        })
    }

    // =========================================================================
    // Legacy Phone
    // =========================================================================

    fn verify_phone(
        &self,
        token: &str,
        payload: serde_json::Value,
    ) -> Result<VerifiedToken, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        // Expiry is optional in this scheme; enforce it only when present.
        validation.required_spec_claims.clear();

        let token_data =
            decode::<PhoneClaims>(token, &self.phone_secret, &validation).map_err(map_jwt_error)?;

        let phone = token_data
            .claims
            .phone_number
            .ok_or(AuthError::MissingRequiredClaim("phoneNumber"))?;

        Ok(VerifiedToken {
            identifier: phone,
            method: AuthMethod::Phone,
            email: None,
            groups: Vec::new(),
            claims: payload,
        })
    }

    // =========================================================================
    // Modern Access/CSRF Pair
    // =========================================================================

    async fn verify_modern(
        &self,
        token: &str,
        payload: serde_json::Value,
        source: TokenSource,
        csrf_token: Option<&str>,
    ) -> Result<VerifiedToken, AuthError> {
        let access = self.verify_modern_single(token, TokenKind::Access)?;

        // Cookie-delivered tokens are reachable by cross-site requests, so
        // they must be paired with a CSRF token proving header access.
        if source == TokenSource::Cookie {
            let csrf_token = csrf_token.ok_or_else(|| {
                AuthError::MalformedRequest("CSRF header required for cookie auth".to_string())
            })?;
            let csrf = self.verify_modern_single(csrf_token, TokenKind::Csrf)?;
            if csrf.uid != access.uid {
                debug!("CSRF token subject does not match access token");
                return Err(AuthError::CsrfMismatch);
            }
        }

        let uid = access.uid.ok_or(AuthError::MissingRequiredClaim("uid"))?;
        let auth_claim = access.auth.ok_or(AuthError::MissingRequiredClaim("auth"))?;
        let method =
            AuthMethod::from_claim(&auth_claim).ok_or(AuthError::UnsupportedTokenType)?;

        Ok(VerifiedToken {
            identifier: uid,
            method,
            email: access.email,
            groups: normalize_groups(access.groups),
            claims: payload,
        })
    }

    /// Verify one modern-scheme token against the key set and check its
    /// `type` claim fits the slot it was presented in.
    fn verify_modern_single(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<ModernClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::UnsupportedTokenType)?;
        let kid = header.kid.ok_or(AuthError::UnknownSigningKey)?;
        let (decoding_key, algorithm) = self.keyset.get_decoding_key(&kid)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.issuer]);
        // These tokens carry no audience claim.
        validation.validate_aud = false;

        let token_data =
            decode::<ModernClaims>(token, decoding_key, &validation).map_err(map_jwt_error)?;
        let claims = token_data.claims;

        // Reject substitution: a CSRF token in the access slot and vice versa.
        match claims.token_type.as_deref() {
            Some(t) if t == kind.claim_value() => {}
            Some(_) => return Err(AuthError::TokenTypeMismatch),
            None => return Err(AuthError::MissingRequiredClaim("type")),
        }

        Ok(claims)
    }
}

/// Decode a JWT payload without verifying anything, for scheme
/// classification only.
fn insecure_claims(token: &str) -> Result<serde_json::Value, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<serde_json::Value>(token)
        .map_err(|_| AuthError::UnsupportedTokenType)?;
    Ok(token_data.claims)
}

/// Map jsonwebtoken failures onto the auth error taxonomy.
fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "exp" => AuthError::MissingRequiredClaim("exp"),
            "iss" => AuthError::IssuerMismatch,
            "aud" => AuthError::AudienceMismatch,
            _ => AuthError::UnsupportedTokenType,
        },
        _ => AuthError::UnsupportedTokenType,
    }
}
