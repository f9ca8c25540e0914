// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and the startup
//! configuration they load into. Configuration is read from the environment
//! once at startup; there is no hot reload — supported versions and rosters
//! change through the admin surface instead.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `API_KEYS` | Comma-separated static keys for anonymous clients | Required |
//! | `SSO_ISSUER` | Campus OIDC provider issuer URL | Required |
//! | `SSO_MOBILE_CLIENT_ID` | Audience expected on mobile SSO tokens | Required |
//! | `SSO_WEB_CLIENT_ID` | Audience expected on web SSO tokens | Required |
//! | `PHONE_AUTH_SECRET` | HMAC secret shared with the phone login service | Required |
//! | `ACCESS_TOKEN_ISSUER` | Issuer required on first-party access tokens | Required |
//! | `ACCESS_KEYSET_FILE` | Path to the JWKS file for first-party tokens | Required |
//! | `AUTH_COOKIE_NAME` | Cookie carrying the access token for web clients | `auth-token` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `SEED_SUPPORTED_VERSIONS` | Comma-separated version list loaded at startup | Optional |
//! | `SEED_ROSTER_FILE` | Path to a JSON roster loaded at startup | Optional |

use std::env;

use thiserror::Error;

/// Environment variable name for the server bind address.
pub const HOST_ENV: &str = "HOST";

/// Environment variable name for the server bind port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the comma-separated API key list.
pub const API_KEYS_ENV: &str = "API_KEYS";

/// Environment variable name for the campus OIDC issuer URL.
///
/// Discovery runs against `<issuer>/.well-known/openid-configuration`.
pub const SSO_ISSUER_ENV: &str = "SSO_ISSUER";

/// Environment variable name for the mobile SSO client id (token audience).
pub const SSO_MOBILE_CLIENT_ID_ENV: &str = "SSO_MOBILE_CLIENT_ID";

/// Environment variable name for the web SSO client id (token audience).
pub const SSO_WEB_CLIENT_ID_ENV: &str = "SSO_WEB_CLIENT_ID";

/// Environment variable name for the phone-login HMAC secret.
pub const PHONE_AUTH_SECRET_ENV: &str = "PHONE_AUTH_SECRET";

/// Environment variable name for the first-party access token issuer.
pub const ACCESS_TOKEN_ISSUER_ENV: &str = "ACCESS_TOKEN_ISSUER";

/// Environment variable name for the first-party JWKS file path.
pub const ACCESS_KEYSET_FILE_ENV: &str = "ACCESS_KEYSET_FILE";

/// Environment variable name for the web auth cookie name.
pub const AUTH_COOKIE_NAME_ENV: &str = "AUTH_COOKIE_NAME";

/// Environment variable name for the logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Environment variable name for the startup supported-version seed.
pub const SEED_SUPPORTED_VERSIONS_ENV: &str = "SEED_SUPPORTED_VERSIONS";

/// Environment variable name for the startup roster seed file.
pub const SEED_ROSTER_FILE_ENV: &str = "SEED_ROSTER_FILE";

/// Default web auth cookie name.
pub const DEFAULT_AUTH_COOKIE_NAME: &str = "auth-token";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Startup configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub api_keys: Vec<String>,
    pub sso_issuer: String,
    pub sso_mobile_audience: String,
    pub sso_web_audience: String,
    pub phone_secret: String,
    pub access_issuer: String,
    pub access_keyset_file: String,
    pub auth_cookie_name: String,
    pub seed_supported_versions: Vec<String>,
    pub seed_roster_file: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source. `from_env` delegates here;
    /// tests supply a map instead of touching process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup(PORT_ENV) {
            None => 8080,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: PORT_ENV,
                reason: format!("'{raw}' is not a port number"),
            })?,
        };

        let api_keys = split_list(&require(&lookup, API_KEYS_ENV)?);
        if api_keys.is_empty() {
            return Err(ConfigError::Invalid {
                name: API_KEYS_ENV,
                reason: "no keys configured".to_string(),
            });
        }

        // Discovery runs against this URL at the first SSO login; a typo
        // should fail startup, not the first user.
        let sso_issuer = require(&lookup, SSO_ISSUER_ENV)?;
        url::Url::parse(&sso_issuer).map_err(|e| ConfigError::Invalid {
            name: SSO_ISSUER_ENV,
            reason: e.to_string(),
        })?;

        Ok(Self {
            host,
            port,
            api_keys,
            sso_issuer,
            sso_mobile_audience: require(&lookup, SSO_MOBILE_CLIENT_ID_ENV)?,
            sso_web_audience: require(&lookup, SSO_WEB_CLIENT_ID_ENV)?,
            phone_secret: require(&lookup, PHONE_AUTH_SECRET_ENV)?,
            access_issuer: require(&lookup, ACCESS_TOKEN_ISSUER_ENV)?,
            access_keyset_file: require(&lookup, ACCESS_KEYSET_FILE_ENV)?,
            auth_cookie_name: lookup(AUTH_COOKIE_NAME_ENV)
                .unwrap_or_else(|| DEFAULT_AUTH_COOKIE_NAME.to_string()),
            seed_supported_versions: lookup(SEED_SUPPORTED_VERSIONS_ENV)
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            seed_roster_file: lookup(SEED_ROSTER_FILE_ENV),
        })
    }
}

fn require<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
