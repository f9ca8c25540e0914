// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, process, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relational_health_server::{
    api::router,
    auth::{Auth, OidcKeyProvider, SigningKeySet, TokenValidator},
    config::{AppConfig, LOG_FORMAT_ENV},
    models::RosterEntry,
    state::AppState,
    storage::{memory::MemoryStorage, Storage},
    version::VersionResolver,
};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration is incomplete");
            process::exit(1);
        }
    };

    let keyset = match SigningKeySet::from_file(&config.access_keyset_file) {
        Ok(keyset) => keyset,
        Err(e) => {
            error!(
                error = %e,
                path = %config.access_keyset_file,
                "Failed to load the first-party signing key set"
            );
            process::exit(1);
        }
    };
    info!(keys = keyset.len(), "First-party signing key set loaded");

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    seed(&config, storage.as_ref()).await;

    let validator = TokenValidator::new(
        OidcKeyProvider::new(config.sso_issuer.clone()),
        config.sso_mobile_audience.clone(),
        config.sso_web_audience.clone(),
        &config.phone_secret,
        keyset,
        config.access_issuer.clone(),
    );

    let auth = Arc::new(Auth::new(
        validator,
        config.api_keys.clone(),
        storage.clone(),
    ));
    let versions = Arc::new(VersionResolver::new(storage.clone()));

    // One token cancels every background loop and the server itself.
    let shutdown = CancellationToken::new();

    if let Err(e) = auth.start(&shutdown).await {
        error!(error = %e, "Failed to start the auth subsystem");
        process::exit(1);
    }
    match versions.refresh().await {
        Ok(count) => info!(versions = count, "Supported version list loaded"),
        Err(e) => {
            error!(error = %e, "Failed to load the supported version list");
            process::exit(1);
        }
    }
    tokio::spawn(versions.clone().run_listener(shutdown.clone()));

    let state = AppState::new(auth, versions, storage, &config.auth_cookie_name);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    info!(%addr, "Health building block listening (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server failed");

    info!("Server stopped");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = env::var(LOG_FORMAT_ENV)
        .map(|format| format == "json")
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Best-effort dev seeding. A production deployment feeds versions and
/// rosters through the admin surface instead.
async fn seed(config: &AppConfig, storage: &dyn Storage) {
    if !config.seed_supported_versions.is_empty() {
        match storage
            .set_supported_versions(config.seed_supported_versions.clone())
            .await
        {
            Ok(()) => info!(
                versions = config.seed_supported_versions.len(),
                "Seeded supported versions"
            ),
            Err(e) => warn!(error = %e, "Failed to seed supported versions"),
        }
    }

    if let Some(path) = &config.seed_roster_file {
        match load_roster_file(path) {
            Ok(entries) => match storage.replace_roster(entries).await {
                Ok(count) => info!(entries = count, path = %path, "Seeded roster"),
                Err(e) => warn!(error = %e, "Failed to seed roster"),
            },
            Err(e) => warn!(error = %e, path = %path, "Failed to read roster seed file"),
        }
    }
}

fn load_roster_file(path: &str) -> Result<Vec<RosterEntry>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutdown signal received");
    shutdown.cancel();
}
