// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Gate
//!
//! Per-request authorization decisions for the three caller audiences:
//!
//! - **API-key tier**: anonymous callers presenting a static key
//! - **User tier**: end users presenting one of the three token schemes;
//!   a verified token with no stored identity is an *allowed* outcome
//!   ([`UserOutcome::Unregistered`]) so the caller can proceed to identity
//!   creation — it is never auto-created here
//! - **Admin tier**: like the user tier plus a required group scope; admin
//!   identities are always federated, and are provisioned on first contact
//!   from their verified claims
//!
//! Each authenticated tier owns an isolated [`IdentityCache`]. Verified
//! claims are synchronized into the stored identity on every load, with the
//! cache entry invalidated before the write lands, so claim changes (group
//! revocation in particular) take effect on the next request.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::cache::IdentityCache;
use super::claims::{AuthMethod, TokenSource, VerifiedToken};
use super::error::AuthError;
use super::provisioner::DefaultAccountProvisioner;
use super::roster::RosterIndex;
use super::validator::TokenValidator;
use crate::models::{Identity, NewIdentity};
use crate::storage::{Storage, StorageError, StorageEvent};

// =============================================================================
// API-Key Tier
// =============================================================================

/// Static-key check for anonymous callers.
pub struct ApiKeyAuth {
    keys: HashSet<String>,
}

impl ApiKeyAuth {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Match a presented key against the allow-list.
    ///
    /// An absent header is a malformed request; a present-but-unrecognized
    /// key is an authentication failure. The two map to different statuses.
    pub fn check(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let presented = presented
            .ok_or_else(|| AuthError::MalformedRequest("API-KEY header is required".to_string()))?;
        if self.keys.contains(presented) {
            Ok(())
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }
}

// =============================================================================
// User Tier
// =============================================================================

/// Result of an end-user check. Both variants are *allowed*: downstream
/// handlers decide what an unregistered caller may do (typically only
/// identity creation).
#[derive(Debug, Clone)]
pub enum UserOutcome {
    /// Token verified and a stored identity was found.
    Registered {
        identity: Identity,
        token: VerifiedToken,
    },
    /// Token verified but nothing is stored under its external identifier.
    Unregistered {
        external_id: String,
        token: VerifiedToken,
    },
}

impl UserOutcome {
    /// The external identifier the outcome resolved to.
    pub fn external_id(&self) -> &str {
        match self {
            UserOutcome::Registered { identity, .. } => &identity.external_id,
            UserOutcome::Unregistered { external_id, .. } => external_id,
        }
    }
}

/// End-user authorization path.
pub struct UserAuth {
    validator: Arc<TokenValidator>,
    storage: Arc<dyn Storage>,
    cache: Arc<IdentityCache>,
    roster: Arc<RosterIndex>,
    provisioner: DefaultAccountProvisioner,
}

impl UserAuth {
    fn new(
        validator: Arc<TokenValidator>,
        storage: Arc<dyn Storage>,
        cache: Arc<IdentityCache>,
        roster: Arc<RosterIndex>,
    ) -> Self {
        let provisioner = DefaultAccountProvisioner::new(storage.clone(), cache.clone());
        Self {
            validator,
            storage,
            cache,
            roster,
            provisioner,
        }
    }

    /// Verify a token and resolve the identity behind it.
    pub async fn check(
        &self,
        token: &str,
        source: TokenSource,
        csrf_token: Option<&str>,
    ) -> Result<UserOutcome, AuthError> {
        let verified = self.validator.verify(token, source, csrf_token).await?;
        let external_id = self.resolve_external_id(&verified)?;

        let Some(identity) = self.load_identity(&external_id, &verified).await? else {
            return Ok(UserOutcome::Unregistered {
                external_id,
                token: verified,
            });
        };

        let identity = self.provisioner.ensure(identity).await?;
        self.cache.put(&external_id, identity.clone());

        Ok(UserOutcome::Registered {
            identity,
            token: verified,
        })
    }

    /// Create the identity for a verified-but-unregistered caller.
    ///
    /// Idempotent: if a record appeared in the meantime (a concurrent first
    /// request), the stored record wins and is returned as-is after account
    /// provisioning.
    pub async fn register(
        &self,
        external_id: &str,
        token: &VerifiedToken,
    ) -> Result<Identity, AuthError> {
        let identity = match self.storage.get_identity(external_id).await? {
            Some(existing) => existing,
            None => {
                let created = materialize(new_identity_from_token(external_id, token));
                self.storage.put_identity(&created).await?;
                info!(external_id, method = %token.method, "created identity");
                created
            }
        };

        let identity = self.provisioner.ensure(identity).await?;
        self.cache.put(external_id, identity.clone());
        Ok(identity)
    }

    /// Resolve the scheme-native identifier to an external identifier,
    /// consulting the roster for phone-derived tokens.
    fn resolve_external_id(&self, verified: &VerifiedToken) -> Result<String, AuthError> {
        if verified.needs_roster_resolution() {
            self.roster
                .resolve(&verified.identifier)
                .ok_or(AuthError::IdentityNotProvisioned)
        } else {
            Ok(verified.identifier.clone())
        }
    }

    /// Cache-then-persistence identity load with claim synchronization.
    async fn load_identity(
        &self,
        external_id: &str,
        verified: &VerifiedToken,
    ) -> Result<Option<Identity>, AuthError> {
        let identity = match self.cache.get(external_id) {
            Some(cached) => cached,
            None => match self.storage.get_identity(external_id).await? {
                Some(stored) => stored,
                None => return Ok(None),
            },
        };

        let identity =
            sync_verified_claims(identity, verified, &self.cache, self.storage.as_ref()).await?;
        self.cache.put(external_id, identity.clone());
        Ok(Some(identity))
    }
}

// =============================================================================
// Admin Tier
// =============================================================================

/// A fully authorized administrator.
#[derive(Debug, Clone)]
pub struct AdminPrincipal {
    pub identity: Identity,
    /// The group scope this request was authorized under.
    pub group: String,
}

/// Administrator authorization path.
pub struct AdminAuth {
    validator: Arc<TokenValidator>,
    storage: Arc<dyn Storage>,
    cache: Arc<IdentityCache>,
}

impl AdminAuth {
    fn new(
        validator: Arc<TokenValidator>,
        storage: Arc<dyn Storage>,
        cache: Arc<IdentityCache>,
    ) -> Self {
        Self {
            validator,
            storage,
            cache,
        }
    }

    /// Verify a token and require membership in the named group scope.
    pub async fn check(
        &self,
        token: &str,
        source: TokenSource,
        csrf_token: Option<&str>,
        group: &str,
    ) -> Result<AdminPrincipal, AuthError> {
        let verified = self.validator.verify(token, source, csrf_token).await?;

        // Admin identities are always federated. A verified phone login is
        // a real person, just never an administrator.
        if verified.method == AuthMethod::Phone {
            warn!(
                identifier = %verified.identifier,
                "admin authorization denied: phone-derived token"
            );
            return Err(AuthError::InsufficientPrivilege);
        }

        let external_id = verified.identifier.clone();
        let identity = match self.load_identity(&external_id, &verified).await? {
            Some(identity) => identity,
            None => self.provision(&external_id, &verified).await?,
        };

        if !identity.is_member_of(group) {
            warn!(
                external_id = %identity.external_id,
                group,
                "admin authorization denied: not a member of required group"
            );
            return Err(AuthError::InsufficientPrivilege);
        }

        self.cache.put(&external_id, identity.clone());
        Ok(AdminPrincipal {
            identity,
            group: group.to_string(),
        })
    }

    async fn load_identity(
        &self,
        external_id: &str,
        verified: &VerifiedToken,
    ) -> Result<Option<Identity>, AuthError> {
        let identity = match self.cache.get(external_id) {
            Some(cached) => cached,
            None => match self.storage.get_identity(external_id).await? {
                Some(stored) => stored,
                None => return Ok(None),
            },
        };

        let identity =
            sync_verified_claims(identity, verified, &self.cache, self.storage.as_ref()).await?;
        Ok(Some(identity))
    }

    /// First contact: create the admin's identity from verified claims.
    async fn provision(
        &self,
        external_id: &str,
        verified: &VerifiedToken,
    ) -> Result<Identity, AuthError> {
        let created = materialize(new_identity_from_token(external_id, verified));
        self.storage.put_identity(&created).await?;
        info!(external_id, "provisioned admin identity from verified claims");
        Ok(created)
    }
}

// =============================================================================
// Composite Gate
// =============================================================================

/// The composed authorization subsystem: one instance per process, injected
/// into request handlers through application state.
pub struct Auth {
    pub api_key: ApiKeyAuth,
    pub user: UserAuth,
    pub admin: AdminAuth,
    validator: Arc<TokenValidator>,
    storage: Arc<dyn Storage>,
    user_cache: Arc<IdentityCache>,
    admin_cache: Arc<IdentityCache>,
    roster: Arc<RosterIndex>,
}

impl Auth {
    pub fn new(
        validator: TokenValidator,
        api_keys: impl IntoIterator<Item = String>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let validator = Arc::new(validator);
        let user_cache = Arc::new(IdentityCache::new("user"));
        let admin_cache = Arc::new(IdentityCache::new("admin"));
        let roster = Arc::new(RosterIndex::new(storage.clone()));

        Self {
            api_key: ApiKeyAuth::new(api_keys),
            user: UserAuth::new(
                validator.clone(),
                storage.clone(),
                user_cache.clone(),
                roster.clone(),
            ),
            admin: AdminAuth::new(validator.clone(), storage.clone(), admin_cache.clone()),
            validator,
            storage,
            user_cache,
            admin_cache,
            roster,
        }
    }

    /// The token validator, exposed for readiness reporting.
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Clear an identity's dependent data (accounts, encrypted blobs).
    ///
    /// Both tier caches are invalidated before the deletion is acknowledged,
    /// so no request can observe a cached record that outlives its data.
    pub async fn clear_identity_data(
        &self,
        external_id: &str,
    ) -> Result<Option<Identity>, AuthError> {
        self.user_cache.invalidate(external_id);
        self.admin_cache.invalidate(external_id);
        let cleared = self.storage.clear_identity_data(external_id).await?;
        if cleared.is_some() {
            info!(external_id, "cleared identity data");
        }
        Ok(cleared)
    }

    /// Load the roster and spawn the background loops: one cache sweeper per
    /// tier, the roster listener, and the cache-invalidation listener.
    pub async fn start(&self, shutdown: &CancellationToken) -> Result<(), StorageError> {
        let entries = self.roster.refresh().await?;
        info!(entries, "Roster index loaded");

        tokio::spawn(self.user_cache.clone().run_sweeper(shutdown.clone()));
        tokio::spawn(self.admin_cache.clone().run_sweeper(shutdown.clone()));
        tokio::spawn(self.roster.clone().run_listener(shutdown.clone()));
        tokio::spawn(run_invalidation_listener(
            self.storage.clone(),
            self.user_cache.clone(),
            self.admin_cache.clone(),
            shutdown.clone(),
        ));
        Ok(())
    }
}

/// Invalidate cached identities when a collaborator mutates them out of
/// band. In-process mutations invalidate synchronously before their write;
/// this listener covers everyone else.
async fn run_invalidation_listener(
    storage: Arc<dyn Storage>,
    user_cache: Arc<IdentityCache>,
    admin_cache: Arc<IdentityCache>,
    shutdown: CancellationToken,
) {
    let mut events = storage.subscribe();
    info!("Identity invalidation listener starting");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(StorageEvent::IdentityUpdated { external_id })
                | Ok(StorageEvent::IdentityCleared { external_id }) => {
                    user_cache.invalidate(&external_id);
                    admin_cache.invalidate(&external_id);
                }
                Ok(_) => {}
                // Missed notifications may include identity mutations, so
                // flush both caches rather than serve stale entries.
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Invalidation listener lagged; flushing caches");
                    user_cache.clear();
                    admin_cache.clear();
                }
                Err(RecvError::Closed) => {
                    info!("Invalidation listener: notification bus closed");
                    return;
                }
            },
            _ = shutdown.cancelled() => {
                info!("Invalidation listener shutting down");
                return;
            }
        }
    }
}

// =============================================================================
// Claim Synchronization
// =============================================================================

/// Fold freshly verified claims into a stored identity.
///
/// When anything changes, the cache entry is invalidated before the write is
/// persisted, then the fresh record is returned for re-caching. Phone tokens
/// carry no claims worth syncing and pass through untouched.
async fn sync_verified_claims(
    mut identity: Identity,
    verified: &VerifiedToken,
    cache: &IdentityCache,
    storage: &dyn Storage,
) -> Result<Identity, AuthError> {
    if verified.method != AuthMethod::Oidc {
        return Ok(identity);
    }

    let mut changed = false;
    if verified.email.is_some() && identity.email != verified.email {
        identity.email = verified.email.clone();
        changed = true;
    }
    if identity.groups != verified.groups {
        identity.groups = verified.groups.clone();
        changed = true;
    }
    if identity.sso_uin.is_none() {
        identity.sso_uin = Some(identity.external_id.clone());
        changed = true;
    }

    if changed {
        cache.invalidate(&identity.external_id);
        identity.updated_at = Utc::now();
        storage.put_identity(&identity).await?;
    }
    Ok(identity)
}

/// Bundle the claims an identity is created from.
fn new_identity_from_token(external_id: &str, verified: &VerifiedToken) -> NewIdentity {
    NewIdentity {
        external_id: external_id.to_string(),
        sso_uin: (verified.method == AuthMethod::Oidc).then(|| external_id.to_string()),
        email: verified.email.clone(),
        groups: verified.groups.clone(),
    }
}

/// Turn a claim bundle into a persistable identity record.
fn materialize(new: NewIdentity) -> Identity {
    let now = Utc::now();
    Identity {
        id: Uuid::new_v4(),
        external_id: new.external_id,
        sso_uin: new.sso_uin,
        email: new.email,
        groups: new.groups,
        encrypted_blobs: Vec::new(),
        accounts: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}
