// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Default Account Provisioner
//!
//! Older clients created identities before the multi-account feature
//! existed, so some stored identities carry no default account. Rather than
//! a bulk migration, the missing account is created lazily on first
//! authenticated access: a migration-on-read applied once per identity.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::cache::IdentityCache;
use super::error::AuthError;
use crate::models::{Account, Identity};
use crate::storage::Storage;

/// Ensures every resolved identity has a default account.
pub struct DefaultAccountProvisioner {
    storage: Arc<dyn Storage>,
    cache: Arc<IdentityCache>,
}

impl DefaultAccountProvisioner {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<IdentityCache>) -> Self {
        Self { storage, cache }
    }

    /// Make sure the identity has a default account, creating one if absent.
    ///
    /// A no-op when the account already exists: nothing is written and the
    /// cache entry is left alone. Otherwise the cache entry is invalidated
    /// before the new account is persisted, so no reader can hold the
    /// pre-migration record once this returns.
    pub async fn ensure(&self, identity: Identity) -> Result<Identity, AuthError> {
        if identity.has_default_account() {
            return Ok(identity);
        }

        self.cache.invalidate(&identity.external_id);

        let mut updated = identity;
        updated
            .accounts
            .push(Account::new_default(updated.external_id.clone()));
        updated.updated_at = Utc::now();
        self.storage.put_identity(&updated).await?;

        info!(
            external_id = %updated.external_id,
            "provisioned default account"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use uuid::Uuid;

    fn identity(external_id: &str, accounts: Vec<Account>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            sso_uin: None,
            email: None,
            groups: Vec::new(),
            encrypted_blobs: Vec::new(),
            accounts,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn provisioner() -> (DefaultAccountProvisioner, Arc<dyn Storage>, Arc<IdentityCache>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let cache = Arc::new(IdentityCache::new("user"));
        (
            DefaultAccountProvisioner::new(storage.clone(), cache.clone()),
            storage,
            cache,
        )
    }

    #[tokio::test]
    async fn creates_default_account_when_absent() {
        let (provisioner, storage, cache) = provisioner();
        let legacy = identity("6500112233", Vec::new());
        storage.put_identity(&legacy).await.unwrap();
        cache.put("6500112233", legacy.clone());

        let ensured = provisioner.ensure(legacy).await.unwrap();
        assert!(ensured.has_default_account());
        assert_eq!(ensured.accounts.len(), 1);

        // The pre-migration cache entry is gone and the account persisted.
        assert!(cache.get("6500112233").is_none());
        let stored = storage.get_identity("6500112233").await.unwrap().unwrap();
        assert!(stored.has_default_account());
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let (provisioner, storage, cache) = provisioner();
        let provisioned = identity(
            "6500112233",
            vec![Account::new_default("6500112233")],
        );
        storage.put_identity(&provisioned).await.unwrap();
        cache.put("6500112233", provisioned.clone());
        let stored_before = storage.get_identity("6500112233").await.unwrap().unwrap();

        let once = provisioner.ensure(provisioned).await.unwrap();
        let twice = provisioner.ensure(once.clone()).await.unwrap();

        // No duplicate account, no write, no cache invalidation.
        assert_eq!(once.accounts.len(), 1);
        assert_eq!(twice.accounts.len(), 1);
        assert!(cache.get("6500112233").is_some());
        let stored_after = storage.get_identity("6500112233").await.unwrap().unwrap();
        assert_eq!(stored_before.updated_at, stored_after.updated_at);
    }

    #[tokio::test]
    async fn non_default_accounts_do_not_satisfy_ensure() {
        let (provisioner, storage, _cache) = provisioner();
        let mut secondary = Account::new_default("6500112233");
        secondary.default = false;
        let partial = identity("6500112233", vec![secondary]);
        storage.put_identity(&partial).await.unwrap();

        let ensured = provisioner.ensure(partial).await.unwrap();
        assert_eq!(ensured.accounts.len(), 2);
        assert_eq!(ensured.accounts.iter().filter(|a| a.default).count(), 1);
    }
}
