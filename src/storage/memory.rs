// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # In-Memory Storage
//!
//! Process-local [`Storage`] backend. Default for development and the test
//! suite; production deployments wire in a durable backend behind the same
//! trait.
//!
//! Locks guard plain maps and are never held across an await point. Every
//! mutation publishes its [`StorageEvent`] only after the write has landed.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use crate::models::{Identity, RosterEntry};
use crate::storage::{Storage, StorageError, StorageEvent};

/// Capacity of the change-notification bus. Subscribers that fall further
/// behind than this see a lag error and perform a full refresh.
const EVENT_BUS_CAPACITY: usize = 64;

/// In-memory [`Storage`] implementation.
pub struct MemoryStorage {
    identities: RwLock<HashMap<String, Identity>>,
    roster: RwLock<Vec<RosterEntry>>,
    versions: RwLock<Vec<String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            identities: RwLock::new(HashMap::new()),
            roster: RwLock::new(Vec::new()),
            versions: RwLock::new(Vec::new()),
            events,
        }
    }

    fn publish(&self, event: StorageEvent) {
        // No receivers is fine; the bus only matters once caches subscribe.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_identity(&self, external_id: &str) -> Result<Option<Identity>, StorageError> {
        let identities = self.identities.read().unwrap_or_else(|e| e.into_inner());
        Ok(identities.get(external_id).cloned())
    }

    async fn put_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        {
            let mut identities = self.identities.write().unwrap_or_else(|e| e.into_inner());
            identities.insert(identity.external_id.clone(), identity.clone());
        }
        self.publish(StorageEvent::IdentityUpdated {
            external_id: identity.external_id.clone(),
        });
        Ok(())
    }

    async fn clear_identity_data(
        &self,
        external_id: &str,
    ) -> Result<Option<Identity>, StorageError> {
        let cleared = {
            let mut identities = self.identities.write().unwrap_or_else(|e| e.into_inner());
            identities.get_mut(external_id).map(|identity| {
                identity.accounts.clear();
                identity.encrypted_blobs.clear();
                identity.updated_at = Utc::now();
                identity.clone()
            })
        };
        if cleared.is_some() {
            self.publish(StorageEvent::IdentityCleared {
                external_id: external_id.to_string(),
            });
        }
        Ok(cleared)
    }

    async fn list_roster(&self) -> Result<Vec<RosterEntry>, StorageError> {
        let roster = self.roster.read().unwrap_or_else(|e| e.into_inner());
        Ok(roster.clone())
    }

    async fn replace_roster(&self, entries: Vec<RosterEntry>) -> Result<usize, StorageError> {
        let count = entries.len();
        {
            let mut roster = self.roster.write().unwrap_or_else(|e| e.into_inner());
            *roster = entries;
        }
        self.publish(StorageEvent::RosterChanged);
        Ok(count)
    }

    async fn get_supported_versions(&self) -> Result<Vec<String>, StorageError> {
        let versions = self.versions.read().unwrap_or_else(|e| e.into_inner());
        Ok(versions.clone())
    }

    async fn set_supported_versions(&self, versions: Vec<String>) -> Result<(), StorageError> {
        {
            let mut stored = self.versions.write().unwrap_or_else(|e| e.into_inner());
            *stored = versions;
        }
        self.publish(StorageEvent::ConfigChanged);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Account;
    use uuid::Uuid;

    fn sample_identity(external_id: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            sso_uin: Some(external_id.into()),
            email: Some("person@example.edu".into()),
            groups: vec!["urn:campus:health".into()],
            encrypted_blobs: vec![serde_json::json!({"ciphertext": "abc"})],
            accounts: vec![Account::new_default(external_id)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let storage = MemoryStorage::new();
        let identity = sample_identity("6500112233");
        storage.put_identity(&identity).await.unwrap();

        let loaded = storage.get_identity("6500112233").await.unwrap().unwrap();
        assert_eq!(loaded, identity);
        assert!(storage.get_identity("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_keeps_record_but_wipes_data() {
        let storage = MemoryStorage::new();
        let identity = sample_identity("6500112233");
        storage.put_identity(&identity).await.unwrap();

        let cleared = storage
            .clear_identity_data("6500112233")
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.accounts.is_empty());
        assert!(cleared.encrypted_blobs.is_empty());
        assert_eq!(cleared.external_id, "6500112233");
        assert!(cleared.updated_at >= identity.updated_at);

        // The record survives so the external identifier stays known.
        assert!(storage.get_identity("6500112233").await.unwrap().is_some());
        // Clearing an unknown identifier is a no-op.
        assert!(storage.clear_identity_data("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mutations_publish_events_after_write() {
        let storage = MemoryStorage::new();
        let mut events = storage.subscribe();

        storage
            .put_identity(&sample_identity("6500112233"))
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            StorageEvent::IdentityUpdated {
                external_id: "6500112233".into()
            }
        );

        storage.clear_identity_data("6500112233").await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            StorageEvent::IdentityCleared {
                external_id: "6500112233".into()
            }
        );

        storage.replace_roster(Vec::new()).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), StorageEvent::RosterChanged);

        storage
            .set_supported_versions(vec!["2.0".into()])
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap(), StorageEvent::ConfigChanged);
    }

    #[tokio::test]
    async fn roster_replace_is_wholesale() {
        let storage = MemoryStorage::new();
        let first = vec![RosterEntry {
            phone: "+16505550100".into(),
            external_id: "6500112233".into(),
            details: serde_json::Value::Null,
        }];
        assert_eq!(storage.replace_roster(first).await.unwrap(), 1);

        let second = vec![
            RosterEntry {
                phone: "+16505550101".into(),
                external_id: "6500112234".into(),
                details: serde_json::Value::Null,
            },
            RosterEntry {
                phone: "+16505550102".into(),
                external_id: "6500112235".into(),
                details: serde_json::Value::Null,
            },
        ];
        assert_eq!(storage.replace_roster(second).await.unwrap(), 2);

        let roster = storage.list_roster().await.unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster.iter().all(|e| e.phone != "+16505550100"));
    }
}
