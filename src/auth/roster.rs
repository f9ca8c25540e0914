// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Roster Index
//!
//! In-memory join table from enrolled phone number to institutional
//! identifier. Phone-derived logins are only admitted when the roster maps
//! their number; the mapping is maintained by administrators out of band.
//!
//! The table is loaded wholesale at startup and again on every roster change
//! notification. There is no incremental update: rosters stay small enough
//! that a full rebuild is cheaper than tracking deltas. The rebuilt map is
//! swapped in atomically, so readers never observe a partially-loaded table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::{Storage, StorageError, StorageEvent};

/// Phone-to-institutional-identifier index, refreshed on change notification.
pub struct RosterIndex {
    storage: Arc<dyn Storage>,
    entries: RwLock<HashMap<String, String>>,
}

impl RosterIndex {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a phone number to its institutional identifier.
    pub fn resolve(&self, phone: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(phone).cloned()
    }

    /// Rebuild the index from persistence and swap it in atomically.
    ///
    /// The storage read happens before any lock is taken; the write lock is
    /// held only for the swap.
    pub async fn refresh(&self) -> Result<usize, StorageError> {
        let roster = self.storage.list_roster().await?;
        let rebuilt: HashMap<String, String> = roster
            .into_iter()
            .map(|entry| (entry.phone, entry.external_id))
            .collect();
        let count = rebuilt.len();

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *entries = rebuilt;
        Ok(count)
    }

    /// Listen for roster change notifications until cancelled.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(roster.clone().run_listener(shutdown.clone()));
    /// ```
    pub async fn run_listener(self: Arc<Self>, shutdown: CancellationToken) {
        let mut events = self.storage.subscribe();
        info!("Roster listener starting");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(StorageEvent::RosterChanged) => self.refresh_step().await,
                    Ok(_) => {}
                    // A lagged receiver may have missed a roster change;
                    // refresh unconditionally.
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Roster listener lagged behind change notifications");
                        self.refresh_step().await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Roster listener: notification bus closed");
                        return;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Roster listener shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one refresh, keeping the previous table on failure.
    async fn refresh_step(&self) {
        match self.refresh().await {
            Ok(count) => info!(entries = count, "Roster index refreshed"),
            Err(e) => warn!(error = %e, "Roster refresh failed; keeping previous table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RosterEntry;
    use crate::storage::memory::MemoryStorage;
    use std::time::Duration;

    fn entry(phone: &str, external_id: &str) -> RosterEntry {
        RosterEntry {
            phone: phone.into(),
            external_id: external_id.into(),
            details: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn resolve_misses_until_refreshed() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .replace_roster(vec![entry("+16505550100", "6500112233")])
            .await
            .unwrap();

        let roster = RosterIndex::new(storage);
        assert!(roster.resolve("+16505550100").is_none());

        assert_eq!(roster.refresh().await.unwrap(), 1);
        assert_eq!(
            roster.resolve("+16505550100").as_deref(),
            Some("6500112233")
        );
        assert!(roster.resolve("+16505550199").is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_wholesale() {
        let storage = Arc::new(MemoryStorage::new());
        let roster = RosterIndex::new(storage.clone());

        storage
            .replace_roster(vec![entry("+16505550100", "6500112233")])
            .await
            .unwrap();
        roster.refresh().await.unwrap();

        storage
            .replace_roster(vec![entry("+16505550101", "6500112234")])
            .await
            .unwrap();
        roster.refresh().await.unwrap();

        // The dropped enrollment is gone, not merged.
        assert!(roster.resolve("+16505550100").is_none());
        assert_eq!(
            roster.resolve("+16505550101").as_deref(),
            Some("6500112234")
        );
    }

    #[tokio::test]
    async fn listener_refreshes_on_change_notification() {
        let storage = Arc::new(MemoryStorage::new());
        let roster = Arc::new(RosterIndex::new(storage.clone()));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(roster.clone().run_listener(shutdown.clone()));

        // Give the listener a beat to subscribe, then publish a change.
        tokio::time::sleep(Duration::from_millis(10)).await;
        storage
            .replace_roster(vec![entry("+16505550100", "6500112233")])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            roster.resolve("+16505550100").as_deref(),
            Some("6500112233")
        );

        shutdown.cancel();
        handle.await.unwrap();
    }
}
