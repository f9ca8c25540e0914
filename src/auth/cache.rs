// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Cache
//!
//! Time-bounded map from external identifier to resolved identity, saving a
//! persistence round-trip on every authenticated request. The end-user and
//! admin tiers each own an isolated instance, swept independently.
//!
//! ## Staleness Contract
//!
//! - `get` refreshes the entry's last-access timestamp
//! - A background sweep wakes every 5 minutes and evicts entries idle for
//!   longer than 5 minutes
//! - Any mutation to the underlying identity must call `invalidate` before
//!   the mutation is acknowledged, so the next `get` observes fresh data
//!
//! One mutex guards the whole map. Critical sections only touch the map, so
//! coarse locking stays cheap at the request volumes this service sees, and
//! the lock is never held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::Identity;

/// How long an entry may go unread before the sweep evicts it.
const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(300);

/// How often the sweep loop wakes.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// One cached identity with its last-access timestamp.
struct CachedIdentity {
    identity: Identity,
    last_access: Instant,
}

/// Shared identity cache with background eviction.
pub struct IdentityCache {
    /// Tier label for log context (`"user"` or `"admin"`).
    name: &'static str,
    entries: Mutex<HashMap<String, CachedIdentity>>,
    max_idle: Duration,
    sweep_interval: Duration,
}

impl IdentityCache {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            max_idle: DEFAULT_MAX_IDLE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the idle threshold. Used to shorten test timing.
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Override the sweep cadence. Used to shorten test timing.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Look up a cached identity, refreshing its last-access timestamp.
    ///
    /// A miss is normal control flow: the caller loads from persistence and
    /// writes the result back via [`IdentityCache::put`].
    pub fn get(&self, external_id: &str) -> Option<Identity> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(external_id)?;
        entry.last_access = Instant::now();
        Some(entry.identity.clone())
    }

    /// Unconditionally cache an identity with a fresh timestamp.
    pub fn put(&self, external_id: impl Into<String>, identity: Identity) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            external_id.into(),
            CachedIdentity {
                identity,
                last_access: Instant::now(),
            },
        );
    }

    /// Drop an entry. Must complete before the corresponding identity
    /// mutation is acknowledged anywhere.
    pub fn invalidate(&self, external_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(external_id).is_some() {
            debug!(cache = self.name, external_id, "invalidated cached identity");
        }
    }

    /// Drop every entry. Used when a change notification stream lags and
    /// individual invalidations may have been missed.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = entries.len();
        entries.clear();
        if dropped > 0 {
            info!(cache = self.name, dropped, "flushed identity cache");
        }
    }

    /// Run the eviction loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(cache.clone().run_sweeper(shutdown.clone()));
    /// ```
    pub async fn run_sweeper(self: std::sync::Arc<Self>, shutdown: CancellationToken) {
        info!(
            cache = self.name,
            interval_secs = self.sweep_interval.as_secs(),
            "Identity cache sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!(cache = self.name, "Identity cache sweeper shutting down");
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!(cache = self.name, "Identity cache sweeper shutting down");
                    return;
                }
            }

            self.sweep_step();
        }
    }

    /// Execute one sweep: evict every entry idle for longer than the
    /// threshold.
    fn sweep_step(&self) {
        let evicted = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let before = entries.len();
            entries.retain(|_, entry| entry.last_access.elapsed() <= self.max_idle);
            before - entries.len()
        };
        if evicted > 0 {
            info!(cache = self.name, evicted, "evicted idle identity cache entries");
        }
    }

    /// Presence probe that does not refresh the timestamp.
    #[cfg(test)]
    fn contains(&self, external_id: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(external_id)
    }
}
