//! Owned store for the operator status board

use crate::config::ServiceKey;
use crate::health::{ServiceState, ServiceStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct StatusEntry {
    generation: u64,
    status: ServiceStatus,
}

/// One `ServiceStatus` per key, overwritten in place by probes.
///
/// Every write carries the generation of the sweep that produced it. A write
/// from an older generation than the one already stored for that key is
/// dropped, so a slow earlier sweep can never clobber a newer result.
#[derive(Debug, Clone)]
pub struct StatusStore {
    entries: Arc<RwLock<BTreeMap<ServiceKey, StatusEntry>>>,
}

impl StatusStore {
    /// Create a store with every key in the `unknown` state.
    pub fn new(keys: impl IntoIterator<Item = ServiceKey>) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| {
                (
                    key,
                    StatusEntry {
                        generation: 0,
                        status: ServiceStatus::unknown(key),
                    },
                )
            })
            .collect();

        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Store `status` unless a newer generation already owns its key.
    /// Returns whether the write was applied.
    pub async fn record(&self, generation: u64, status: ServiceStatus) -> bool {
        let mut entries = self.entries.write().await;

        match entries.get_mut(&status.key) {
            Some(entry) if entry.generation > generation => {
                debug!(
                    "Dropping stale status for {} (generation {} < {})",
                    status.key, generation, entry.generation
                );
                false
            }
            Some(entry) => {
                entry.generation = generation;
                entry.status = status;
                true
            }
            None => {
                entries.insert(status.key, StatusEntry { generation, status });
                true
            }
        }
    }

    pub async fn get(&self, key: ServiceKey) -> Option<ServiceStatus> {
        let entries = self.entries.read().await;
        entries.get(&key).map(|entry| entry.status.clone())
    }

    pub async fn snapshot(&self) -> BTreeMap<ServiceKey, ServiceStatus> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(key, entry)| (*key, entry.status.clone()))
            .collect()
    }

    pub async fn summary(&self) -> StatusSummary {
        let entries = self.entries.read().await;
        StatusSummary::from_states(entries.values().map(|entry| entry.status.state))
    }
}

/// Per-state counts for the board header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub online: usize,
    pub degraded: usize,
    pub offline: usize,
    pub unknown: usize,
}

impl StatusSummary {
    pub fn from_states(states: impl IntoIterator<Item = ServiceState>) -> Self {
        let mut summary = StatusSummary::default();
        for state in states {
            match state {
                ServiceState::Online => summary.online += 1,
                ServiceState::Degraded => summary.degraded += 1,
                ServiceState::Offline => summary.offline += 1,
                ServiceState::Unknown => summary.unknown += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.online + self.degraded + self.offline + self.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(key: ServiceKey, state: ServiceState) -> ServiceStatus {
        ServiceStatus {
            key,
            state,
            latency_ms: None,
            http_status: None,
            error: None,
            last_checked_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_new_store_is_unknown() {
        let store = StatusStore::new(ServiceKey::ALL);

        let summary = store.summary().await;
        assert_eq!(summary.unknown, 9);
        assert_eq!(summary.total(), 9);

        let auth = store.get(ServiceKey::Auth).await.unwrap();
        assert_eq!(auth.state, ServiceState::Unknown);
        assert!(auth.last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_older_generation_is_dropped() {
        let store = StatusStore::new([ServiceKey::Courses]);

        assert!(store.record(2, status(ServiceKey::Courses, ServiceState::Online)).await);
        assert!(!store.record(1, status(ServiceKey::Courses, ServiceState::Offline)).await);
        assert_eq!(
            store.get(ServiceKey::Courses).await.unwrap().state,
            ServiceState::Online
        );

        assert!(store.record(2, status(ServiceKey::Courses, ServiceState::Degraded)).await);
        assert_eq!(
            store.get(ServiceKey::Courses).await.unwrap().state,
            ServiceState::Degraded
        );
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = StatusStore::new([ServiceKey::Quizzes, ServiceKey::Materials]);

        store.record(5, status(ServiceKey::Quizzes, ServiceState::Offline)).await;
        assert!(store.record(1, status(ServiceKey::Materials, ServiceState::Online)).await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[&ServiceKey::Quizzes].state, ServiceState::Offline);
        assert_eq!(snapshot[&ServiceKey::Materials].state, ServiceState::Online);
    }
}
