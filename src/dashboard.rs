//! Cross-service dashboard counts

use crate::aggregate::{AggregateRequest, AggregateResult, AggregationCoordinator, FallbackPolicy};
use crate::config::ServiceKey;
use crate::dataset::records_of;
use crate::errors::TransportError;
use crate::models::EntityKind;
use crate::scheduler::RefreshTarget;
use crate::transport::ServiceClient;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Number of records a collection response describes.
///
/// Spring-style pages report `totalElements`; other services send a bare
/// array or wrap one under `content`, `data` or `items`.
pub fn count_records(body: Value) -> Result<u64, TransportError> {
    for key in ["totalElements", "total", "count"] {
        if let Some(n) = body.get(key).and_then(Value::as_u64) {
            return Ok(n);
        }
    }

    records_of(body)
        .map(|records| records.len() as u64)
        .ok_or_else(|| TransportError::Parse("response is not a collection".to_string()))
}

/// One count per entity collection, each from its own service. Sweeps run
/// through an `AggregationCoordinator`, so any subset of services can be down
/// and the dashboard still renders.
#[derive(Debug)]
pub struct Dashboard {
    clients: BTreeMap<ServiceKey, ServiceClient>,
    coordinator: AggregationCoordinator<u64>,
    latest: RwLock<Option<(u64, AggregateResult<u64>)>>,
    generation: AtomicU64,
}

impl Dashboard {
    pub fn new(clients: impl IntoIterator<Item = ServiceClient>) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.key(), c)).collect(),
            coordinator: AggregationCoordinator::new(),
            latest: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    #[instrument(skip(self))]
    pub async fn aggregate(&self) -> AggregateResult<u64> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let requests = EntityKind::ALL
            .iter()
            .map(|&kind| {
                let client = self.clients.get(&kind.service());
                let path = kind.collection_path();
                AggregateRequest::new(
                    kind.stat_name(),
                    kind.service(),
                    async move {
                        match client {
                            Some(client) => count_records(client.get(&path).await?),
                            None => Err(TransportError::Network(format!(
                                "{} is not configured",
                                kind.service()
                            ))),
                        }
                    },
                    FallbackPolicy::LastKnownOr(0),
                )
            })
            .collect();

        let result = self.coordinator.aggregate(requests).await;

        info!(
            "Dashboard sweep {}: {}/{} live fields{}",
            generation,
            result.real_count(),
            result.len(),
            if result.partial() { " (partial)" } else { "" }
        );

        let mut latest = self.latest.write().await;
        let is_newer = latest
            .as_ref()
            .is_none_or(|(stored, _)| *stored < generation);
        if is_newer {
            *latest = Some((generation, result.clone()));
        }

        result
    }

    /// Most recent completed sweep.
    pub async fn latest(&self) -> Option<AggregateResult<u64>> {
        self.latest.read().await.as_ref().map(|(_, result)| result.clone())
    }
}

#[async_trait]
impl RefreshTarget for Dashboard {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn refresh(&self) {
        self.aggregate().await;
    }
}
