//! Liveness and latency probes for the service status board

use crate::config::{ServiceDescriptor, ServiceKey};
use crate::errors::{ConsoleError, Result, TransportError};
use crate::scheduler::RefreshTarget;
use crate::status::StatusStore;
use crate::transport::{Credentials, RawResponse, ServiceClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Online,
    /// Answered, but not with a 2xx
    Degraded,
    Offline,
    /// Not probed yet
    Unknown,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Online => write!(f, "ONLINE"),
            ServiceState::Degraded => write!(f, "DEGRADED"),
            ServiceState::Offline => write!(f, "OFFLINE"),
            ServiceState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub key: ServiceKey,
    pub state: ServiceState,
    pub latency_ms: Option<u64>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ServiceStatus {
    pub fn unknown(key: ServiceKey) -> Self {
        Self {
            key,
            state: ServiceState::Unknown,
            latency_ms: None,
            http_status: None,
            error: None,
            last_checked_at: None,
        }
    }
}

/// Map one settled probe onto the board's three terminal states.
pub fn classify(
    key: ServiceKey,
    outcome: std::result::Result<RawResponse, TransportError>,
    latency: Duration,
) -> ServiceStatus {
    let latency_ms = Some(latency.as_millis() as u64);
    let mut status = ServiceStatus {
        last_checked_at: Some(Utc::now()),
        ..ServiceStatus::unknown(key)
    };

    match outcome {
        Ok(response) if response.is_success() => {
            status.state = ServiceState::Online;
            status.latency_ms = latency_ms;
            status.http_status = Some(response.status);
        }
        Ok(response) => {
            status.state = ServiceState::Degraded;
            status.latency_ms = latency_ms;
            status.http_status = Some(response.status);
            status.error = Some(format!("HTTP {}", response.status));
        }
        Err(TransportError::Http { status: code, .. }) => {
            status.state = ServiceState::Degraded;
            status.latency_ms = latency_ms;
            status.http_status = Some(code);
            status.error = Some(format!("HTTP {}", code));
        }
        // a body we could not read still came with a 2xx
        Err(TransportError::Parse(_)) => {
            status.state = ServiceState::Online;
            status.latency_ms = latency_ms;
        }
        Err(err @ (TransportError::Timeout(_) | TransportError::Network(_))) => {
            status.state = ServiceState::Offline;
            status.error = Some(err.to_string());
        }
    }

    status
}

/// Run one GET against the client's probe endpoint. Never fails.
#[instrument(skip(client), fields(service = %client.key()))]
pub async fn probe(client: &ServiceClient) -> ServiceStatus {
    let endpoint = client.descriptor().probe_endpoint.clone();
    let started = Instant::now();
    let outcome = client.send(Method::GET, &endpoint, None).await;
    let status = classify(client.key(), outcome, started.elapsed());

    match status.state {
        ServiceState::Online => debug!(
            "{} online in {}ms",
            status.key,
            status.latency_ms.unwrap_or_default()
        ),
        _ => warn!(
            "{} {}: {}",
            status.key,
            status.state,
            status.error.as_deref().unwrap_or("no detail")
        ),
    }

    status
}

/// Probes every configured service and publishes the results to a `StatusStore`.
#[derive(Debug)]
pub struct HealthMonitor {
    clients: BTreeMap<ServiceKey, ServiceClient>,
    store: StatusStore,
    generation: AtomicU64,
}

impl HealthMonitor {
    pub fn new(clients: impl IntoIterator<Item = ServiceClient>, store: StatusStore) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.key(), c)).collect(),
            store,
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ServiceDescriptor>,
        credentials: Option<&Credentials>,
    ) -> Result<Self> {
        let clients = descriptors
            .into_iter()
            .map(|d| ServiceClient::new(d, credentials))
            .collect::<Result<Vec<_>>>()?;
        let store = StatusStore::new(clients.iter().map(ServiceClient::key));
        Ok(Self::new(clients, store))
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn keys(&self) -> impl Iterator<Item = ServiceKey> + '_ {
        self.clients.keys().copied()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Probe every service concurrently. Returns once all probes have settled;
    /// the whole sweep is bounded by the slowest probe, not their sum.
    pub async fn probe_all(&self) -> BTreeMap<ServiceKey, ServiceStatus> {
        let generation = self.next_generation();
        let sweep_id = Uuid::new_v4();
        let started = Instant::now();

        debug!("Starting probe sweep {} (generation {})", sweep_id, generation);

        let results = join_all(self.clients.values().map(|client| async move {
            let status = probe(client).await;
            self.store.record(generation, status.clone()).await;
            status
        }))
        .await;

        let statuses: BTreeMap<ServiceKey, ServiceStatus> =
            results.into_iter().map(|s| (s.key, s)).collect();

        let online = statuses
            .values()
            .filter(|s| s.state == ServiceState::Online)
            .count();
        info!(
            "Probe sweep {} finished in {}ms: {}/{} online",
            sweep_id,
            started.elapsed().as_millis(),
            online,
            statuses.len()
        );

        statuses
    }

    /// Probe a single service, touching only its own entry.
    pub async fn probe_one(&self, key: ServiceKey) -> Result<ServiceStatus> {
        let client = self
            .clients
            .get(&key)
            .ok_or_else(|| ConsoleError::UnknownService(key.to_string()))?;

        let generation = self.next_generation();
        let status = probe(client).await;
        self.store.record(generation, status.clone()).await;
        Ok(status)
    }
}

#[async_trait]
impl RefreshTarget for HealthMonitor {
    fn name(&self) -> &str {
        "health"
    }

    async fn refresh(&self) {
        self.probe_all().await;
        let summary = self.store.summary().await;
        info!(
            "Status board: {} online, {} degraded, {} offline, {} unknown",
            summary.online, summary.degraded, summary.offline, summary.unknown
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(server: &MockServer, key: ServiceKey, budget: Duration) -> ServiceDescriptor {
        ServiceDescriptor::new(key, server.uri(), budget)
            .with_probe_endpoint(format!("/probe/{}", key))
    }

    async fn mount(server: &MockServer, key: ServiceKey, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/probe/{}", key)))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[test]
    fn test_classify_policy() {
        let ok = classify(
            ServiceKey::Auth,
            Ok(RawResponse { status: 200, body: String::new() }),
            Duration::from_millis(12),
        );
        assert_eq!(ok.state, ServiceState::Online);
        assert_eq!(ok.latency_ms, Some(12));
        assert_eq!(ok.http_status, Some(200));
        assert!(ok.error.is_none());

        let degraded = classify(
            ServiceKey::Auth,
            Ok(RawResponse { status: 500, body: "boom".to_string() }),
            Duration::from_millis(30),
        );
        assert_eq!(degraded.state, ServiceState::Degraded);
        assert_eq!(degraded.latency_ms, Some(30));
        assert_eq!(degraded.http_status, Some(500));

        let offline = classify(
            ServiceKey::Auth,
            Err(TransportError::Timeout(Duration::from_millis(100))),
            Duration::from_millis(100),
        );
        assert_eq!(offline.state, ServiceState::Offline);
        assert!(offline.latency_ms.is_none());
        assert!(offline.error.unwrap().contains("timed out"));

        let refused = classify(
            ServiceKey::Auth,
            Err(TransportError::Network("connection refused".to_string())),
            Duration::from_millis(1),
        );
        assert_eq!(refused.state, ServiceState::Offline);
        assert!(refused.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_probe_all_mixed_fleet() {
        let server = MockServer::start().await;
        let budget = Duration::from_millis(200);

        let online = [ServiceKey::Auth, ServiceKey::Students, ServiceKey::Lecturers];
        let failing = [ServiceKey::Courses, ServiceKey::Assignments];
        let hanging = [
            ServiceKey::Submissions,
            ServiceKey::Announcements,
            ServiceKey::Quizzes,
            ServiceKey::Materials,
        ];

        for key in online {
            mount(&server, key, ResponseTemplate::new(200).set_body_json(json!({"status": "UP"}))).await;
        }
        for key in failing {
            mount(&server, key, ResponseTemplate::new(500)).await;
        }
        for key in hanging {
            mount(&server, key, ResponseTemplate::new(200).set_delay(Duration::from_secs(2))).await;
        }

        let descriptors: Vec<_> = ServiceKey::ALL
            .iter()
            .map(|key| descriptor(&server, *key, budget))
            .collect();
        let monitor = HealthMonitor::from_descriptors(descriptors, None).unwrap();

        let started = Instant::now();
        let statuses = monitor.probe_all().await;
        let elapsed = started.elapsed();

        assert_eq!(statuses.len(), 9);
        for key in online {
            assert_eq!(statuses[&key].state, ServiceState::Online);
        }
        for key in failing {
            assert_eq!(statuses[&key].state, ServiceState::Degraded);
            assert_eq!(statuses[&key].http_status, Some(500));
        }
        for key in hanging {
            assert_eq!(statuses[&key].state, ServiceState::Offline);
            assert!(statuses[&key].error.is_some());
        }

        // four sequential timeouts would take at least 800ms
        assert!(elapsed < Duration::from_millis(700), "sweep took {:?}", elapsed);

        let summary = monitor.store().summary().await;
        assert_eq!((summary.online, summary.degraded, summary.offline), (3, 2, 4));
    }

    #[tokio::test]
    async fn test_probe_one_only_touches_its_entry() {
        let server = MockServer::start().await;
        mount(&server, ServiceKey::Courses, ResponseTemplate::new(204)).await;

        let descriptors = vec![
            descriptor(&server, ServiceKey::Courses, Duration::from_secs(1)),
            descriptor(&server, ServiceKey::Quizzes, Duration::from_secs(1)),
        ];
        let monitor = HealthMonitor::from_descriptors(descriptors, None).unwrap();

        let status = monitor.probe_one(ServiceKey::Courses).await.unwrap();
        assert_eq!(status.state, ServiceState::Online);

        let board = monitor.store().snapshot().await;
        assert_eq!(board[&ServiceKey::Courses].state, ServiceState::Online);
        assert_eq!(board[&ServiceKey::Quizzes].state, ServiceState::Unknown);
    }

    #[tokio::test]
    async fn test_probe_one_unknown_service() {
        let monitor = HealthMonitor::new(Vec::new(), StatusStore::new([]));
        let err = monitor.probe_one(ServiceKey::Auth).await.unwrap_err();
        assert!(matches!(err, ConsoleError::UnknownService(_)));
    }
}
