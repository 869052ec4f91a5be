//! Admin console facade wiring transport, probes, dashboard and settings together

use crate::aggregate::AggregateResult;
use crate::config::{Config, ServiceKey};
use crate::dashboard::Dashboard;
use crate::dataset::{DatasetSnapshot, SnapshotFetcher};
use crate::errors::{ConsoleError, Result};
use crate::health::{HealthMonitor, ServiceStatus};
use crate::list::ListView;
use crate::models::{EntityKind, GradingSummary};
use crate::scheduler::{RefreshScheduler, RefreshTarget};
use crate::settings::{FileStore, KeyValueStore, SettingsStore};
use crate::status::StatusSummary;
use crate::transport::{Credentials, ServiceClient};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Everything the status board shows in one read.
#[derive(Debug, Clone, Serialize)]
pub struct StatusBoard {
    pub summary: StatusSummary,
    pub services: Vec<ServiceStatus>,
}

/// Owns one client per service for data calls, a separate probe client per
/// service, the status store, the dashboard and the settings store.
pub struct AdminConsole {
    config: Config,
    fetcher: SnapshotFetcher,
    dashboard: Dashboard,
    health: HealthMonitor,
    settings: SettingsStore,
}

impl AdminConsole {
    /// Create a console over `backend` for persisted settings. Settings are
    /// loaded here, before any refresh can be scheduled.
    pub fn new(config: Config, backend: impl KeyValueStore + 'static) -> Result<Self> {
        config.validate().map_err(ConsoleError::Config)?;

        let credentials = credentials_from(&config);

        let clients = config
            .services
            .iter()
            .cloned()
            .map(|descriptor| ServiceClient::new(descriptor, credentials.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let health = HealthMonitor::from_descriptors(config.probe_descriptors(), credentials.as_ref())?;
        let settings = SettingsStore::load(backend)?;

        info!(
            "Admin console ready: {} services, credentials {}",
            clients.len(),
            match &credentials {
                Some(c) => format!("{:?}", c),
                None => "none".to_string(),
            }
        );

        Ok(Self {
            fetcher: SnapshotFetcher::new(clients.iter().cloned()),
            dashboard: Dashboard::new(clients),
            health,
            settings,
            config,
        })
    }

    /// Create a console persisting settings to `config.settings_path`.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = FileStore::new(&config.settings_path);
        Self::new(config, backend)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &SnapshotFetcher {
        &self.fetcher
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub async fn fetch_snapshot(&self, kind: EntityKind) -> Result<DatasetSnapshot<Value>> {
        self.fetcher.fetch_snapshot(kind).await
    }

    /// An unloaded list view using the configured page size and debounce.
    pub fn list_view(&self, kind: EntityKind) -> ListView {
        ListView::new(
            kind,
            self.config.default_page_size,
            self.config.search_debounce,
        )
    }

    /// A list view with its snapshot already requested. A failed fetch is
    /// reported through the view's load state.
    pub async fn open_list(&self, kind: EntityKind) -> ListView {
        let mut view = self.list_view(kind);
        view.load(&self.fetcher).await;
        view
    }

    pub async fn aggregate_dashboard(&self) -> AggregateResult<u64> {
        self.dashboard.aggregate().await
    }

    pub async fn probe_all(&self) -> Vec<ServiceStatus> {
        self.health.probe_all().await.into_values().collect()
    }

    pub async fn probe_one(&self, key: ServiceKey) -> Result<ServiceStatus> {
        self.health.probe_one(key).await
    }

    pub async fn status_board(&self) -> StatusBoard {
        let store = self.health.store();
        StatusBoard {
            summary: store.summary().await,
            services: store.snapshot().await.into_values().collect(),
        }
    }

    #[instrument(skip(self))]
    pub async fn grading_summary(&self) -> Result<GradingSummary> {
        let snapshot = self.fetch_snapshot(EntityKind::Submissions).await?;
        Ok(GradingSummary::from_submissions(snapshot.records()))
    }

    /// Start the periodic sweep (probes and dashboard) under the current
    /// settings. Dropping the returned scheduler stops it.
    pub fn start_auto_refresh(self: &Arc<Self>) -> RefreshScheduler {
        let target: Arc<dyn RefreshTarget> = self.clone();
        RefreshScheduler::spawn(target, self.settings.subscribe())
    }
}

fn credentials_from(config: &Config) -> Option<Credentials> {
    config
        .auth_token
        .clone()
        .map(Credentials::Bearer)
        .or_else(|| config.session_cookie.clone().map(Credentials::SessionCookie))
}

impl std::fmt::Debug for AdminConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConsole")
            .field("services", &self.config.services.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl RefreshTarget for AdminConsole {
    fn name(&self) -> &str {
        "console"
    }

    async fn refresh(&self) {
        futures::join!(self.health.refresh(), self.dashboard.refresh());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            default_page_size: 0,
            ..Config::default()
        };

        let err = AdminConsole::new(config, MemoryStore::new()).unwrap_err();
        assert!(matches!(err, ConsoleError::Config(_)));
    }

    #[test]
    fn test_bearer_token_wins_over_cookie() {
        let config = Config {
            auth_token: Some("abc".to_string()),
            session_cookie: Some("SESSION=1".to_string()),
            ..Config::default()
        };
        assert_eq!(
            credentials_from(&config),
            Some(Credentials::Bearer("abc".to_string()))
        );

        let config = Config {
            session_cookie: Some("SESSION=1".to_string()),
            ..Config::default()
        };
        assert_eq!(
            credentials_from(&config),
            Some(Credentials::SessionCookie("SESSION=1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_board_starts_unknown() {
        let console = AdminConsole::new(Config::default(), MemoryStore::new()).unwrap();
        let board = console.status_board().await;

        assert_eq!(board.services.len(), 9);
        assert_eq!(board.summary.unknown, 9);
        assert!(board.services.iter().all(|s| s.last_checked_at.is_none()));
    }
}
