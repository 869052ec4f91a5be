//! Campus Admin Console Core
//!
//! This library talks to the nine learning-platform backend services, keeps a
//! live status board of their health, aggregates cross-service dashboard
//! counts that degrade gracefully, and searches and pages fetched collections
//! entirely in memory.

pub mod aggregate;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod dataset;
pub mod debounce;
pub mod errors;
pub mod health;
pub mod list;
pub mod models;
pub mod query;
pub mod scheduler;
pub mod settings;
pub mod status;
pub mod transport;

pub use aggregate::{AggregateField, AggregateResult, AggregationCoordinator, FallbackPolicy};
pub use config::{Config, ServiceDescriptor, ServiceKey};
pub use console::{AdminConsole, StatusBoard};
pub use dataset::{DatasetSnapshot, FetchStrategy, SnapshotFetcher};
pub use errors::{ConsoleError, Result, TransportError};
pub use health::{HealthMonitor, ServiceState, ServiceStatus};
pub use list::{ListView, LoadState};
pub use models::{EntityKind, Grade, GradingSummary};
pub use query::{Pagination, QueryEngine, QueryState};
pub use scheduler::{RefreshScheduler, RefreshTarget};
pub use settings::{FileStore, KeyValueStore, MemoryStore, Settings, SettingsStore};
pub use status::{StatusStore, StatusSummary};
pub use transport::{Credentials, ServiceClient};
