//! Point-in-time dataset snapshots and the strategies used to fetch them

use crate::config::ServiceKey;
use crate::errors::{ConsoleError, Result, TransportError};
use crate::models::EntityKind;
use crate::transport::ServiceClient;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Upper bound on pages walked by one paged fetch.
const MAX_PAGES: usize = 1000;

/// Immutable records of one entity type. A refresh replaces the whole
/// snapshot; nothing ever edits one in place.
#[derive(Debug, Clone)]
pub struct DatasetSnapshot<T> {
    records: Arc<[T]>,
    fetched_at: DateTime<Utc>,
}

impl<T> DatasetSnapshot<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records: records.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// One way of pulling a full collection from a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Walk a `{content, totalPages, last}` page sequence
    Paged { path: String, page_size: usize },
    /// Single request returning every record
    Bulk { path: String },
}

impl FetchStrategy {
    /// Students are tried page by page first since that endpoint is the
    /// one the student service optimises; everything else is bulk only.
    pub fn defaults_for(kind: EntityKind) -> Vec<FetchStrategy> {
        let path = kind.collection_path();
        match kind {
            EntityKind::Students => vec![
                FetchStrategy::Paged {
                    path: format!("{}/paginated", path),
                    page_size: 100,
                },
                FetchStrategy::Bulk { path },
            ],
            _ => vec![FetchStrategy::Bulk { path }],
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FetchStrategy::Paged { path, page_size } => format!("paged {} (size {})", path, page_size),
            FetchStrategy::Bulk { path } => format!("bulk {}", path),
        }
    }

    async fn run(&self, client: &ServiceClient) -> std::result::Result<Vec<Value>, TransportError> {
        match self {
            FetchStrategy::Bulk { path } => {
                let body = client.get(path).await?;
                records_of(body).ok_or_else(|| {
                    TransportError::Parse(format!("{} did not return a list of records", path))
                })
            }
            FetchStrategy::Paged { path, page_size } => fetch_pages(client, path, *page_size).await,
        }
    }
}

async fn fetch_pages(
    client: &ServiceClient,
    path: &str,
    page_size: usize,
) -> std::result::Result<Vec<Value>, TransportError> {
    let mut records = Vec::new();

    for page in 0..MAX_PAGES {
        let url = format!("{}?page={}&size={}", path, page, page_size);
        let mut body = client.get(&url).await?;

        let content = match body.get_mut("content").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(TransportError::Parse(format!(
                    "{} did not return a page object",
                    path
                )));
            }
        };

        let fetched = content.len();
        records.extend(content);

        let last = body["last"].as_bool().unwrap_or(false);
        let total_pages = body["totalPages"].as_u64().map(|n| n as usize);
        let exhausted = match total_pages {
            Some(total) => page + 1 >= total,
            None => fetched < page_size,
        };

        if last || exhausted || fetched == 0 {
            return Ok(records);
        }
    }

    warn!("{} still had pages after {} requests, truncating", path, MAX_PAGES);
    Ok(records)
}

/// Records carried by a list response: a bare array, an object wrapping one
/// under `content`, `data` or `items`, or nothing at all (`null`).
pub fn records_of(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Null => Some(Vec::new()),
        Value::Object(mut object) => ["content", "data", "items"]
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        _ => None,
    }
}

/// Fetches whole collections, trying each configured strategy in order.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    clients: BTreeMap<ServiceKey, ServiceClient>,
    strategies: HashMap<EntityKind, Vec<FetchStrategy>>,
}

impl SnapshotFetcher {
    pub fn new(clients: impl IntoIterator<Item = ServiceClient>) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.key(), c)).collect(),
            strategies: EntityKind::ALL
                .iter()
                .map(|kind| (*kind, FetchStrategy::defaults_for(*kind)))
                .collect(),
        }
    }

    pub fn with_strategies(mut self, kind: EntityKind, strategies: Vec<FetchStrategy>) -> Self {
        self.strategies.insert(kind, strategies);
        self
    }

    pub fn strategies(&self, kind: EntityKind) -> &[FetchStrategy] {
        self.strategies.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    #[instrument(skip(self))]
    pub async fn fetch_snapshot(&self, kind: EntityKind) -> Result<DatasetSnapshot<Value>> {
        let client = self
            .clients
            .get(&kind.service())
            .ok_or_else(|| ConsoleError::UnknownService(kind.service().to_string()))?;

        let mut attempts = Vec::new();

        for strategy in self.strategies(kind) {
            match strategy.run(client).await {
                Ok(records) => {
                    info!(
                        "Loaded {} {} via {}",
                        records.len(),
                        kind,
                        strategy.describe()
                    );
                    return Ok(DatasetSnapshot::new(records));
                }
                Err(e) => {
                    warn!("Fetching {} via {} failed: {}", kind, strategy.describe(), e);
                    attempts.push(e);
                }
            }
        }

        debug!("All {} strategies for {} failed", attempts.len(), kind);
        Err(ConsoleError::FetchFailed {
            entity: kind.to_string(),
            attempts,
        })
    }
}
