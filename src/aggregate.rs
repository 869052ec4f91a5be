//! Fan-out of independent requests into one best-effort composite

use crate::config::ServiceKey;
use crate::errors::TransportError;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, join_all};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Where a field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Service(ServiceKey),
    Fallback,
}

impl Serialize for FieldSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSource::Service(key) => serializer.serialize_str(key.as_str()),
            FieldSource::Fallback => serializer.serialize_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateField<T> {
    pub value: T,
    /// False when `value` was substituted because its source failed
    pub is_real: bool,
    pub source: FieldSource,
}

impl<T> AggregateField<T> {
    pub fn real(value: T, source: ServiceKey) -> Self {
        Self {
            value,
            is_real: true,
            source: FieldSource::Service(source),
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            is_real: false,
            source: FieldSource::Fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedField<T> {
    pub name: String,
    #[serde(flatten)]
    pub field: AggregateField<T>,
}

/// Ordered named fields. `partial` is derived from the fields on construction
/// and is true exactly when at least one of them is not real.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult<T> {
    fields: Vec<NamedField<T>>,
    partial: bool,
    fetched_at: DateTime<Utc>,
}

impl<T> AggregateResult<T> {
    pub fn from_fields(fields: Vec<NamedField<T>>) -> Self {
        let partial = fields.iter().any(|f| !f.field.is_real);
        Self {
            fields,
            partial,
            fetched_at: Utc::now(),
        }
    }

    pub fn fields(&self) -> &[NamedField<T>] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&AggregateField<T>> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.field)
    }

    pub fn partial(&self) -> bool {
        self.partial
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn real_count(&self) -> usize {
        self.fields.iter().filter(|f| f.field.is_real).count()
    }
}

/// What a field shows when its request fails.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackPolicy<T> {
    Fixed(T),
    /// The last real value seen for this field name, else the given default
    LastKnownOr(T),
}

pub struct AggregateRequest<'a, T> {
    name: String,
    source: ServiceKey,
    fetch: BoxFuture<'a, Result<T, TransportError>>,
    fallback: FallbackPolicy<T>,
}

impl<'a, T> AggregateRequest<'a, T> {
    pub fn new<F>(
        name: impl Into<String>,
        source: ServiceKey,
        fetch: F,
        fallback: FallbackPolicy<T>,
    ) -> Self
    where
        F: Future<Output = Result<T, TransportError>> + Send + 'a,
    {
        Self {
            name: name.into(),
            source,
            fetch: fetch.boxed(),
            fallback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs every request of a batch concurrently and waits for all of them to
/// settle. A failed request becomes a non-real fallback field; it never
/// aborts or delays the rest of the batch.
#[derive(Debug)]
pub struct AggregationCoordinator<T> {
    last_known: Mutex<HashMap<String, T>>,
}

impl<T> Default for AggregationCoordinator<T> {
    fn default() -> Self {
        Self {
            last_known: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send> AggregationCoordinator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn aggregate(&self, requests: Vec<AggregateRequest<'_, T>>) -> AggregateResult<T> {
        let settled = join_all(requests.into_iter().map(|request| async move {
            let AggregateRequest {
                name,
                source,
                fetch,
                fallback,
            } = request;
            let outcome = fetch.await;
            (name, source, fallback, outcome)
        }))
        .await;

        let mut last_known = self.last_known.lock().await;
        let fields = settled
            .into_iter()
            .map(|(name, source, fallback, outcome)| {
                let field = match outcome {
                    Ok(value) => {
                        last_known.insert(name.clone(), value.clone());
                        AggregateField::real(value, source)
                    }
                    Err(err) => {
                        warn!("{} from {} unavailable, using fallback: {}", name, source, err);
                        let value = match fallback {
                            FallbackPolicy::Fixed(value) => value,
                            FallbackPolicy::LastKnownOr(default) => {
                                last_known.get(&name).cloned().unwrap_or(default)
                            }
                        };
                        AggregateField::fallback(value)
                    }
                };
                NamedField { name, field }
            })
            .collect();

        let result = AggregateResult::from_fields(fields);
        debug!(
            "Aggregated {} fields ({} real, partial: {})",
            result.len(),
            result.real_count(),
            result.partial()
        );
        result
    }
}
