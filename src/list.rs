//! List views: one fetched collection plus its query engine

use crate::dataset::{DatasetSnapshot, SnapshotFetcher};
use crate::errors::Result;
use crate::models::{EntityKind, extract_fields};
use crate::query::{Pagination, QueryEngine};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Load state of a list view. `Failed` is distinct from a search that
/// matched nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed { message: String, retryable: bool },
}

#[derive(Debug)]
pub struct ListView {
    kind: EntityKind,
    engine: QueryEngine<Value>,
    state: LoadState,
}

impl ListView {
    pub fn new(kind: EntityKind, page_size: usize, debounce: Duration) -> Self {
        let fields = kind.searchable_fields();
        let pagination = if kind.is_paginated() {
            Pagination::Paged { page_size }
        } else {
            Pagination::Unpaged
        };

        Self {
            kind,
            engine: QueryEngine::new(
                Box::new(move |record: &Value| extract_fields(record, fields)),
                pagination,
                debounce,
            ),
            state: LoadState::Idle,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn engine(&self) -> &QueryEngine<Value> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut QueryEngine<Value> {
        &mut self.engine
    }

    /// Enter `Loading` so callers can show it before the fetch settles.
    pub fn begin_load(&mut self) {
        self.state = LoadState::Loading;
    }

    /// Settle a load started with `begin_load`. On failure the previous
    /// snapshot is dropped and the view reports whether a retry could help.
    pub fn complete_load(&mut self, outcome: Result<DatasetSnapshot<Value>>) -> &LoadState {
        self.state = match outcome {
            Ok(snapshot) => {
                self.engine.load_snapshot(snapshot);
                LoadState::Ready
            }
            Err(e) => {
                warn!("List view for {} failed to load: {}", self.kind, e);
                self.engine.clear_snapshot();
                LoadState::Failed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }
            }
        };

        &self.state
    }

    /// Fetch the collection once and hand it to the engine.
    pub async fn load(&mut self, fetcher: &SnapshotFetcher) -> &LoadState {
        self.begin_load();
        let outcome = fetcher.fetch_snapshot(self.kind).await;
        self.complete_load(outcome)
    }

    pub async fn retry(&mut self, fetcher: &SnapshotFetcher) -> &LoadState {
        self.load(fetcher).await
    }

    /// Loaded fine, but the current search matched nothing.
    pub fn is_empty_result(&self) -> bool {
        self.state == LoadState::Ready && self.engine.total_filtered_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceDescriptor, ServiceKey};
    use crate::errors::ConsoleError;
    use crate::transport::ServiceClient;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer, key: ServiceKey) -> SnapshotFetcher {
        let descriptor = ServiceDescriptor::new(key, server.uri(), Duration::from_secs(2));
        SnapshotFetcher::new([ServiceClient::new(descriptor, None).unwrap()])
    }

    #[tokio::test]
    async fn test_lecturer_list_is_unpaged_and_searchable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/lecturers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"firstName": "Grace", "lastName": "Hopper", "department": "Computing"},
                {"firstName": "Ada", "lastName": "Lovelace", "department": "Mathematics"},
                {"firstName": "Alan", "lastName": "Turing", "department": "Computing"},
            ])))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, ServiceKey::Lecturers);
        let mut view = ListView::new(EntityKind::Lecturers, 10, Duration::from_millis(500));
        assert_eq!(view.load(&fetcher).await, &LoadState::Ready);
        assert_eq!(view.engine().visible_page().len(), 3);

        let engine = view.engine_mut();
        engine.set_raw_term("COMPUTING", Instant::now());
        engine.flush_term();
        assert_eq!(view.engine().total_filtered_count(), 2);

        let engine = view.engine_mut();
        engine.set_raw_term("nobody", Instant::now());
        engine.flush_term();
        assert!(view.is_empty_result());
    }

    #[tokio::test]
    async fn test_failed_load_is_not_an_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, ServiceKey::Courses);
        let mut view = ListView::new(EntityKind::Courses, 10, Duration::from_millis(500));

        match view.load(&fetcher).await {
            LoadState::Failed { message, retryable } => {
                assert!(message.contains("courses"));
                assert!(*retryable);
            }
            other => panic!("unexpected state: {:?}", other),
        }
        assert!(!view.is_empty_result());
        assert!(view.engine().visible_page().is_empty());
    }

    #[test]
    fn test_loading_is_visible_until_settled() {
        let mut view = ListView::new(EntityKind::Materials, 10, Duration::from_millis(500));
        assert_eq!(view.state(), &LoadState::Idle);

        view.begin_load();
        assert_eq!(view.state(), &LoadState::Loading);
        assert!(!view.is_empty_result());

        let snapshot = DatasetSnapshot::new(vec![json!({"title": "Syllabus"})]);
        assert_eq!(view.complete_load(Ok(snapshot)), &LoadState::Ready);
        assert_eq!(view.engine().visible_page().len(), 1);

        view.begin_load();
        let failed = view.complete_load(Err(ConsoleError::UnknownService("materials".to_string())));
        assert!(matches!(failed, LoadState::Failed { retryable: false, .. }));
        assert!(view.engine().visible_page().is_empty());
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/quizzes"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/quizzes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"title": "Week 1"}])))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server, ServiceKey::Quizzes);
        let mut view = ListView::new(EntityKind::Quizzes, 10, Duration::from_millis(500));

        assert!(matches!(view.load(&fetcher).await, LoadState::Failed { .. }));
        assert_eq!(view.retry(&fetcher).await, &LoadState::Ready);
        assert_eq!(view.engine().total_filtered_count(), 1);
    }
}
