use campus_console::{
    AdminConsole, Config, ConsoleError, EntityKind, LoadState, MemoryStore, ServiceDescriptor,
    ServiceKey, ServiceState, Settings,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UNREACHABLE: &str = "http://127.0.0.1:1";

/// Every service behind one mock server, each under its own path prefix.
fn config_for(server: &MockServer, offline: &[ServiceKey]) -> Config {
    let timeout = Duration::from_secs(2);
    let services = ServiceKey::ALL
        .iter()
        .map(|key| {
            let host = if offline.contains(key) {
                UNREACHABLE.to_string()
            } else {
                server.uri()
            };
            ServiceDescriptor::new(*key, format!("{}/{}", host, key), timeout)
        })
        .collect();

    Config {
        services,
        request_timeout: timeout,
        probe_timeout: timeout,
        ..Config::default()
    }
}

fn roster() -> Vec<Value> {
    (0..23)
        .map(|i| match i {
            4 => json!({"studentId": "STU-004", "firstName": "Ana", "lastName": "Lima", "email": "alima@campus.edu"}),
            17 => json!({"studentId": "STU-017", "firstName": "Joao", "lastName": "Silva", "email": "SANA@campus.edu"}),
            _ => json!({
                "studentId": format!("STU-{:03}", i),
                "firstName": format!("Student{}", i),
                "lastName": "Learner",
                "email": format!("s{}@campus.edu", i),
            }),
        })
        .collect()
}

async fn mount_get(server: &MockServer, route: String, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn student_list_pages_and_searches_without_refetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/students/api/students"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(roster())))
        .expect(1)
        .mount(&server)
        .await;

    let console = AdminConsole::new(config_for(&server, &[]), MemoryStore::new()).unwrap();
    let mut view = console.open_list(EntityKind::Students).await;
    assert_eq!(view.state(), &LoadState::Ready);

    let engine = view.engine_mut();
    assert_eq!(engine.total_filtered_count(), 23);
    assert_eq!(engine.total_pages(), 3);

    engine.set_page(2);
    assert_eq!(engine.visible_page().len(), 3);

    let typed_at = Instant::now();
    engine.set_raw_term("a", typed_at);
    engine.set_raw_term("an", typed_at + Duration::from_millis(100));
    engine.set_raw_term("ana", typed_at + Duration::from_millis(200));

    assert!(!engine.tick(typed_at + Duration::from_millis(600)));
    assert_eq!(engine.total_filtered_count(), 23);

    assert!(engine.tick(typed_at + Duration::from_millis(700)));
    assert_eq!(engine.total_filtered_count(), 2);
    assert_eq!(engine.page(), 0);
    assert_eq!(engine.total_pages(), 1);

    let names: Vec<_> = engine
        .visible_page()
        .iter()
        .filter_map(|s| s["firstName"].as_str())
        .collect();
    assert_eq!(names, vec!["Ana", "Joao"]);
}

#[tokio::test]
async fn dashboard_renders_with_only_students_live() {
    let server = MockServer::start().await;
    let students: Vec<_> = (0..42).map(|i| json!({"id": i})).collect();
    mount_get(
        &server,
        "/students/api/students".to_string(),
        ResponseTemplate::new(200).set_body_json(json!(students)),
    )
    .await;
    for key in ServiceKey::ALL.iter().filter(|k| **k != ServiceKey::Students) {
        Mock::given(method("GET"))
            .and(path(format!("/{}/api/{}", key, key)))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
    }

    let console = AdminConsole::new(config_for(&server, &[]), MemoryStore::new()).unwrap();
    let result = console.aggregate_dashboard().await;

    assert!(result.partial());
    assert_eq!(result.len(), 8);
    let students = result.get("totalStudents").unwrap();
    assert_eq!(students.value, 42);
    assert!(students.is_real);
    assert_eq!(result.real_count(), 1);

    let rendered = serde_json::to_value(&result).unwrap();
    assert_eq!(rendered["partial"], json!(true));
}

#[tokio::test]
async fn status_board_reports_each_service_independently() {
    let server = MockServer::start().await;
    for key in [
        ServiceKey::Auth,
        ServiceKey::Students,
        ServiceKey::Lecturers,
        ServiceKey::Courses,
    ] {
        mount_get(
            &server,
            format!("/{}{}", key, key.default_probe_endpoint()),
            ResponseTemplate::new(200).set_body_json(json!({"status": "UP"})),
        )
        .await;
    }
    mount_get(
        &server,
        "/assignments/api/assignments".to_string(),
        ResponseTemplate::new(500),
    )
    .await;

    let offline = [
        ServiceKey::Announcements,
        ServiceKey::Quizzes,
        ServiceKey::Materials,
    ];
    let console = AdminConsole::new(config_for(&server, &offline), MemoryStore::new()).unwrap();

    let statuses = console.probe_all().await;
    assert_eq!(statuses.len(), 9);

    let board = console.status_board().await;
    assert_eq!(board.summary.online, 4);
    // submissions has no mock, so it answers 404
    assert_eq!(board.summary.degraded, 2);
    assert_eq!(board.summary.offline, 3);
    assert_eq!(board.summary.unknown, 0);

    for status in &board.services {
        if offline.contains(&status.key) {
            assert_eq!(status.state, ServiceState::Offline);
            assert!(status.error.is_some());
        }
    }
}

#[tokio::test]
async fn single_probe_leaves_other_rows_alone() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/students/api/students".to_string(),
        ResponseTemplate::new(200).set_body_json(json!([])),
    )
    .await;

    let console = AdminConsole::new(config_for(&server, &[]), MemoryStore::new()).unwrap();
    console.probe_all().await;
    let before = console.status_board().await;

    let status = assert_ok!(console.probe_one(ServiceKey::Students).await);
    assert_eq!(status.state, ServiceState::Online);

    let after = console.status_board().await;
    for (old, new) in before.services.iter().zip(after.services.iter()) {
        if old.key == ServiceKey::Students {
            assert!(new.last_checked_at >= old.last_checked_at);
        } else {
            assert_eq!(old, new);
        }
    }
}

#[tokio::test]
async fn failed_list_is_retryable_and_distinct_from_no_matches() {
    let server = MockServer::start().await;
    let console =
        AdminConsole::new(config_for(&server, &[ServiceKey::Courses]), MemoryStore::new()).unwrap();

    let view = console.open_list(EntityKind::Courses).await;
    match view.state() {
        LoadState::Failed { retryable, .. } => assert!(*retryable),
        other => panic!("expected a failed load, got {:?}", other),
    }
    assert!(!view.is_empty_result());

    let err = assert_err!(console.fetch_snapshot(EntityKind::Courses).await);
    assert!(matches!(err, ConsoleError::FetchFailed { .. }));
}

#[tokio::test]
async fn grading_summary_counts_zero_marks_as_graded() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/submissions/api/submissions".to_string(),
        ResponseTemplate::new(200).set_body_json(json!([
            {"studentId": "STU-001", "marks": 0},
            {"studentId": "STU-002", "marks": 87.5},
            {"studentId": "STU-003", "marks": null},
            {"studentId": "STU-004"},
        ])),
    )
    .await;

    let console = AdminConsole::new(config_for(&server, &[]), MemoryStore::new()).unwrap();
    let summary = console.grading_summary().await.unwrap();

    assert_eq!(summary.graded, 2);
    assert_eq!(summary.ungraded, 2);
}

#[tokio::test]
async fn settings_persist_across_console_restarts() {
    let dir = tempdir().unwrap();
    let config = Config {
        settings_path: dir.path().join("console-settings.json"),
        ..Config::default()
    };

    {
        let console = AdminConsole::from_config(config.clone()).unwrap();
        console.settings().set_auto_refresh(false).unwrap();
        console
            .settings()
            .set_refresh_interval(Duration::from_secs(90))
            .unwrap();
    }

    let console = AdminConsole::from_config(config).unwrap();
    let settings = console.settings().current();
    assert!(!settings.auto_refresh);
    assert_eq!(settings.refresh_interval_ms, 90_000);
}

#[tokio::test]
async fn corrupt_settings_file_does_not_block_startup() {
    let dir = tempdir().unwrap();
    let settings_path = dir.path().join("console-settings.json");
    std::fs::write(&settings_path, "this is not json").unwrap();

    let config = Config {
        settings_path,
        ..Config::default()
    };
    let console = assert_ok!(AdminConsole::from_config(config));
    assert_eq!(console.settings().current(), Settings::default());
}

#[tokio::test]
async fn manual_refresh_sweeps_probes_and_dashboard() {
    let server = MockServer::start().await;
    let console = Arc::new(
        AdminConsole::new(config_for(&server, &[]), MemoryStore::new()).unwrap(),
    );
    console.settings().set_auto_refresh(false).unwrap();

    let scheduler = console.start_auto_refresh();
    scheduler.trigger();

    for _ in 0..100 {
        if scheduler.fire_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(scheduler.fire_count(), 1);

    assert!(console.dashboard().latest().await.is_some());
    assert_eq!(console.status_board().await.summary.unknown, 0);

    scheduler.shutdown().await;
}
