//! Integration tests for feed export into SQLite
//!
//! Each test drives [`Feed::export`] against a mocked API and inspects the
//! resulting table.

mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use feedsync::exporter::{Exporter, Value};
use feedsync::feed::registry::{ACTIONS, ACTION_ASSIGNEES, GROUP_USERS, INSPECTIONS, USERS};
use feedsync::feed::{Feed, FeedDescriptor, FeedOptions};
use feedsync::status::ExportStatus;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn feed(descriptor: &'static FeedDescriptor, options: FeedOptions) -> Feed {
    Feed::new(descriptor, Arc::new(options))
}

fn text(value: &Value) -> &str {
    match value {
        Value::Text(s) => s,
        other => panic!("expected text, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_keys_keep_last_row() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![
                common::user("user_1", "old@example.com"),
                common::user("user_2", "two@example.com"),
                common::user("user_1", "new@example.com"),
            ],
            None,
            0,
        )))
        .mount(&server)
        .await;

    let client = common::api_client(&server);
    let status = ExportStatus::new();
    status.start_feed(USERS.name);
    let stats = feed(&USERS, FeedOptions::default())
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();

    assert_eq!(stats.pages, 1);
    assert_eq!(stats.rows, 2);
    assert_eq!(exporter.count_rows(&USERS).await.unwrap(), 2);

    let row = exporter
        .find_row(&USERS, &[Value::from("user_1")])
        .await
        .unwrap()
        .unwrap();
    let email = USERS.column_index("email").unwrap();
    assert_eq!(text(&row[email]), "new@example.com");

    let active = USERS.column_index("active").unwrap();
    assert_eq!(row[active], Value::Boolean(true));
}

#[tokio::test]
async fn test_cursor_prefers_scope_then_unscoped_rows() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    exporter.init_feed(&ACTIONS, false).await.unwrap();

    let epoch = DateTime::UNIX_EPOCH;
    assert_eq!(
        exporter.last_modified_at(&ACTIONS, epoch, "role_a").await.unwrap(),
        epoch
    );

    let now = Utc::now();
    let unscoped = ACTIONS
        .row_from_json(
            &json!({"id": "action_1", "modified_at": "2024-02-01T00:00:00Z"}),
            &now,
        )
        .unwrap();
    exporter.write_rows(&ACTIONS, &[unscoped]).await.unwrap();

    let feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    assert_eq!(
        exporter.last_modified_at(&ACTIONS, epoch, "role_a").await.unwrap(),
        feb
    );

    let scoped = ACTIONS
        .row_from_json(
            &json!({
                "id": "action_2",
                "organisation_id": "role_a",
                "modified_at": "2024-01-15T12:30:00Z",
            }),
            &now,
        )
        .unwrap();
    exporter.write_rows(&ACTIONS, &[scoped]).await.unwrap();

    let jan = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap();
    assert_eq!(
        exporter.last_modified_at(&ACTIONS, epoch, "role_a").await.unwrap(),
        jan
    );
    assert_eq!(
        exporter.last_modified_at(&ACTIONS, epoch, "role_b").await.unwrap(),
        feb
    );

    // A later configured floor wins over the stored cursor
    let floor = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    assert_eq!(
        exporter.last_modified_at(&ACTIONS, floor, "role_a").await.unwrap(),
        floor
    );
}

#[tokio::test]
async fn test_second_incremental_run_resumes_from_cursor() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed/inspections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![
                common::inspection("audit_1", "Daily check", "2024-01-04T09:00:00Z"),
                common::inspection("audit_2", "Weekly check", "2024-01-05T10:00:00Z"),
            ],
            None,
            0,
        )))
        .expect(2)
        .mount(&server)
        .await;

    let client = common::api_client(&server);
    let status = ExportStatus::new();
    let inspections = feed(&INSPECTIONS, FeedOptions::default());

    inspections
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();
    let first_count = exporter.count_rows(&INSPECTIONS).await.unwrap();
    inspections
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();

    assert_eq!(first_count, 2);
    assert_eq!(exporter.count_rows(&INSPECTIONS).await.unwrap(), 2);

    let requests = server.received_requests().await.unwrap();
    let modified_after = |i: usize| {
        requests[i]
            .url
            .query_pairs()
            .find(|(key, _)| key == "modified_after")
            .map(|(_, value)| value.into_owned())
    };
    assert_eq!(modified_after(0), None);
    assert_eq!(modified_after(1).as_deref(), Some("2024-01-05T10:00:00.000Z"));
}

#[tokio::test]
async fn test_skip_ids_are_never_written() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed/inspections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![
                common::inspection("audit_1", "Kept", "2024-01-04T09:00:00Z"),
                common::inspection("audit_2", "Skipped", "2024-01-05T10:00:00Z"),
            ],
            None,
            0,
        )))
        .mount(&server)
        .await;

    let options = FeedOptions {
        skip_ids: vec!["audit_2".to_string()],
        ..FeedOptions::default()
    };
    let client = common::api_client(&server);
    let stats = feed(&INSPECTIONS, options)
        .export(&client, &exporter, common::ORG_ID, &ExportStatus::new())
        .await
        .unwrap();

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.rows, 1);
    assert!(exporter
        .find_row(&INSPECTIONS, &[Value::from("audit_2")])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_scope_replace_clears_previous_membership() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    let member = |user: &str, group: &str| {
        json!({"user_id": user, "group_id": group, "organisation_id": common::ORG_ID})
    };
    Mock::given(method("GET"))
        .and(path("/feed/group_users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![member("u1", "g1"), member("u2", "g1"), member("u3", "g2")],
            None,
            0,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed/group_users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![member("u2", "g1")],
            None,
            0,
        )))
        .mount(&server)
        .await;

    let client = common::api_client(&server);
    let group_users = feed(&GROUP_USERS, FeedOptions::default());
    let status = ExportStatus::new();

    group_users
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();
    assert_eq!(exporter.count_rows(&GROUP_USERS).await.unwrap(), 3);

    let stats = group_users
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();
    assert_eq!(stats.deleted, 3);
    assert_eq!(exporter.count_rows(&GROUP_USERS).await.unwrap(), 1);
}

#[tokio::test]
async fn test_parent_replace_only_touches_parents_in_page() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    let assignee = |id: &str, action: &str, who: &str| {
        json!({
            "id": id,
            "action_id": action,
            "assignee_id": who,
            "type": "USER",
            "organisation_id": common::ORG_ID,
            "modified_at": "2024-03-01T00:00:00Z",
        })
    };
    Mock::given(method("GET"))
        .and(path("/feed/action_assignees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![
                assignee("a1", "action_1", "x"),
                assignee("a2", "action_1", "y"),
                assignee("a3", "action_2", "z"),
            ],
            None,
            0,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed/action_assignees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![assignee("a4", "action_1", "w")],
            None,
            0,
        )))
        .mount(&server)
        .await;

    let client = common::api_client(&server);
    let assignees = feed(&ACTION_ASSIGNEES, FeedOptions::default());
    let status = ExportStatus::new();

    assignees
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();
    assignees
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();

    assert_eq!(exporter.count_rows(&ACTION_ASSIGNEES).await.unwrap(), 2);
    for gone in ["a1", "a2"] {
        assert!(exporter
            .find_row(&ACTION_ASSIGNEES, &[Value::from(gone)])
            .await
            .unwrap()
            .is_none());
    }
    for kept in ["a3", "a4"] {
        assert!(exporter
            .find_row(&ACTION_ASSIGNEES, &[Value::from(kept)])
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn test_full_run_truncates_incremental_feed() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed/inspections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![
                common::inspection("audit_1", "One", "2024-01-04T09:00:00Z"),
                common::inspection("audit_2", "Two", "2024-01-05T10:00:00Z"),
            ],
            None,
            0,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed/inspections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(
            vec![common::inspection("audit_3", "Three", "2024-01-06T10:00:00Z")],
            None,
            0,
        )))
        .mount(&server)
        .await;

    let client = common::api_client(&server);
    let status = ExportStatus::new();
    feed(&INSPECTIONS, FeedOptions::default())
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();

    let full = FeedOptions {
        incremental: false,
        ..FeedOptions::default()
    };
    feed(&INSPECTIONS, full)
        .export(&client, &exporter, common::ORG_ID, &status)
        .await
        .unwrap();

    assert_eq!(exporter.count_rows(&INSPECTIONS).await.unwrap(), 1);
    let requests = server.received_requests().await.unwrap();
    assert!(requests[1].url.query_pairs().all(|(key, _)| key != "modified_after"));
}
