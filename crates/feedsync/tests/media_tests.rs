//! Integration tests for inspection item media download

mod common;

use std::path::Path;
use std::sync::Arc;

use feedsync::feed::registry::INSPECTION_ITEMS;
use feedsync::feed::{Feed, FeedOptions};
use feedsync::status::ExportStatus;
use feedsync::SyncError;
use serde_json::{json, Value as Json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];

fn item(id: &str, audit_id: &str, media: &[String]) -> Json {
    json!({
        "id": id,
        "item_id": format!("{}_item", id),
        "audit_id": audit_id,
        "organisation_id": common::ORG_ID,
        "modified_at": "2024-01-05T10:00:00Z",
        "media_hypertext_reference": media.join("\n"),
    })
}

fn media_feed(media_path: &Path, export_media: bool) -> Feed {
    Feed::new(
        &INSPECTION_ITEMS,
        Arc::new(FeedOptions {
            export_media,
            media_path: media_path.to_path_buf(),
            ..FeedOptions::default()
        }),
    )
}

async fn mount_items(server: &MockServer, items: Vec<Json>) {
    Mock::given(method("GET"))
        .and(path("/feed/inspection_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(items, None, 0)))
        .mount(server)
        .await;
}

async fn mount_media(server: &MockServer, media_path: &str, response: ResponseTemplate, hits: u64) {
    Mock::given(method("GET"))
        .and(path(media_path))
        .respond_with(response)
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_media_is_written_per_inspection() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;
    let base = server.uri();

    mount_items(
        &server,
        vec![
            item(
                "item_1",
                "audit_1",
                &[
                    format!("{}/audits/audit_1/media/m1", base),
                    format!("{}/audits/audit_1/media/m2", base),
                ],
            ),
            item("item_2", "audit_2", &[format!("{}/audits/audit_2/media/m3", base)]),
            item("item_3", "audit_2", &[]),
        ],
    )
    .await;
    mount_media(
        &server,
        "/audits/audit_1/media/m1",
        ResponseTemplate::new(200).set_body_raw(JPEG, "image/jpeg"),
        1,
    )
    .await;
    mount_media(&server, "/audits/audit_1/media/m2", ResponseTemplate::new(403), 1).await;
    mount_media(&server, "/audits/audit_2/media/m3", ResponseTemplate::new(204), 1).await;

    let media_dir = dir.path().join("media");
    let client = common::api_client(&server);
    let stats = media_feed(&media_dir, true)
        .export(&client, &exporter, common::ORG_ID, &ExportStatus::new())
        .await
        .unwrap();

    assert_eq!(stats.rows, 3);
    assert_eq!(stats.media, 1);
    assert_eq!(
        std::fs::read(media_dir.join("audit_1").join("m1.jpeg")).unwrap(),
        JPEG
    );
    assert!(!media_dir.join("audit_1").join("m2.jpeg").exists());
    assert!(!media_dir.join("audit_2").exists());
}

#[tokio::test]
async fn test_media_without_content_type_fails_feed() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    mount_items(
        &server,
        vec![item(
            "item_1",
            "audit_1",
            &[format!("{}/audits/audit_1/media/m1", server.uri())],
        )],
    )
    .await;
    mount_media(
        &server,
        "/audits/audit_1/media/m1",
        ResponseTemplate::new(200).set_body_bytes(JPEG),
        1,
    )
    .await;

    let client = common::api_client(&server);
    let err = media_feed(&dir.path().join("media"), true)
        .export(&client, &exporter, common::ORG_ID, &ExportStatus::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DataIntegrity(_)));
    assert!(err.to_string().contains("content type"));
}

#[tokio::test]
async fn test_media_is_not_fetched_unless_enabled() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    mount_items(
        &server,
        vec![item(
            "item_1",
            "audit_1",
            &[format!("{}/audits/audit_1/media/m1", server.uri())],
        )],
    )
    .await;
    mount_media(
        &server,
        "/audits/audit_1/media/m1",
        ResponseTemplate::new(200).set_body_raw(JPEG, "image/jpeg"),
        0,
    )
    .await;

    let media_dir = dir.path().join("media");
    let client = common::api_client(&server);
    let stats = media_feed(&media_dir, false)
        .export(&client, &exporter, common::ORG_ID, &ExportStatus::new())
        .await
        .unwrap();

    assert_eq!(stats.rows, 1);
    assert_eq!(stats.media, 0);
    assert!(!media_dir.exists());
}

#[tokio::test]
async fn test_skipped_inspections_download_no_media() {
    let dir = TempDir::new().unwrap();
    let exporter = common::sqlite_exporter(dir.path()).await;
    let server = MockServer::start().await;

    mount_items(
        &server,
        vec![item(
            "item_1",
            "audit_skip",
            &[format!("{}/audits/audit_skip/media/m1", server.uri())],
        )],
    )
    .await;
    mount_media(
        &server,
        "/audits/audit_skip/media/m1",
        ResponseTemplate::new(200).set_body_raw(JPEG, "image/jpeg"),
        0,
    )
    .await;

    let feed = Feed::new(
        &INSPECTION_ITEMS,
        Arc::new(FeedOptions {
            export_media: true,
            media_path: dir.path().join("media"),
            skip_ids: vec!["audit_skip".to_string()],
            ..FeedOptions::default()
        }),
    );
    let client = common::api_client(&server);
    let stats = feed
        .export(&client, &exporter, common::ORG_ID, &ExportStatus::new())
        .await
        .unwrap();

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.media, 0);
}
