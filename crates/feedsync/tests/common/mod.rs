//! Shared helpers for feedsync integration tests
//!
//! HTTP is served by a `wiremock` server; destinations are SQLite files in a
//! temporary directory, so every test is isolated.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::time::Duration;

use feedsync::client::{ApiClient, Credentials, HttpOptions};
use feedsync::exporter::{SqlConfig, SqlExporter};
use feedsync::transport::RetryPolicy;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ORG_ID: &str = "role_123abc";
pub const TOKEN: &str = "test-token";

/// Short waits so retry tests finish quickly
pub fn fast_options() -> HttpOptions {
    HttpOptions {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 4,
            min_wait: Duration::from_millis(10),
            max_wait: Duration::from_millis(200),
        },
        ..HttpOptions::default()
    }
}

pub fn api_client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), Credentials::Bearer(TOKEN.to_string()), &fast_options())
        .expect("Failed to build client")
}

pub async fn sqlite_exporter(dir: &Path) -> SqlExporter {
    SqlExporter::connect(&SqlConfig::sqlite_file(&dir.join("feedsync.db")))
        .await
        .expect("Failed to open SQLite database")
}

/// A feed envelope; `next` is a root-relative cursor
pub fn page(data: Vec<Value>, next: Option<&str>, remaining: i64) -> Value {
    json!({
        "metadata": { "next_page": next, "remaining_records": remaining },
        "data": data,
    })
}

pub async fn mount_whoami(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/accounts/user/v1/user:WhoAmI"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "user_1",
            "organisation_id": ORG_ID,
            "firstname": "Test",
            "lastname": "User",
        })))
        .mount(server)
        .await;
}

pub fn user(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "organisation_id": ORG_ID,
        "email": email,
        "firstname": "First",
        "lastname": "Last",
        "active": true,
        "last_seen_at": "2024-01-10T08:00:00Z",
    })
}

pub fn inspection(id: &str, name: &str, modified_at: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "template_id": "template_1",
        "organisation_id": ORG_ID,
        "modified_at": modified_at,
        "created_at": "2024-01-01T00:00:00Z",
        "archived": false,
    })
}
