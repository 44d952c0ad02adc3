#![allow(clippy::unwrap_used)]
// End-to-end exports against a mock Drive/Sheets server.

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reportsync_common::{Credentials, Error, Result, RetryConfig, SensitiveString};
use reportsync_report::{CoverInfo, ReportBundle, SalesReport};
use reportsync_storage::{
    ApiEndpoints, BootstrapConfig, ConsentFlow, GoogleWorkspace, GrantedToken, StaticRuntime,
    TokenRequest,
};
use reportsync_sync::{ArtifactStatus, ExportConfig, ExportEngine, FileArtifact};

struct FixedConsent;

#[async_trait]
impl ConsentFlow for FixedConsent {
    async fn request_token(&self, _request: &TokenRequest) -> Result<GrantedToken> {
        Ok(GrantedToken {
            access_token: SensitiveString::new("token-1"),
            expires_in: None,
        })
    }

    async fn revoke(&self, _access_token: &str) -> Result<()> {
        Err(Error::Network("revocation is not mocked".to_string()))
    }
}

async fn engine() -> (MockServer, ExportEngine<GoogleWorkspace>) {
    let server = MockServer::start().await;
    let credentials = Credentials::new("client-id", "api-key", "").unwrap();
    let loader = Arc::new(StaticRuntime::new(ApiEndpoints::with_root(&server.uri())));
    let config = BootstrapConfig {
        poll_interval: Duration::from_millis(1),
        max_attempts: 3,
        request_timeout: Duration::from_secs(5),
    };
    let workspace =
        GoogleWorkspace::with_config(credentials, loader, Arc::new(FixedConsent), config);

    let engine = ExportEngine::new(workspace, ExportConfig::default()).with_retry_config(
        RetryConfig::new(1)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false),
    );
    (server, engine)
}

fn cover() -> CoverInfo {
    CoverInfo::new(
        "Monthly Report",
        chrono::Utc.with_ymd_and_hms(2024, 3, 31, 17, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn test_export_report_writes_summary_then_sections() {
    let (server, engine) = engine().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "spreadsheetId": "doc-7" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/doc-7/values/.+!A1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/doc-7/permissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let bundle = ReportBundle {
        sales: Some(SalesReport::default()),
        ..Default::default()
    };
    let report = engine
        .export_report("Monthly Report", &bundle, &cover())
        .await
        .unwrap();

    assert!(report.is_success());
    let sheets: Vec<String> = report
        .entries()
        .iter()
        .map(|e| e.artifact.to_string())
        .collect();
    assert_eq!(
        sheets,
        vec!["Monthly Report / Summary", "Monthly Report / Sales"]
    );

    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.url.path() == "/v4/spreadsheets")
        .unwrap();
    let body: Value = serde_json::from_slice(&create.body).unwrap();
    assert_eq!(body["sheets"][0]["properties"]["title"], "Summary");
    assert_eq!(body["sheets"][1]["properties"]["title"], "Sales");

    let summary = requests
        .iter()
        .find(|r| r.url.path().ends_with("%27Summary%27!A1"))
        .unwrap();
    let written: Value = serde_json::from_slice(&summary.body).unwrap();
    assert_eq!(written["values"][0][0], "Monthly Report");
    assert_eq!(written["values"][1][1], "2024-03-31 17:00:00 UTC");
    assert_eq!(written["values"][3][0], "Sales");

    // Blank container: nothing is moved.
    assert!(!requests.iter().any(|r| r.method.as_str() == "PATCH"));
}

#[tokio::test]
async fn test_export_report_sheet_failure_is_reported_per_sheet() {
    let (server, engine) = engine().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "spreadsheetId": "doc-7" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/doc-7/values/%27Summary%27!A1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/doc-7/values/%27Sales%27!A1$"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid range"))
        .mount(&server)
        .await;

    let bundle = ReportBundle {
        sales: Some(SalesReport::default()),
        ..Default::default()
    };
    let report = engine
        .export_report("Monthly Report", &bundle, &cover())
        .await
        .unwrap();

    let statuses: Vec<ArtifactStatus> = report.entries().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![ArtifactStatus::Synced, ArtifactStatus::Failed]);
    assert!(report.entries()[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Invalid range"));
}

#[tokio::test]
async fn test_export_files_continues_after_a_failure() {
    let (server, engine) = engine().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(413).set_body_string("File too large"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "file-2",
            "name": "b.txt",
            "mimeType": "text/plain"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/file-2/permissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let report = engine
        .export_files(vec![
            FileArtifact::from_bytes("a.bin", vec![0u8; 16]),
            FileArtifact::from_bytes("b.txt", "hello").with_content_type("text/plain"),
        ])
        .await;

    assert_eq!(report.entries()[0].status, ArtifactStatus::Failed);
    assert_eq!(report.entries()[1].status, ArtifactStatus::Synced);
    assert_eq!(
        report.entries()[1].url.as_deref(),
        Some("https://drive.google.com/file/d/file-2/view")
    );
}
