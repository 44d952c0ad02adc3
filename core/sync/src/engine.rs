//! Export engine that orchestrates one export action.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use reportsync_common::{CallContext, Error, Result, RetryConfig, RetryExecutor, SheetMatrix};
use reportsync_report::{CoverInfo, ReportAggregator, ReportBundle};
use reportsync_storage::{GoogleWorkspace, SpreadsheetOutcome, UpsertOutcome};

use crate::state::{Artifact, ExportReport};

/// Configuration for the export engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportConfig {
    /// Retries for file uploads that fail with a transient error.
    pub max_retries: u32,
    /// Upper bound on each remote operation.
    pub timeout: Option<Duration>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: None,
        }
    }
}

/// Where a file's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// In-memory content.
    Bytes(Bytes),
    /// Downloaded from a URL before uploading.
    Url(String),
}

/// A file to upsert by logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    /// Logical name.
    pub name: String,
    /// Content source.
    pub source: FileSource,
    /// Content type; the provider default applies when absent.
    pub content_type: Option<String>,
}

impl FileArtifact {
    /// A file with in-memory content.
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Bytes(content.into()),
            content_type: None,
        }
    }

    /// A file fetched from `url`.
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Url(url.into()),
            content_type: None,
        }
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Remote side of an export.
#[async_trait]
pub trait ExportTarget: Send + Sync {
    /// Create or update the spreadsheet `name` with `sheets`.
    async fn sync_spreadsheet(
        &self,
        ctx: &CallContext,
        name: &str,
        sheets: Vec<SheetMatrix>,
    ) -> Result<SpreadsheetOutcome>;

    /// Create or replace one file.
    async fn upsert_file(&self, ctx: &CallContext, file: &FileArtifact) -> Result<UpsertOutcome>;
}

#[async_trait]
impl ExportTarget for GoogleWorkspace {
    async fn sync_spreadsheet(
        &self,
        ctx: &CallContext,
        name: &str,
        sheets: Vec<SheetMatrix>,
    ) -> Result<SpreadsheetOutcome> {
        self.spreadsheets()
            .sync_spreadsheet_with(ctx, name, sheets)
            .await
    }

    async fn upsert_file(&self, ctx: &CallContext, file: &FileArtifact) -> Result<UpsertOutcome> {
        let content_type = file.content_type.as_deref();
        match &file.source {
            FileSource::Bytes(content) => {
                self.files()
                    .upload_or_update_with(ctx, content.clone(), &file.name, content_type)
                    .await
            }
            FileSource::Url(url) => {
                self.files()
                    .upload_from_url_with(ctx, url, &file.name, content_type)
                    .await
            }
        }
    }
}

/// Runs exports against a target and reports each artifact separately.
pub struct ExportEngine<T: ExportTarget + ?Sized> {
    target: Arc<T>,
    retry_executor: RetryExecutor,
    cancel: CancellationToken,
    config: ExportConfig,
}

impl<T: ExportTarget + 'static> ExportEngine<T> {
    /// Create a new export engine.
    pub fn new(target: T, config: ExportConfig) -> Self {
        Self::from_arc(Arc::new(target), config)
    }
}

impl<T: ExportTarget + ?Sized> ExportEngine<T> {
    /// Create an export engine from an Arc-wrapped target.
    pub fn from_arc(target: Arc<T>, config: ExportConfig) -> Self {
        Self {
            target,
            retry_executor: RetryExecutor::new(RetryConfig::new(config.max_retries)),
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Override the retry policy used for file uploads.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.config.max_retries = config.max_retries;
        self.retry_executor = RetryExecutor::new(config);
        self
    }

    /// Get the target.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Cancel every operation in flight and every later one.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn context(&self) -> CallContext {
        let ctx = CallContext::new().with_cancellation(self.cancel.clone());
        match self.config.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    /// Lay out a bundle as the sheets of one document.
    ///
    /// The combined `Summary` sheet comes first, then one sheet per present
    /// section in bundle order.
    pub fn build_sheets(bundle: &ReportBundle, cover: &CoverInfo) -> Result<Vec<SheetMatrix>> {
        if bundle.is_empty() {
            return Err(Error::InvalidInput("Report bundle has no sections".to_string()));
        }

        let mut sheets = vec![ReportAggregator::combine_all(bundle, cover)?];
        for section in ReportAggregator::sections(bundle) {
            sheets.push(ReportAggregator::to_matrix(section)?);
        }
        Ok(sheets)
    }

    /// Export a report bundle as the spreadsheet `name`.
    ///
    /// Remote failures are recorded per sheet in the returned report: sheets
    /// written before a failing sheet stay synced, later ones are skipped.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty bundle or blank name; nothing is sent
    pub async fn export_report(
        &self,
        name: &str,
        bundle: &ReportBundle,
        cover: &CoverInfo,
    ) -> Result<ExportReport> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Report name must not be empty".to_string()));
        }
        let sheets = Self::build_sheets(bundle, cover)?;
        let start = Instant::now();

        let mut report = ExportReport::new();
        report.started_at = Some(chrono::Utc::now());
        let indices: Vec<(String, usize)> = sheets
            .iter()
            .map(|s| {
                let sheet = s.sheet_name().to_string();
                let index = report.track(Artifact::sheet(name, sheet.clone()));
                (sheet, index)
            })
            .collect();

        info!(name, sheets = indices.len(), "Starting report export");

        let ctx = self.context();
        match self.target.sync_spreadsheet(&ctx, name, sheets).await {
            Ok(outcome) => {
                let warnings: Vec<String> =
                    outcome.warnings.iter().map(ToString::to_string).collect();
                // Document-level warnings are reported once, on the first sheet.
                for (position, (_, index)) in indices.iter().enumerate() {
                    if let Some(entry) = report.entry_mut(*index) {
                        let attached = if position == 0 { warnings.clone() } else { Vec::new() };
                        entry.mark_synced(Some(outcome.url.clone()), attached);
                    }
                }
            }
            Err(err) => {
                let message = err.to_string();
                let failed = err
                    .failed_sheet()
                    .and_then(|s| indices.iter().position(|(sheet, _)| sheet == s));

                for (position, (_, index)) in indices.iter().enumerate() {
                    let Some(entry) = report.entry_mut(*index) else {
                        continue;
                    };
                    match failed {
                        Some(f) if position < f => entry.mark_synced(None, Vec::new()),
                        Some(f) if position > f => {
                            entry.mark_skipped("An earlier sheet of this document failed")
                        }
                        _ => entry.mark_failed(message.clone()),
                    }
                }
            }
        }

        report.finished_at = Some(chrono::Utc::now());
        info!(
            name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = report.is_success(),
            "Report export finished"
        );
        Ok(report)
    }

    /// Upsert each file independently; one failure does not stop the others.
    pub async fn export_files(&self, files: Vec<FileArtifact>) -> ExportReport {
        let start = Instant::now();
        let mut report = ExportReport::new();
        report.started_at = Some(chrono::Utc::now());

        info!("Exporting {} files", files.len());

        for file in &files {
            let index = report.track(Artifact::file(file.name.clone()));
            debug!(name = %file.name, "Uploading file");

            let ctx = self.context();
            let result = self
                .retry_executor
                .execute(|| self.target.upsert_file(&ctx, file))
                .await;

            let Some(entry) = report.entry_mut(index) else {
                continue;
            };
            match result {
                Ok(outcome) => {
                    entry.mark_synced(
                        Some(outcome.url),
                        outcome.warnings.iter().map(ToString::to_string).collect(),
                    );
                }
                Err(e) => {
                    error!(name = %file.name, "Failed to upload: {}", e);
                    entry.mark_failed(e.to_string());
                }
            }
        }

        report.finished_at = Some(chrono::Utc::now());
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = report.is_success(),
            "File export finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ArtifactStatus;
    use chrono::TimeZone;
    use reportsync_report::{InventoryReport, SalesReport};
    use reportsync_storage::{PartialSuccess, UpsertAction};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Records calls and fails on demand.
    #[derive(Default)]
    struct FakeTarget {
        sheet_calls: Mutex<Vec<(String, Vec<String>)>>,
        file_attempts: Mutex<HashMap<String, u32>>,
        spreadsheet_error: Mutex<Option<Error>>,
        file_errors: Mutex<HashMap<String, Vec<Error>>>,
        not_public: bool,
        spreadsheet_calls: AtomicU32,
    }

    #[async_trait]
    impl ExportTarget for FakeTarget {
        async fn sync_spreadsheet(
            &self,
            _ctx: &CallContext,
            name: &str,
            sheets: Vec<SheetMatrix>,
        ) -> Result<SpreadsheetOutcome> {
            self.spreadsheet_calls.fetch_add(1, Ordering::SeqCst);
            let titles: Vec<String> = sheets.iter().map(|s| s.sheet_name().to_string()).collect();
            self.sheet_calls
                .lock()
                .unwrap()
                .push((name.to_string(), titles.clone()));

            if let Some(err) = self.spreadsheet_error.lock().unwrap().take() {
                return Err(err);
            }
            let warnings = if self.not_public {
                vec![PartialSuccess::NotPublic {
                    file_id: "doc-1".to_string(),
                    reason: "403".to_string(),
                }]
            } else {
                Vec::new()
            };
            Ok(SpreadsheetOutcome {
                spreadsheet_id: "doc-1".to_string(),
                url: "https://docs.google.com/spreadsheets/d/doc-1/edit".to_string(),
                action: UpsertAction::Created,
                sheets_written: titles,
                added_sheets: Vec::new(),
                warnings,
            })
        }

        async fn upsert_file(
            &self,
            _ctx: &CallContext,
            file: &FileArtifact,
        ) -> Result<UpsertOutcome> {
            *self
                .file_attempts
                .lock()
                .unwrap()
                .entry(file.name.clone())
                .or_insert(0) += 1;

            let queued = self
                .file_errors
                .lock()
                .unwrap()
                .get_mut(&file.name)
                .and_then(|errors| (!errors.is_empty()).then(|| errors.remove(0)));
            if let Some(err) = queued {
                return Err(err);
            }
            Ok(UpsertOutcome {
                file_id: format!("id-{}", file.name),
                url: format!("https://drive.google.com/file/d/id-{}/view", file.name),
                action: UpsertAction::Created,
                warnings: Vec::new(),
            })
        }
    }

    fn bundle() -> ReportBundle {
        ReportBundle {
            sales: Some(SalesReport::default()),
            inventory: Some(InventoryReport::default()),
            ..Default::default()
        }
    }

    fn cover() -> CoverInfo {
        CoverInfo::new("Q1", chrono::Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap())
    }

    fn sync_error(sheet: &str) -> Error {
        Error::Sync {
            operation: "write".to_string(),
            target: "Q1".to_string(),
            sheet: Some(sheet.to_string()),
            status: 400,
            body: "bad range".to_string(),
        }
    }

    fn no_wait() -> RetryConfig {
        RetryConfig::new(2)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    fn statuses(report: &ExportReport) -> Vec<(String, ArtifactStatus)> {
        report
            .entries()
            .iter()
            .map(|e| (e.artifact.to_string(), e.status))
            .collect()
    }

    #[test]
    fn test_build_sheets_summary_first() {
        let sheets = ExportEngine::<FakeTarget>::build_sheets(&bundle(), &cover()).unwrap();
        let names: Vec<_> = sheets.iter().map(|s| s.sheet_name()).collect();
        assert_eq!(names, vec!["Summary", "Sales", "Inventory"]);
    }

    #[tokio::test]
    async fn test_export_report_success() {
        let engine = ExportEngine::new(
            FakeTarget {
                not_public: true,
                ..Default::default()
            },
            ExportConfig::default(),
        );

        let report = engine.export_report("Q1", &bundle(), &cover()).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.entries().len(), 3);
        assert_eq!(
            report.entries()[1].url.as_deref(),
            Some("https://docs.google.com/spreadsheets/d/doc-1/edit")
        );
        assert_eq!(report.entries()[0].warnings.len(), 1);
        assert!(report.entries()[1].warnings.is_empty());
        assert!(report.finished_at.is_some());

        let calls = engine.target().sheet_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(
                "Q1".to_string(),
                vec!["Summary".to_string(), "Sales".to_string(), "Inventory".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn test_export_report_names_failing_sheet() {
        let target = FakeTarget::default();
        *target.spreadsheet_error.lock().unwrap() = Some(sync_error("Sales"));
        let engine = ExportEngine::new(target, ExportConfig::default());

        let report = engine.export_report("Q1", &bundle(), &cover()).await.unwrap();

        assert_eq!(
            statuses(&report),
            vec![
                ("Q1 / Summary".to_string(), ArtifactStatus::Synced),
                ("Q1 / Sales".to_string(), ArtifactStatus::Failed),
                ("Q1 / Inventory".to_string(), ArtifactStatus::Skipped),
            ]
        );
        assert!(report.entries()[0].url.is_none());
        assert!(report.entries()[1]
            .error
            .as_deref()
            .unwrap()
            .contains("bad range"));
    }

    #[tokio::test]
    async fn test_export_report_document_failure_fails_every_sheet() {
        let target = FakeTarget::default();
        *target.spreadsheet_error.lock().unwrap() =
            Some(Error::Authentication("consent declined".to_string()));
        let engine = ExportEngine::new(target, ExportConfig::default());

        let report = engine.export_report("Q1", &bundle(), &cover()).await.unwrap();

        assert_eq!(report.entries_with_status(ArtifactStatus::Failed).len(), 3);
        // Spreadsheet syncs are not retried.
        assert_eq!(engine.target().spreadsheet_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_export_report_rejects_empty_bundle() {
        let engine = ExportEngine::new(FakeTarget::default(), ExportConfig::default());

        let err = engine
            .export_report("Q1", &ReportBundle::default(), &cover())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = engine.export_report("  ", &bundle(), &cover()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(engine.target().spreadsheet_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_export_files_reports_each_file() {
        let target = FakeTarget::default();
        target.file_errors.lock().unwrap().insert(
            "b.pdf".to_string(),
            vec![Error::Upload {
                operation: "create".to_string(),
                target: "b.pdf".to_string(),
                status: 413,
                body: "too large".to_string(),
            }],
        );
        let engine = ExportEngine::new(target, ExportConfig::default()).with_retry_config(no_wait());

        let report = engine
            .export_files(vec![
                FileArtifact::from_bytes("a.txt", "alpha"),
                FileArtifact::from_bytes("b.pdf", vec![0u8; 4]).with_content_type("application/pdf"),
                FileArtifact::from_url("c.png", "https://example.com/c.png"),
            ])
            .await;

        assert_eq!(
            statuses(&report),
            vec![
                ("a.txt".to_string(), ArtifactStatus::Synced),
                ("b.pdf".to_string(), ArtifactStatus::Failed),
                ("c.png".to_string(), ArtifactStatus::Synced),
            ]
        );
        // 413 is not transient, so it is attempted once.
        assert_eq!(engine.target().file_attempts.lock().unwrap()["b.pdf"], 1);
    }

    #[tokio::test]
    async fn test_export_files_retries_transient_errors() {
        let target = FakeTarget::default();
        target.file_errors.lock().unwrap().insert(
            "a.txt".to_string(),
            vec![
                Error::Network("connection reset".to_string()),
                Error::Upload {
                    operation: "create".to_string(),
                    target: "a.txt".to_string(),
                    status: 503,
                    body: String::new(),
                },
            ],
        );
        let engine = ExportEngine::new(target, ExportConfig::default()).with_retry_config(no_wait());

        let report = engine
            .export_files(vec![FileArtifact::from_bytes("a.txt", "alpha")])
            .await;

        assert!(report.is_success());
        assert_eq!(engine.target().file_attempts.lock().unwrap()["a.txt"], 3);
    }
}
