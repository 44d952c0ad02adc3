//! Per-artifact outcome tracking for one export run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use reportsync_common::{Error, Result};

/// One remote thing an export writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Artifact {
    /// A standalone file, by logical name.
    File {
        /// Logical name.
        name: String,
    },
    /// One sheet of a spreadsheet document.
    Sheet {
        /// Document name.
        document: String,
        /// Sheet title.
        sheet: String,
    },
}

impl Artifact {
    /// A file artifact.
    pub fn file(name: impl Into<String>) -> Self {
        Artifact::File { name: name.into() }
    }

    /// A sheet artifact.
    pub fn sheet(document: impl Into<String>, sheet: impl Into<String>) -> Self {
        Artifact::Sheet {
            document: document.into(),
            sheet: sheet.into(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::File { name } => write!(f, "{}", name),
            Artifact::Sheet { document, sheet } => write!(f, "{} / {}", document, sheet),
        }
    }
}

/// Outcome of a single artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Not attempted yet.
    Pending,
    /// Written; `url` points at it.
    Synced,
    /// The write failed.
    Failed,
    /// Not attempted because an earlier artifact in the same document failed.
    Skipped,
}

/// Tracking entry for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// What was written.
    pub artifact: Artifact,
    /// Current status.
    pub status: ArtifactStatus,
    /// Where it can be viewed, once synced.
    pub url: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Non-fatal problems reported alongside success.
    pub warnings: Vec<String>,
    /// When the entry last changed status.
    pub updated_at: DateTime<Utc>,
}

impl ArtifactEntry {
    /// Create a pending entry.
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            status: ArtifactStatus::Pending,
            url: None,
            error: None,
            warnings: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Mark as synced. `url` is unknown when the write landed but the run failed later.
    pub fn mark_synced(&mut self, url: Option<String>, warnings: Vec<String>) {
        self.status = ArtifactStatus::Synced;
        self.url = url;
        self.error = None;
        self.warnings = warnings;
        self.updated_at = Utc::now();
    }

    /// Mark as failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ArtifactStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark as skipped.
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = ArtifactStatus::Skipped;
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
    }
}

/// Ordered outcome of an export run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    entries: Vec<ArtifactEntry>,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExportReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new artifact. Returns its index.
    pub fn track(&mut self, artifact: Artifact) -> usize {
        self.entries.push(ArtifactEntry::new(artifact));
        self.entries.len() - 1
    }

    /// Get the entry for an artifact.
    pub fn get(&self, artifact: &Artifact) -> Option<&ArtifactEntry> {
        self.entries.iter().find(|e| &e.artifact == artifact)
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> Option<&mut ArtifactEntry> {
        self.entries.get_mut(index)
    }

    /// All entries, in the order they were tracked.
    pub fn entries(&self) -> &[ArtifactEntry] {
        &self.entries
    }

    /// Entries with a specific status.
    pub fn entries_with_status(&self, status: ArtifactStatus) -> Vec<&ArtifactEntry> {
        self.entries.iter().filter(|e| e.status == status).collect()
    }

    /// Count entries by status.
    pub fn count_by_status(&self) -> HashMap<ArtifactStatus, usize> {
        let mut counts = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }

    /// Whether every artifact was written.
    pub fn is_success(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.status == ArtifactStatus::Synced)
    }

    /// Whether anything was written with warnings attached.
    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|e| !e.warnings.is_empty())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_transitions() {
        let mut entry = ArtifactEntry::new(Artifact::file("logo.png"));
        assert_eq!(entry.status, ArtifactStatus::Pending);

        entry.mark_failed("quota exceeded");
        assert_eq!(entry.status, ArtifactStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("quota exceeded"));

        entry.mark_synced(Some("https://drive.google.com/file/d/1/view".to_string()), vec![]);
        assert_eq!(entry.status, ArtifactStatus::Synced);
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_report_keeps_order() {
        let mut report = ExportReport::new();
        report.track(Artifact::sheet("Q1", "Summary"));
        report.track(Artifact::sheet("Q1", "Sales"));
        report.track(Artifact::file("notes.txt"));

        let names: Vec<_> = report.entries().iter().map(|e| e.artifact.to_string()).collect();
        assert_eq!(names, vec!["Q1 / Summary", "Q1 / Sales", "notes.txt"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_count_by_status() {
        let mut report = ExportReport::new();
        let a = report.track(Artifact::file("a"));
        let b = report.track(Artifact::file("b"));
        report.track(Artifact::file("c"));

        report
            .entry_mut(a)
            .unwrap()
            .mark_synced(Some("u".to_string()), vec!["private".to_string()]);
        report.entry_mut(b).unwrap().mark_skipped("earlier failure");

        let counts = report.count_by_status();
        assert_eq!(counts[&ArtifactStatus::Synced], 1);
        assert_eq!(counts[&ArtifactStatus::Skipped], 1);
        assert_eq!(counts[&ArtifactStatus::Pending], 1);
        assert!(report.has_warnings());
        assert_eq!(
            report.get(&Artifact::file("b")).unwrap().status,
            ArtifactStatus::Skipped
        );
    }

    #[test]
    fn test_report_serialization() {
        let mut report = ExportReport::new();
        let i = report.track(Artifact::sheet("Q1", "Sales"));
        report.entry_mut(i).unwrap().mark_failed("sheet write rejected");

        let json = report.to_json().unwrap();
        assert!(json.contains("\"type\": \"sheet\""));
        assert!(json.contains("\"status\": \"failed\""));

        let restored = ExportReport::from_json(&json).unwrap();
        assert_eq!(restored, report);
    }
}
