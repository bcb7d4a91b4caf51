//! The JSON run report written by `run --report`.
//!
//! One report per run: which files were written or left alone, and every
//! placeholder issue found while rendering locale files.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::i18n::Locale;
use crate::xliff::PlaceholderIssue;

pub const REPORT_SCHEMA_VERSION: &str = "1";

/// What a file did during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Workbook,
    LocaleXlf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: String,
    pub role: FileRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<Locale>,
    pub digest: String,
    /// `false` when the file already held identical bytes.
    pub written: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRecord {
    pub locale: Locale,
    #[serde(flatten)]
    pub issue: PlaceholderIssue,
}

/// JSON artifact written by `run --report`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub project: String,
    pub source_locale: Locale,
    pub locales: Vec<Locale>,
    pub key_count: usize,
    pub files: Vec<FileRecord>,
    pub warnings: Vec<IssueRecord>,
}

impl SyncReport {
    pub fn new(run_id: Uuid, project: String, source_locale: Locale) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id,
            generated_at: Utc::now(),
            project,
            source_locale,
            locales: Vec::new(),
            key_count: 0,
            files: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
