//! Error types for the tool and their process exit codes.

use ngx_i18n_sandbox::{CapabilityViolation, ContextError, FsError};
use thiserror::Error;

use crate::angular::ProjectError;
use crate::dispatch::UsageError;
use crate::i18n::TranslationError;
use crate::workbook::WorkbookError;
use crate::xliff::XliffError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CAPABILITY: i32 = 3;
pub const EXIT_CONTEXT: i32 = 4;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Result alias for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("cannot build capability context: {0}")]
    Context(#[from] ContextError),

    #[error("{0}")]
    Usage(#[from] UsageError),

    #[error("capability violation: {0}")]
    Capability(#[from] CapabilityViolation),

    #[error("interrupted")]
    Interrupted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("{path}: {source}")]
    Xliff {
        path: String,
        #[source]
        source: XliffError,
    },

    #[error("{path}: {source}")]
    Workbook {
        path: String,
        #[source]
        source: WorkbookError,
    },

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} placeholder issue(s) found")]
    IssuesFound(usize),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ToolError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolError::Context(_) => EXIT_CONTEXT,
            ToolError::Usage(_) => EXIT_USAGE,
            ToolError::Capability(_) => EXIT_CAPABILITY,
            ToolError::Interrupted => EXIT_INTERRUPTED,
            ToolError::Config(_)
            | ToolError::Project(_)
            | ToolError::Xliff { .. }
            | ToolError::Workbook { .. }
            | ToolError::Translation(_)
            | ToolError::Io { .. }
            | ToolError::Serialization(_)
            | ToolError::IssuesFound(_)
            | ToolError::Task(_) => EXIT_FAILURE,
        }
    }
}

impl From<FsError> for ToolError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Violation(v) => ToolError::Capability(v),
            FsError::Io { op, path, source } => ToolError::Io { op, path, source },
            FsError::Cancelled { .. } => ToolError::Interrupted,
        }
    }
}
