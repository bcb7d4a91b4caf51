//! Error types for the capability layer.

use std::path::PathBuf;

use crate::access::{Access, AccessMode};

/// Errors raised while building a [`crate::CapabilityContext`].
///
/// These are fatal: no invocation exists yet when they occur.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("cannot determine working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    #[error("root {name} at {}: {source}", .path.display())]
    RootUnavailable {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("root {name} at {} is not a directory", .path.display())]
    NotADirectory { name: String, path: PathBuf },

    #[error("invalid root name {0:?}: root names must be absolute guest paths")]
    InvalidRootName(String),

    #[error("root {0} granted twice")]
    DuplicateRoot(String),
}

/// An attempt to reach outside the granted capability set.
///
/// Always fatal to the current invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityViolation {
    #[error("path {path:?} escapes root {root}")]
    Escape { path: String, root: String },

    #[error("no granted root contains {path:?}")]
    NoRoot { path: String },

    #[error("path {path:?} resolves through a symlink outside root {root}")]
    SymlinkEscape { path: String, root: String },

    #[error("{access} access to {path:?} denied: root {root} is {mode}")]
    AccessDenied {
        path: String,
        root: String,
        access: Access,
        mode: AccessMode,
    },
}

/// Errors from filesystem operations performed through a granted root.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error(transparent)]
    Violation(#[from] CapabilityViolation),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {path} cancelled")]
    Cancelled { path: String },
}

impl FsError {
    /// Returns `true` if the underlying I/O error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type for capability-scoped filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;
