//! Access modes: what a root grants and what an operation needs.

use serde::{Deserialize, Serialize};

/// The mode a filesystem root was granted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// The kind of access a single operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
}

impl AccessMode {
    /// Returns `true` if a root granted with this mode allows `access`.
    pub fn permits(self, access: Access) -> bool {
        match (self, access) {
            (_, Access::Read) => true,
            (AccessMode::ReadWrite, Access::Write) => true,
            (AccessMode::ReadOnly, Access::Write) => false,
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::ReadOnly => write!(f, "read_only"),
            AccessMode::ReadWrite => write!(f, "read_write"),
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}
