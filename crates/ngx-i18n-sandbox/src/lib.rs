//! Capability context for ngx-i18n-tools (Layer 0).
//!
//! An invocation never touches ambient process state. The host hands it a
//! [`CapabilityContext`]: argv, a snapshot of the environment, and a set of
//! named filesystem roots, each granted read-only or read-write. Every path
//! the tool touches goes through [`CapabilityContext::resolve`], which rejects
//! escapes (`..` above a root, symlinks leading out, writes to read-only
//! roots) with a [`CapabilityViolation`].
//!
//! # Modules
//!
//! - [`access`]: `AccessMode` (what a root grants) and `Access` (what an op needs)
//! - [`root`]: `Root` and `ScopedPath`, lexical + symlink confinement
//! - [`context`]: `CapabilityContext` and its builder
//! - [`fs`]: atomic staged writes, write-if-changed, transient-I/O retry
//! - [`error`]: `ContextError`, `CapabilityViolation`, `FsError`

pub mod access;
pub mod context;
pub mod error;
pub mod fs;
pub mod root;

pub use access::{Access, AccessMode};
pub use context::{CapabilityContext, CapabilityContextBuilder, DEFAULT_ROOT};
pub use error::{CapabilityViolation, ContextError, FsError, FsResult};
pub use fs::{content_digest, RetryPolicy, WriteStatus};
pub use root::{Root, ScopedPath};
