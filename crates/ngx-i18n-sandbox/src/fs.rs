//! Filesystem operations on [`ScopedPath`]s.
//!
//! Writes are atomic: data goes to a temp file in the destination directory
//! and is renamed into place on `StagedWrite::commit`. Dropping an
//! uncommitted `StagedWrite` removes the temp file, so an aborted run never
//! leaves a partial file behind.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::access::{Access, AccessMode};
use crate::error::{CapabilityViolation, FsError, FsResult};
use crate::root::ScopedPath;

/// Retry controls for transient I/O against a granted root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 20,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    pub fn run<T>(
        &self,
        op: &'static str,
        path: &ScopedPath,
        mut f: impl FnMut() -> io::Result<T>,
    ) -> FsResult<T> {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_transient(&err) => {
                    let delay = Duration::from_millis(self.backoff_base_ms * 2u64.pow(attempt - 1));
                    tracing::debug!(
                        op,
                        path = %path,
                        attempt,
                        error = %err,
                        "transient I/O failure, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(source) => {
                    return Err(FsError::Io {
                        op,
                        path: path.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

/// Lowercase hex SHA-256 of `data`.
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Outcome of [`write_if_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    /// The file was created or replaced.
    Written { digest: String },
    /// The file already held identical bytes and was left untouched.
    Unchanged { digest: String },
}

impl WriteStatus {
    pub fn digest(&self) -> &str {
        match self {
            WriteStatus::Written { digest } | WriteStatus::Unchanged { digest } => digest,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, WriteStatus::Written { .. })
    }
}

/// Bytes written to a temp file next to their destination, not yet visible.
#[derive(Debug)]
pub(crate) struct StagedWrite {
    tmp: NamedTempFile,
    target: ScopedPath,
    digest: String,
    retry: RetryPolicy,
}

impl StagedWrite {
    /// Atomically move the staged bytes into place.
    pub fn commit(self) -> FsResult<String> {
        let StagedWrite {
            tmp,
            target,
            digest,
            retry,
        } = self;
        // `persist` hands the temp file back on failure; keep it alive for the retry.
        let mut pending = Some(tmp);
        retry.run("commit", &target, || {
            let file = pending
                .take()
                .ok_or_else(|| io::Error::other("staged file already consumed"))?;
            file.persist(target.host_path()).map(|_| ()).map_err(|e| {
                pending = Some(e.file);
                e.error
            })
        })?;
        tracing::debug!(path = %target, digest = %digest, "committed write");
        Ok(digest)
    }

    /// Drop the staged bytes without touching the destination.
    pub fn discard(self) {
        tracing::debug!(path = %self.target, "discarded staged write");
    }
}

fn require_write(path: &ScopedPath) -> FsResult<()> {
    if path.access() == Access::Write {
        return Ok(());
    }
    Err(CapabilityViolation::AccessDenied {
        path: path.to_string(),
        root: path.root().to_string(),
        access: Access::Write,
        mode: AccessMode::ReadOnly,
    }
    .into())
}

pub fn read(path: &ScopedPath, retry: &RetryPolicy) -> FsResult<Vec<u8>> {
    retry.run("read", path, || fs::read(path.host_path()))
}

pub fn read_to_string(path: &ScopedPath, retry: &RetryPolicy) -> FsResult<String> {
    retry.run("read", path, || fs::read_to_string(path.host_path()))
}

pub fn exists(path: &ScopedPath) -> FsResult<bool> {
    path.host_path().try_exists().map_err(|source| FsError::Io {
        op: "stat",
        path: path.to_string(),
        source,
    })
}

/// Write `data` to a temp file beside `path`. Nothing is visible until commit.
///
/// `path` must have been resolved for [`Access::Write`].
pub(crate) fn stage(path: &ScopedPath, data: &[u8], retry: &RetryPolicy) -> FsResult<StagedWrite> {
    require_write(path)?;

    let dir: PathBuf = path
        .host_path()
        .parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| FsError::Io {
            op: "stage",
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"),
        })?;

    let tmp = retry.run("stage", path, || {
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    })?;

    Ok(StagedWrite {
        tmp,
        target: path.clone(),
        digest: content_digest(data),
        retry: *retry,
    })
}

/// Write `data` atomically unless the file already holds the same bytes.
/// Write `data` atomically unless the file already holds the same bytes.
///
/// `cancelled` is polled once the bytes are staged; if it reports `true` the
/// staged file is dropped and the destination is left untouched.
pub fn write_if_changed(
    path: &ScopedPath,
    data: &[u8],
    retry: &RetryPolicy,
    cancelled: impl FnOnce() -> bool,
) -> FsResult<WriteStatus> {
    require_write(path)?;

    let digest = content_digest(data);
    if exists(path)? {
        let current = read(path, retry)?;
        if content_digest(&current) == digest {
            tracing::debug!(path = %path, digest = %digest, "content unchanged, skipping write");
            return Ok(WriteStatus::Unchanged { digest });
        }
    }

    let staged = stage(path, data, retry)?;
    if cancelled() {
        staged.discard();
        return Err(FsError::Cancelled {
            path: path.to_string(),
        });
    }
    let digest = staged.commit()?;
    Ok(WriteStatus::Written { digest })
}
