//! The capability context: everything one invocation may see.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::access::{Access, AccessMode};
use crate::error::{CapabilityViolation, ContextError, FsResult};
use crate::fs::{self, RetryPolicy, WriteStatus};
use crate::root::{Root, ScopedPath};

/// Name of the root that relative paths resolve against.
pub const DEFAULT_ROOT: &str = "/";

/// Immutable bundle of argv, env, and granted filesystem roots.
///
/// Built once per process by the host and never mutated afterwards. Not
/// `Clone`: share it behind an `Arc` within a single invocation.
#[derive(Debug)]
pub struct CapabilityContext {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    roots: BTreeMap<String, Root>,
    retry: RetryPolicy,
}

impl CapabilityContext {
    pub fn builder() -> CapabilityContextBuilder {
        CapabilityContextBuilder::default()
    }

    /// Full argv, including the program name at index 0 when the host supplied one.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Root> {
        self.roots.values()
    }

    pub fn root(&self, name: &str) -> Option<&Root> {
        self.roots.get(name)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Check `requested` against the granted roots for `access`.
    ///
    /// Relative paths resolve against [`DEFAULT_ROOT`]. Absolute paths
    /// resolve against the root whose guest name is the longest prefix.
    pub fn resolve(
        &self,
        requested: impl AsRef<Path>,
        access: Access,
    ) -> Result<ScopedPath, CapabilityViolation> {
        let requested = requested.as_ref();
        let shown = requested.to_string_lossy().into_owned();

        let (root, remainder) = if requested.is_absolute() {
            self.roots
                .values()
                .filter_map(|root| root.strip(requested).map(|rest| (root, rest)))
                .max_by_key(|(root, _)| root.depth())
                .ok_or_else(|| CapabilityViolation::NoRoot { path: shown.clone() })?
        } else {
            let root = self
                .roots
                .get(DEFAULT_ROOT)
                .ok_or_else(|| CapabilityViolation::NoRoot { path: shown.clone() })?;
            (root, requested.to_path_buf())
        };

        let resolved = root.resolve(&shown, &remainder, access);
        if let Err(violation) = &resolved {
            tracing::debug!(path = %shown, %access, error = %violation, "capability violation");
        }
        resolved
    }

    pub fn read(&self, requested: impl AsRef<Path>) -> FsResult<Vec<u8>> {
        let path = self.resolve(requested, Access::Read)?;
        fs::read(&path, &self.retry)
    }

    pub fn read_to_string(&self, requested: impl AsRef<Path>) -> FsResult<String> {
        let path = self.resolve(requested, Access::Read)?;
        fs::read_to_string(&path, &self.retry)
    }

    pub fn exists(&self, requested: impl AsRef<Path>) -> FsResult<bool> {
        let path = self.resolve(requested, Access::Read)?;
        fs::exists(&path)
    }

    /// Write `data` to `path` unless unchanged or `cancelled`; see [`fs::write_if_changed`].
    pub fn write_if_changed(
        &self,
        path: &ScopedPath,
        data: &[u8],
        cancelled: impl FnOnce() -> bool,
    ) -> FsResult<WriteStatus> {
        fs::write_if_changed(path, data, &self.retry, cancelled)
    }
}

/// Builder for [`CapabilityContext`].
#[derive(Debug, Default)]
pub struct CapabilityContextBuilder {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    roots: Vec<(String, PathBuf, AccessMode)>,
    retry: Option<RetryPolicy>,
}

impl CapabilityContextBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add one environment entry. A repeated key keeps the last value.
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Grant `host_path` as guest root `name` with `mode`.
    pub fn root(mut self, name: impl Into<String>, host_path: impl AsRef<Path>, mode: AccessMode) -> Self {
        self.roots
            .push((name.into(), host_path.as_ref().to_path_buf(), mode));
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<CapabilityContext, ContextError> {
        let mut roots = BTreeMap::new();
        for (name, host_path, mode) in self.roots {
            let root = Root::open(&name, &host_path, mode)?;
            let key = root.name().to_string();
            if roots.contains_key(&key) {
                return Err(ContextError::DuplicateRoot(key));
            }
            roots.insert(key, root);
        }

        Ok(CapabilityContext {
            args: self.args,
            env: self.env,
            roots,
            retry: self.retry.unwrap_or_default(),
        })
    }
}
