//! Granted filesystem roots and path resolution against them.
//!
//! A root maps a guest name (an absolute guest path such as `/` or `/data`)
//! onto a canonical host directory. Resolution is lexical first: the
//! requested path is cleaned relative to the root and rejected if any `..`
//! survives at its head. It then follows the deepest existing ancestor on the
//! host and rejects it if its canonical form leaves the root (symlink escape).

use std::fs;
use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

use crate::access::{Access, AccessMode};
use crate::error::{CapabilityViolation, ContextError};

/// A filesystem root granted to an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    name: String,
    path: PathBuf,
    mode: AccessMode,
}

impl Root {
    /// Open `host_path` as root `name`. The host path is canonicalised.
    pub(crate) fn open(name: &str, host_path: &Path, mode: AccessMode) -> Result<Self, ContextError> {
        if !name.starts_with('/') {
            return Err(ContextError::InvalidRootName(name.to_string()));
        }
        let name = PathBuf::from(name).clean().to_string_lossy().into_owned();

        let path = fs::canonicalize(host_path).map_err(|source| ContextError::RootUnavailable {
            name: name.clone(),
            path: host_path.to_path_buf(),
            source,
        })?;
        if !path.is_dir() {
            return Err(ContextError::NotADirectory { name, path });
        }

        Ok(Self { name, path, mode })
    }

    /// Guest name of this root, e.g. `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical host directory backing this root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// If `guest` lies under this root's name, the remainder relative to it.
    pub(crate) fn strip(&self, guest: &Path) -> Option<PathBuf> {
        guest
            .strip_prefix(&self.name)
            .ok()
            .map(|rest| rest.to_path_buf())
    }

    /// Number of components in this root's guest name (longest match wins).
    pub(crate) fn depth(&self) -> usize {
        Path::new(&self.name).components().count()
    }

    /// Resolve `remainder` (relative to this root) for `access`.
    ///
    /// `requested` is the path as the caller spelled it, used in errors only.
    pub(crate) fn resolve(
        &self,
        requested: &str,
        remainder: &Path,
        access: Access,
    ) -> Result<ScopedPath, CapabilityViolation> {
        let cleaned = remainder.clean();
        let escapes = cleaned
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(CapabilityViolation::Escape {
                path: requested.to_string(),
                root: self.name.clone(),
            });
        }

        if !self.mode.permits(access) {
            return Err(CapabilityViolation::AccessDenied {
                path: requested.to_string(),
                root: self.name.clone(),
                access,
                mode: self.mode,
            });
        }

        let relative = if cleaned == Path::new(".") {
            PathBuf::new()
        } else {
            cleaned
        };
        let host = self.path.join(&relative);
        self.check_symlinks(requested, &host)?;

        Ok(ScopedPath {
            root: self.name.clone(),
            relative,
            host,
            access,
        })
    }

    fn check_symlinks(&self, requested: &str, host: &Path) -> Result<(), CapabilityViolation> {
        let Some(existing) = host.ancestors().find(|p| p.exists()) else {
            return Ok(());
        };
        let inside = fs::canonicalize(existing)
            .map(|canonical| canonical.starts_with(&self.path))
            .unwrap_or(false);
        if inside {
            Ok(())
        } else {
            Err(CapabilityViolation::SymlinkEscape {
                path: requested.to_string(),
                root: self.name.clone(),
            })
        }
    }
}

/// A path that has been checked against a granted root.
///
/// Only [`crate::CapabilityContext::resolve`] constructs these, so holding one
/// is proof that the path lies inside a root and that the root grants
/// [`ScopedPath::access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPath {
    root: String,
    relative: PathBuf,
    host: PathBuf,
    access: Access,
}

impl ScopedPath {
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Path relative to the root, already cleaned.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Host path the operation will touch.
    pub fn host_path(&self) -> &Path {
        &self.host
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// The path as the guest sees it, e.g. `/src/locale/messages.xlf`.
    pub fn guest_path(&self) -> PathBuf {
        Path::new(&self.root).join(&self.relative)
    }
}

impl std::fmt::Display for ScopedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.guest_path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_root(mode: AccessMode) -> (tempfile::TempDir, Root) {
        let dir = tempfile::tempdir().unwrap();
        let root = Root::open("/", dir.path(), mode).unwrap();
        (dir, root)
    }

    #[test]
    fn test_open_rejects_relative_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = Root::open("data", dir.path(), AccessMode::ReadOnly).unwrap_err();
        assert!(matches!(err, ContextError::InvalidRootName(_)));
    }

    #[test]
    fn test_open_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        let err = Root::open("/", &file, AccessMode::ReadOnly).unwrap_err();
        assert!(matches!(err, ContextError::NotADirectory { .. }));
    }

    #[test]
    fn test_open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = Root::open("/", &dir.path().join("nope"), AccessMode::ReadOnly).unwrap_err();
        assert!(matches!(err, ContextError::RootUnavailable { .. }));
    }

    #[test]
    fn test_resolve_inside() {
        let (_dir, root) = make_root(AccessMode::ReadWrite);
        let scoped = root
            .resolve("src/locale/messages.xlf", Path::new("src/locale/messages.xlf"), Access::Read)
            .unwrap();
        assert_eq!(scoped.relative(), Path::new("src/locale/messages.xlf"));
        assert!(scoped.host_path().starts_with(root.path()));
        assert_eq!(scoped.guest_path(), PathBuf::from("/src/locale/messages.xlf"));
    }

    #[test]
    fn test_resolve_dot_dot_that_stays_inside() {
        let (_dir, root) = make_root(AccessMode::ReadWrite);
        let scoped = root
            .resolve("a/../b.txt", Path::new("a/../b.txt"), Access::Read)
            .unwrap();
        assert_eq!(scoped.relative(), Path::new("b.txt"));
    }

    #[test]
    fn test_resolve_escape_is_violation() {
        let (_dir, root) = make_root(AccessMode::ReadWrite);
        let err = root
            .resolve(
                "./outside/../../etc/passwd",
                Path::new("./outside/../../etc/passwd"),
                Access::Read,
            )
            .unwrap_err();
        assert!(matches!(err, CapabilityViolation::Escape { .. }));
    }

    #[test]
    fn test_resolve_root_itself() {
        let (_dir, root) = make_root(AccessMode::ReadOnly);
        let scoped = root.resolve(".", Path::new("."), Access::Read).unwrap();
        assert_eq!(scoped.relative(), Path::new(""));
        assert_eq!(scoped.host_path(), root.path());
    }

    #[test]
    fn test_write_to_read_only_root_denied() {
        let (_dir, root) = make_root(AccessMode::ReadOnly);
        let err = root
            .resolve("out.xlsx", Path::new("out.xlsx"), Access::Write)
            .unwrap_err();
        match err {
            CapabilityViolation::AccessDenied { access, mode, .. } => {
                assert_eq!(access, Access::Write);
                assert_eq!(mode, AccessMode::ReadOnly);
            }
            other => panic!("expected AccessDenied, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_is_violation() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        let (dir, root) = make_root(AccessMode::ReadWrite);
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = root
            .resolve("link/secret.txt", Path::new("link/secret.txt"), Access::Read)
            .unwrap_err();
        assert!(matches!(err, CapabilityViolation::SymlinkEscape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_root_is_fine() {
        let (dir, root) = make_root(AccessMode::ReadWrite);
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        assert!(root
            .resolve("alias/file.txt", Path::new("alias/file.txt"), Access::Write)
            .is_ok());
    }
}
