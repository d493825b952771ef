//! Directory root
//!
//! The single directory every protocol serves from. All path resolution goes
//! through [`DirectoryRoot`] so that no listener can touch anything outside it.

use log::warn;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ConfinementError;
use crate::storage::validation::normalize_virtual_path;

pub const SECURITY_TARGET: &str = "rax_share::security";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRoot {
    path: PathBuf,
}

impl DirectoryRoot {
    /// Validates and canonicalizes the directory to serve.
    ///
    /// Symlinks in the root itself are resolved here, once.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfinementError> {
        let requested = path.as_ref();
        let canonical = requested
            .canonicalize()
            .map_err(|_| ConfinementError::NotADirectory(requested.display().to_string()))?;

        let metadata = fs::metadata(&canonical)?;
        if !metadata.is_dir() {
            return Err(ConfinementError::NotADirectory(
                canonical.display().to_string(),
            ));
        }
        if metadata.permissions().readonly() {
            return Err(ConfinementError::ReadOnly(canonical.display().to_string()));
        }

        Ok(Self { path: canonical })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a client path to an absolute path under the root.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf, ConfinementError> {
        match normalize_virtual_path(virtual_path) {
            Ok(relative) if relative.as_os_str().is_empty() => Ok(self.path.clone()),
            Ok(relative) => Ok(self.path.join(relative)),
            Err(e) => {
                if let ConfinementError::Escape(_) = e {
                    warn!(
                        target: SECURITY_TARGET,
                        "Rejected path escape attempt {:?} (root: {})",
                        virtual_path,
                        self.path.display()
                    );
                }
                Err(e)
            }
        }
    }

    /// Verifies that `path`, after following symlinks in its deepest existing
    /// ancestor, still lies under the root.
    pub fn confine(&self, path: &Path) -> Result<(), ConfinementError> {
        let mut probe = path;
        loop {
            match probe.canonicalize() {
                Ok(real) => {
                    if real.starts_with(&self.path) {
                        return Ok(());
                    }
                    warn!(
                        target: SECURITY_TARGET,
                        "Rejected symlink escape {} -> {} (root: {})",
                        path.display(),
                        real.display(),
                        self.path.display()
                    );
                    return Err(ConfinementError::Escape(path.display().to_string()));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => match probe.parent() {
                    Some(parent) => probe = parent,
                    None => return Err(e.into()),
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// [`resolve`](Self::resolve) followed by [`confine`](Self::confine).
    pub fn resolve_confined(&self, virtual_path: &str) -> Result<PathBuf, ConfinementError> {
        let path = self.resolve(virtual_path)?;
        self.confine(&path)?;
        Ok(path)
    }

    /// Client-facing spelling of a path under the root, always `/`-rooted.
    pub fn to_virtual(&self, real: &Path) -> String {
        match real.strip_prefix(&self.path) {
            Ok(relative) => {
                let joined = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("/{}", joined)
            }
            Err(_) => "/".to_string(),
        }
    }

    /// A fresh, server-chosen file path directly under the root.
    pub fn unique_file(&self) -> PathBuf {
        self.path.join(Uuid::new_v4().to_string())
    }
}
