use std::path::{Path, PathBuf};
use thiserror::Error;

/// Confines replacement targets to a workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical workspace root
    workspace_root: PathBuf,
    /// Canonical directories inside the workspace that must never be rewritten
    protected_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in protected directory: {path} (protected: {protected})")]
    ProtectedPath { path: PathBuf, protected: PathBuf },

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize().map_err(|source| SafetyError::Canonicalize {
        path: path.to_path_buf(),
        source,
    })
}

impl WorkspaceGuard {
    /// Create a guard for `workspace_root`.
    ///
    /// Version-control metadata (`.git`, `.hg`, `.svn`) inside the workspace
    /// is protected.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref();
        let vcs_dirs = [".git", ".hg", ".svn"]
            .iter()
            .map(|dir| workspace_root.join(dir))
            .filter(|dir| dir.exists())
            .collect();
        Self::with_protected(workspace_root, vcs_dirs)
    }

    /// Create a guard with an explicit protected list. Every protected path
    /// must exist.
    pub fn with_protected(
        workspace_root: impl AsRef<Path>,
        protected: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        let workspace_root = canonicalize(workspace_root.as_ref())?;
        let protected_paths = protected
            .iter()
            .map(|path| canonicalize(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            workspace_root,
            protected_paths,
        })
    }

    /// Check that a target file may be rewritten.
    ///
    /// Relative paths are resolved against the workspace root. Returns the
    /// canonical path. The file must exist.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        // Canonicalize to resolve symlinks and .. components
        let canonical = canonicalize(&absolute)?;

        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical,
                workspace: self.workspace_root.clone(),
            });
        }

        if let Some(protected) = self
            .protected_paths
            .iter()
            .find(|protected| canonical.starts_with(protected))
        {
            return Err(SafetyError::ProtectedPath {
                path: canonical.clone(),
                protected: protected.clone(),
            });
        }

        Ok(canonical)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
