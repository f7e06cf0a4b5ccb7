//! Workspace roots and the editor/agent path namespaces.
//!
//! The editor addresses files by host paths; an agent running in an isolated
//! container sees the same tree mounted somewhere else. A [`WorkspaceResolver`]
//! decides which tree a `cwd` belongs to, and a [`PathTranslator`] moves paths
//! between the two views.

pub mod resolver;
pub mod translator;

use std::path::{Path, PathBuf};

use crate::Result;

pub use resolver::MappedWorkspaceResolver;
pub use translator::{normalize, PathTranslator};

/// A resolved workspace: the editor-side root and its agent-side equivalent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    /// Root as seen by the editor.
    pub host_root: PathBuf,
    /// Root as seen by the agent process.
    pub agent_root: PathBuf,
}

impl WorkspaceRoot {
    /// A root the agent sees at the same location as the editor.
    #[must_use]
    pub fn identity(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            host_root: root.clone(),
            agent_root: root,
        }
    }
}

/// Maps an editor-supplied path to the workspace it belongs to.
///
/// Implemented outside the proxy core; [`MappedWorkspaceResolver`] is the
/// configuration-driven default.
pub trait WorkspaceResolver: Send + Sync {
    /// Resolve `path` to its workspace root.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Workspace`](crate::AppError::Workspace) when the
    /// path cannot be placed in any workspace.
    fn resolve(&self, path: &Path) -> Result<WorkspaceRoot>;
}
