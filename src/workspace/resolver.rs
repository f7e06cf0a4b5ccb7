//! Configuration-driven [`WorkspaceResolver`].

use std::path::Path;

use tracing::debug;

use super::translator::normalize;
use super::{WorkspaceResolver, WorkspaceRoot};
use crate::config::WorkspaceMapping;
use crate::{AppError, Result};

/// Resolves a path against the `[[workspace]]` mappings from the config file.
///
/// The longest `host_root` containing the path wins. A path covered by no
/// mapping becomes its own workspace root and the agent sees it unchanged,
/// which is the right answer for agents spawned directly on the host.
#[derive(Debug, Clone, Default)]
pub struct MappedWorkspaceResolver {
    mappings: Vec<WorkspaceMapping>,
}

impl MappedWorkspaceResolver {
    /// Create a resolver over `mappings`.
    #[must_use]
    pub fn new(mappings: Vec<WorkspaceMapping>) -> Self {
        let mappings = mappings
            .into_iter()
            .map(|m| WorkspaceMapping {
                host_root: normalize(&m.host_root),
                container_root: normalize(&m.container_root),
            })
            .collect();
        Self { mappings }
    }
}

impl WorkspaceResolver for MappedWorkspaceResolver {
    fn resolve(&self, path: &Path) -> Result<WorkspaceRoot> {
        if !path.is_absolute() {
            return Err(AppError::Workspace(format!(
                "cwd must be an absolute path: {}",
                path.display()
            )));
        }
        let normalized = normalize(path);

        let best = self
            .mappings
            .iter()
            .filter(|m| normalized.starts_with(&m.host_root))
            .max_by_key(|m| m.host_root.components().count());

        if let Some(mapping) = best {
            debug!(
                cwd = %normalized.display(),
                host_root = %mapping.host_root.display(),
                container_root = %mapping.container_root.display(),
                "workspace resolved via mapping"
            );
            return Ok(WorkspaceRoot {
                host_root: mapping.host_root.clone(),
                agent_root: mapping.container_root.clone(),
            });
        }

        Ok(WorkspaceRoot::identity(normalized))
    }
}
