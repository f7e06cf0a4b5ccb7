//! Editor ↔ agent path translation.
//!
//! Translation is lexical: the agent-side root usually does not exist on the
//! host, so nothing is canonicalized. A path's position relative to the
//! workspace root is reapplied under the other root; paths outside the root
//! pass through unchanged.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::WorkspaceRoot;

/// Lexically normalize `path`: drop `.` segments and fold `..` into its parent.
///
/// `..` at the root is discarded, matching how the OS resolves `/..`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                let at_root = normalized
                    .components()
                    .next_back()
                    .map_or(true, |c| matches!(c, Component::RootDir | Component::Prefix(_)));
                if !at_root {
                    normalized.pop();
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

/// Stateless translator between an editor-side root and its agent-side twin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTranslator {
    workspace_root: PathBuf,
    container_root: PathBuf,
}

impl PathTranslator {
    /// Build a translator for `(workspace_root, container_root)`.
    #[must_use]
    pub fn new(workspace_root: &Path, container_root: &Path) -> Self {
        Self {
            workspace_root: normalize(workspace_root),
            container_root: normalize(container_root),
        }
    }

    /// Build a translator from a resolved workspace.
    #[must_use]
    pub fn for_workspace(root: &WorkspaceRoot) -> Self {
        Self::new(&root.host_root, &root.agent_root)
    }

    /// Both roots are the same location.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.workspace_root == self.container_root
    }

    /// Editor path → agent path.
    #[must_use]
    pub fn to_agent(&self, path: &Path) -> PathBuf {
        remap(path, &self.workspace_root, &self.container_root).unwrap_or_else(|| {
            debug!(path = %path.display(), root = %self.workspace_root.display(),
                "path outside workspace root, passing through");
            path.to_path_buf()
        })
    }

    /// Agent path → editor path; the inverse of [`Self::to_agent`].
    #[must_use]
    pub fn to_editor(&self, path: &Path) -> PathBuf {
        remap(path, &self.container_root, &self.workspace_root).unwrap_or_else(|| {
            debug!(path = %path.display(), root = %self.container_root.display(),
                "path outside container root, passing through");
            path.to_path_buf()
        })
    }

    /// Translate a single launch-spec string to the agent view.
    ///
    /// Absolute paths and `key=/abs/path` assignments are rewritten; anything
    /// else (flags, names, URLs) is returned unchanged.
    #[must_use]
    pub fn translate_arg(&self, arg: &str) -> String {
        if Path::new(arg).is_absolute() {
            return self.to_agent(Path::new(arg)).to_string_lossy().into_owned();
        }
        if let Some((key, value)) = arg.split_once('=') {
            if Path::new(value).is_absolute() {
                let translated = self.to_agent(Path::new(value));
                return format!("{key}={}", translated.to_string_lossy());
            }
        }
        arg.to_owned()
    }

    /// Rewrite host paths inside embedded tool/server launch specs, in place.
    pub fn translate_launch_specs(&self, specs: &mut [Value]) {
        if self.is_identity() {
            return;
        }
        for spec in specs {
            self.translate_value(spec);
        }
    }

    fn translate_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                let translated = self.translate_arg(s);
                if translated != *s {
                    *s = translated;
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.translate_value(v)),
            Value::Object(map) => {
                for (key, v) in map.iter_mut() {
                    // Names and URLs are identifiers, not filesystem locations.
                    if matches!(key.as_str(), "name" | "type" | "url") {
                        continue;
                    }
                    self.translate_value(v);
                }
            }
            _ => {}
        }
    }
}

/// Re-root `path` from `from` to `to`, or `None` when it is outside `from`.
fn remap(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let normalized = normalize(path);
    let relative = normalized.strip_prefix(from).ok()?;
    let mut out = to.to_path_buf();
    for component in relative.components() {
        out.push(component);
    }
    Some(out)
}
