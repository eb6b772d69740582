//! Dependency key definitions.
//!
//! A `DependencyKey` names an external resource a render consumed: a source
//! file, a referenced asset, a template. The engine never looks inside a key.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque identifier for a resource a render may depend on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyKey(String);

impl DependencyKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Key for a filesystem resource.
    ///
    /// The path is normalised lexically (no filesystem access) so that
    /// `content/./a.md` and `content/a.md` produce the same key.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self(normalize_path(path.as_ref()).to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for DependencyKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DependencyKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DependencyKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resolve `.` and `..` segments without consulting the filesystem.
///
/// Leading `..` segments of a relative path are kept, since there is nothing
/// to pop them against.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
