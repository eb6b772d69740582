//! Content units known to a build generation.

use std::path::PathBuf;

use serde::Serialize;
use time::Date;

use crate::domain::types::{UnitId, UnitKind};

/// One independently renderable item of the corpus.
///
/// Metadata is opaque to the build engine; it is carried through to the
/// renderer and the aggregate hooks untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub source: PathBuf,
    /// Site-relative url without leading or trailing slash; empty for the root.
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<Date>,
}

impl ContentUnit {
    /// Human-readable label used in build logs: the title when present, the url otherwise.
    pub fn label(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ if self.url.is_empty() => "/",
            _ => self.url.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(title: Option<&str>, url: &str) -> ContentUnit {
        ContentUnit {
            id: UnitId::new(0),
            kind: UnitKind::Page,
            source: PathBuf::from("content/pages/about.md"),
            url: url.to_string(),
            title: title.map(str::to_string),
            description: None,
            date: None,
        }
    }

    #[test]
    fn label_prefers_title() {
        assert_eq!(unit(Some("About"), "about").label(), "About");
    }

    #[test]
    fn label_falls_back_to_url() {
        assert_eq!(unit(None, "about").label(), "about");
        assert_eq!(unit(Some("  "), "about").label(), "about");
        assert_eq!(unit(None, "").label(), "/");
    }
}
