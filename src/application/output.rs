//! Filesystem output sink.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::build::{OutputSink, PublishOutcome, RenderOutput, SinkError};
use crate::domain::entities::ContentUnit;

const INDEX_FILE: &str = "index.html";

/// Writes each unit to `<output>/<url>/index.html`.
///
/// A file whose content hash already matches is left untouched so that
/// downstream tooling watching the output tree sees only real changes.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn target_path(&self, unit: &ContentUnit) -> PathBuf {
        let mut path = self.output_dir.clone();
        for segment in unit.url.split('/').filter(|segment| !segment.is_empty()) {
            path.push(segment);
        }
        path.push(INDEX_FILE);
        path
    }
}

#[async_trait]
impl OutputSink for OutputWriter {
    async fn publish(
        &self,
        unit: &ContentUnit,
        output: &RenderOutput,
    ) -> Result<PublishOutcome, SinkError> {
        let path = self.target_path(unit);
        write_if_changed(&path, output.html.as_bytes()).await
    }
}

/// Write `contents` to `path` unless the file already holds the same bytes.
pub async fn write_if_changed(path: &Path, contents: &[u8]) -> Result<PublishOutcome, SinkError> {
    match tokio::fs::read(path).await {
        Ok(existing) if digest(&existing) == digest(contents) => {
            trace!(path = %path.display(), "Output unchanged");
            return Ok(PublishOutcome::Unchanged);
        }
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(SinkError::io(path, err)),
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| SinkError::io(parent, err))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|err| SinkError::io(path, err))?;

    debug!(path = %path.display(), bytes = contents.len(), "Output written");
    Ok(PublishOutcome::Written)
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::domain::types::{UnitId, UnitKind};

    fn unit(url: &str) -> ContentUnit {
        ContentUnit {
            id: UnitId::new(0),
            kind: UnitKind::Page,
            source: PathBuf::from("content/pages/x.md"),
            url: url.to_string(),
            title: None,
            description: None,
            date: None,
        }
    }

    #[test]
    fn root_url_maps_to_top_level_index() {
        let writer = OutputWriter::new("public");
        assert_eq!(writer.target_path(&unit("")), PathBuf::from("public/index.html"));
        assert_eq!(
            writer.target_path(&unit("posts/hello")),
            PathBuf::from("public/posts/hello/index.html")
        );
    }

    #[tokio::test]
    async fn skips_identical_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = OutputWriter::new(dir.path());
        let unit = unit("about");
        let output = RenderOutput::new("<p>about</p>", HashSet::new());

        assert_eq!(
            writer.publish(&unit, &output).await.expect("publish"),
            PublishOutcome::Written
        );
        assert_eq!(
            writer.publish(&unit, &output).await.expect("publish"),
            PublishOutcome::Unchanged
        );

        let changed = RenderOutput::new("<p>about us</p>", HashSet::new());
        assert_eq!(
            writer.publish(&unit, &changed).await.expect("publish"),
            PublishOutcome::Written
        );
        let written =
            std::fs::read_to_string(dir.path().join("about/index.html")).expect("read output");
        assert_eq!(written, "<p>about us</p>");
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "file, not a directory").expect("write");
        let writer = OutputWriter::new(&blocker);

        let err = writer
            .publish(&unit("about"), &RenderOutput::new("x", HashSet::new()))
            .await
            .expect_err("parent is a file");
        assert!(matches!(err, SinkError::Io { .. }));
    }
}
