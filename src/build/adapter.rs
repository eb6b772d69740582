//! External boundaries of the build engine.
//!
//! The engine does not know how a unit is rendered, where its output goes,
//! or what corpus-wide artifacts exist. Those are supplied as trait objects.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::ContentUnit;
use crate::domain::types::UnitId;

use super::keys::DependencyKey;

/// Result of rendering one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub html: String,
    /// Every key the render consumed.
    pub dependencies: HashSet<DependencyKey>,
}

impl RenderOutput {
    pub fn new(html: impl Into<String>, dependencies: HashSet<DependencyKey>) -> Self {
        Self {
            html: html.into(),
            dependencies,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid front matter: {message}")]
    FrontMatter { message: String },
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("document rewrite failed: {message}")]
    Document { message: String },
    #[error("{0}")]
    Other(String),
}

impl RenderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Turns one content unit into output plus the keys it depended on.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, unit: &ContentUnit) -> Result<RenderOutput, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persists rendered output.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn publish(
        &self,
        unit: &ContentUnit,
        output: &RenderOutput,
    ) -> Result<PublishOutcome, SinkError>;
}

/// Sink that keeps nothing beyond the driver's in-memory output set.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl OutputSink for DiscardSink {
    async fn publish(
        &self,
        _unit: &ContentUnit,
        _output: &RenderOutput,
    ) -> Result<PublishOutcome, SinkError> {
        Ok(PublishOutcome::Unchanged)
    }
}

/// Last successful output of a unit.
#[derive(Debug, Clone)]
pub struct RenderedUnit {
    pub unit: Arc<ContentUnit>,
    pub output: RenderOutput,
}

/// Full output set, ordered by unit id.
pub type OutputSet = BTreeMap<UnitId, RenderedUnit>;

#[derive(Debug, Clone, Error)]
#[error("aggregate hook `{hook}` failed: {message}")]
pub struct AggregateError {
    pub hook: &'static str,
    pub message: String,
}

impl AggregateError {
    pub fn new(hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            hook,
            message: message.into(),
        }
    }
}

/// Corpus-wide work run once after a full build (feeds, audits).
#[async_trait]
pub trait AggregateHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, outputs: &OutputSet) -> Result<(), AggregateError>;
}
