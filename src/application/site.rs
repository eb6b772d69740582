//! Wiring of the collaborators into a ready-to-run build session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::application::catalog::Catalog;
use crate::application::css_audit::CssAuditHook;
use crate::application::error::AppError;
use crate::application::feed::FeedHook;
use crate::application::file_cache::FileCache;
use crate::application::output::OutputWriter;
use crate::application::render::MarkdownRenderer;
use crate::build::{BuildConfig, BuildDriver, BuildSession, DependencyGraph};
use crate::config::Settings;
use crate::infra::error::InfraError;

/// A loaded site: its catalog plus the session that builds it.
pub struct Site {
    content_dir: PathBuf,
    catalog: Catalog,
    file_cache: Arc<FileCache>,
    css_audit: Arc<CssAuditHook>,
    session: BuildSession,
}

impl Site {
    /// Load the catalog and assemble renderer, writer, hooks and session.
    pub async fn open(settings: &Settings) -> Result<Self, AppError> {
        let content_dir =
            std::path::absolute(&settings.site.content_dir).map_err(InfraError::from)?;
        let output_dir =
            std::path::absolute(&settings.site.output_dir).map_err(InfraError::from)?;

        let catalog = Catalog::load(&content_dir).await?;
        let config = BuildConfig::from(&settings.build);

        let file_cache = Arc::new(FileCache::new(settings.build.file_cache_capacity));
        let renderer = Arc::new(MarkdownRenderer::new(Arc::clone(&file_cache), &content_dir));
        let writer = Arc::new(OutputWriter::new(&output_dir));

        let mut site_settings = settings.site.clone();
        site_settings.output_dir = output_dir.clone();
        let feed = Arc::new(FeedHook::new(&site_settings));
        let css_audit = Arc::new(CssAuditHook::new(
            content_dir.join(&settings.site.stylesheet_dir),
        ));

        let driver = BuildDriver::new(
            config.clone(),
            renderer,
            writer,
            Arc::new(DependencyGraph::new()),
        )
        .with_hook(feed)
        .with_hook(Arc::clone(&css_audit) as _);

        let session = BuildSession::new(
            config,
            catalog.units().iter().cloned(),
            driver,
            Arc::clone(&file_cache) as _,
        );

        info!(
            content_dir = %content_dir.display(),
            output_dir = %output_dir.display(),
            units = catalog.len(),
            "Site opened"
        );

        Ok(Self {
            content_dir,
            catalog,
            file_cache,
            css_audit,
            session,
        })
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn file_cache(&self) -> &Arc<FileCache> {
        &self.file_cache
    }

    pub fn css_audit(&self) -> &Arc<CssAuditHook> {
        &self.css_audit
    }

    pub fn session(&self) -> &BuildSession {
        &self.session
    }
}
