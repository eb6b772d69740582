//! Markdown rendering with dependency tracking.
//!
//! Every file a render touches goes through the [`FileCache`], which records
//! its key with the active collector. Local images referenced from the body
//! are recorded as well so that replacing an asset rebuilds its pages.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use comrak::{Options, markdown_to_html};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::{debug, instrument};

use crate::build::{DependencyKey, RenderError, RenderOutput, Renderer, deps};
use crate::domain::entities::ContentUnit;

use super::catalog::{FrontMatter, split_front_matter};
use super::file_cache::FileCache;

pub const LAYOUT_FILE: &str = "layout.html";

const DEFAULT_LAYOUT: &str = "<!DOCTYPE html>
<html lang=\"en\">
<head>
<meta charset=\"utf-8\">
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">
<title>{{ title }}</title>
<meta name=\"description\" content=\"{{ description }}\">
</head>
<body>
<main>
{{ content }}
</main>
</body>
</html>
";

/// Renders markdown units into full HTML documents.
pub struct MarkdownRenderer {
    cache: Arc<FileCache>,
    content_dir: PathBuf,
    options: Options<'static>,
}

impl MarkdownRenderer {
    pub fn new(cache: Arc<FileCache>, content_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            content_dir: content_dir.into(),
            options: default_options(),
        }
    }

    pub fn layout_path(&self) -> PathBuf {
        self.content_dir.join(LAYOUT_FILE)
    }

    async fn render_document(&self, unit: &ContentUnit) -> Result<String, RenderError> {
        let source = self
            .cache
            .read_to_string(&unit.source)
            .await
            .map_err(|err| RenderError::io(&unit.source, err))?;

        let (front, body) = split_front_matter(&source)
            .map_err(|message| RenderError::FrontMatter { message })?;
        let front = match front {
            Some(block) => {
                FrontMatter::parse(block).map_err(|message| RenderError::FrontMatter { message })?
            }
            None => FrontMatter::default(),
        };
        // Metadata comes from the source as read now, not as catalogued at startup.
        let current = ContentUnit {
            title: front.title,
            description: front.description,
            ..unit.clone()
        };

        let html = markdown_to_html(body, &self.options);
        let base_dir = unit.source.parent().unwrap_or_else(|| Path::new(""));
        for asset in local_images(&html)? {
            let path = resolve_asset(&self.content_dir, base_dir, &asset);
            deps::record(DependencyKey::from_path(path));
        }

        let layout = self.load_layout().await?;
        Ok(apply_layout(&layout, &current, &html))
    }

    async fn load_layout(&self) -> Result<Arc<str>, RenderError> {
        let path = self.layout_path();
        match self.cache.read_to_string(&path).await {
            Ok(layout) => Ok(layout),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Layout missing, using built-in layout");
                Ok(Arc::from(DEFAULT_LAYOUT))
            }
            Err(err) => Err(RenderError::io(path, err)),
        }
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    #[instrument(skip_all, fields(unit = %unit.id, url = %unit.url))]
    async fn render(&self, unit: &ContentUnit) -> Result<RenderOutput, RenderError> {
        let (result, dependencies) = deps::with_collector(self.render_document(unit)).await;
        let html = result?;
        debug!(dependency_count = dependencies.len(), "Unit rendered");
        Ok(RenderOutput::new(html, dependencies))
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.description_lists = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;

    options
}

/// `src` values of images that live on the local filesystem.
fn local_images(html: &str) -> Result<Vec<String>, RenderError> {
    let found = Rc::new(RefCell::new(Vec::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", {
                let found = Rc::clone(&found);
                move |el| {
                    if let Some(src) = el.get_attribute("src")
                        && is_local_reference(&src)
                    {
                        found.borrow_mut().push(src);
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    Ok(found.take())
}

fn is_local_reference(src: &str) -> bool {
    let src = src.trim();
    !(src.is_empty()
        || src.starts_with('#')
        || src.starts_with("//")
        || src.contains("://")
        || src.starts_with("data:")
        || src.starts_with("mailto:"))
}

/// Site-absolute references resolve against the content root, others
/// against the directory of the referencing source file.
fn resolve_asset(content_dir: &Path, base_dir: &Path, src: &str) -> PathBuf {
    let src = src.trim();
    let src = src.split(['?', '#']).next().unwrap_or(src);
    match src.strip_prefix('/') {
        Some(rooted) => content_dir.join(rooted),
        None => base_dir.join(src),
    }
}

/// Fills `{{ title }}`, `{{ description }}` and `{{ content }}` in a single
/// pass, so substituted text is never scanned for placeholders again.
fn apply_layout(layout: &str, unit: &ContentUnit, content: &str) -> String {
    let title = html_escape(unit.label());
    let description = html_escape(unit.description.as_deref().unwrap_or_default());

    let mut output = String::with_capacity(layout.len() + content.len());
    let mut rest = layout;
    while let Some(start) = rest.find("{{") {
        let (before, tail) = rest.split_at(start);
        output.push_str(before);
        let Some(end) = tail.find("}}") else {
            rest = tail;
            break;
        };
        let placeholder = &tail[..end + 2];
        match tail[2..end].trim() {
            "title" => output.push_str(&title),
            "description" => output.push_str(&description),
            "content" => output.push_str(content),
            _ => output.push_str(placeholder),
        }
        rest = &tail[end + 2..];
    }
    output.push_str(rest);
    output
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
