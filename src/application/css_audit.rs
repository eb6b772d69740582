//! Stylesheet audit comparing declared classes with the classes the site uses.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;

use async_trait::async_trait;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::{debug, info, warn};

use crate::build::{AggregateError, AggregateHook, OutputSet, mutex_lock};

const HOOK_NAME: &str = "css_audit";
const SOURCE: &str = "application::css_audit";

/// Findings of one audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssReport {
    /// Declared in a stylesheet, never used by any output.
    pub unused: Vec<String>,
    /// Used by some output, declared nowhere.
    pub undeclared: Vec<String>,
}

impl CssReport {
    pub fn compare(declared: &BTreeSet<String>, used: &BTreeSet<String>) -> Self {
        Self {
            unused: declared.difference(used).cloned().collect(),
            undeclared: used.difference(declared).cloned().collect(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.unused.is_empty() && self.undeclared.is_empty()
    }
}

/// Warns about unused and undeclared CSS classes after each full build.
///
/// Findings never fail the build.
pub struct CssAuditHook {
    stylesheet_dir: PathBuf,
    last_report: Mutex<Option<CssReport>>,
}

impl CssAuditHook {
    pub fn new(stylesheet_dir: impl Into<PathBuf>) -> Self {
        Self {
            stylesheet_dir: stylesheet_dir.into(),
            last_report: Mutex::new(None),
        }
    }

    pub fn last_report(&self) -> Option<CssReport> {
        mutex_lock(&self.last_report, SOURCE, "last_report").clone()
    }

    /// Recompute the report from the stylesheets on disk and `outputs`.
    ///
    /// Returns `None` when there are no stylesheets to audit against.
    pub async fn audit(&self, outputs: &OutputSet) -> Result<Option<CssReport>, AggregateError> {
        let stylesheets = stylesheet_files(&self.stylesheet_dir).await?;
        if stylesheets.is_empty() {
            debug!(dir = %self.stylesheet_dir.display(), "No stylesheets found, skipping CSS audit");
            return Ok(None);
        }

        let mut declared = BTreeSet::new();
        for path in &stylesheets {
            let css = tokio::fs::read_to_string(path).await.map_err(|err| {
                AggregateError::new(HOOK_NAME, format!("failed to read `{}`: {err}", path.display()))
            })?;
            declared.extend(declared_classes(&css));
        }

        let mut used = BTreeSet::new();
        for rendered in outputs.values() {
            used.extend(used_classes(&rendered.output.html)?);
        }

        Ok(Some(CssReport::compare(&declared, &used)))
    }
}

#[async_trait]
impl AggregateHook for CssAuditHook {
    fn name(&self) -> &'static str {
        HOOK_NAME
    }

    async fn run(&self, outputs: &OutputSet) -> Result<(), AggregateError> {
        let report = self.audit(outputs).await?;

        if let Some(report) = report.as_ref() {
            if report.is_clean() {
                info!("CSS audit found no issues");
            }
            if !report.unused.is_empty() {
                warn!(
                    count = report.unused.len(),
                    classes = %report.unused.join(", "),
                    "Unused CSS classes"
                );
            }
            if !report.undeclared.is_empty() {
                warn!(
                    count = report.undeclared.len(),
                    classes = %report.undeclared.join(", "),
                    "Undeclared CSS classes"
                );
            }
        }

        *mutex_lock(&self.last_report, SOURCE, "run") = report;
        Ok(())
    }
}

async fn stylesheet_files(dir: &Path) -> Result<Vec<PathBuf>, AggregateError> {
    let read_error = |err: std::io::Error| {
        AggregateError::new(HOOK_NAME, format!("failed to list `{}`: {err}", dir.display()))
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(read_error(err)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "css") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Class names appearing in selector preludes.
///
/// Declaration bodies are skipped so that values like `0.5em` or
/// `url(a.png)` are not mistaken for classes.
pub fn declared_classes(css: &str) -> BTreeSet<String> {
    let css = strip_comments(css);
    let mut classes = BTreeSet::new();
    let mut prelude = String::new();

    for ch in css.chars() {
        match ch {
            '{' => {
                if !prelude.trim_start().starts_with('@') {
                    collect_selector_classes(&prelude, &mut classes);
                }
                prelude.clear();
            }
            '}' | ';' => prelude.clear(),
            _ => prelude.push(ch),
        }
    }

    classes
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn collect_selector_classes(selector: &str, classes: &mut BTreeSet<String>) {
    let mut chars = selector.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if ch != '.' {
            continue;
        }
        let mut name = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_alphanumeric() || next == '-' || next == '_' {
                name.push(next);
                chars.next();
            } else if next == '\\' {
                chars.next();
                if let Some((_, escaped)) = chars.next() {
                    name.push(escaped);
                }
            } else {
                break;
            }
        }
        if name.chars().next().is_some_and(|first| !first.is_ascii_digit()) {
            classes.insert(name);
        }
    }
}

/// Class names used by `class` attributes in an HTML document.
pub fn used_classes(html: &str) -> Result<BTreeSet<String>, AggregateError> {
    let found = Rc::new(RefCell::new(BTreeSet::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("[class]", {
                let found = Rc::clone(&found);
                move |el| {
                    if let Some(class) = el.get_attribute("class") {
                        found
                            .borrow_mut()
                            .extend(class.split_whitespace().map(str::to_string));
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| AggregateError::new(HOOK_NAME, format!("failed to scan output: {err}")))?;

    Ok(found.take())
}
