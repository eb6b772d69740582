//! Content catalog: the fixed set of units a build generation renders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use time::{Date, macros::format_description};
use tracing::{debug, info};

use crate::domain::entities::ContentUnit;
use crate::domain::error::DomainError;
use crate::domain::types::{UnitId, UnitKind};

const PAGES_DIR: &str = "pages";
const POSTS_DIR: &str = "posts";
const FRONT_MATTER_DELIMITER: &str = "+++";
const INDEX_STEM: &str = "index";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid front matter in `{path}`: {message}")]
    FrontMatter { path: PathBuf, message: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CatalogError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn front_matter(path: &Path, message: impl Into<String>) -> Self {
        Self::FrontMatter {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Metadata block at the top of a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<Date>,
    pub slug: Option<String>,
}

impl FrontMatter {
    /// Parse the TOML body of a front matter block.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let table: toml::Table = toml::from_str(raw).map_err(|err| err.to_string())?;

        let text = |field: &str| -> Result<Option<String>, String> {
            match table.get(field) {
                None => Ok(None),
                Some(toml::Value::String(value)) => {
                    let trimmed = value.trim();
                    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
                }
                Some(other) => Err(format!(
                    "`{field}` must be a string, found {}",
                    other.type_str()
                )),
            }
        };

        let date = match table.get("date") {
            None => None,
            Some(toml::Value::String(value)) => Some(parse_date(value.trim())?),
            Some(toml::Value::Datetime(value)) => Some(parse_date(&value.to_string())?),
            Some(other) => {
                return Err(format!(
                    "`date` must be a YYYY-MM-DD date, found {}",
                    other.type_str()
                ));
            }
        };

        Ok(Self {
            title: text("title")?,
            description: text("description")?,
            date,
            slug: text("slug")?,
        })
    }
}

/// Split a source document into its front matter block and body.
///
/// A document without a leading `+++` line has no front matter. An opening
/// delimiter without a closing one is an error.
pub fn split_front_matter(source: &str) -> Result<(Option<&str>, &str), String> {
    let trimmed = source.trim_start_matches('\u{feff}');
    let Some(rest) = strip_delimiter_line(trimmed) else {
        return Ok((None, trimmed));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(front), body));
        }
        offset += line.len();
    }

    Err(format!("missing closing `{FRONT_MATTER_DELIMITER}` delimiter"))
}

fn strip_delimiter_line(source: &str) -> Option<&str> {
    let rest = source.strip_prefix(FRONT_MATTER_DELIMITER)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

fn parse_date(value: &str) -> Result<Date, String> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value, &format).map_err(|err| format!("invalid date `{value}`: {err}"))
}

/// Every unit of one build generation, in render order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    units: Vec<Arc<ContentUnit>>,
}

impl Catalog {
    /// Scan `<content>/pages/*.md` then `<content>/posts/*.md`.
    ///
    /// Missing directories contribute no units. Ids follow load order.
    pub async fn load(content_dir: &Path) -> Result<Self, CatalogError> {
        let mut units = Vec::new();
        let mut urls: HashMap<String, PathBuf> = HashMap::new();

        for kind in [UnitKind::Page, UnitKind::Post] {
            let dir = content_dir.join(match kind {
                UnitKind::Page => PAGES_DIR,
                UnitKind::Post => POSTS_DIR,
            });

            for source in markdown_files(&dir).await? {
                let raw = tokio::fs::read_to_string(&source)
                    .await
                    .map_err(|err| CatalogError::io(&source, err))?;
                let id = UnitId::new(units.len() as u32);
                let unit = build_unit(id, kind, source, &raw)?;

                if let Some(previous) = urls.insert(unit.url.clone(), unit.source.clone()) {
                    return Err(DomainError::validation(format!(
                        "`{}` and `{}` both publish to url `/{}`",
                        previous.display(),
                        unit.source.display(),
                        unit.url
                    ))
                    .into());
                }

                debug!(unit = %unit.id, kind = kind.as_str(), url = %unit.url, "Catalogued content unit");
                units.push(Arc::new(unit));
            }
        }

        info!(
            content_dir = %content_dir.display(),
            unit_count = units.len(),
            "Content catalog loaded"
        );

        Ok(Self { units })
    }

    pub fn from_units(units: Vec<ContentUnit>) -> Self {
        Self {
            units: units.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn units(&self) -> &[Arc<ContentUnit>] {
        &self.units
    }

    pub fn pages(&self) -> impl Iterator<Item = &Arc<ContentUnit>> {
        self.units.iter().filter(|unit| unit.kind == UnitKind::Page)
    }

    pub fn posts(&self) -> impl Iterator<Item = &Arc<ContentUnit>> {
        self.units.iter().filter(|unit| unit.kind == UnitKind::Post)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

async fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(CatalogError::io(dir, err)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| CatalogError::io(dir, err))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|err| CatalogError::io(&path, err))?
            .is_file();
        if is_file && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn build_unit(
    id: UnitId,
    kind: UnitKind,
    source: PathBuf,
    raw: &str,
) -> Result<ContentUnit, CatalogError> {
    let (front, _body) =
        split_front_matter(raw).map_err(|message| CatalogError::front_matter(&source, message))?;
    let front = match front {
        Some(block) => FrontMatter::parse(block)
            .map_err(|message| CatalogError::front_matter(&source, message))?,
        None => FrontMatter::default(),
    };

    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| DomainError::invariant(format!("`{}` has no file stem", source.display())))?;

    let url = match kind {
        UnitKind::Page => page_url(front.slug.as_deref(), &stem, &source)?,
        UnitKind::Post => {
            let slug = front
                .slug
                .clone()
                .unwrap_or_else(|| slug::slugify(&stem));
            if slug.is_empty() {
                return Err(DomainError::validation(format!(
                    "`{}` does not yield a usable slug",
                    source.display()
                ))
                .into());
            }
            ensure_contained(&slug, &source)?;
            format!("{POSTS_DIR}/{slug}")
        }
    };

    Ok(ContentUnit {
        id,
        kind,
        source,
        url,
        title: front.title,
        description: front.description,
        date: front.date,
    })
}

fn page_url(slug: Option<&str>, stem: &str, source: &Path) -> Result<String, DomainError> {
    let raw = slug.unwrap_or(stem).trim_matches('/');
    ensure_contained(raw, source)?;
    if raw == INDEX_STEM {
        Ok(String::new())
    } else {
        Ok(raw.to_string())
    }
}

/// Urls become output paths, so no segment may step out of the output root.
fn ensure_contained(url: &str, source: &Path) -> Result<(), DomainError> {
    if url
        .split(['/', '\\'])
        .any(|segment| matches!(segment.trim(), "." | ".."))
    {
        return Err(DomainError::validation(format!(
            "`{}` declares url `{url}` outside the output directory",
            source.display()
        )));
    }
    Ok(())
}
