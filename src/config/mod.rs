//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{BuildArgs, BuildOverrides, CliArgs, Command, DevArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_OUTPUT_DIR: &str = "public";
const DEFAULT_CNAME_FILE: &str = "CNAME";
const DEFAULT_STYLESHEET_DIR: &str = "styles";
const DEFAULT_COPYRIGHT: &str = "";
const DEFAULT_DEBOUNCE_MS: u64 = 50;
const DEFAULT_RENDER_CONCURRENCY: u64 = 4;
const DEFAULT_FILE_CACHE_CAPACITY: u64 = 512;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub build: BuildSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Public host name; when absent it is read from `cname_file`.
    pub host: Option<String>,
    pub cname_file: PathBuf,
    pub stylesheet_dir: PathBuf,
    pub feed: FeedSettings,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub title: Option<String>,
    pub description: Option<String>,
    pub copyright: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub debounce: Duration,
    pub render_concurrency: NonZeroUsize,
    pub file_cache_capacity: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    if let Some(command) = cli.command.as_ref() {
        raw.apply_overrides(command.overrides());
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    build: RawBuildSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &BuildOverrides) {
        if let Some(dir) = overrides.content_dir.as_ref() {
            self.site.content_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.site.output_dir = Some(dir.clone());
        }
        if let Some(debounce) = overrides.debounce_ms {
            self.build.debounce_ms = Some(debounce);
        }
        if let Some(concurrency) = overrides.render_concurrency {
            self.build.render_concurrency = Some(concurrency);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            site,
            build,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let site = build_site_settings(site)?;
        let build = build_build_settings(build)?;

        Ok(Self {
            logging,
            site,
            build,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let content_dir = non_empty_path(site.content_dir, DEFAULT_CONTENT_DIR, "site.content_dir")?;
    let output_dir = non_empty_path(site.output_dir, DEFAULT_OUTPUT_DIR, "site.output_dir")?;
    if content_dir == output_dir {
        return Err(LoadError::invalid(
            "site.output_dir",
            "must differ from site.content_dir",
        ));
    }

    let host = trimmed(site.host).map(|host| {
        host.trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    });

    let cname_file = site
        .cname_file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CNAME_FILE));
    let stylesheet_dir = site
        .stylesheet_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STYLESHEET_DIR));

    let feed = FeedSettings {
        title: trimmed(site.feed_title),
        description: trimmed(site.feed_description),
        copyright: site
            .copyright
            .unwrap_or_else(|| DEFAULT_COPYRIGHT.to_string()),
        author_name: trimmed(site.author_name),
        author_email: trimmed(site.author_email),
    };

    Ok(SiteSettings {
        content_dir,
        output_dir,
        host,
        cname_file,
        stylesheet_dir,
        feed,
    })
}

fn build_build_settings(build: RawBuildSettings) -> Result<BuildSettings, LoadError> {
    let debounce_ms = non_zero_u64(
        build.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
        "build.debounce_ms",
    )?;
    let render_concurrency = non_zero_usize(
        build
            .render_concurrency
            .unwrap_or(DEFAULT_RENDER_CONCURRENCY),
        "build.render_concurrency",
    )?;
    let file_cache_capacity = non_zero_usize(
        build
            .file_cache_capacity
            .unwrap_or(DEFAULT_FILE_CACHE_CAPACITY),
        "build.file_cache_capacity",
    )?;

    Ok(BuildSettings {
        debounce: Duration::from_millis(debounce_ms.get()),
        render_concurrency,
        file_cache_capacity,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    content_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    host: Option<String>,
    cname_file: Option<PathBuf>,
    stylesheet_dir: Option<PathBuf>,
    feed_title: Option<String>,
    feed_description: Option<String>,
    copyright: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBuildSettings {
    debounce_ms: Option<u64>,
    render_concurrency: Option<u64>,
    file_cache_capacity: Option<u64>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
