//! RSS feed generated once the whole site has been built.

use std::path::PathBuf;

use async_trait::async_trait;
use time::{OffsetDateTime, Time, format_description::well_known::Rfc2822};
use tracing::{debug, info};

use crate::build::{AggregateError, AggregateHook, OutputSet, PublishOutcome};
use crate::config::{FeedSettings, SiteSettings};
use crate::domain::entities::ContentUnit;
use crate::domain::types::UnitKind;

use super::output::write_if_changed;

const HOOK_NAME: &str = "feed";
pub const FEED_FILE: &str = "feed.xml";

/// Writes `<output>/feed.xml` listing every post.
pub struct FeedHook {
    output_dir: PathBuf,
    host: Option<String>,
    cname_file: PathBuf,
    feed: FeedSettings,
}

impl FeedHook {
    pub fn new(site: &SiteSettings) -> Self {
        Self {
            output_dir: site.output_dir.clone(),
            host: site.host.clone(),
            cname_file: site.cname_file.clone(),
            feed: site.feed.clone(),
        }
    }

    async fn resolve_host(&self) -> Result<String, AggregateError> {
        if let Some(host) = self.host.as_ref() {
            return Ok(host.clone());
        }

        let raw = tokio::fs::read_to_string(&self.cname_file)
            .await
            .map_err(|err| {
                AggregateError::new(
                    HOOK_NAME,
                    format!(
                        "no site host configured and `{}` is unreadable: {err}",
                        self.cname_file.display()
                    ),
                )
            })?;

        raw.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AggregateError::new(
                    HOOK_NAME,
                    format!("`{}` does not name a host", self.cname_file.display()),
                )
            })
    }
}

#[async_trait]
impl AggregateHook for FeedHook {
    fn name(&self) -> &'static str {
        HOOK_NAME
    }

    async fn run(&self, outputs: &OutputSet) -> Result<(), AggregateError> {
        let mut pages = outputs
            .values()
            .map(|rendered| rendered.unit.as_ref())
            .filter(|unit| unit.kind == UnitKind::Page);
        let root = pages.clone().find(|unit| unit.url.is_empty());
        let Some(home) = root.or_else(|| pages.next()) else {
            debug!("No pages rendered, skipping feed");
            return Ok(());
        };

        let host = self.resolve_host().await?;
        let posts: Vec<&ContentUnit> = outputs
            .values()
            .map(|rendered| rendered.unit.as_ref())
            .filter(|unit| unit.kind == UnitKind::Post)
            .collect();

        let xml = render_rss(&host, home, &posts, &self.feed, OffsetDateTime::now_utc());
        let path = self.output_dir.join(FEED_FILE);
        let outcome = write_if_changed(&path, xml.as_bytes())
            .await
            .map_err(|err| AggregateError::new(HOOK_NAME, err.to_string()))?;

        info!(
            path = %path.display(),
            items = posts.len(),
            written = matches!(outcome, PublishOutcome::Written),
            "Feed generated"
        );
        Ok(())
    }
}

/// Build the RSS 2.0 document.
///
/// Channel metadata comes from the home page, then from settings. Posts
/// without a date use `now`.
pub fn render_rss(
    host: &str,
    home: &ContentUnit,
    posts: &[&ContentUnit],
    feed: &FeedSettings,
    now: OffsetDateTime,
) -> String {
    let base = format!("https://{}/", host.trim_end_matches('/'));
    let title = home
        .title
        .as_deref()
        .or(feed.title.as_deref())
        .unwrap_or(host);
    let description = home
        .description
        .as_deref()
        .or(feed.description.as_deref())
        .unwrap_or_default();

    let mut items = String::new();
    for post in posts {
        let published = post
            .date
            .map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
            .unwrap_or(now);
        let pub_date = published
            .format(&Rfc2822)
            .unwrap_or_else(|_| published.to_string());
        let link = format!("{base}{}", post.url);
        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{}</pubDate>\n      <description>{}</description>\n    </item>\n",
            xml_escape(post.label()),
            xml_escape(&link),
            xml_escape(&link),
            pub_date,
            xml_escape(post.description.as_deref().unwrap_or_default()),
        ));
    }

    let mut channel_extras = String::new();
    if !feed.copyright.is_empty() {
        channel_extras.push_str(&format!(
            "    <copyright>{}</copyright>\n",
            xml_escape(&feed.copyright)
        ));
    }
    if let Some(email) = feed.author_email.as_deref() {
        let editor = match feed.author_name.as_deref() {
            Some(name) => format!("{email} ({name})"),
            None => email.to_string(),
        };
        channel_extras.push_str(&format!(
            "    <managingEditor>{}</managingEditor>\n",
            xml_escape(&editor)
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n{}{}  </channel>\n</rss>\n",
        xml_escape(title),
        xml_escape(&base),
        xml_escape(description),
        channel_extras,
        items
    )
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
