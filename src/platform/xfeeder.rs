use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::platform::{sanitize_body, FeedMessage, MessageSource, Publisher};

/// Extracts chat rows from an x-feeder style page.
///
/// Every `<tr id="...">` starts a row; the row runs until the next one.
/// The author sits in the `name` cell and the body in the first cell of
/// the `comment` block.
struct FeedParser {
    row: Regex,
    name: Regex,
    comment: Regex,
    tag: Regex,
}

impl FeedParser {
    fn new() -> Result<Self> {
        Ok(Self {
            row: Regex::new(r#"(?i)<tr\b[^>]*?\bid\s*=\s*"([^"]+)"[^>]*>"#)?,
            name: Regex::new(r#"(?is)class\s*=\s*"[^"]*\bname\b[^"]*"[^>]*>(.*?)</"#)?,
            comment: Regex::new(
                r#"(?is)class\s*=\s*"[^"]*\bcomment\b[^"]*"[^>]*>.*?<td\b[^>]*>(.*?)</td>"#,
            )?,
            tag: Regex::new(r"<[^>]*>")?,
        })
    }

    /// Every id row, newest first. A row without a readable body is kept
    /// with an empty body so the newest row is never hidden.
    fn parse(&self, html: &str, boilerplate: &str) -> Vec<FeedMessage> {
        let starts: Vec<_> = self.row.captures_iter(html).collect();
        let mut messages = Vec::with_capacity(starts.len());

        for (i, caps) in starts.iter().enumerate() {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = starts
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(html.len());
            let segment = &html[whole.end()..end];

            let body = self
                .comment
                .captures(segment)
                .and_then(|c| c.get(1))
                .map(|m| sanitize_body(&self.text_of(m.as_str()), boilerplate))
                .unwrap_or_default();

            let author = self
                .name
                .captures(segment)
                .and_then(|c| c.get(1))
                .map(|m| self.text_of(m.as_str()))
                .unwrap_or_default();

            messages.push(FeedMessage {
                id: id.as_str().to_string(),
                author,
                body,
            });
        }

        messages
    }

    fn text_of(&self, fragment: &str) -> String {
        let text = self.tag.replace_all(fragment, "");
        decode_entities(&text).trim().to_string()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// HTTP adapter for an x-feeder chat room
pub struct XFeederClient {
    client: reqwest::Client,
    parser: FeedParser,
    feed_url: String,
    post_url: String,
    boilerplate: String,
}

impl XFeederClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            parser: FeedParser::new().context("Failed to build feed parser")?,
            feed_url: config.url.clone(),
            post_url: config.post_url().to_string(),
            boilerplate: config.boilerplate.clone(),
        })
    }

    async fn fetch_rows(&self) -> Result<Vec<FeedMessage>> {
        debug!("Fetching feed: {}", self.feed_url);

        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("Failed to fetch feed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Feed returned {}", status);
        }

        let html = response.text().await.context("Failed to read feed body")?;
        Ok(self.parser.parse(&html, &self.boilerplate))
    }
}

/// Up to `limit` rows that carry text, newest first.
fn history_window(rows: Vec<FeedMessage>, limit: usize) -> Vec<FeedMessage> {
    rows.into_iter()
        .filter(|row| !row.body.is_empty())
        .take(limit)
        .collect()
}

#[async_trait]
impl MessageSource for XFeederClient {
    async fn latest_message(&self) -> Option<FeedMessage> {
        match self.fetch_rows().await {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!("Feed unreadable: {:#}", e);
                None
            }
        }
    }

    async fn recent_history(&self, limit: usize) -> Vec<FeedMessage> {
        match self.fetch_rows().await {
            Ok(rows) => history_window(rows, limit),
            Err(e) => {
                warn!("Feed history unreadable: {:#}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Publisher for XFeederClient {
    async fn publish(&self, text: &str, display_name: &str) -> Result<()> {
        let form = [("name", display_name), ("comment", text)];

        let response = self
            .client
            .post(&self.post_url)
            .form(&form)
            .send()
            .await
            .context("Failed to post reply")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Posting reply failed ({}): {}", status, body);
        }

        Ok(())
    }
}
