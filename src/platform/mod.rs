pub mod xfeeder;

use anyhow::Result;
use async_trait::async_trait;

/// A single chat row read from the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    /// Row identifier, stable and unique per row
    pub id: String,
    /// Display name of the author
    pub author: String,
    /// Body text with the feed's boilerplate removed
    pub body: String,
}

/// Read side of the feed.
///
/// Transient read failures are reported as "nothing there" rather than
/// errors; the poll loop simply tries again on the next tick.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// The newest row in the feed, if any. Its body is empty when the row
    /// carries no readable text.
    async fn latest_message(&self) -> Option<FeedMessage>;

    /// Up to `limit` of the newest rows that carry text, newest first
    async fn recent_history(&self, limit: usize) -> Vec<FeedMessage>;
}

/// Write side of the feed
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str, display_name: &str) -> Result<()>;
}

/// Strip the feed's fixed boilerplate label from a body and trim it.
pub fn sanitize_body(raw: &str, boilerplate: &str) -> String {
    let stripped = if boilerplate.is_empty() {
        raw.to_string()
    } else {
        raw.replacen(boilerplate, "", 1)
    };
    stripped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_boilerplate_once() {
        assert_eq!(
            sanitize_body("こんばんは～この投稿へ移動", "この投稿へ移動"),
            "こんばんは～"
        );
        assert_eq!(sanitize_body("  plain  ", ""), "plain");
    }
}
