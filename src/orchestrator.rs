use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::composer::{build_prompt, is_no_reply_verdict};
use crate::config::Config;
use crate::llm::{is_rate_limited, Responder};
use crate::memory::{DecorationTable, ReplyLedger};
use crate::platform::{FeedMessage, MessageSource, Publisher};

/// Result of one poll-and-process cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new to consider this tick
    Idle,
    /// A reply was posted and the id recorded
    Replied,
    /// The model declined or the row had no text; the id is recorded
    /// without posting
    Skipped,
    /// Transient failure; the id is left unrecorded for a later tick
    FailedRetryable,
    /// Rate limited; the id is recorded so it is not retried
    FailedTerminal,
}

enum Verdict {
    Posted,
    Declined,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub bot_name: String,
    pub history_enabled: bool,
    pub history_len: usize,
    pub poll_interval: Duration,
    pub room: String,
    pub decoration_probability: f64,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bot_name: config.bot.name.clone(),
            history_enabled: config.bot.history_enabled,
            history_len: config.bot.history_len,
            poll_interval: Duration::from_millis(config.bot.poll_interval_ms.max(1)),
            room: config.feed.room(),
            decoration_probability: config.bot.decoration_probability,
        }
    }
}

/// Polls the feed and replies to new messages, one at a time.
///
/// Owns the reply ledger and the in-flight marker. A message id reaches
/// the publisher at most once: it is recorded as handled after a post,
/// a declined reply, or a rate limit, and is only left open after a
/// retryable failure.
pub struct Orchestrator {
    source: Arc<dyn MessageSource>,
    responder: Arc<dyn Responder>,
    publisher: Arc<dyn Publisher>,
    ledger: ReplyLedger,
    decorations: DecorationTable,
    settings: OrchestratorSettings,
    in_flight: Option<String>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn MessageSource>,
        responder: Arc<dyn Responder>,
        publisher: Arc<dyn Publisher>,
        ledger: ReplyLedger,
        decorations: DecorationTable,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            source,
            responder,
            publisher,
            ledger,
            decorations,
            settings,
            in_flight: None,
        }
    }

    pub fn ledger(&self) -> &ReplyLedger {
        &self.ledger
    }

    /// Id of the message currently being processed, if any
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Poll forever. Each tick runs a full cycle before the next one is
    /// scheduled, so cycles never overlap.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Watching feed as \"{}\" every {:?} (history: {})",
            self.settings.bot_name,
            self.settings.poll_interval,
            if self.settings.history_enabled {
                self.settings.history_len
            } else {
                0
            }
        );

        loop {
            interval.tick().await;
            let outcome = self.tick().await;
            if outcome != CycleOutcome::Idle {
                debug!("Cycle finished: {:?}", outcome);
            }
        }
    }

    /// One poll: look at the newest message and process it if it is a
    /// candidate.
    pub async fn tick(&mut self) -> CycleOutcome {
        let Some(message) = self.source.latest_message().await else {
            return CycleOutcome::Idle;
        };

        if !self.is_candidate(&message) {
            return CycleOutcome::Idle;
        }

        if message.body.is_empty() {
            info!("Message {} from {} has no text, skipping", message.id, message.author);
            self.record(&message.id);
            return CycleOutcome::Skipped;
        }

        info!("New message {} from {}: {}", message.id, message.author, message.body);

        self.in_flight = Some(message.id.clone());
        let outcome = self.process(&message).await;
        self.in_flight = None;

        outcome
    }

    /// Self-authored messages are rejected before the ledger is consulted
    /// and never recorded.
    fn is_candidate(&self, message: &FeedMessage) -> bool {
        if message.author == self.settings.bot_name {
            return false;
        }
        if self.ledger.is_handled(&message.id) {
            return false;
        }
        if let Some(current) = self.in_flight() {
            debug!("Message {} is in flight, ignoring {}", current, message.id);
            return false;
        }
        true
    }

    async fn process(&mut self, message: &FeedMessage) -> CycleOutcome {
        match self.reply_to(message).await {
            Ok(Verdict::Posted) => {
                info!("Replied to {}", message.id);
                self.record(&message.id);
                CycleOutcome::Replied
            }
            Ok(Verdict::Declined) => {
                info!("No reply needed for {}, skipping", message.id);
                self.record(&message.id);
                CycleOutcome::Skipped
            }
            Err(e) if is_rate_limited(&e) => {
                warn!("Rate limited on {}, not retrying: {:#}", message.id, e);
                self.record(&message.id);
                CycleOutcome::FailedTerminal
            }
            Err(e) => {
                warn!("Failed to handle {}, will retry: {:#}", message.id, e);
                CycleOutcome::FailedRetryable
            }
        }
    }

    async fn reply_to(&self, message: &FeedMessage) -> Result<Verdict> {
        let history = if self.settings.history_enabled {
            self.source.recent_history(self.settings.history_len).await
        } else {
            Vec::new()
        };

        let prompt = build_prompt(message, &history, &self.settings.bot_name);
        debug!("Prompt for {}:\n{}", message.id, prompt);

        let response = self
            .responder
            .generate(&prompt)
            .await
            .context("Responder failed")?;
        debug!("Response for {}: {}", message.id, response);

        if is_no_reply_verdict(&response) {
            return Ok(Verdict::Declined);
        }

        let text = self.decorations.decorate(
            response.trim(),
            &self.settings.room,
            self.settings.decoration_probability,
        );

        self.publisher
            .publish(&text, &self.settings.bot_name)
            .await
            .context("Publishing reply failed")?;

        Ok(Verdict::Posted)
    }

    fn record(&mut self, id: &str) {
        if let Err(e) = self.ledger.mark_handled(id) {
            error!(
                "Failed to persist ledger {} after handling {}: {:#}",
                self.ledger.path().display(),
                id,
                e
            );
        }
    }
}
