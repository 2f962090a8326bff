mod composer;
mod config;
mod llm;
mod memory;
mod orchestrator;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::composer::{build_prompt, is_no_reply_verdict};
use crate::config::Config;
use crate::llm::{LlmClient, Responder};
use crate::memory::{DecorationTable, ReplyLedger};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::platform::xfeeder::XFeederClient;
use crate::platform::FeedMessage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,feedbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Usage: feedbot [config.toml] [--probe "message"]
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("config.toml");
    let mut probe: Option<String> = None;
    while let Some(arg) = args.next() {
        if arg == "--probe" {
            probe = Some(args.next().context("--probe needs a message")?);
        } else {
            config_path = PathBuf::from(arg);
        }
    }

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Provider: {} ({})", config.llm.provider, config.llm.model);
    info!("  Feed: {} (room {})", config.feed.url, config.feed.room());
    info!("  Bot name: {}", config.bot.name);

    let responder = Arc::new(LlmClient::new(config.llm.clone()));

    if let Some(text) = probe {
        return run_probe(responder.as_ref(), &config.bot.name, &text).await;
    }

    let feed = Arc::new(XFeederClient::new(&config.feed)?);
    let ledger = ReplyLedger::load(&config.ledger.path);
    let decorations = DecorationTable::load(config.decorations.path.as_deref());

    let mut orchestrator = Orchestrator::new(
        feed.clone(),
        responder,
        feed,
        ledger,
        decorations,
        OrchestratorSettings::from_config(&config),
    );
    info!(
        "  Ledger: {} ({} handled ids)",
        orchestrator.ledger().path().display(),
        orchestrator.ledger().len()
    );
    if orchestrator.ledger().is_empty() {
        info!("  Ledger is empty: the newest feed row will be answered");
    }

    info!("Bot is starting...");
    tokio::select! {
        _ = orchestrator.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

/// Send a single message through the prompt and model without touching
/// the feed or the ledger.
async fn run_probe(responder: &dyn Responder, bot_name: &str, text: &str) -> Result<()> {
    let message = FeedMessage {
        id: "probe".to_string(),
        author: "probe".to_string(),
        body: text.to_string(),
    };
    let prompt = build_prompt(&message, &[], bot_name);
    let response = responder.generate(&prompt).await?;

    if is_no_reply_verdict(&response) {
        println!("(no reply: the model declined)");
    } else {
        println!("{}", response.trim());
    }
    Ok(())
}
