use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Gemini,
    Openrouter,
    Ollama,
    Openai,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Gemini => write!(f, "gemini"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Openai => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Openai => "https://api.openai.com/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default = "default_bot_config")]
    pub bot: BotConfig,
    #[serde(default = "default_llm_config")]
    pub llm: LlmConfig,
    #[serde(default = "default_ledger_config")]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub decorations: DecorationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// Room identifier used to look up decorations; derived from `url` when unset
    #[serde(default)]
    pub room: Option<String>,
    /// Form endpoint for posting; defaults to `url`
    #[serde(default)]
    pub post_url: Option<String>,
    #[serde(default = "default_boilerplate")]
    pub boilerplate: String,
}

impl FeedConfig {
    pub fn room(&self) -> String {
        if let Some(room) = self.room.as_deref().filter(|r| !r.is_empty()) {
            return room.to_string();
        }
        room_from_url(&self.url)
    }

    pub fn post_url(&self) -> &str {
        self.post_url.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_history_enabled")]
    pub history_enabled: bool,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_decoration_probability")]
    pub decoration_probability: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DecorationsConfig {
    /// JSON file mapping room id to a suffix string
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Last non-empty path segment of a feed URL, e.g. `minnnano` for
/// `https://www2.x-feeder.info/minnnano/`.
pub fn room_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    path.split('/')
        .skip(1)
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_boilerplate() -> String {
    "この投稿へ移動".to_string()
}

fn default_bot_name() -> String {
    "TEST".to_string()
}

fn default_history_enabled() -> bool {
    true
}

fn default_history_len() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_decoration_probability() -> f64 {
    0.1
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("replied_ids.json")
}

fn default_bot_config() -> BotConfig {
    BotConfig {
        name: default_bot_name(),
        history_enabled: default_history_enabled(),
        history_len: default_history_len(),
        poll_interval_ms: default_poll_interval_ms(),
        decoration_probability: default_decoration_probability(),
    }
}

fn default_llm_config() -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::default(),
        model: default_model(),
        base_url: String::new(),
        api_key: String::new(),
        max_tokens: default_max_tokens(),
    }
}

fn default_ledger_config() -> LedgerConfig {
    LedgerConfig {
        path: default_ledger_path(),
    }
}

/// Environment variables consulted, in order, when `llm.api_key` is empty.
const API_KEY_VARS: [&str; 2] = ["LLM_API_KEY", "GEMINI_API_KEY"];

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.llm.api_key.is_empty() {
            if let Some(key) = API_KEY_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            {
                config.llm.api_key = key;
            }
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        if !config.bot.decoration_probability.is_finite() {
            anyhow::bail!(
                "[bot] decoration_probability must be a finite number, got {}",
                config.bot.decoration_probability
            );
        }
        config.bot.decoration_probability = config.bot.decoration_probability.clamp(0.0, 1.0);
        if config.feed.url.trim().is_empty() {
            anyhow::bail!("[feed] url must not be empty");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [feed]
            url = "https://www2.x-feeder.info/minnnano/"
            "#,
        )
        .unwrap();

        assert_eq!(config.bot.name, "TEST");
        assert!(config.bot.history_enabled);
        assert_eq!(config.bot.history_len, 5);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.ledger.path, PathBuf::from("replied_ids.json"));
        assert!(config.decorations.path.is_none());
        assert_eq!(config.feed.room(), "minnnano");
        assert_eq!(config.feed.post_url(), "https://www2.x-feeder.info/minnnano/");
    }

    #[test]
    fn test_explicit_room_and_probability_clamp() {
        let config = Config::parse(
            r#"
            [feed]
            url = "https://example.com/chat/"
            room = "tahiti"

            [bot]
            name = "helper"
            decoration_probability = 4.0

            [llm]
            provider = "openrouter"
            model = "some/model"
            "#,
        )
        .unwrap();

        assert_eq!(config.feed.room(), "tahiti");
        assert_eq!(config.bot.name, "helper");
        assert_eq!(config.bot.decoration_probability, 1.0);
        assert_eq!(config.llm.effective_base_url(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_non_finite_probability_rejected() {
        for value in ["nan", "inf", "-inf"] {
            let content = format!(
                "[feed]\nurl = \"https://example.com/room/\"\n\n[bot]\ndecoration_probability = {}\n",
                value
            );
            assert!(Config::parse(&content).is_err(), "{} accepted", value);
        }
    }

    #[test]
    fn test_empty_feed_url_rejected() {
        assert!(Config::parse("[feed]\nurl = \"\"\n").is_err());
    }

    #[test]
    fn test_room_from_url() {
        assert_eq!(room_from_url("https://www1.x-feeder.info/Zrl3B07Z/"), "Zrl3B07Z");
        assert_eq!(room_from_url("https://host/a/b?x=1"), "b");
        assert_eq!(room_from_url("https://host/"), "");
    }
}
