use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Per-room suffixes occasionally appended to outgoing replies.
#[derive(Debug, Clone, Default)]
pub struct DecorationTable {
    suffixes: HashMap<String, String>,
}

impl DecorationTable {
    /// Load from a JSON object of `room -> suffix`. An absent or corrupt
    /// file means no decorations are ever applied.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::read(path) {
            Ok(suffixes) => {
                info!(
                    "Loaded {} room decorations from {}",
                    suffixes.len(),
                    path.display()
                );
                Self { suffixes }
            }
            Err(e) => {
                warn!("Decorations disabled: {:#}", e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decorations: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse decorations: {}", path.display()))
    }

    #[cfg(test)]
    pub fn from_map(suffixes: HashMap<String, String>) -> Self {
        Self { suffixes }
    }

    pub fn suffix_for(&self, room: &str) -> Option<&str> {
        self.suffixes.get(room).map(String::as_str)
    }

    /// Append the room's suffix with the given probability. A NaN
    /// probability never decorates.
    pub fn decorate(&self, text: &str, room: &str, probability: f64) -> String {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        match self.suffix_for(room) {
            Some(suffix) if rand::random_bool(probability) => {
                format!("{}\n{}", text, suffix)
            }
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DecorationTable {
        DecorationTable::from_map(HashMap::from([(
            "minnnano".to_string(),
            "(from the bot)".to_string(),
        )]))
    }

    #[test]
    fn test_decorate_always_and_never() {
        let table = table();
        assert_eq!(
            table.decorate("hi", "minnnano", 1.0),
            "hi\n(from the bot)"
        );
        assert_eq!(table.decorate("hi", "minnnano", 0.0), "hi");
    }

    #[test]
    fn test_nan_probability_never_decorates() {
        assert_eq!(table().decorate("hi", "minnnano", f64::NAN), "hi");
    }

    #[test]
    fn test_unknown_room_is_untouched() {
        assert_eq!(table().decorate("hi", "tahiti", 1.0), "hi");
    }

    #[test]
    fn test_load_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DecorationTable::load(None).suffix_for("minnnano").is_none());

        let missing = dir.path().join("nope.json");
        assert!(DecorationTable::load(Some(&missing))
            .suffix_for("minnnano")
            .is_none());

        let corrupt = dir.path().join("bad.json");
        std::fs::write(&corrupt, "[1, 2").unwrap();
        assert!(DecorationTable::load(Some(&corrupt))
            .suffix_for("minnnano")
            .is_none());
    }

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decorations.json");
        std::fs::write(&path, r#"{"minnnano": "~bot~"}"#).unwrap();

        let table = DecorationTable::load(Some(&path));
        assert_eq!(table.suffix_for("minnnano"), Some("~bot~"));
    }
}
