use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A single card: prompt on the front, answer on the back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub front: String,
    pub back: String,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }
}

/// All decks, keyed by name. Card order within a deck is significant.
pub type Decks = BTreeMap<String, Vec<Card>>;

/// A named deck loaded from a file
#[derive(Debug, Clone)]
pub struct Deck {
    pub name: String,
    pub cards: Vec<Card>,
}

impl Deck {
    /// Load a deck from a TSV file
    /// Format: front<TAB>back
    /// Lines starting with # are comments, empty lines are skipped
    pub fn load_tsv(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deck file: {}", path.display()))?;

        let mut cards = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((front, back)) = line.split_once('\t') else {
                bail!(
                    "Invalid line {} in {}: expected front<TAB>back",
                    line_num + 1,
                    path.display()
                );
            };

            cards.push(Card::new(front.trim(), back.trim()));
        }

        Ok(Deck {
            name,
            cards: clean_cards(cards),
        })
    }
}

/// Parse decks from JSON of the form `{ "Deck": [ {"front": "", "back": ""} ] }`
pub fn parse_json_decks(text: &str) -> Result<Decks> {
    let text = text.trim();
    ensure!(!text.is_empty(), "Nothing to import");

    let parsed: Value = serde_json::from_str(text).context("Invalid JSON")?;
    let Some(object) = parsed.as_object() else {
        bail!(r#"Wrong format. Use {{ "Deck Name": [ {{"front":"","back":""}} ] }}"#);
    };
    ensure!(!object.is_empty(), "Missing deck name key");

    let mut decks = Decks::new();
    for (name, cards) in object {
        let Some(cards) = cards.as_array() else {
            bail!("Deck {} is not an array", name);
        };

        let mut parsed_cards = Vec::with_capacity(cards.len());
        for (idx, card) in cards.iter().enumerate() {
            let front = card.get("front").and_then(Value::as_str);
            let back = card.get("back").and_then(Value::as_str);
            match (front, back) {
                (Some(front), Some(back)) => parsed_cards.push(Card::new(front, back)),
                _ => bail!("Deck {} card {} missing front/back", name, idx),
            }
        }

        decks.insert(name.clone(), parsed_cards);
    }

    Ok(decks)
}

/// Pretty-printed JSON in the same shape `parse_json_decks` accepts
pub fn export_json(decks: &Decks) -> Result<String> {
    serde_json::to_string_pretty(decks).context("Failed to serialize decks")
}

/// Trim both sides of every card and drop cards with an empty side
pub fn clean_cards(cards: Vec<Card>) -> Vec<Card> {
    cards
        .into_iter()
        .map(|card| Card::new(card.front.trim(), card.back.trim()))
        .filter(|card| !card.front.is_empty() && !card.back.is_empty())
        .collect()
}

/// Starter deck for an empty store
pub fn example_decks() -> Decks {
    let mut decks = Decks::new();
    decks.insert(
        "Example Deck".to_string(),
        vec![
            Card::new("What is the capital of France?", "Paris"),
            Card::new("2 + 2 = ?", "4"),
            Card::new("HTTP stands for?", "HyperText Transfer Protocol"),
        ],
    );
    decks
}
