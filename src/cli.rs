use crate::deck::{Card, Deck, Decks, export_json, parse_json_decks};
use crate::progress::ProgressStore;
use crate::scheduler::StudyMode;
use crate::storage::BlobStore;
use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "boxcards", about = "Flashcards with Leitner-style mastery boxes", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open the study screen (default when no subcommand is given)
    Study {
        /// Start directly in this deck
        #[arg(long)]
        deck: Option<String>,
        /// Study mode to start in
        #[arg(long, value_enum)]
        mode: Option<StudyMode>,
    },

    /// List decks with card counts and scores
    List,

    /// Import decks from a JSON file, or a single deck from a .tsv file
    Import {
        file: PathBuf,
        /// Replace every existing deck and reset all progress
        #[arg(long)]
        replace: bool,
    },

    /// Export all decks as JSON (stdout when no file is given)
    Export { file: Option<PathBuf> },

    /// Rename a deck, keeping its progress
    Rename { old: String, new: String },

    /// Delete a deck and its progress
    Delete { name: String },

    /// Show score and box distribution for a deck
    Stats { name: String },

    /// Create an empty deck
    New {
        name: String,
        /// Empty an existing deck of the same name
        #[arg(long)]
        force: bool,
    },

    /// List the cards of a deck, numbered for `edit`
    Cards { name: String },

    /// Add, change or remove cards in a deck
    Edit {
        deck: String,
        #[command(subcommand)]
        action: EditAction,
    },
}

#[derive(Subcommand)]
pub enum EditAction {
    /// Append a card
    Add { front: String, back: String },
    /// Replace card NUMBER (as shown by `cards`)
    Set {
        number: usize,
        front: String,
        back: String,
    },
    /// Remove card NUMBER (as shown by `cards`)
    Remove { number: usize },
}

/// Zero-based position of card `number` (counted from 1)
fn card_position(cards: &[Card], number: usize) -> Result<usize> {
    ensure!(
        (1..=cards.len()).contains(&number),
        "No card {} (deck has {} cards)",
        number,
        cards.len()
    );
    Ok(number - 1)
}

fn checked_card(front: String, back: String) -> Result<Card> {
    ensure!(
        !front.trim().is_empty() && !back.trim().is_empty(),
        "Both sides of a card need text"
    );
    Ok(Card::new(front, back))
}

/// Read decks from `path`: `.tsv` files hold one deck named after the file,
/// anything else is parsed as JSON
pub fn read_import_file(path: &Path) -> Result<Decks> {
    if path.extension().is_some_and(|ext| ext == "tsv") {
        let deck = Deck::load_tsv(path)?;
        return Ok(Decks::from([(deck.name, deck.cards)]));
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    parse_json_decks(&text).with_context(|| format!("Invalid deck file: {}", path.display()))
}

/// Run a non-interactive command against the store, writing output to `out`
pub fn run_command<S: BlobStore, W: Write>(
    store: &mut ProgressStore<S>,
    command: Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Study { .. } => {
            anyhow::bail!("study runs in the terminal UI");
        }
        Command::List => {
            let decks: Vec<(String, usize)> = store
                .decks()
                .iter()
                .map(|(name, cards)| (name.clone(), cards.len()))
                .collect();
            if decks.is_empty() {
                writeln!(out, "No decks yet. Import some with `boxcards import`.")?;
            }
            for (name, len) in decks {
                let score = store.snapshot(&name, len);
                writeln!(
                    out,
                    "{}\t{} cards\t{} right / {} total",
                    name, len, score.correct, score.total
                )?;
            }
        }
        Command::Import { file, replace } => {
            let decks = read_import_file(&file)?;
            let count = decks.len();
            if replace {
                store.replace_decks(decks);
            } else {
                store.merge_decks(decks);
            }
            store.flush().context("Failed to save imported decks")?;
            writeln!(out, "Imported {} deck(s) from {}", count, file.display())?;
        }
        Command::Export { file } => {
            let json = export_json(store.decks())?;
            match file {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    writeln!(out, "Exported {} deck(s) to {}", store.decks().len(), path.display())?;
                }
                None => writeln!(out, "{}", json)?,
            }
        }
        Command::Rename { old, new } => {
            let new = store.rename_deck(&old, &new)?;
            store.flush().context("Failed to save renamed deck")?;
            writeln!(out, "Renamed '{}' to '{}'", old, new)?;
        }
        Command::Delete { name } => {
            store.delete_deck(&name)?;
            store.flush().context("Failed to save after delete")?;
            writeln!(out, "Deleted deck '{}'", name)?;
        }
        Command::Stats { name } => {
            let len = store
                .deck(&name)
                .map(<[_]>::len)
                .with_context(|| format!("Deck '{}' not found", name))?;
            let progress = store.progress(&name, len);
            let [b1, b2, b3, b4] = progress.box_counts();
            writeln!(out, "{}: {} cards", name, len)?;
            writeln!(out, "score: {} right / {} total", progress.correct, progress.total)?;
            writeln!(out, "boxes: 1:{} 2:{} 3:{} 4:{}", b1, b2, b3, b4)?;
        }
        Command::New { name, force } => {
            ensure!(
                force || store.deck(name.trim()).is_none(),
                "Deck '{}' already exists; pass --force to replace it with an empty deck",
                name.trim()
            );
            let name = store.create_deck(&name, force)?;
            store.flush().context("Failed to save new deck")?;
            writeln!(out, "Created deck '{}'", name)?;
        }
        Command::Cards { name } => {
            let cards = store
                .deck(&name)
                .with_context(|| format!("Deck '{}' not found", name))?;
            if cards.is_empty() {
                writeln!(out, "'{}' has no cards. Add one with `boxcards edit`.", name)?;
            }
            for (i, card) in cards.iter().enumerate() {
                writeln!(out, "{}\t{}\t{}", i + 1, card.front, card.back)?;
            }
        }
        Command::Edit { deck, action } => {
            let mut cards = store
                .deck(&deck)
                .map(<[_]>::to_vec)
                .with_context(|| format!("Deck '{}' not found", deck))?;
            match action {
                EditAction::Add { front, back } => cards.push(checked_card(front, back)?),
                EditAction::Set { number, front, back } => {
                    let i = card_position(&cards, number)?;
                    cards[i] = checked_card(front, back)?;
                }
                EditAction::Remove { number } => {
                    let i = card_position(&cards, number)?;
                    cards.remove(i);
                }
            }
            let kept = store.save_deck(&deck, cards)?;
            store.flush().context("Failed to save deck")?;
            writeln!(out, "Saved '{}' with {} card(s)", deck, kept)?;
        }
    }

    Ok(())
}
