use crate::progress::{DeckProgress, ProgressStore};
use crate::storage::BlobStore;
use anyhow::{Context, Result, ensure};
use log::debug;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Mastery level of a single card, from least to most known
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(into = "u8")]
pub enum BoxLevel {
    /// Box 1 - new or just missed
    #[default]
    Fresh = 1,
    /// Box 2
    Learning = 2,
    /// Box 3
    Reviewing = 3,
    /// Box 4 - most mastered, least due
    Mastered = 4,
}

impl BoxLevel {
    /// Interpret a stored box value; anything outside 1..=4 is rejected
    pub fn from_stored(value: u64) -> Option<Self> {
        match value {
            1 => Some(BoxLevel::Fresh),
            2 => Some(BoxLevel::Learning),
            3 => Some(BoxLevel::Reviewing),
            4 => Some(BoxLevel::Mastered),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Move up one box, capped at Mastered
    pub fn promote(self) -> Self {
        match self {
            BoxLevel::Fresh => BoxLevel::Learning,
            BoxLevel::Learning => BoxLevel::Reviewing,
            BoxLevel::Reviewing | BoxLevel::Mastered => BoxLevel::Mastered,
        }
    }

    /// A miss always sends the card back to the first box
    pub fn demote(self) -> Self {
        BoxLevel::Fresh
    }

    /// How many tickets this card gets in the spaced selection bag
    pub fn weight(self) -> usize {
        match self {
            BoxLevel::Fresh => 4,
            BoxLevel::Learning => 2,
            BoxLevel::Reviewing => 1,
            BoxLevel::Mastered => 1,
        }
    }
}

impl From<BoxLevel> for u8 {
    fn from(level: BoxLevel) -> Self {
        level.as_u8()
    }
}

/// How the study screen collects answers and picks the next card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    /// Walk through the deck in order, wrapping at both ends
    #[default]
    Sequential,
    /// Weighted random draw biased toward low boxes; answers move cards between boxes
    Spaced,
    /// Pick the back from a set of options
    MultipleChoice,
    /// Type the back and have it checked
    Typed,
}

impl StudyMode {
    pub fn is_spaced(self) -> bool {
        self == StudyMode::Spaced
    }

    /// Next mode in the Tab cycle
    pub fn cycle(self) -> Self {
        match self {
            StudyMode::Sequential => StudyMode::Spaced,
            StudyMode::Spaced => StudyMode::MultipleChoice,
            StudyMode::MultipleChoice => StudyMode::Typed,
            StudyMode::Typed => StudyMode::Sequential,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StudyMode::Sequential => "sequential",
            StudyMode::Spaced => "spaced",
            StudyMode::MultipleChoice => "multiple choice",
            StudyMode::Typed => "typed",
        }
    }
}

/// Direction for sequential navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Build the spaced selection bag: each index repeated by its box weight
pub fn selection_bag(boxes: &[BoxLevel]) -> Vec<usize> {
    boxes
        .iter()
        .enumerate()
        .flat_map(|(index, level)| std::iter::repeat_n(index, level.weight()))
        .collect()
}

/// Box scheduler: records answers and picks the next card.
///
/// Holds no per-deck state of its own; everything that influences selection
/// lives in the `DeckProgress` records of the store passed in.
pub struct Scheduler<R> {
    rng: R,
}

impl<R: Rng> Scheduler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Record an answer for `card_index`.
    ///
    /// Counters and the resume index are always updated. Boxes only move in
    /// spaced mode: promote one level on a correct answer, back to box 1 on a
    /// miss.
    pub fn record_answer<S: BlobStore>(
        &self,
        store: &mut ProgressStore<S>,
        deck_name: &str,
        deck_len: usize,
        card_index: usize,
        correct: bool,
        spaced_mode: bool,
    ) -> DeckProgress {
        store.update_progress(deck_name, deck_len, |progress| {
            progress.total = progress.total.saturating_add(1);
            if correct {
                progress.correct = progress.correct.saturating_add(1);
            }
            progress.last_index = card_index;

            if spaced_mode {
                match progress.boxes.get_mut(card_index) {
                    Some(level) => {
                        *level = if correct {
                            level.promote()
                        } else {
                            level.demote()
                        };
                    }
                    None => debug!(
                        "answer for card {} is outside deck '{}' ({} cards), boxes untouched",
                        card_index, deck_name, deck_len
                    ),
                }
            }
        })
    }

    /// Step one card forward or backward, wrapping at both ends
    pub fn next_sequential(
        &self,
        deck_len: usize,
        current: usize,
        direction: Direction,
    ) -> Result<usize> {
        ensure!(deck_len > 0, "cannot move through an empty deck");

        let current = current % deck_len;
        let next = match direction {
            Direction::Forward => (current + 1) % deck_len,
            Direction::Backward => (current + deck_len - 1) % deck_len,
        };
        Ok(next)
    }

    /// Weighted random draw over the deck's boxes.
    ///
    /// Repeats are allowed; a card can come up twice in a row.
    pub fn next_spaced<S: BlobStore>(
        &mut self,
        store: &mut ProgressStore<S>,
        deck_name: &str,
        deck_len: usize,
    ) -> Result<usize> {
        ensure!(deck_len > 0, "cannot pick a card from an empty deck");

        let progress = store.progress(deck_name, deck_len);
        let bag = selection_bag(&progress.boxes);

        bag.choose(&mut self.rng)
            .copied()
            .with_context(|| format!("selection bag for deck '{}' is empty", deck_name))
    }

    /// Pick the card to show after `current` under `mode`
    pub fn next_index<S: BlobStore>(
        &mut self,
        store: &mut ProgressStore<S>,
        deck_name: &str,
        deck_len: usize,
        current: usize,
        mode: StudyMode,
        direction: Direction,
    ) -> Result<usize> {
        if mode.is_spaced() {
            self.next_spaced(store, deck_name, deck_len)
        } else {
            self.next_sequential(deck_len, current, direction)
        }
    }

    /// Mutable access to the random source, shared with quiz option building
    pub fn rng(&mut self) -> &mut R {
        &mut self.rng
    }
}
