//! Per-deck study progress and the deck collection, persisted as one JSON
//! blob through a [`BlobStore`].
//!
//! Card identity is positional: `boxes[i]` belongs to whatever card sits at
//! index `i` of the deck right now. Reordering or inserting cards remaps
//! progress onto different cards.

use crate::deck::{Card, Decks, clean_cards};
use crate::scheduler::BoxLevel;
use crate::storage::BlobStore;
use anyhow::{Context, Result, anyhow, ensure};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Fixed namespace key the whole state is stored under
pub const STORAGE_KEY: &str = "boxcards-flashcards-v1";

/// Statistics for one deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckProgress {
    /// Correct answers ever recorded
    pub correct: u32,
    /// All answers ever recorded
    pub total: u32,
    /// Most recently answered card, used to resume
    pub last_index: usize,
    /// Mastery box per card index
    pub boxes: Vec<BoxLevel>,
}

impl DeckProgress {
    /// Zero-valued record with every card in box 1
    pub fn new(deck_len: usize) -> Self {
        Self {
            correct: 0,
            total: 0,
            last_index: 0,
            boxes: vec![BoxLevel::Fresh; deck_len],
        }
    }

    /// Build a record from stored JSON, defaulting anything malformed
    fn from_stored(value: &Value) -> Self {
        let count = |field: &str| {
            value
                .get(field)
                .and_then(Value::as_u64)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(0)
        };

        let boxes = value
            .get("boxes")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        entry
                            .as_u64()
                            .and_then(BoxLevel::from_stored)
                            .unwrap_or_else(|| {
                                debug!("stored box value {} is invalid, using box 1", entry);
                                BoxLevel::Fresh
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut progress = Self {
            correct: count("correct"),
            total: count("total"),
            last_index: value
                .get("lastIndex")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0),
            boxes,
        };
        progress.enforce_counts();
        progress
    }

    /// Truncate or pad `boxes` to `deck_len`. Returns true if anything changed.
    pub fn reconcile(&mut self, deck_len: usize) -> bool {
        if self.boxes.len() == deck_len {
            return false;
        }
        debug!(
            "reconciling {} boxes to deck length {}",
            self.boxes.len(),
            deck_len
        );
        self.boxes.resize(deck_len, BoxLevel::Fresh);
        true
    }

    /// Restore `correct <= total`
    fn enforce_counts(&mut self) {
        if self.correct > self.total {
            debug!(
                "correct count {} exceeds total {}, raising total",
                self.correct, self.total
            );
            self.total = self.correct;
        }
    }

    /// Number of cards in each box, box 1 first
    pub fn box_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for level in &self.boxes {
            counts[usize::from(level.as_u8()) - 1] += 1;
        }
        counts
    }
}

/// Read-only score for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub correct: u32,
    pub total: u32,
}

/// Everything that gets persisted
#[derive(Debug, Clone, Default, Serialize)]
struct PersistedState {
    decks: Decks,
    stats: BTreeMap<String, DeckProgress>,
}

impl PersistedState {
    fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).context("state is not valid JSON")?;

        let decks = value
            .get("decks")
            .filter(|decks| decks.is_object())
            .ok_or_else(|| anyhow!("state has no decks object"))?;
        let decks: Decks =
            serde_json::from_value(decks.clone()).context("stored decks are malformed")?;

        let stats = value
            .get("stats")
            .and_then(Value::as_object)
            .map(|stats| {
                stats
                    .iter()
                    .map(|(name, record)| (name.clone(), DeckProgress::from_stored(record)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { decks, stats })
    }
}

/// Deck collection and per-deck progress, written through to a [`BlobStore`].
///
/// Loaded once with [`ProgressStore::load`]; every mutation writes the whole
/// state back. Storage failures never surface from here: an unreadable blob
/// starts an empty state, a failed write keeps the in-memory state.
pub struct ProgressStore<S> {
    store: S,
    state: PersistedState,
}

impl<S: BlobStore> ProgressStore<S> {
    pub fn load(store: S) -> Self {
        let state = match store.read(STORAGE_KEY) {
            Ok(Some(raw)) => match PersistedState::parse(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!("stored study state is unreadable, starting empty: {:#}", e);
                    PersistedState::default()
                }
            },
            Ok(None) => {
                info!("no stored study state, starting empty");
                PersistedState::default()
            }
            Err(e) => {
                warn!("could not read study state, starting empty: {:#}", e);
                PersistedState::default()
            }
        };

        Self { store, state }
    }

    /// Write the full state to storage
    pub fn flush(&mut self) -> Result<()> {
        let raw = serde_json::to_string(&self.state).context("Failed to serialize study state")?;
        self.store.write(STORAGE_KEY, &raw)
    }

    /// Write-through used by every mutation; failures are logged and dropped
    fn persist(&mut self) {
        if let Err(e) = self.flush() {
            warn!("could not persist study state: {:#}", e);
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn decks(&self) -> &Decks {
        &self.state.decks
    }

    pub fn deck(&self, name: &str) -> Option<&[Card]> {
        self.state.decks.get(name).map(Vec::as_slice)
    }

    /// Stored record for `deck_name`, created on first access and reconciled
    /// against `deck_len`. Returns whether anything had to change.
    fn reconciled(&mut self, deck_name: &str, deck_len: usize) -> (&mut DeckProgress, bool) {
        let mut created = false;
        let record = self
            .state
            .stats
            .entry(deck_name.to_string())
            .or_insert_with(|| {
                created = true;
                DeckProgress::new(deck_len)
            });
        let repaired = record.reconcile(deck_len);
        (record, created || repaired)
    }

    /// Progress for a deck, normalized to `deck_len`
    pub fn progress(&mut self, deck_name: &str, deck_len: usize) -> DeckProgress {
        let (record, changed) = self.reconciled(deck_name, deck_len);
        let record = record.clone();
        if changed {
            self.persist();
        }
        record
    }

    /// Apply `mutation` to the deck's reconciled record and persist it.
    /// The only path that modifies progress.
    pub fn update_progress<F>(&mut self, deck_name: &str, deck_len: usize, mutation: F) -> DeckProgress
    where
        F: FnOnce(&mut DeckProgress),
    {
        let (record, _) = self.reconciled(deck_name, deck_len);
        mutation(record);
        record.enforce_counts();
        record.reconcile(deck_len);
        let record = record.clone();
        self.persist();
        record
    }

    pub fn snapshot(&mut self, deck_name: &str, deck_len: usize) -> Snapshot {
        let progress = self.progress(deck_name, deck_len);
        Snapshot {
            correct: progress.correct,
            total: progress.total,
        }
    }

    /// Index to resume studying at; stale indices fall back to 0
    pub fn resume_index(&mut self, deck_name: &str, deck_len: usize) -> usize {
        let progress = self.progress(deck_name, deck_len);
        if progress.last_index < deck_len {
            progress.last_index
        } else {
            debug!(
                "resume index {} is stale for deck '{}' ({} cards)",
                progress.last_index, deck_name, deck_len
            );
            0
        }
    }

    /// Rename a deck, moving its progress along in the same write.
    /// Returns the name actually used (trimmed).
    pub fn rename_deck(&mut self, old_name: &str, new_name: &str) -> Result<String> {
        let new_name = new_name.trim();

        ensure!(
            self.state.decks.contains_key(old_name),
            "Deck '{}' not found",
            old_name
        );
        ensure!(!new_name.is_empty(), "Name cannot be empty");
        if new_name == old_name {
            return Ok(new_name.to_string());
        }
        ensure!(
            !self.state.decks.contains_key(new_name),
            "A deck named '{}' already exists",
            new_name
        );

        if let Some(cards) = self.state.decks.remove(old_name) {
            self.state.decks.insert(new_name.to_string(), cards);
        }
        match self.state.stats.remove(old_name) {
            Some(record) => {
                self.state.stats.insert(new_name.to_string(), record);
            }
            None => {
                self.state.stats.remove(new_name);
            }
        }

        info!("renamed deck '{}' to '{}'", old_name, new_name);
        self.persist();
        Ok(new_name.to_string())
    }

    /// Delete a deck and its progress
    pub fn delete_deck(&mut self, name: &str) -> Result<()> {
        ensure!(self.state.decks.remove(name).is_some(), "Deck '{}' not found", name);
        self.state.stats.remove(name);

        info!("deleted deck '{}'", name);
        self.persist();
        Ok(())
    }

    /// Replace every deck; all progress is discarded
    pub fn replace_decks(&mut self, decks: Decks) {
        info!("replacing all decks with {} imported decks", decks.len());
        self.state.decks = decks;
        self.state.stats.clear();
        self.persist();
    }

    /// Add or overwrite the given decks. Progress is kept and reconciles lazily.
    pub fn merge_decks(&mut self, decks: Decks) {
        info!("merging {} decks", decks.len());
        self.state.decks.extend(decks);
        self.persist();
    }

    /// Create an empty deck. An existing deck of that name is only emptied
    /// when `overwrite` is set; its progress stays and reconciles lazily.
    /// Returns the name actually used (trimmed).
    pub fn create_deck(&mut self, name: &str, overwrite: bool) -> Result<String> {
        let name = name.trim();

        ensure!(!name.is_empty(), "Name cannot be empty");
        ensure!(
            overwrite || !self.state.decks.contains_key(name),
            "A deck named '{}' already exists",
            name
        );

        self.merge_decks(Decks::from([(name.to_string(), Vec::new())]));
        Ok(name.to_string())
    }

    /// Save an edited card list for an existing deck. Cards are cleaned
    /// first. Returns how many cards were kept.
    pub fn save_deck(&mut self, name: &str, cards: Vec<Card>) -> Result<usize> {
        ensure!(self.state.decks.contains_key(name), "Deck '{}' not found", name);

        let cards = clean_cards(cards);
        let kept = cards.len();
        self.merge_decks(Decks::from([(name.to_string(), cards)]));
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::example_decks;
    use crate::storage::{MemoryStore, SqliteStore};
    use tempfile::tempdir;

    fn levels(values: &[u8]) -> Vec<BoxLevel> {
        values
            .iter()
            .map(|v| BoxLevel::from_stored(*v as u64).unwrap())
            .collect()
    }

    fn cards(n: usize) -> Vec<Card> {
        (0..n)
            .map(|i| Card::new(format!("front {}", i), format!("back {}", i)))
            .collect()
    }

    fn store_with(decks: &[(&str, usize)]) -> ProgressStore<MemoryStore> {
        let mut store = ProgressStore::load(MemoryStore::default());
        store.merge_decks(
            decks
                .iter()
                .map(|(name, n)| (name.to_string(), cards(*n)))
                .collect(),
        );
        store
    }

    fn set_boxes(store: &mut ProgressStore<MemoryStore>, name: &str, boxes: &[u8]) {
        store.update_progress(name, boxes.len(), |p| p.boxes = levels(boxes));
    }

    #[test]
    fn test_first_access_creates_zeroed_record() {
        let mut store = store_with(&[("Capitals", 3)]);
        assert_eq!(store.progress("Capitals", 3), DeckProgress::new(3));
        assert_eq!(store.progress("Capitals", 3).boxes, levels(&[1, 1, 1]));
    }

    #[test]
    fn test_first_access_is_persisted() {
        let mut store = store_with(&[("Capitals", 3)]);
        store.progress("Capitals", 3);

        let reloaded = ProgressStore::load(store.into_inner());
        assert!(reloaded.state.stats.contains_key("Capitals"));
    }

    #[test]
    fn test_reconcile_truncates_shrunk_deck() {
        let mut store = store_with(&[("Shrink", 5)]);
        set_boxes(&mut store, "Shrink", &[2, 3, 1, 4, 2]);
        store.update_progress("Shrink", 5, |p| {
            p.correct = 3;
            p.total = 4;
        });

        let progress = store.progress("Shrink", 3);
        assert_eq!(progress.boxes, levels(&[2, 3, 1]));
        assert_eq!((progress.correct, progress.total), (3, 4));
    }

    #[test]
    fn test_reconcile_pads_grown_deck() {
        let mut store = store_with(&[("Grow", 2)]);
        set_boxes(&mut store, "Grow", &[3, 1]);

        assert_eq!(store.progress("Grow", 4).boxes, levels(&[3, 1, 1, 1]));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut store = store_with(&[("Deck", 5)]);
        set_boxes(&mut store, "Deck", &[4, 4, 2, 1, 3]);

        let first = store.progress("Deck", 7);
        let second = store.progress("Deck", 7);
        assert_eq!(first, second);
        assert_eq!(first.boxes.len(), 7);
    }

    #[test]
    fn test_update_progress_keeps_invariants() {
        let mut store = store_with(&[("Deck", 3)]);
        let progress = store.update_progress("Deck", 3, |p| {
            p.correct = 10;
            p.total = 2;
            p.boxes.push(BoxLevel::Mastered);
        });

        assert!(progress.correct <= progress.total);
        assert_eq!(progress.boxes.len(), 3);
    }

    #[test]
    fn test_resume_index_guards_stale_values() {
        let mut store = store_with(&[("Deck", 5)]);
        store.update_progress("Deck", 5, |p| p.last_index = 4);

        assert_eq!(store.resume_index("Deck", 5), 4);
        assert_eq!(store.resume_index("Deck", 3), 0);
        assert_eq!(store.resume_index("Deck", 0), 0);
    }

    #[test]
    fn test_snapshot() {
        let mut store = store_with(&[("Deck", 2)]);
        store.update_progress("Deck", 2, |p| {
            p.correct = 1;
            p.total = 3;
        });
        assert_eq!(store.snapshot("Deck", 2), Snapshot { correct: 1, total: 3 });
    }

    #[test]
    fn test_rename_moves_progress_exactly() {
        let mut store = store_with(&[("A", 3)]);
        let before = store.update_progress("A", 3, |p| {
            p.correct = 5;
            p.total = 10;
            p.last_index = 2;
            p.boxes = levels(&[4, 2, 1]);
        });

        assert_eq!(store.rename_deck("A", "  B ").unwrap(), "B");
        assert!(store.deck("A").is_none());
        assert_eq!(store.deck("B").map(<[Card]>::len), Some(3));
        assert!(!store.state.stats.contains_key("A"));
        assert_eq!(store.state.stats["B"], before);

        // Persisted in one write
        let reloaded = ProgressStore::load(store.into_inner());
        assert_eq!(reloaded.state.stats["B"], before);
        assert!(!reloaded.state.decks.contains_key("A"));
    }

    #[test]
    fn test_rename_errors() {
        let mut store = store_with(&[("A", 1), ("B", 1)]);
        assert!(store.rename_deck("Missing", "C").is_err());
        assert!(store.rename_deck("A", "   ").is_err());
        assert!(store.rename_deck("A", "B").is_err());
        assert_eq!(store.rename_deck("A", "A").unwrap(), "A");
        assert!(store.deck("A").is_some());
    }

    #[test]
    fn test_delete_removes_progress() {
        let mut store = store_with(&[("A", 2), ("B", 2)]);
        store.progress("A", 2);
        store.progress("B", 2);

        store.delete_deck("A").unwrap();
        assert!(store.deck("A").is_none());
        assert!(!store.state.stats.contains_key("A"));
        assert!(store.state.stats.contains_key("B"));
        assert!(store.delete_deck("A").is_err());
    }

    #[test]
    fn test_replace_clears_all_progress() {
        let mut store = store_with(&[("A", 2), ("B", 2)]);
        store.update_progress("A", 2, |p| p.total = 4);
        store.update_progress("B", 2, |p| p.total = 1);

        store.replace_decks(example_decks());
        assert!(store.state.stats.is_empty());
        assert!(store.deck("A").is_none());
        assert!(store.deck("Example Deck").is_some());
    }

    #[test]
    fn test_merge_keeps_counters_and_reconciles_lazily() {
        let mut store = store_with(&[("A", 4), ("B", 2)]);
        store.update_progress("A", 4, |p| {
            p.correct = 2;
            p.total = 3;
            p.boxes = levels(&[4, 3, 2, 2]);
        });
        store.update_progress("B", 2, |p| p.total = 7);

        let mut overwrite = Decks::new();
        overwrite.insert("A".to_string(), cards(2));
        store.merge_decks(overwrite);

        let a = store.progress("A", 2);
        assert_eq!((a.correct, a.total), (2, 3));
        assert_eq!(a.boxes, levels(&[4, 3]));
        assert_eq!(store.snapshot("B", 2).total, 7);
    }

    #[test]
    fn test_create_deck() {
        let mut store = store_with(&[("A", 2)]);
        store.update_progress("A", 2, |p| {
            p.correct = 1;
            p.total = 2;
        });

        assert_eq!(store.create_deck("  Verbs ", false).unwrap(), "Verbs");
        assert_eq!(store.deck("Verbs"), Some(&[][..]));

        assert!(store.create_deck("A", false).is_err());
        assert_eq!(store.deck("A").map(<[_]>::len), Some(2));
        assert!(store.create_deck("   ", true).is_err());

        store.create_deck("A", true).unwrap();
        let a = store.progress("A", 0);
        assert!(a.boxes.is_empty());
        assert_eq!((a.correct, a.total), (1, 2));
    }

    #[test]
    fn test_save_deck_cleans_cards_and_keeps_counters() {
        let mut store = store_with(&[("A", 3)]);
        store.update_progress("A", 3, |p| {
            p.correct = 2;
            p.total = 2;
            p.boxes = levels(&[2, 3, 4]);
        });

        let mut edited = cards(2);
        edited.push(Card::new("  ", "no front"));
        edited.push(Card::new(" new ", " card "));
        assert_eq!(store.save_deck("A", edited).unwrap(), 3);
        assert_eq!(store.deck("A").unwrap()[2], Card::new("new", "card"));

        let a = store.progress("A", 3);
        assert_eq!((a.correct, a.total), (2, 2));
        assert_eq!(a.boxes, levels(&[2, 3, 4]));

        assert!(store.save_deck("Missing", cards(1)).is_err());
        assert!(store.deck("Missing").is_none());
    }

    #[test]
    fn test_load_missing_key_starts_empty() {
        let store = ProgressStore::load(MemoryStore::default());
        assert!(store.decks().is_empty());
    }

    #[test]
    fn test_load_corrupt_blob_starts_empty() {
        let store = ProgressStore::load(MemoryStore::with_entry(STORAGE_KEY, "{not json"));
        assert!(store.decks().is_empty());

        let store =
            ProgressStore::load(MemoryStore::with_entry(STORAGE_KEY, r#"{"decks": [1, 2]}"#));
        assert!(store.decks().is_empty());
    }

    #[test]
    fn test_load_read_failure_starts_empty() {
        let failing = MemoryStore {
            fail_reads: true,
            ..Default::default()
        };
        let mut store = ProgressStore::load(failing);
        assert!(store.decks().is_empty());
        assert_eq!(store.progress("Any", 2), DeckProgress::new(2));
    }

    #[test]
    fn test_load_lenient_stats() {
        let raw = r#"{
            "decks": {"Deck": [
                {"front": "a", "back": "1"},
                {"front": "b", "back": "2"},
                {"front": "c", "back": "3"}
            ]},
            "stats": {"Deck": {"correct": 9, "total": 4, "lastIndex": "x", "boxes": [0, 3, 7]}}
        }"#;
        let mut store = ProgressStore::load(MemoryStore::with_entry(STORAGE_KEY, raw));

        let progress = store.progress("Deck", 3);
        assert_eq!(progress.boxes, levels(&[1, 3, 1]));
        assert_eq!(progress.last_index, 0);
        assert!(progress.correct <= progress.total);
    }

    #[test]
    fn test_load_without_stats_keeps_decks() {
        let raw = r#"{"decks": {"Deck": [{"front": "a", "back": "1"}]}}"#;
        let mut store = ProgressStore::load(MemoryStore::with_entry(STORAGE_KEY, raw));
        assert_eq!(store.deck("Deck").map(<[Card]>::len), Some(1));
        assert_eq!(store.progress("Deck", 1), DeckProgress::new(1));
    }

    #[test]
    fn test_persisted_layout() {
        let mut store = store_with(&[("Deck", 2)]);
        store.update_progress("Deck", 2, |p| {
            p.correct = 1;
            p.total = 1;
            p.last_index = 1;
            p.boxes = levels(&[1, 2]);
        });

        let memory = store.into_inner();
        let value: Value = serde_json::from_str(&memory.entries[STORAGE_KEY]).unwrap();
        assert_eq!(value["decks"]["Deck"][0]["front"], "front 0");
        assert_eq!(value["stats"]["Deck"]["lastIndex"], 1);
        assert_eq!(value["stats"]["Deck"]["boxes"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let mut store = store_with(&[("Deck", 2)]);
        store.store.fail_writes = true;

        let progress = store.update_progress("Deck", 2, |p| p.total = 3);
        assert_eq!(progress.total, 3);
        assert_eq!(store.snapshot("Deck", 2).total, 3);
        assert!(store.flush().is_err());
    }

    #[test]
    fn test_box_counts() {
        let mut progress = DeckProgress::new(0);
        progress.boxes = levels(&[1, 1, 4, 2, 3]);
        assert_eq!(progress.box_counts(), [2, 1, 1, 1]);
    }

    #[test]
    fn test_sqlite_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boxcards.db");

        {
            let mut store = ProgressStore::load(SqliteStore::open(&path).unwrap());
            store.merge_decks(example_decks());
            store.update_progress("Example Deck", 3, |p| p.boxes[1] = BoxLevel::Reviewing);
        }

        let mut store = ProgressStore::load(SqliteStore::open(&path).unwrap());
        assert_eq!(store.decks().len(), 1);
        assert_eq!(
            store.progress("Example Deck", 3).boxes,
            levels(&[1, 3, 1])
        );
    }
}
