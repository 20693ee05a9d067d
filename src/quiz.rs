use crate::deck::Card;
use rand::Rng;
use rand::seq::SliceRandom;

/// Placeholder option when the deck has too few distinct answers
pub const FILLER_OPTION: &str = "N/A";

/// Lowercase, trim, and collapse runs of whitespace to a single space
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check a typed answer against the card's back.
/// Returns `None` when nothing was typed, so the attempt is not scored.
pub fn check_typed(expected: &str, given: &str) -> Option<bool> {
    if given.trim().is_empty() {
        return None;
    }
    Some(normalize_answer(expected) == normalize_answer(given))
}

/// Options for a multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choices {
    pub options: Vec<String>,
    /// Position of the right answer in `options`
    pub correct: usize,
}

impl Choices {
    pub fn is_correct(&self, picked: usize) -> bool {
        picked == self.correct
    }
}

/// Build `count` options for the card at `index`: its back, distinct
/// distractor backs from the rest of the deck, then filler, shuffled.
pub fn build_choices<R: Rng + ?Sized>(
    cards: &[Card],
    index: usize,
    count: usize,
    rng: &mut R,
) -> Option<Choices> {
    let answer = &cards.get(index)?.back;
    let count = count.max(1);

    let mut distractors: Vec<&str> = Vec::new();
    for card in cards {
        if card.back != *answer && !distractors.contains(&card.back.as_str()) {
            distractors.push(&card.back);
        }
    }
    distractors.shuffle(rng);
    distractors.truncate(count - 1);

    let mut options = vec![answer.clone()];
    options.extend(distractors.into_iter().map(str::to_string));
    while options.len() < count {
        options.push(FILLER_OPTION.to_string());
    }
    options.shuffle(rng);

    let correct = options.iter().position(|option| option == answer)?;
    Some(Choices { options, correct })
}
