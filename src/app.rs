use crate::config::Config;
use crate::deck::{Card, example_decks};
use crate::progress::{DeckProgress, ProgressStore, Snapshot};
use crate::quiz::{Choices, build_choices, check_typed};
use crate::scheduler::{Direction, Scheduler, StudyMode};
use crate::storage::BlobStore;
use crate::ui::{self, DeckSummary, Face, StudyView, choice_key};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::info;
use rand::Rng;
use ratatui::{DefaultTerminal, Frame};

/// Application state phases
#[derive(Debug, Clone, PartialEq)]
enum Phase {
    DeckSelection,
    Studying,
    ConfirmDelete(String),
}

/// The deck being studied
struct StudySession {
    deck_name: String,
    cards: Vec<Card>,
    index: usize,
    showing_back: bool,
    mode: StudyMode,
    progress: DeckProgress,
    choices: Option<Choices>,
    typed: String,
}

impl StudySession {
    fn current(&self) -> Option<&Card> {
        self.cards.get(self.index)
    }

    /// Reset per-card UI state after the index or mode changed
    fn prepare_card<R: Rng + ?Sized>(&mut self, choice_count: usize, rng: &mut R) {
        self.showing_back = false;
        self.typed.clear();
        self.choices = if self.mode == StudyMode::MultipleChoice {
            build_choices(&self.cards, self.index, choice_count, rng)
        } else {
            None
        };
    }
}

/// Main application state
pub struct App<S, R> {
    config: Config,
    store: ProgressStore<S>,
    scheduler: Scheduler<R>,
    phase: Phase,
    mode: StudyMode,
    // Deck selection state
    decks: Vec<DeckSummary>,
    selected: usize,
    // Study state
    session: Option<StudySession>,
    // Last message for the user
    status: Option<String>,
    should_exit: bool,
}

impl<S: BlobStore, R: Rng> App<S, R> {
    /// Create a new application
    pub fn new(
        config: Config,
        mut store: ProgressStore<S>,
        scheduler: Scheduler<R>,
        mode: StudyMode,
    ) -> Self {
        if config.seed_example_deck && store.decks().is_empty() {
            info!("no decks found, adding the example deck");
            store.merge_decks(example_decks());
        }

        let mut app = Self {
            config,
            store,
            scheduler,
            phase: Phase::DeckSelection,
            mode,
            decks: Vec::new(),
            selected: 0,
            session: None,
            status: None,
            should_exit: false,
        };
        app.refresh_decks();
        app
    }

    /// Run the application
    pub fn run(mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        while !self.should_exit {
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;
        }

        Ok(())
    }

    /// Rebuild the deck list with current scores
    fn refresh_decks(&mut self) {
        let names: Vec<(String, usize)> = self
            .store
            .decks()
            .iter()
            .map(|(name, cards)| (name.clone(), cards.len()))
            .collect();

        self.decks = names
            .into_iter()
            .map(|(name, cards)| {
                let score = self.store.snapshot(&name, cards);
                DeckSummary { name, cards, score }
            })
            .collect();

        if self.selected >= self.decks.len() {
            self.selected = self.decks.len().saturating_sub(1);
        }
    }

    /// Start studying `name`, resuming at the last answered card
    pub fn open_deck(&mut self, name: &str) -> Result<()> {
        let cards = self
            .store
            .deck(name)
            .map(<[Card]>::to_vec)
            .with_context(|| format!("Deck '{}' not found", name))?;

        let index = self.store.resume_index(name, cards.len());
        let progress = self.store.progress(name, cards.len());

        let mut session = StudySession {
            deck_name: name.to_string(),
            cards,
            index,
            showing_back: false,
            mode: self.mode,
            progress,
            choices: None,
            typed: String::new(),
        };
        session.prepare_card(self.config.choice_count, self.scheduler.rng());

        info!("studying '{}' in {} mode from card {}", name, self.mode.label(), index);
        self.session = Some(session);
        self.status = None;
        self.phase = Phase::Studying;
        Ok(())
    }

    /// Render the UI
    fn render(&self, frame: &mut Frame) {
        match &self.phase {
            Phase::DeckSelection => {
                ui::render_deck_selection(
                    frame,
                    &self.decks,
                    self.selected,
                    self.status.as_deref(),
                );
            }
            Phase::ConfirmDelete(name) => ui::render_confirm_delete(frame, name),
            Phase::Studying => {
                if let Some(session) = &self.session {
                    ui::render_study(frame, &self.study_view(session));
                }
            }
        }
    }

    fn study_view<'a>(&'a self, session: &'a StudySession) -> StudyView<'a> {
        let (face, text) = match session.current() {
            None => (
                Face::Empty,
                "No cards in this deck.\nAdd some with `boxcards edit` or `boxcards import`.",
            ),
            Some(card) if session.showing_back => (Face::Back, card.back.as_str()),
            Some(card) => (Face::Front, card.front.as_str()),
        };
        let position = if session.cards.is_empty() {
            (0, 0)
        } else {
            (session.index + 1, session.cards.len())
        };

        StudyView {
            deck: &session.deck_name,
            mode: session.mode,
            face,
            text,
            position,
            score: Snapshot {
                correct: session.progress.correct,
                total: session.progress.total,
            },
            box_level: session.progress.boxes.get(session.index).copied(),
            choices: session.choices.as_ref(),
            typed: (session.mode == StudyMode::Typed).then_some(session.typed.as_str()),
            status: self.status.as_deref(),
        }
    }

    /// Handle input events
    fn handle_events(&mut self) -> Result<()> {
        if let Event::Key(key) = event::read()? {
            // Only handle key press events
            if key.kind == KeyEventKind::Press {
                self.handle_key(key)?;
            }
        }
        Ok(())
    }

    /// Dispatch a key press to the current phase
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_exit = true;
            return Ok(());
        }

        match self.phase {
            Phase::DeckSelection => self.handle_deck_selection(key),
            Phase::ConfirmDelete(_) => self.handle_confirm_delete(key),
            Phase::Studying => self.handle_studying(key),
        }
    }

    /// Handle deck selection input
    fn handle_deck_selection(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.decks.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(deck) = self.decks.get(self.selected) {
                    let name = deck.name.clone();
                    self.open_deck(&name)?;
                }
            }
            KeyCode::Char('d') => {
                if let Some(deck) = self.decks.get(self.selected) {
                    self.phase = Phase::ConfirmDelete(deck.name.clone());
                }
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                self.should_exit = true;
            }
            _ => {}
        }
        Ok(())
    }

    /// Handle delete confirmation input
    fn handle_confirm_delete(&mut self, key: KeyEvent) -> Result<()> {
        if let Phase::ConfirmDelete(name) = std::mem::replace(&mut self.phase, Phase::DeckSelection)
        {
            if key.code == KeyCode::Char('y') {
                self.status = Some(match self.store.delete_deck(&name) {
                    Ok(()) => format!("Deleted deck '{}'.", name),
                    Err(e) => format!("Could not delete deck: {}", e),
                });
            }
            self.refresh_decks();
        }
        Ok(())
    }

    /// Handle studying input
    fn handle_studying(&mut self, key: KeyEvent) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            self.phase = Phase::DeckSelection;
            return Ok(());
        };
        let mode = session.mode;
        let empty = session.cards.is_empty();

        match key.code {
            KeyCode::Esc => {
                self.session = None;
                self.status = None;
                self.phase = Phase::DeckSelection;
                self.refresh_decks();
                return Ok(());
            }
            KeyCode::Tab => {
                self.switch_mode(mode.cycle());
                return Ok(());
            }
            _ => {}
        }

        // Study keys need a card
        if empty {
            return Ok(());
        }

        match key.code {
            KeyCode::Right => self.advance(Direction::Forward),
            KeyCode::Left => self.advance(Direction::Backward),
            KeyCode::Enter if mode == StudyMode::Typed => self.check_typed_answer(),
            KeyCode::Backspace if mode == StudyMode::Typed => {
                if let Some(session) = self.session.as_mut() {
                    session.typed.pop();
                }
                Ok(())
            }
            KeyCode::Char(c) if mode == StudyMode::Typed => {
                if let Some(session) = self.session.as_mut() {
                    session.typed.push(c);
                }
                Ok(())
            }
            KeyCode::Char(c)
                if mode == StudyMode::MultipleChoice && self.choice_index(c).is_some() =>
            {
                self.pick_choice(c)
            }
            KeyCode::Char(' ') => {
                self.flip();
                Ok(())
            }
            KeyCode::Char('l') => self.advance(Direction::Forward),
            KeyCode::Char('h') => self.advance(Direction::Backward),
            KeyCode::Char('1') => {
                self.status = Some("Marked right.".to_string());
                self.record(true)
            }
            KeyCode::Char('2') => {
                self.status = Some("Marked wrong.".to_string());
                self.record(false)
            }
            _ => Ok(()),
        }
    }

    fn switch_mode(&mut self, mode: StudyMode) {
        self.mode = mode;
        if let Some(session) = self.session.as_mut() {
            session.mode = mode;
            session.prepare_card(self.config.choice_count, self.scheduler.rng());
        }
        self.status = Some(format!("Mode: {}", mode.label()));
    }

    fn flip(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.showing_back = !session.showing_back;
        }
    }

    /// Move to the next card under the session's mode
    fn advance(&mut self, direction: Direction) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.cards.is_empty() {
            return Ok(());
        }

        session.index = self.scheduler.next_index(
            &mut self.store,
            &session.deck_name,
            session.cards.len(),
            session.index,
            session.mode,
            direction,
        )?;
        session.prepare_card(self.config.choice_count, self.scheduler.rng());
        Ok(())
    }

    /// Record an answer for the current card, then move on
    fn record(&mut self, correct: bool) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.cards.is_empty() {
            return Ok(());
        }

        session.progress = self.scheduler.record_answer(
            &mut self.store,
            &session.deck_name,
            session.cards.len(),
            session.index,
            correct,
            session.mode.is_spaced(),
        );
        self.advance(Direction::Forward)
    }

    /// Option selected by `key`, if the current card offers one
    fn choice_index(&self, key: char) -> Option<usize> {
        let choices = self.session.as_ref()?.choices.as_ref()?;
        (0..choices.options.len()).find(|&i| choice_key(i) == key)
    }

    fn pick_choice(&mut self, key: char) -> Result<()> {
        let Some(picked) = self.choice_index(key) else {
            return Ok(());
        };
        let Some(choices) = self.session.as_ref().and_then(|s| s.choices.as_ref()) else {
            return Ok(());
        };

        let correct = choices.is_correct(picked);
        self.status = Some(if correct {
            "Correct!".to_string()
        } else {
            format!("Wrong. Answer: {}", choices.options[choices.correct])
        });
        self.record(correct)
    }

    fn check_typed_answer(&mut self) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let Some(card) = session.current() else {
            return Ok(());
        };
        // Blank input is not an attempt
        let Some(correct) = check_typed(&card.back, &session.typed) else {
            return Ok(());
        };

        self.status = Some(if correct {
            "Correct!".to_string()
        } else {
            format!("Wrong. Answer: {}", card.back)
        });
        self.record(correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Decks;
    use crate::scheduler::BoxLevel;
    use crate::storage::MemoryStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn capitals() -> Decks {
        Decks::from([(
            "Capitals".to_string(),
            vec![
                Card::new("France", "Paris"),
                Card::new("Peru", "Lima"),
                Card::new("Japan", "Tokyo"),
            ],
        )])
    }

    fn app_with(decks: Decks, mode: StudyMode) -> App<MemoryStore, StdRng> {
        let mut store = ProgressStore::load(MemoryStore::default());
        store.merge_decks(decks);
        App::new(
            Config::default(),
            store,
            Scheduler::new(StdRng::seed_from_u64(11)),
            mode,
        )
    }

    fn session(app: &App<MemoryStore, StdRng>) -> &StudySession {
        app.session.as_ref().unwrap()
    }

    #[test]
    fn test_seeds_example_deck_when_empty() {
        let app = app_with(Decks::new(), StudyMode::Sequential);
        assert_eq!(app.decks.len(), 1);
        assert_eq!(app.decks[0].name, "Example Deck");
    }

    #[test]
    fn test_no_seed_when_disabled() {
        let config = Config {
            seed_example_deck: false,
            ..Config::default()
        };
        let app = App::new(
            config,
            ProgressStore::load(MemoryStore::default()),
            Scheduler::new(StdRng::seed_from_u64(1)),
            StudyMode::Sequential,
        );
        assert!(app.decks.is_empty());
    }

    #[test]
    fn test_sequential_navigation_wraps() {
        let mut app = app_with(capitals(), StudyMode::Sequential);
        app.handle_key(press(KeyCode::Enter)).unwrap();
        assert_eq!(app.phase, Phase::Studying);
        assert_eq!(session(&app).index, 0);

        app.handle_key(press(KeyCode::Left)).unwrap();
        assert_eq!(session(&app).index, 2);
        app.handle_key(press(KeyCode::Right)).unwrap();
        assert_eq!(session(&app).index, 0);
    }

    #[test]
    fn test_flip_and_reset_on_move() {
        let mut app = app_with(capitals(), StudyMode::Sequential);
        app.open_deck("Capitals").unwrap();

        app.handle_key(press(KeyCode::Char(' '))).unwrap();
        assert!(session(&app).showing_back);
        app.handle_key(press(KeyCode::Right)).unwrap();
        assert!(!session(&app).showing_back);
    }

    #[test]
    fn test_record_in_sequential_mode() {
        let mut app = app_with(capitals(), StudyMode::Sequential);
        app.open_deck("Capitals").unwrap();

        app.handle_key(press(KeyCode::Char('1'))).unwrap();
        app.handle_key(press(KeyCode::Char('2'))).unwrap();

        let s = session(&app);
        assert_eq!((s.progress.correct, s.progress.total), (1, 2));
        assert_eq!(s.progress.last_index, 1);
        assert_eq!(s.index, 2);
        assert!(s.progress.boxes.iter().all(|b| *b == BoxLevel::Fresh));
    }

    #[test]
    fn test_record_in_spaced_mode_moves_boxes() {
        let mut app = app_with(capitals(), StudyMode::Spaced);
        app.open_deck("Capitals").unwrap();
        let first = session(&app).index;

        app.handle_key(press(KeyCode::Char('1'))).unwrap();
        let s = session(&app);
        assert_eq!(s.progress.boxes[first], BoxLevel::Learning);
        assert!(s.index < 3);
    }

    #[test]
    fn test_resumes_at_last_index() {
        let mut app = app_with(capitals(), StudyMode::Sequential);
        app.open_deck("Capitals").unwrap();
        app.handle_key(press(KeyCode::Right)).unwrap();
        app.handle_key(press(KeyCode::Char('1'))).unwrap();

        app.handle_key(press(KeyCode::Esc)).unwrap();
        assert_eq!(app.phase, Phase::DeckSelection);
        assert_eq!(app.decks[0].score, Snapshot { correct: 1, total: 1 });

        app.open_deck("Capitals").unwrap();
        assert_eq!(session(&app).index, 1);
    }

    #[test]
    fn test_typed_mode_checks_answer() {
        let mut app = app_with(capitals(), StudyMode::Typed);
        app.open_deck("Capitals").unwrap();

        // Enter on blank input is ignored
        app.handle_key(press(KeyCode::Enter)).unwrap();
        assert_eq!(session(&app).progress.total, 0);

        for c in " PARIS ".chars() {
            app.handle_key(press(KeyCode::Char(c))).unwrap();
        }
        app.handle_key(press(KeyCode::Enter)).unwrap();

        let s = session(&app);
        assert_eq!((s.progress.correct, s.progress.total), (1, 1));
        assert_eq!(s.index, 1);
        assert!(s.typed.is_empty());
        assert_eq!(app.status.as_deref(), Some("Correct!"));
    }

    #[test]
    fn test_multiple_choice_pick() {
        let mut app = app_with(capitals(), StudyMode::MultipleChoice);
        app.open_deck("Capitals").unwrap();

        let choices = session(&app).choices.clone().unwrap();
        let right = choice_key(choices.correct);
        app.handle_key(press(KeyCode::Char(right))).unwrap();

        let s = session(&app);
        assert_eq!((s.progress.correct, s.progress.total), (1, 1));
        assert!(s.choices.is_some());
    }

    #[test]
    fn test_every_choice_letter_is_pickable() {
        let cards: Vec<Card> = (0..14)
            .map(|i| Card::new(format!("q{}", i), format!("a{}", i)))
            .collect();
        let mut store = ProgressStore::load(MemoryStore::default());
        store.merge_decks(Decks::from([("Big".to_string(), cards)]));
        let config = Config {
            choice_count: 12,
            ..Config::default()
        };
        let mut app = App::new(
            config,
            store,
            Scheduler::new(StdRng::seed_from_u64(5)),
            StudyMode::MultipleChoice,
        );
        app.open_deck("Big").unwrap();
        assert_eq!(session(&app).choices.as_ref().unwrap().options.len(), 12);

        app.handle_key(press(KeyCode::Char('h'))).unwrap();
        assert_eq!(session(&app).progress.total, 1);
        assert_eq!(session(&app).index, 1);

        app.handle_key(press(KeyCode::Char('l'))).unwrap();
        assert_eq!(session(&app).progress.total, 2);
        assert_eq!(session(&app).index, 2);
    }

    #[test]
    fn test_tab_cycles_mode() {
        let mut app = app_with(capitals(), StudyMode::Sequential);
        app.open_deck("Capitals").unwrap();

        app.handle_key(press(KeyCode::Tab)).unwrap();
        assert_eq!(session(&app).mode, StudyMode::Spaced);
        app.handle_key(press(KeyCode::Tab)).unwrap();
        assert!(session(&app).choices.is_some());
        app.handle_key(press(KeyCode::Tab)).unwrap();
        assert!(session(&app).choices.is_none());
        assert_eq!(app.mode, StudyMode::Typed);
    }

    #[test]
    fn test_empty_deck_ignores_study_keys() {
        let decks = Decks::from([("Empty".to_string(), Vec::new())]);
        let mut app = app_with(decks, StudyMode::Spaced);
        app.open_deck("Empty").unwrap();

        app.handle_key(press(KeyCode::Right)).unwrap();
        app.handle_key(press(KeyCode::Char('1'))).unwrap();
        assert_eq!(session(&app).progress.total, 0);
        assert_eq!(session(&app).index, 0);
    }

    #[test]
    fn test_delete_with_confirmation() {
        let mut app = app_with(capitals(), StudyMode::Sequential);

        app.handle_key(press(KeyCode::Char('d'))).unwrap();
        app.handle_key(press(KeyCode::Char('n'))).unwrap();
        assert_eq!(app.decks.len(), 1);

        app.handle_key(press(KeyCode::Char('d'))).unwrap();
        app.handle_key(press(KeyCode::Char('y'))).unwrap();
        assert!(app.decks.is_empty());
        assert_eq!(app.phase, Phase::DeckSelection);
    }

    #[test]
    fn test_open_missing_deck_is_error() {
        let mut app = app_with(capitals(), StudyMode::Sequential);
        assert!(app.open_deck("Nope").is_err());
    }

    #[test]
    fn test_ctrl_c_exits() {
        let mut app = app_with(capitals(), StudyMode::Typed);
        app.open_deck("Capitals").unwrap();
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
            .unwrap();
        assert!(app.should_exit);
    }
}
