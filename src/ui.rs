use crate::progress::Snapshot;
use crate::quiz::Choices;
use crate::scheduler::{BoxLevel, StudyMode};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};

/// One row of the deck selection list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckSummary {
    pub name: String,
    pub cards: usize,
    pub score: Snapshot,
}

/// What the card is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Front,
    Back,
    /// Deck has no cards
    Empty,
}

/// UI state for the study screen
pub struct StudyView<'a> {
    pub deck: &'a str,
    pub mode: StudyMode,
    pub face: Face,
    /// Text of the visible face
    pub text: &'a str,
    /// 1-based card number and deck size
    pub position: (usize, usize),
    pub score: Snapshot,
    /// Box of the current card, shown in spaced mode
    pub box_level: Option<BoxLevel>,
    pub choices: Option<&'a Choices>,
    /// Input line in typed mode
    pub typed: Option<&'a str>,
    pub status: Option<&'a str>,
}

/// Letter used to pick option `i` in multiple-choice mode
pub fn choice_key(i: usize) -> char {
    (b'a' + (i % 26) as u8) as char
}

/// Render the study screen
pub fn render_study(frame: &mut Frame, view: &StudyView) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Fill(1),   // Top spacer
        Constraint::Length(1), // Deck name and position
        Constraint::Length(1), // Mode and score
        Constraint::Length(1), // Question / Answer label
        Constraint::Length(4), // Card text
        Constraint::Length(6), // Choices or typed input
        Constraint::Length(1), // Status message
        Constraint::Length(1), // Key help
        Constraint::Fill(1),   // Bottom spacer
    ])
    .split(area);

    let (index, total) = view.position;
    let header = Paragraph::new(format!("{}  {} / {}", view.deck, index, total))
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(header, chunks[1]);

    let mut mode_line = vec![
        Span::styled(view.mode.label(), Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::raw(format!(
            "{} right / {} total",
            view.score.correct, view.score.total
        )),
    ];
    if view.mode.is_spaced()
        && let Some(level) = view.box_level
    {
        mode_line.push(Span::styled(
            format!("  box {}", level.as_u8()),
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(mode_line)).alignment(Alignment::Center),
        chunks[2],
    );

    let (label, color) = match view.face {
        Face::Front => ("Question", Color::DarkGray),
        Face::Back => ("Answer", Color::Green),
        Face::Empty => ("Empty", Color::DarkGray),
    };
    let label = Paragraph::new(label)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);
    frame.render_widget(label, chunks[3]);

    let text = Paragraph::new(view.text)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(text, chunks[4]);

    if let Some(choices) = view.choices {
        let lines: Vec<Line> = choices
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| Line::from(format!("{}) {}", choice_key(i), option)))
            .collect();
        frame.render_widget(
            Paragraph::new(lines).alignment(Alignment::Center),
            chunks[5],
        );
    } else if let Some(typed) = view.typed {
        let input = Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::DarkGray)),
            Span::styled(typed, Style::default().fg(Color::White)),
            Span::styled("_", Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(
            Paragraph::new(input).alignment(Alignment::Center),
            chunks[5],
        );
    }

    if let Some(msg) = view.status {
        let message = Paragraph::new(msg)
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        frame.render_widget(message, chunks[6]);
    }

    let help = match view.mode {
        StudyMode::MultipleChoice => "letter pick  space flip  ←/→ move  tab mode  esc decks",
        StudyMode::Typed => "type answer  enter check  ←/→ move  tab mode  esc decks",
        StudyMode::Sequential | StudyMode::Spaced => {
            "space flip  1 right  2 wrong  ←/→ move  tab mode  esc decks"
        }
    };
    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center),
        chunks[7],
    );
}

/// Render deck selection screen
pub fn render_deck_selection(
    frame: &mut Frame,
    decks: &[DeckSummary],
    selected: usize,
    status: Option<&str>,
) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(2),
        Constraint::Length((decks.len().max(1) + 1) as u16),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .split(area);

    let title = Paragraph::new("Select a deck")
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);
    frame.render_widget(title, chunks[1]);

    let mut lines: Vec<Line> = Vec::new();

    for (i, deck) in decks.iter().enumerate() {
        let prefix = if i == selected { "> " } else { "  " };
        let style = if i == selected {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        };

        lines.push(Line::from(Span::styled(
            format!(
                "{}{} ({} cards, {} right / {} total)",
                prefix, deck.name, deck.cards, deck.score.correct, deck.score.total
            ),
            style,
        )));
    }

    if decks.is_empty() {
        lines.push(Line::from(Span::styled(
            "No decks yet. Import some with `boxcards import <file>`.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let list = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(list, chunks[2]);

    if let Some(msg) = status {
        let message = Paragraph::new(msg)
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        frame.render_widget(message, chunks[3]);
    }

    let help = Paragraph::new("enter study  d delete  q quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, chunks[4]);
}

/// Render delete confirmation
pub fn render_confirm_delete(frame: &mut Frame, deck: &str) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(3),
        Constraint::Fill(1),
    ])
    .split(area);

    let lines = vec![
        Line::from(Span::styled(
            format!("Delete deck '{}' and its progress?", deck),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Press y to delete or any other key to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let confirm = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(confirm, chunks[1]);
}
