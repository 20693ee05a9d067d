mod app;
mod cli;
mod config;
mod deck;
mod logging;
mod progress;
mod quiz;
mod scheduler;
mod storage;
mod ui;

use anyhow::Result;
use app::App;
use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use log::warn;
use progress::ProgressStore;
use scheduler::{Scheduler, StudyMode};
use storage::SqliteStore;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    config.ensure_dirs()?;
    if let Err(e) = logging::init(&config.log_path) {
        eprintln!("Warning: logging disabled ({:#})", e);
    }

    // A broken database should not stop anyone from studying
    let sqlite = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            warn!("falling back to in-memory storage: {:#}", e);
            eprintln!("Warning: progress will not be saved ({:#})", e);
            SqliteStore::open_in_memory()?
        }
    };
    let mut store = ProgressStore::load(sqlite);

    match cli.command {
        None => run_study(config, store, None, None),
        Some(Command::Study { deck, mode }) => run_study(config, store, deck, mode),
        Some(command) => cli::run_command(&mut store, command, &mut std::io::stdout().lock()),
    }
}

fn run_study(
    config: Config,
    store: ProgressStore<SqliteStore>,
    deck: Option<String>,
    mode: Option<StudyMode>,
) -> Result<()> {
    let mode = mode.unwrap_or(config.default_mode);
    let mut app = App::new(config, store, Scheduler::new(rand::rng()), mode);
    if let Some(name) = deck {
        app.open_deck(&name)?;
    }

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal);
    ratatui::restore();

    result
}
