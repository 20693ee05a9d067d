use crate::scheduler::StudyMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mode the study screen opens in (default: sequential)
    #[serde(default)]
    pub default_mode: StudyMode,

    /// Add the example deck when the store has no decks at all (default: true)
    #[serde(default = "default_seed_example_deck")]
    pub seed_example_deck: bool,

    /// Number of options shown in multiple-choice mode (default: 4)
    #[serde(default = "default_choice_count")]
    pub choice_count: usize,

    /// Path to database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Path to log file (the terminal belongs to the UI)
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

fn default_seed_example_deck() -> bool {
    true
}

fn default_choice_count() -> usize {
    4
}

fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("boxcards"))
}

fn default_db_path() -> PathBuf {
    data_dir()
        .map(|p| p.join("boxcards.db"))
        .unwrap_or_else(|| PathBuf::from("boxcards.db"))
}

fn default_log_path() -> PathBuf {
    data_dir()
        .map(|p| p.join("boxcards.log"))
        .unwrap_or_else(|| PathBuf::from("boxcards.log"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_mode: StudyMode::default(),
            seed_example_deck: default_seed_example_deck(),
            choice_count: default_choice_count(),
            db_path: default_db_path(),
            log_path: default_log_path(),
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(suffix) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(suffix);
    }
    path.to_path_buf()
}

impl Config {
    /// Load config from file or return defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Invalid config: {}", config_path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.db_path = expand_tilde(&config.db_path);
        config.log_path = expand_tilde(&config.log_path);
        config.choice_count = config.choice_count.clamp(2, 26);
        Ok(config)
    }

    /// Path to config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("boxcards").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Ensure required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        for path in [&self.db_path, &self.log_path] {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        Ok(())
    }
}
