//! Configuration for boardsync.
//!
//! Settings are read from `.boardsync/boardsync.toml` and layered
//! file → environment (`BOARDSYNC_*`) → CLI. Every field has a default, so
//! a missing file is the same as an empty one.
//!
//! ```toml
//! [store]
//! database_path = ".boardsync/remote.db"
//! state_path = ".boardsync/state.db"
//!
//! [feed]
//! capacity = 256
//!
//! [boards]
//! default_board_name = "My Board"
//! starter_columns = ["To Do", "In Progress", "Done"]
//! max_name_len = 120
//!
//! [tasks]
//! max_title_len = 500
//! compact_on_delete = false
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".boardsync";
pub const CONFIG_FILE: &str = "boardsync.toml";

/// Where the remote store and the client state live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Remote store database (defaults to `.boardsync/remote.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Client state database (defaults to `.boardsync/state.db`)
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    /// Bounded channel size per subscription
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,
}

fn default_feed_capacity() -> usize {
    256
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            capacity: default_feed_capacity(),
        }
    }
}

/// Board lifecycle settings used by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardsConfig {
    /// Name of the board created for an account that has none
    #[serde(default = "default_board_name")]
    pub default_board_name: String,
    /// Columns seeded into new or empty boards, in order
    #[serde(default = "default_starter_columns")]
    pub starter_columns: Vec<String>,
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

fn default_board_name() -> String {
    "My Board".to_string()
}

fn default_starter_columns() -> Vec<String> {
    vec!["To Do".to_string(), "In Progress".to_string(), "Done".to_string()]
}

fn default_max_name_len() -> usize {
    120
}

impl Default for BoardsConfig {
    fn default() -> Self {
        Self {
            default_board_name: default_board_name(),
            starter_columns: default_starter_columns(),
            max_name_len: default_max_name_len(),
        }
    }
}

/// Limits and behaviour of task and column mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Longest task or column title accepted, in characters
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,
    /// Renumber a column densely after one of its tasks is deleted
    #[serde(default)]
    pub compact_on_delete: bool,
}

fn default_max_title_len() -> usize {
    500
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_title_len: default_max_title_len(),
            compact_on_delete: false,
        }
    }
}

/// The complete boardsync.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncToml {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub boards: BoardsConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

impl SyncToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse boardsync.toml")
    }

    /// Load `boardsync.toml` from `config_dir`, or defaults if it is absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize boardsync.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `BOARDSYNC_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(std::env::vars())
    }

    /// Apply `BOARDSYNC_*` overrides from the given variables. Unknown
    /// names are ignored; malformed values are an error.
    pub fn apply_env_from<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "BOARDSYNC_DB" => self.store.database_path = Some(PathBuf::from(value)),
                "BOARDSYNC_STATE" => self.store.state_path = Some(PathBuf::from(value)),
                "BOARDSYNC_FEED_CAPACITY" => {
                    self.feed.capacity = value
                        .parse()
                        .with_context(|| format!("Invalid BOARDSYNC_FEED_CAPACITY '{}'", value))?;
                }
                "BOARDSYNC_DEFAULT_BOARD" => self.boards.default_board_name = value.to_string(),
                "BOARDSYNC_COMPACT_ON_DELETE" => {
                    self.tasks.compact_on_delete = parse_bool(value).with_context(|| {
                        format!("Invalid BOARDSYNC_COMPACT_ON_DELETE '{}'", value)
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject settings that would break board invariants. Every board must
    /// be seeded with at least one column, and column titles are non-empty.
    pub fn check(&self) -> Result<()> {
        if self.boards.starter_columns.is_empty() {
            bail!("boards.starter_columns must name at least one column");
        }
        if self.boards.starter_columns.iter().any(|c| c.trim().is_empty()) {
            bail!("boards.starter_columns contains an empty title");
        }
        Ok(())
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.feed.capacity == 0 {
            warnings.push("feed.capacity must be greater than 0".to_string());
        }
        if self.boards.default_board_name.trim().is_empty() {
            warnings.push("boards.default_board_name must not be empty".to_string());
        }
        if self.boards.max_name_len == 0 {
            warnings.push("boards.max_name_len must be greater than 0".to_string());
        }
        if self.tasks.max_title_len == 0 {
            warnings.push("tasks.max_title_len must be greater than 0".to_string());
        }
        warnings
    }
}

/// Effective configuration: boardsync.toml, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path to the .boardsync directory
    pub config_dir: PathBuf,
    pub toml: SyncToml,
    /// Account whose boards are operated on
    pub account: String,
    pub cli_database_path: Option<PathBuf>,
    pub cli_state_path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let config_dir = base_dir.join(CONFIG_DIR);
        let mut toml = SyncToml::load_or_default(&config_dir)?;
        toml.apply_env()?;
        toml.check().with_context(|| {
            format!("Invalid configuration in {}", config_dir.join(CONFIG_FILE).display())
        })?;
        Ok(Self {
            config_dir,
            toml,
            account: "local".to_string(),
            cli_database_path: None,
            cli_state_path: None,
        })
    }

    pub fn with_cli_args(
        base_dir: &Path,
        account: Option<String>,
        database_path: Option<PathBuf>,
        state_path: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self::new(base_dir)?;
        if let Some(account) = account {
            config.account = account;
        }
        config.cli_database_path = database_path;
        config.cli_state_path = state_path;
        Ok(config)
    }

    /// Remote store path (CLI → env/file → default).
    pub fn database_path(&self) -> PathBuf {
        self.cli_database_path
            .clone()
            .or_else(|| self.toml.store.database_path.clone())
            .unwrap_or_else(|| self.config_dir.join("remote.db"))
    }

    /// Client state path (CLI → env/file → default).
    pub fn state_path(&self) -> PathBuf {
        self.cli_state_path
            .clone()
            .or_else(|| self.toml.store.state_path.clone())
            .unwrap_or_else(|| self.config_dir.join("state.db"))
    }

    pub fn feed_capacity(&self) -> usize {
        self.toml.feed.capacity.max(1)
    }

    pub fn boards(&self) -> &BoardsConfig {
        &self.toml.boards
    }

    pub fn tasks(&self) -> &TasksConfig {
        &self.toml.tasks
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if self.account.trim().is_empty() {
            warnings.push("account must not be empty".to_string());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let toml = SyncToml::default();
        assert_eq!(toml.feed.capacity, 256);
        assert_eq!(toml.boards.default_board_name, "My Board");
        assert_eq!(toml.boards.starter_columns, vec!["To Do", "In Progress", "Done"]);
        assert_eq!(toml.tasks.max_title_len, 500);
        assert!(!toml.tasks.compact_on_delete);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file() {
        let content = r#"
[boards]
starter_columns = ["Backlog", "Doing"]

[tasks]
compact_on_delete = true
"#;
        let toml = SyncToml::parse(content).unwrap();
        assert_eq!(toml.boards.starter_columns, vec!["Backlog", "Doing"]);
        assert_eq!(toml.boards.max_name_len, 120);
        assert!(toml.tasks.compact_on_delete);
        assert_eq!(toml.feed.capacity, 256);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(SyncToml::parse("[boards\nname = ").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = SyncToml::default();
        toml.feed.capacity = 64;
        toml.save(&path).unwrap();
        let loaded = SyncToml::load(&path).unwrap();
        assert_eq!(loaded.feed.capacity, 64);
    }

    #[test]
    fn test_env_overrides() {
        let mut toml = SyncToml::default();
        toml.apply_env_from([
            ("BOARDSYNC_DB", "/tmp/remote.db"),
            ("BOARDSYNC_FEED_CAPACITY", "32"),
            ("BOARDSYNC_COMPACT_ON_DELETE", "yes"),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();
        assert_eq!(toml.store.database_path, Some(PathBuf::from("/tmp/remote.db")));
        assert_eq!(toml.feed.capacity, 32);
        assert!(toml.tasks.compact_on_delete);

        let err = toml.apply_env_from([("BOARDSYNC_FEED_CAPACITY", "lots")]);
        assert!(err.is_err());
    }

    #[test]
    fn test_validate_warns() {
        let mut toml = SyncToml::default();
        toml.feed.capacity = 0;
        toml.tasks.max_title_len = 0;
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_starter_columns_must_be_usable() {
        let mut toml = SyncToml::default();
        assert!(toml.check().is_ok());

        toml.boards.starter_columns.clear();
        let err = toml.check().unwrap_err();
        assert!(err.to_string().contains("at least one column"));

        toml.boards.starter_columns = vec!["To Do".to_string(), "  ".to_string()];
        assert!(toml.check().is_err());
    }

    #[test]
    fn test_config_with_empty_starter_columns_fails_to_load() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE), "[boards]\nstarter_columns = []\n").unwrap();

        let err = SyncConfig::new(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("at least one column"));
    }

    #[test]
    fn test_config_paths_and_cli_overrides() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join(CONFIG_FILE),
            "[store]\ndatabase_path = \"from-file.db\"\n",
        )
        .unwrap();

        let config = SyncConfig::new(dir.path()).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("from-file.db"));
        assert!(config.state_path().ends_with(".boardsync/state.db"));

        let config = SyncConfig::with_cli_args(
            dir.path(),
            Some("alice".to_string()),
            Some(PathBuf::from("cli.db")),
            None,
        )
        .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("cli.db"));
        assert_eq!(config.account, "alice");
    }
}
