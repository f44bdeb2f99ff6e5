//! Project configuration management for `sheetblocks.toml`.
//!
//! # Sections
//!
//! | Section    | Purpose                                     |
//! |------------|---------------------------------------------|
//! | `[vault]`  | Document directory and file extensions      |
//! | `[store]`  | Widget state file and flush timing          |
//! | `[watch]`  | File watcher debounce                       |
//!
//! # Example
//!
//! ```toml
//! [vault]
//! root = "notes"
//!
//! [store]
//! path = "~/.local/share/sheetblocks/state.json"
//! debounce_ms = 200
//!
//! [watch]
//! debounce_ms = 300
//! ```

pub mod defaults;
mod error;
mod store;
mod vault;
mod watch;

pub use error::ConfigError;
pub use store::StoreConfig;
pub use vault::VaultConfig;
pub use watch::WatchConfig;

use crate::cli::Cli;
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing sheetblocks.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SheetConfig {
    /// Absolute project root (set after loading)
    #[serde(skip)]
    #[educe(Default = PathBuf::from("./"))]
    pub root: PathBuf,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Documents
    #[serde(default)]
    pub vault: VaultConfig,

    /// Widget state persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// File watcher
    #[serde(default)]
    pub watch: WatchConfig,
}

impl SheetConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SheetConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the project root path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Update configuration with CLI arguments.
    ///
    /// Resolves every path against the project root and makes it absolute.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let root = Self::normalize_path(root);

        if let Some(store) = &cli.store {
            self.store.path = store.clone();
        }

        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.vault.root = Self::normalize_path(&root.join(&self.vault.root));
        self.store.path = Self::resolve(&root, &self.store.path);
        self.root = root;
    }

    /// Join `path` to `root` after tilde expansion; absolute paths stay as they are.
    fn resolve(root: &Path, path: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        if expanded.is_relative() {
            Self::normalize_path(&root.join(expanded))
        } else {
            Self::normalize_path(&expanded)
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.vault.extensions.is_empty() {
            bail!(ConfigError::Validation(
                "[vault.extensions] must have at least one element".into()
            ));
        }

        if let Some(ext) = self.vault.extensions.iter().find(|e| e.is_empty() || e.starts_with('.')) {
            bail!(ConfigError::Validation(format!(
                "[vault.extensions] entry `{ext}` must be an extension without the dot"
            )));
        }

        if !self.vault.root.is_dir() {
            bail!(ConfigError::Validation(format!(
                "[vault.root] `{}` is not a directory",
                self.vault.root.display()
            )));
        }

        if self.store.path.file_name().is_none() {
            bail!(ConfigError::Validation("[store.path] must name a file".into()));
        }

        if self.store.debounce_ms == 0 {
            bail!(ConfigError::Validation("[store.debounce_ms] must be positive".into()));
        }

        if self.store.max_delay_ms < self.store.debounce_ms {
            bail!(ConfigError::Validation(
                "[store.max_delay_ms] must not be smaller than [store.debounce_ms]".into()
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use tempfile::TempDir;

    fn cli(root: &Path, store: Option<&str>) -> Cli {
        Cli {
            root: Some(root.to_path_buf()),
            config: "sheetblocks.toml".into(),
            store: store.map(PathBuf::from),
            command: Commands::State { key: None },
        }
    }

    #[test]
    fn test_from_str() {
        let config = SheetConfig::from_str(
            r#"
            [vault]
            root = "notes"

            [store]
            debounce_ms = 100
        "#,
        )
        .unwrap();

        assert_eq!(config.vault.root, Path::new("notes"));
        assert_eq!(config.store.debounce_ms, 100);
        assert_eq!(config.store.max_delay_ms, 1000);
        assert_eq!(config.watch.debounce_ms, 300);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let err = SheetConfig::from_str("[vault\nroot = 1").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_unknown_section_rejection() {
        assert!(SheetConfig::from_str("[serve]\nport = 1").is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = SheetConfig::from_path(Path::new("/nonexistent/sheetblocks.toml")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Io(..))));
    }

    #[test]
    fn test_update_with_cli_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut config = SheetConfig::default();
        config.update_with_cli(&cli(&root, None));

        assert_eq!(config.get_root(), root);
        assert_eq!(config.vault.root, root);
        assert_eq!(config.config_path, root.join("sheetblocks.toml"));
        assert_eq!(config.store.path, root.join(".sheetblocks/state.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_store_override() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut config = SheetConfig::default();
        config.update_with_cli(&cli(&root, Some("custom/state.json")));

        assert_eq!(config.store.path, root.join("custom/state.json"));
    }

    #[test]
    fn test_tilde_expansion() {
        let dir = TempDir::new().unwrap();
        let mut config = SheetConfig::from_str("[store]\npath = \"~/sheet-state.json\"").unwrap();
        config.update_with_cli(&cli(dir.path(), None));

        assert!(config.store.path.is_absolute());
        assert!(!config.store.path.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let check = |toml: &str| {
            let mut config = SheetConfig::from_str(toml).unwrap();
            config.update_with_cli(&cli(dir.path(), None));
            config.validate()
        };

        assert!(check("[vault]\nextensions = []").is_err());
        assert!(check("[vault]\nextensions = [\".md\"]").is_err());
        assert!(check("[vault]\nroot = \"missing\"").is_err());
        assert!(check("[store]\ndebounce_ms = 0").is_err());
        assert!(check("[store]\ndebounce_ms = 500\nmax_delay_ms = 100").is_err());
        assert!(check("").is_ok());
    }

    #[test]
    fn test_default_config_round_trips() {
        let text = toml::to_string_pretty(&SheetConfig::default()).unwrap();
        let parsed = SheetConfig::from_str(&text).unwrap();
        assert_eq!(parsed.vault.extensions, vec!["md"]);
        assert_eq!(parsed.store.path, PathBuf::from(".sheetblocks/state.json"));
    }
}
