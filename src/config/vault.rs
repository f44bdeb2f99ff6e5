//! `[vault]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[vault]` section in sheetblocks.toml - where the documents live.
///
/// # Example
/// ```toml
/// [vault]
/// root = "notes"
/// extensions = ["md", "markdown"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Document directory, relative to the project root.
    #[serde(default = "defaults::vault::root")]
    #[educe(Default = defaults::vault::root())]
    pub root: PathBuf,

    /// File extensions treated as documents (without the dot).
    #[serde(default = "defaults::vault::extensions")]
    #[educe(Default = defaults::vault::extensions())]
    pub extensions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::super::SheetConfig;
    use std::path::Path;

    #[test]
    fn test_vault_config() {
        let config: SheetConfig = toml::from_str(
            r#"
            [vault]
            root = "notes"
            extensions = ["md", "markdown"]
        "#,
        )
        .unwrap();

        assert_eq!(config.vault.root, Path::new("notes"));
        assert_eq!(config.vault.extensions, vec!["md", "markdown"]);
    }

    #[test]
    fn test_vault_config_defaults() {
        let config: SheetConfig = toml::from_str("").unwrap();
        assert_eq!(config.vault.root, Path::new("."));
        assert_eq!(config.vault.extensions, vec!["md"]);
    }
}
