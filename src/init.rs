//! Project initialization module.
//!
//! Writes a default configuration and a sample character sheet.

use crate::config::SheetConfig;
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Files to write ignore patterns to
const IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

/// Sample document showing every built-in widget
const SAMPLE_SHEET: &str = r#"---
name: Wren
level: 2
skills:
  stealth: 2
---
# Wren

```traits
base: { agility: 2, strength: -1, finesse: 1, instinct: 0, presence: 1, knowledge: 0 }
bonuses:
  - { agility: 1 }
```

```badges
items:
  - { label: Evasion, value: "{{ add 10 abilities.agility }}" }
  - { label: Stealth, value: "{{ skills.stealth }}" }
```

```tracker
label: HP
uses: "{{ add 4 frontmatter.level }}"
state_key: hp
```

```checklist
label: Gear
items: [Rope, Torch, Rations]
state_key: gear
```
"#;

/// Create a project in the configured root
pub fn new_project(config: &SheetConfig) -> Result<()> {
    if config.config_path.exists() {
        bail!(
            "Config file already exists at {}. Remove it manually or init in a different path.",
            config.config_path.display()
        );
    }

    fs::create_dir_all(&config.vault.root)
        .with_context(|| format!("Failed to create {}", config.vault.root.display()))?;
    init_default_config(&config.config_path)?;
    init_sample(&config.vault.root)?;

    let state = config.store.path.strip_prefix(config.get_root()).unwrap_or(&config.store.path);
    init_ignored_files(config.get_root(), &[state])?;

    Ok(())
}

/// Write default configuration file
fn init_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&SheetConfig::default())?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write the sample sheet unless the vault already has one
fn init_sample(vault: &Path) -> Result<()> {
    let path = vault.join("sample.md");
    if !path.exists() {
        fs::write(&path, SAMPLE_SHEET)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Initialize .gitignore and .ignore files with specified paths
pub fn init_ignored_files(root: &Path, paths: &[&Path]) -> Result<()> {
    let content = paths
        .iter()
        .filter_map(|p| p.to_str())
        .collect::<Vec<_>>()
        .join("\n");

    for filename in IGNORE_FILES {
        let path = root.join(filename);
        if !path.exists() {
            fs::write(&path, &content)?;
        }
    }

    Ok(())
}
