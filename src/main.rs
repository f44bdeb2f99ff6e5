//! sheetblocks - live widgets for markdown character sheets.

use anyhow::{Result, bail};
use clap::Parser;
use sheetblocks::{
    cli::{Cli, Commands},
    config::SheetConfig,
    init::new_project,
    render::{click_block, render_document, show_state},
    watch::watch_vault,
};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Init => new_project(&config),
        Commands::Render { file } => render_document(&config, file),
        Commands::Click {
            file,
            block,
            index,
            times,
        } => click_block(&config, file, *block, *index, *times),
        Commands::State { key } => show_state(&config, key.as_deref()),
        Commands::Watch { path } => watch_vault(&config, path.as_deref()),
    }
}

/// Load and validate configuration from CLI arguments.
///
/// A missing config file means defaults, except for `init` which refuses to
/// overwrite an existing one.
fn load_config(cli: &Cli) -> Result<SheetConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        if cli.is_init() {
            bail!("Config file already exists. Remove it manually or init in a different path.")
        }
        SheetConfig::from_path(&config_path)?
    } else {
        SheetConfig::default()
    };
    config.update_with_cli(cli);

    if !cli.is_init() {
        config.validate()?;
    }

    Ok(config)
}
