//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Live widgets for markdown character sheets
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root (where the config file lives)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: sheetblocks.toml)
    #[arg(short = 'C', long, default_value = "sheetblocks.toml")]
    pub config: PathBuf,

    /// State file path, overrides `[store.path]`
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a default config file
    Init,

    /// Render a document with its live blocks
    Render {
        /// Document path, relative to the vault root
        file: PathBuf,
    },

    /// Click a box of a live block, then print the document
    Click {
        /// Document path, relative to the vault root
        file: PathBuf,

        /// Zero-based position of the block among the document's live blocks
        #[arg(short, long)]
        block: usize,

        /// Zero-based box to click
        #[arg(short, long)]
        index: usize,

        /// How many times to click
        #[arg(short, long, default_value_t = 1)]
        times: usize,
    },

    /// Print persisted state as JSON
    State {
        /// Only this key
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Watch the vault and re-render documents on change
    Watch {
        /// Only this document (default: every document)
        path: Option<PathBuf>,
    },
}

impl Cli {
    pub const fn is_init(&self) -> bool {
        matches!(self.command, Commands::Init)
    }
}
