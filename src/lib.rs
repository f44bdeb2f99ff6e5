//! sheetblocks - live, stateful widgets embedded in markdown documents.
//!
//! The core is three pieces:
//!
//! - [`template`]: `{{ ... }}` expressions over frontmatter, ability totals and skills
//! - [`store`]: a scoped key/value store with debounced persistence
//! - [`blocks`]: registration, mounting and reconciliation of live blocks,
//!   with [`broadcast`] keeping instances of the same value in sync
//!
//! [`host`] and [`widgets`] are a reference document host and the built-in
//! widgets; [`session`] wires everything together for the CLI.

pub mod abilities;
pub mod blocks;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod document;
pub mod host;
pub mod init;
pub mod logger;
pub mod render;
pub mod session;
pub mod store;
pub mod template;
pub mod watch;
pub mod widgets;
