//! Live blocks: registration, mounting and reconciliation.
//!
//! # Architecture
//!
//! ```text
//!  host                         LiveBlocks                         renderer
//! ──────                       ────────────                       ──────────
//!  mount(type, region, src) ─► create Surface in region ─────────► render(surface, src, env)
//!                              record {type, src, ctx, renderer}
//!                              by_document[doc] += mount
//!
//!  metadata changed(doc) ────► for mount in by_document[doc]:
//!                                disconnected? ── forget (lazy GC)
//!                                connected?    ── its OWN renderer ► render(surface, its src, env)
//! ```
//!
//! The host side is abstracted by [`DocumentHost`] (metadata, neighborhood
//! text, the change notification) and [`OutputRegion`] (a place that can own
//! a child [`Surface`] and knows whether it is still in the document).

mod manager;
mod surface;

pub use manager::{BlockError, LiveBlocks, MountId, Reconciled, RenderEnv, Renderer};
pub use surface::{Interaction, OutputRegion, RegionId, Surface, WeakSurface};

use crate::document::Frontmatter;
use std::fmt;

/// Identity of a document inside the host (a vault-relative path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Where a block sits in its document, as reported by the host at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub document: DocPath,
    /// Zero-based line of the block's opening fence
    pub line_start: usize,
    /// Zero-based line of the block's closing fence
    pub line_end: usize,
}

impl RenderContext {
    pub fn new(document: impl Into<DocPath>, line_start: usize, line_end: usize) -> Self {
        Self {
            document: document.into(),
            line_start,
            line_end,
        }
    }
}

/// The textual neighborhood of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub text: String,
    /// Line of the block within `text`
    pub line_start: usize,
    pub line_end: usize,
}

/// Called with the document and, when the host has it, the fresh metadata.
pub type MetadataListener = Box<dyn Fn(&DocPath, Option<&Frontmatter>)>;

/// What the block system needs from the document environment.
pub trait DocumentHost {
    /// Current metadata of `document`, if the host knows the document.
    fn metadata(&self, document: &DocPath) -> Option<Frontmatter>;

    /// Text around the block at `ctx`.
    fn section_info(&self, ctx: &RenderContext) -> Option<SectionInfo>;

    /// Subscribe to metadata changes of any document.
    fn on_metadata_changed(&self, listener: MetadataListener);
}
