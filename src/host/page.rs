//! The rendered view of one document.
//!
//! A page owns one [`TextRegion`] per fenced block of a registered type and
//! mounts each of them with [`LiveBlocks`]. When the block layout of the
//! document changes, regions whose block moved are remounted in place, and
//! regions whose block disappeared are disconnected and swept. Blocks that
//! kept their mount are re-rendered when the document's `traits` blocks
//! change, since their `abilities.*` values come from there.

use super::{TextRegion, Vault};
use crate::{
    blocks::{DocPath, LiveBlocks, MountId, RenderContext, Surface},
    document::{FencedBlock, fenced_blocks, frontmatter_span},
    template::TRAITS_BLOCK,
};
use anyhow::{Context, Result};
use std::{cell::RefCell, rc::Rc};

struct Slot {
    block: FencedBlock,
    region: Rc<TextRegion>,
    mount: MountId,
}

pub struct Page {
    document: DocPath,
    vault: Rc<Vault>,
    blocks: LiveBlocks,
    slots: RefCell<Vec<Slot>>,
    traits: RefCell<Option<Vec<FencedBlock>>>,
}

/// Counts from one [`Page::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layout {
    pub kept: usize,
    pub remounted: usize,
    pub mounted: usize,
    pub released: usize,
    /// Kept blocks re-rendered for new ability totals.
    pub rerendered: usize,
}

impl Layout {
    pub fn changed(&self) -> bool {
        self.remounted + self.mounted + self.released > 0
    }
}

impl Page {
    /// Open `document` and mount its blocks.
    pub fn open(document: DocPath, vault: Rc<Vault>, blocks: LiveBlocks) -> Result<Self> {
        let page = Self {
            document,
            vault,
            blocks,
            slots: RefCell::default(),
            traits: RefCell::default(),
        };
        page.refresh()?;
        Ok(page)
    }

    pub fn document(&self) -> &DocPath {
        &self.document
    }

    /// Bring the regions in line with the current document text.
    ///
    /// Blocks are matched by position: an unchanged block keeps its mount, a
    /// block with the same type and body on other lines is remounted into the
    /// same region, anything else gets a fresh region. If a `traits` block
    /// was added, removed or edited, the kept blocks are rendered again.
    pub fn refresh(&self) -> Result<Layout> {
        let text = self
            .vault
            .text(&self.document)
            .with_context(|| format!("unknown document {}", self.document))?;

        let all = fenced_blocks(&text);
        let traits: Vec<FencedBlock> =
            all.iter().filter(|b| b.lang == TRAITS_BLOCK).cloned().collect();
        let traits_changed = self
            .traits
            .replace(Some(traits.clone()))
            .is_some_and(|previous| previous != traits);

        let wanted: Vec<FencedBlock> = all
            .into_iter()
            .filter(|b| self.blocks.is_registered(&b.lang))
            .collect();

        let mut old: Vec<Option<Slot>> = self.slots.take().into_iter().map(Some).collect();
        let mut slots = Vec::with_capacity(wanted.len());
        let mut layout = Layout::default();
        let mut kept = Vec::new();

        for (i, block) in wanted.into_iter().enumerate() {
            let previous = old.get_mut(i).and_then(Option::take);
            let slot = match previous {
                Some(slot) if slot.block == block => {
                    layout.kept += 1;
                    kept.push(slot.mount);
                    slot
                }
                Some(slot) if slot.block.lang == block.lang && slot.block.body == block.body => {
                    layout.remounted += 1;
                    self.mount(block, slot.region)?
                }
                previous => {
                    if let Some(stale) = previous {
                        stale.region.disconnect();
                    }
                    layout.mounted += 1;
                    self.mount(block, TextRegion::new())?
                }
            };
            slots.push(slot);
        }

        for stale in old.into_iter().flatten() {
            stale.region.disconnect();
        }
        // Mounts can re-enter; the new layout is committed before sweeping.
        *self.slots.borrow_mut() = slots;
        layout.released = self.blocks.sweep_document(&self.document);
        if traits_changed {
            layout.rerendered = kept.into_iter().filter(|&id| self.blocks.rerender(id)).count();
        }
        Ok(layout)
    }

    fn mount(&self, block: FencedBlock, region: Rc<TextRegion>) -> Result<Slot> {
        let ctx = RenderContext::new(self.document.clone(), block.line_start, block.line_end);
        let mount = self.blocks.mount(&block.lang, region.clone(), &block.body, ctx)?;
        Ok(Slot {
            block,
            region,
            mount,
        })
    }

    /// Number of live blocks on the page.
    pub fn block_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Type and surface of the `n`-th live block.
    pub fn block(&self, n: usize) -> Option<(String, Surface)> {
        let slots = self.slots.borrow();
        let slot = slots.get(n)?;
        Some((slot.block.lang.clone(), slot.region.surface()?))
    }

    pub fn mount_ids(&self) -> Vec<MountId> {
        self.slots.borrow().iter().map(|s| s.mount).collect()
    }

    /// The document body with every live block replaced by its output.
    pub fn render(&self) -> String {
        let text = self.vault.text(&self.document).unwrap_or_default();
        let skip = frontmatter_span(&text).map_or(0, |(_, body)| body);
        let slots = self.slots.borrow();

        let mut out = Vec::new();
        let mut lines = text.lines().enumerate().skip(skip).peekable();
        let mut next_slot = slots.iter().peekable();

        while let Some((n, line)) = lines.next() {
            match next_slot.peek() {
                Some(slot) if slot.block.line_start == n => {
                    out.push(slot.region.text());
                    while lines.next_if(|(m, _)| *m <= slot.block.line_end).is_some() {}
                    next_slot.next();
                }
                _ => out.push(line.to_string()),
            }
        }
        out.join("\n")
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        for slot in self.slots.get_mut().drain(..) {
            slot.region.disconnect();
        }
        self.blocks.sweep_document(&self.document);
    }
}
