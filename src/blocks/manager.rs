//! The live block table and its reconciliation pass.

use super::{DocPath, DocumentHost, OutputRegion, RegionId, RenderContext, Surface};
use crate::{document::Frontmatter, log, template::TemplateContext};
use anyhow::Result;
use rustc_hash::FxHashMap;
use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    rc::{Rc, Weak},
};
use thiserror::Error;

// ============================================================================
// Renderer Contract
// ============================================================================

/// Turns a block's source text into output on its surface.
///
/// The surface is cleared before every call, so running a renderer twice for
/// the same block converges to the same visible state.
pub trait Renderer {
    fn render(&self, surface: &Surface, source: &str, env: &RenderEnv<'_>) -> Result<()>;
}

impl<F> Renderer for F
where
    F: Fn(&Surface, &str, &RenderEnv<'_>) -> Result<()>,
{
    fn render(&self, surface: &Surface, source: &str, env: &RenderEnv<'_>) -> Result<()> {
        self(surface, source, env)
    }
}

/// What a renderer sees of its environment.
pub struct RenderEnv<'a> {
    host: &'a dyn DocumentHost,
    ctx: &'a RenderContext,
    metadata: Option<&'a Frontmatter>,
}

impl<'a> RenderEnv<'a> {
    pub fn context(&self) -> &RenderContext {
        self.ctx
    }

    pub fn document(&self) -> &DocPath {
        &self.ctx.document
    }

    /// Current metadata of the block's document.
    pub fn frontmatter(&self) -> Frontmatter {
        self.metadata
            .cloned()
            .or_else(|| self.host.metadata(&self.ctx.document))
            .unwrap_or_default()
    }

    /// A fresh template context for this block.
    pub fn template_context(&self) -> TemplateContext {
        TemplateContext::build(self.host, self.ctx, self.metadata)
    }
}

// ============================================================================
// Mount Table
// ============================================================================

/// Handle of one mounted block instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(u64);

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("no renderer registered for `{0}` blocks")]
    Unregistered(String),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub rendered: usize,
    pub removed: usize,
}

struct Mount {
    block_type: String,
    region: Rc<dyn OutputRegion>,
    surface: Surface,
    source: String,
    ctx: RenderContext,
    renderer: Rc<dyn Renderer>,
    rendering: bool,
    /// A render requested while one was running; carries its metadata override
    pending: Option<Option<Frontmatter>>,
}

#[derive(Default)]
struct MountTable {
    next_id: u64,
    mounts: FxHashMap<MountId, Mount>,
    by_region: FxHashMap<RegionId, MountId>,
    by_document: FxHashMap<DocPath, BTreeSet<MountId>>,
}

impl MountTable {
    fn insert(&mut self, mount: Mount) -> MountId {
        self.next_id += 1;
        let id = MountId(self.next_id);
        self.by_region.insert(mount.region.id(), id);
        self.by_document
            .entry(mount.ctx.document.clone())
            .or_default()
            .insert(id);
        self.mounts.insert(id, mount);
        id
    }

    fn remove(&mut self, id: MountId) -> Option<Mount> {
        let mount = self.mounts.remove(&id)?;
        self.by_region.remove(&mount.region.id());
        self.unlink_document(&mount.ctx.document, id);
        Some(mount)
    }

    fn unlink_document(&mut self, document: &DocPath, id: MountId) {
        if let Some(ids) = self.by_document.get_mut(document) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_document.remove(document);
            }
        }
    }

    fn document_mounts(&self, document: &DocPath) -> Vec<MountId> {
        self.by_document
            .get(document)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// LiveBlocks
// ============================================================================

struct Inner {
    host: Rc<dyn DocumentHost>,
    renderers: RefCell<FxHashMap<String, Rc<dyn Renderer>>>,
    table: RefCell<MountTable>,
    listening: Cell<bool>,
}

/// Registry of block types and their live instances.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct LiveBlocks {
    inner: Rc<Inner>,
}

impl LiveBlocks {
    pub fn new(host: Rc<dyn DocumentHost>) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                renderers: RefCell::default(),
                table: RefCell::default(),
                listening: Cell::new(false),
            }),
        }
    }

    /// Register `renderer` for blocks named `block_type`.
    ///
    /// The first registration installs the single metadata listener. Registering
    /// a name again only affects later mounts: existing instances keep the
    /// renderer they were mounted with.
    pub fn register(&self, block_type: &str, renderer: impl Renderer + 'static) {
        self.inner
            .renderers
            .borrow_mut()
            .insert(block_type.to_string(), Rc::new(renderer));

        if !self.inner.listening.replace(true) {
            let weak: Weak<Inner> = Rc::downgrade(&self.inner);
            self.inner
                .host
                .on_metadata_changed(Box::new(move |document: &DocPath, metadata: Option<&Frontmatter>| {
                    if let Some(inner) = weak.upgrade() {
                        LiveBlocks { inner }.reconcile(document, metadata);
                    }
                }));
        }
    }

    pub fn is_registered(&self, block_type: &str) -> bool {
        self.inner.renderers.borrow().contains_key(block_type)
    }

    /// Render a block instance into `region`.
    ///
    /// The first call for a region attaches a dedicated surface and records the
    /// instance. Later calls for the same region update the record and render
    /// into the same surface.
    pub fn mount(
        &self,
        block_type: &str,
        region: Rc<dyn OutputRegion>,
        source: &str,
        ctx: RenderContext,
    ) -> Result<MountId, BlockError> {
        let renderer = self
            .inner
            .renderers
            .borrow()
            .get(block_type)
            .cloned()
            .ok_or_else(|| BlockError::Unregistered(block_type.to_string()))?;

        let existing = self.inner.table.borrow().by_region.get(&region.id()).copied();
        let id = match existing {
            Some(id) => {
                let mut table = self.inner.table.borrow_mut();
                let old_document = table.mounts.get(&id).map(|m| m.ctx.document.clone());
                if let Some(old) = old_document.filter(|d| *d != ctx.document) {
                    table.unlink_document(&old, id);
                    table.by_document.entry(ctx.document.clone()).or_default().insert(id);
                }
                if let Some(mount) = table.mounts.get_mut(&id) {
                    mount.block_type = block_type.to_string();
                    mount.source = source.to_string();
                    mount.ctx = ctx;
                    mount.renderer = renderer;
                }
                id
            }
            None => {
                let surface = Surface::new();
                region.attach(&surface);
                self.inner.table.borrow_mut().insert(Mount {
                    block_type: block_type.to_string(),
                    region,
                    surface,
                    source: source.to_string(),
                    ctx,
                    renderer,
                    rendering: false,
                    pending: None,
                })
            }
        };

        self.render(id, None);
        Ok(id)
    }

    /// Re-render every connected instance of `document`; forget the rest.
    ///
    /// Each instance is rendered with the renderer and source text it was
    /// mounted with. `metadata` is the fresh snapshot from the change
    /// notification, if any.
    pub fn reconcile(&self, document: &DocPath, metadata: Option<&Frontmatter>) -> Reconciled {
        let ids = self.inner.table.borrow().document_mounts(document);
        let mut report = Reconciled::default();

        for id in ids {
            let region = self.inner.table.borrow().mounts.get(&id).map(|m| m.region.clone());
            match region {
                None => {}
                Some(region) if !region.is_connected() => {
                    self.forget(id);
                    report.removed += 1;
                }
                Some(_) => {
                    if self.render(id, metadata) {
                        report.rendered += 1;
                    }
                }
            }
        }

        if report != Reconciled::default() {
            log!("blocks"; "{document}: re-rendered {}, released {}", report.rendered, report.removed);
        }
        report
    }

    /// Render one instance again against the host's current state.
    pub fn rerender(&self, id: MountId) -> bool {
        self.render(id, None)
    }

    /// Forget disconnected instances of `document` without rendering anything.
    pub fn sweep_document(&self, document: &DocPath) -> usize {
        let ids = self.inner.table.borrow().document_mounts(document);
        self.sweep_ids(ids)
    }

    /// Forget disconnected instances of every document.
    pub fn sweep(&self) -> usize {
        let ids: Vec<_> = self.inner.table.borrow().mounts.keys().copied().collect();
        self.sweep_ids(ids)
    }

    fn sweep_ids(&self, ids: Vec<MountId>) -> usize {
        ids.into_iter()
            .filter(|id| {
                let region = self.inner.table.borrow().mounts.get(id).map(|m| m.region.clone());
                region.is_some_and(|r| !r.is_connected())
            })
            .map(|id| self.forget(id))
            .filter(|forgotten| *forgotten)
            .count()
    }

    /// Number of tracked instances for `document`.
    pub fn live_count(&self, document: &DocPath) -> usize {
        self.inner
            .table
            .borrow()
            .by_document
            .get(document)
            .map_or(0, BTreeSet::len)
    }

    /// Tracked instances of `document`, in mount order.
    pub fn mounts(&self, document: &DocPath) -> Vec<MountId> {
        self.inner.table.borrow().document_mounts(document)
    }

    pub fn surface(&self, id: MountId) -> Option<Surface> {
        self.inner.table.borrow().mounts.get(&id).map(|m| m.surface.clone())
    }

    pub fn block_type(&self, id: MountId) -> Option<String> {
        self.inner.table.borrow().mounts.get(&id).map(|m| m.block_type.clone())
    }

    /// Run the bound renderer of `id`. Returns false if the instance is gone or
    /// already rendering (the request is then folded into one follow-up render).
    fn render(&self, id: MountId, metadata: Option<&Frontmatter>) -> bool {
        {
            let mut table = self.inner.table.borrow_mut();
            let Some(mount) = table.mounts.get_mut(&id) else {
                return false;
            };
            if mount.rendering {
                mount.pending = Some(metadata.cloned());
                return false;
            }
            mount.rendering = true;
        }

        let mut metadata = metadata.cloned();
        loop {
            // Re-read every round: a re-entrant mount may have replaced the source.
            let Some((renderer, surface, source, ctx, block_type)) = self.job(id) else {
                return true;
            };

            surface.clear();
            let env = RenderEnv {
                host: self.inner.host.as_ref(),
                ctx: &ctx,
                metadata: metadata.as_ref(),
            };
            if let Err(err) = renderer.render(&surface, &source, &env) {
                log!("error"; "`{block_type}` block in {} failed: {err:#}", ctx.document);
            }

            let mut table = self.inner.table.borrow_mut();
            let Some(mount) = table.mounts.get_mut(&id) else {
                return true;
            };
            match mount.pending.take() {
                Some(next) => metadata = next,
                None => {
                    mount.rendering = false;
                    return true;
                }
            }
        }
    }

    fn job(&self, id: MountId) -> Option<(Rc<dyn Renderer>, Surface, String, RenderContext, String)> {
        let table = self.inner.table.borrow();
        let mount = table.mounts.get(&id)?;
        Some((
            mount.renderer.clone(),
            mount.surface.clone(),
            mount.source.clone(),
            mount.ctx.clone(),
            mount.block_type.clone(),
        ))
    }

    /// Drop the record of `id` and release its surface.
    fn forget(&self, id: MountId) -> bool {
        let Some(mount) = self.inner.table.borrow_mut().remove(id) else {
            return false;
        };
        mount.region.detach(&mount.surface);
        mount.surface.clear();
        true
    }
}
