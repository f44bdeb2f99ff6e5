//! Render targets.
//!
//! An [`OutputRegion`] is owned by the host. The block system never writes into
//! it directly: it attaches one child [`Surface`] per region and renders there.

use std::{
    any::Any,
    cell::RefCell,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_REGION: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an output region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl RegionId {
    /// A process-unique id.
    pub fn fresh() -> Self {
        Self(NEXT_REGION.fetch_add(1, Ordering::Relaxed))
    }
}

/// A host-provided output region for one block instance.
pub trait OutputRegion {
    fn id(&self) -> RegionId;

    /// Whether the region is still part of the live document.
    fn is_connected(&self) -> bool;

    /// Take `surface` as an exclusively-owned child.
    fn attach(&self, surface: &Surface);

    /// Drop a child previously attached.
    fn detach(&self, surface: &Surface);
}

/// User input delivered to a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// A click on the zero-based item `index` (a tracker box, a checklist entry)
    Click(usize),
}

type Handler = Rc<dyn Fn(Interaction)>;

#[derive(Default)]
struct SurfaceState {
    lines: Vec<String>,
    handler: Option<Handler>,
    /// Values that live exactly as long as the current render (subscriptions, views)
    retained: Vec<Box<dyn Any>>,
}

/// Retained-mode output of one block instance.
#[derive(Clone, Default)]
pub struct Surface {
    state: Rc<RefCell<SurfaceState>>,
}

/// Non-owning handle to a [`Surface`], for callbacks that must not keep it alive.
#[derive(Clone, Default)]
pub struct WeakSurface {
    state: Weak<RefCell<SurfaceState>>,
}

impl WeakSurface {
    pub fn upgrade(&self) -> Option<Surface> {
        self.state.upgrade().map(|state| Surface { state })
    }
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakSurface {
        WeakSurface {
            state: Rc::downgrade(&self.state),
        }
    }

    pub fn ptr_eq(&self, other: &Surface) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn set_lines(&self, lines: Vec<String>) {
        self.state.borrow_mut().lines = lines;
    }

    pub fn push_line(&self, line: impl Into<String>) {
        self.state.borrow_mut().lines.push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.borrow().lines.clone()
    }

    pub fn text(&self) -> String {
        self.state.borrow().lines.join("\n")
    }

    /// Install the interaction handler, replacing any previous one.
    pub fn on_interaction(&self, handler: impl Fn(Interaction) + 'static) {
        self.state.borrow_mut().handler = Some(Rc::new(handler));
    }

    /// Deliver `interaction`. Returns false when nothing handles it.
    pub fn interact(&self, interaction: Interaction) -> bool {
        let handler = self.state.borrow().handler.clone();
        match handler {
            Some(handler) => {
                handler(interaction);
                true
            }
            None => false,
        }
    }

    /// Keep `value` alive until the surface is cleared or dropped.
    pub fn retain(&self, value: impl Any) {
        self.state.borrow_mut().retained.push(Box::new(value));
    }

    /// Reset to blank, dropping the handler and retained values.
    pub fn clear(&self) {
        let (handler, retained) = {
            let mut state = self.state.borrow_mut();
            state.lines.clear();
            (state.handler.take(), std::mem::take(&mut state.retained))
        };
        // Dropped outside the borrow: a subscription guard may call back into us.
        drop(handler);
        drop(retained);
    }
}
