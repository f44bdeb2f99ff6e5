use crate::blocks::{OutputRegion, RegionId, Surface};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// A slot in a rendered page that holds one block's output.
pub struct TextRegion {
    id: RegionId,
    connected: Cell<bool>,
    child: RefCell<Option<Surface>>,
}

impl TextRegion {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            id: RegionId::fresh(),
            connected: Cell::new(true),
            child: RefCell::new(None),
        })
    }

    /// Take the region out of the page. The block system notices lazily.
    pub fn disconnect(&self) {
        self.connected.set(false);
    }

    pub fn surface(&self) -> Option<Surface> {
        self.child.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.surface().map(|s| s.text()).unwrap_or_default()
    }
}

impl OutputRegion for TextRegion {
    fn id(&self) -> RegionId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn attach(&self, surface: &Surface) {
        *self.child.borrow_mut() = Some(surface.clone());
    }

    fn detach(&self, surface: &Surface) {
        let mut child = self.child.borrow_mut();
        if child.as_ref().is_some_and(|c| c.ptr_eq(surface)) {
            *child = None;
        }
    }
}
