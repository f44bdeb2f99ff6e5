//! `tracker`: a row of boxes filled from the left (hit points, stress, hope).
//!
//! ```yaml
//! label: HP
//! uses: "{{ add 4 frontmatter.level }}"
//! state_key: hp
//! scope: document
//! ```

use super::{MAX_COUNT, NumberOrTemplate, Scope, Services, diagnostic, parse_config, scoped_key};
use crate::{
    blocks::{Interaction, RenderEnv, Renderer, Surface, WeakSurface},
    broadcast::StateEvent,
    log,
};
use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::{cell::Cell, rc::Rc};

pub(super) const BLOCK: &str = "tracker";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackerConfig {
    #[serde(default)]
    label: Option<String>,
    uses: NumberOrTemplate,
    state_key: String,
    #[serde(default)]
    scope: Scope,
}

/// Fill level after a click on box `index` of `uses`.
///
/// Clicking the last filled box empties it; any other box fills up to and
/// including itself. Clicks outside the row change nothing.
pub fn next_filled(filled: usize, index: usize, uses: usize) -> Option<usize> {
    if index >= uses {
        return None;
    }
    Some(if filled == index + 1 { index } else { index + 1 })
}

/// The displayed state of one tracker instance.
struct TrackerView {
    label: String,
    uses: usize,
    filled: Cell<usize>,
    surface: WeakSurface,
}

impl TrackerView {
    fn update(&self, filled: usize) {
        self.filled.set(filled.min(self.uses));
        self.draw();
    }

    fn draw(&self) {
        let Some(surface) = self.surface.upgrade() else {
            return;
        };
        let filled = self.filled.get();
        let boxes: String = (0..self.uses).map(|i| if i < filled { '■' } else { '□' }).collect();
        surface.set_lines(vec![format!("{}  {boxes}  {filled}/{}", self.label, self.uses)]);
    }
}

pub struct Tracker {
    services: Services,
}

impl Tracker {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

impl Renderer for Tracker {
    fn render(&self, surface: &Surface, source: &str, env: &RenderEnv<'_>) -> Result<()> {
        let config: TrackerConfig = match parse_config(source) {
            Ok(config) => config,
            Err(e) => {
                diagnostic(surface, BLOCK, e);
                return Ok(());
            }
        };
        let name = config.state_key.trim();
        if name.is_empty() {
            diagnostic(surface, BLOCK, "`state_key` must not be empty");
            return Ok(());
        }

        let ctx = env.template_context();
        if config.uses.value(&ctx) > MAX_COUNT as f64 {
            diagnostic(surface, BLOCK, format!("`uses` must be at most {MAX_COUNT}"));
            return Ok(());
        }
        let uses = config.uses.count(&ctx);
        let key = scoped_key(BLOCK, name, config.scope, env.document());
        let Services { store, bus } = &self.services;

        let view = Rc::new(TrackerView {
            label: config.label.unwrap_or_else(|| name.to_string()),
            uses,
            filled: Cell::new(0),
            surface: surface.downgrade(),
        });
        view.update(store.get(&key, 0usize));

        let weak = Rc::downgrade(&view);
        let subscription = bus.subscribe(key.clone(), move |event: &StateEvent| {
            if let Some(view) = weak.upgrade()
                && let Some(filled) = event.as_count()
            {
                view.update(filled);
            }
        });

        let weak = Rc::downgrade(&view);
        let (store, bus) = (store.clone(), bus.clone());
        surface.on_interaction(move |Interaction::Click(index)| {
            let Some(view) = weak.upgrade() else {
                return;
            };
            let Some(next) = next_filled(view.filled.get(), index, view.uses) else {
                return;
            };
            if let Err(e) = store.set(&key, &next) {
                log!("store"; "{e}");
            }
            bus.publish(&key, json!(next));
        });

        surface.retain(view);
        surface.retain(subscription);
        Ok(())
    }
}
