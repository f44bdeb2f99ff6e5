//! `checklist`: independent toggle boxes.
//!
//! ```yaml
//! label: Prep
//! items: [Rations, Rope, Torch]
//! state_key: prep
//! ```

use super::{Scope, Services, diagnostic, parse_config, scoped_key};
use crate::{
    blocks::{Interaction, RenderEnv, Renderer, Surface, WeakSurface},
    broadcast::StateEvent,
    template::process_template,
};
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::{cell::RefCell, rc::Rc};

pub(super) const BLOCK: &str = "checklist";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChecklistConfig {
    #[serde(default)]
    label: Option<String>,
    items: Vec<String>,
    state_key: String,
    #[serde(default)]
    scope: Scope,
}

struct ChecklistView {
    label: Option<String>,
    items: Vec<String>,
    checked: RefCell<Vec<bool>>,
    surface: WeakSurface,
}

impl ChecklistView {
    fn update(&self, mut checked: Vec<bool>) {
        checked.resize(self.items.len(), false);
        *self.checked.borrow_mut() = checked;
        self.draw();
    }

    fn draw(&self) {
        let Some(surface) = self.surface.upgrade() else {
            return;
        };
        let checked = self.checked.borrow();
        let mut lines: Vec<String> = self.label.iter().cloned().collect();
        lines.extend(self.items.iter().zip(checked.iter()).map(|(item, &on)| {
            format!("[{}] {item}", if on { 'x' } else { ' ' })
        }));
        surface.set_lines(lines);
    }
}

pub struct Checklist {
    services: Services,
}

impl Checklist {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

impl Renderer for Checklist {
    fn render(&self, surface: &Surface, source: &str, env: &RenderEnv<'_>) -> Result<()> {
        let config: ChecklistConfig = match parse_config(source) {
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

        let tctx = env.template_context();
        let key = scoped_key(BLOCK, name, config.scope, env.document());
        let Services { store, bus } = &self.services;

        let view = Rc::new(ChecklistView {
            label: config.label.map(|l| process_template(&l, &tctx).into_owned()),
            items: config
                .items
                .iter()
                .map(|item| process_template(item, &tctx).into_owned())
                .collect(),
            checked: RefCell::default(),
            surface: surface.downgrade(),
        });
        view.update(store.get_bool_array(&key, view.items.len()));

        let weak = Rc::downgrade(&view);
        let subscription = bus.subscribe(key.clone(), move |event: &StateEvent| {
            if let Some(view) = weak.upgrade()
                && let Some(flags) = event.as_bools()
            {
                view.update(flags);
            }
        });

        let weak = Rc::downgrade(&view);
        let (store, bus) = (store.clone(), bus.clone());
        surface.on_interaction(move |Interaction::Click(index)| {
            let Some(view) = weak.upgrade() else {
                return;
            };
            // Other instances may track a different number of items.
            let mut flags = store.get_bool_array(&key, view.items.len());
            let Some(flag) = flags.get_mut(index) else {
                return;
            };
            *flag = !*flag;
            store.set_bool_array(&key, &flags);
            bus.publish(&key, Value::from(flags));
        });

        surface.retain(view);
        surface.retain(subscription);
        Ok(())
    }
}
