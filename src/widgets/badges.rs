//! `badges`: labelled values resolved from templates.
//!
//! ```yaml
//! items:
//!   - { label: Evasion, value: "{{ add 10 abilities.agility }}" }
//!   - { label: Level, value: "{{ frontmatter.level }}" }
//!   - { label: Armor, value: 3 }
//! ```

use super::{NumberOrTemplate, diagnostic, parse_config};
use crate::blocks::{RenderEnv, Renderer, Surface};
use anyhow::Result;
use serde::Deserialize;

pub(super) const BLOCK: &str = "badges";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BadgesConfig {
    items: Vec<Badge>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Badge {
    label: String,
    value: NumberOrTemplate,
}

pub struct Badges;

impl Renderer for Badges {
    fn render(&self, surface: &Surface, source: &str, env: &RenderEnv<'_>) -> Result<()> {
        let config: BadgesConfig = match parse_config(source) {
            Ok(config) => config,
            Err(e) => {
                diagnostic(surface, BLOCK, e);
                return Ok(());
            }
        };

        let tctx = env.template_context();
        let badges: Vec<String> = config
            .items
            .iter()
            .map(|b| format!("[{} {}]", b.label, b.value.display(&tctx)))
            .collect();
        surface.set_lines(vec![badges.join(" ")]);
        Ok(())
    }
}
