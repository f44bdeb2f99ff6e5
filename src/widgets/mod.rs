//! Built-in widgets.
//!
//! Each widget is a [`Renderer`](crate::blocks::Renderer) over a typed config
//! parsed from the block body (YAML). A config that does not parse renders a
//! one-line diagnostic instead of the widget.
//!
//! | Block       | State                                  | Broadcast       |
//! |-------------|----------------------------------------|-----------------|
//! | `tracker`   | `tracker:<key>[::<doc>]` → count       | filled count    |
//! | `checklist` | `checklist:<key>[::<doc>]` → `[bool]`  | the flag array  |
//! | `badges`    | none                                   | none            |
//! | `traits`    | none                                   | none            |

mod badges;
mod checklist;
mod tracker;
mod traits;

pub use badges::Badges;
pub use checklist::Checklist;
pub use tracker::Tracker;
pub use traits::Traits;

use crate::{
    blocks::{DocPath, LiveBlocks, Surface},
    broadcast::Broadcast,
    store::KvStore,
    template::{TemplateContext, format_number, process_template},
};
use serde::{Deserialize, de::DeserializeOwned};

/// Shared services handed to stateful widgets.
#[derive(Clone)]
pub struct Services {
    pub store: KvStore,
    pub bus: Broadcast,
}

/// Register every built-in widget with `blocks`.
pub fn register_builtin(blocks: &LiveBlocks, services: &Services) {
    blocks.register(tracker::BLOCK, Tracker::new(services.clone()));
    blocks.register(checklist::BLOCK, Checklist::new(services.clone()));
    blocks.register(badges::BLOCK, Badges);
    blocks.register(traits::BLOCK, Traits);
}

/// Largest count a widget draws.
pub const MAX_COUNT: usize = 1000;

/// Block names handled by [`register_builtin`].
pub const BUILTIN_BLOCKS: &[&str] = &[tracker::BLOCK, checklist::BLOCK, badges::BLOCK, traits::BLOCK];

// ============================================================================
// Config Helpers
// ============================================================================

fn parse_config<T: DeserializeOwned>(source: &str) -> Result<T, serde_yaml::Error> {
    serde_yaml::from_str(source)
}

/// Replace the widget output with `⚠ <block>: <message>`.
fn diagnostic(surface: &Surface, block: &str, message: impl std::fmt::Display) {
    surface.set_lines(vec![format!("⚠ {block}: {message}")]);
}

/// A number written either literally or as a template.
///
/// ```yaml
/// uses: 6
/// uses: "{{ add 2 frontmatter.level }}"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrTemplate {
    Number(f64),
    Template(String),
}

impl NumberOrTemplate {
    /// Numeric value; templates that do not yield a number count as 0.
    pub fn value(&self, ctx: &TemplateContext) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Template(t) => process_template(t, ctx).trim().parse().unwrap_or(0.0),
        }
    }

    /// Display form.
    pub fn display(&self, ctx: &TemplateContext) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Template(t) => process_template(t, ctx).into_owned(),
        }
    }

    /// Value as a count: negative and non-finite values become 0, anything
    /// above [`MAX_COUNT`] becomes `MAX_COUNT`.
    pub fn count(&self, ctx: &TemplateContext) -> usize {
        let n = self.value(ctx);
        if n.is_finite() && n > 0.0 {
            n.floor().min(MAX_COUNT as f64) as usize
        } else {
            0
        }
    }
}

/// Whether a persisted value is per document or shared by the whole vault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Document,
    Global,
}

/// `<prefix>:<name>` for global values, `<prefix>:<name>::<doc>` otherwise.
pub fn scoped_key(prefix: &str, name: &str, scope: Scope, document: &DocPath) -> String {
    match scope {
        Scope::Global => format!("{prefix}:{name}"),
        Scope::Document => format!("{prefix}:{name}::{document}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityTotals;
    use serde_json::json;

    fn ctx() -> TemplateContext {
        let fm = json!({ "level": 4 }).as_object().cloned().unwrap();
        TemplateContext::new(fm, AbilityTotals::default())
    }

    #[test]
    fn test_number_or_template_parses_both_forms() {
        #[derive(Deserialize)]
        struct Probe {
            uses: NumberOrTemplate,
        }

        let n: Probe = parse_config("uses: 6").unwrap();
        assert_eq!(n.uses, NumberOrTemplate::Number(6.0));

        let t: Probe = parse_config("uses: \"{{ add 2 frontmatter.level }}\"").unwrap();
        assert_eq!(t.uses.count(&ctx()), 6);
        assert_eq!(t.uses.display(&ctx()), "6");
    }

    #[test]
    fn test_count_clamps_bad_values() {
        let ctx = ctx();
        assert_eq!(NumberOrTemplate::Number(-2.0).count(&ctx), 0);
        assert_eq!(NumberOrTemplate::Number(2.7).count(&ctx), 2);
        assert_eq!(NumberOrTemplate::Template("{{ divide 1 0 }}".into()).count(&ctx), 0);
        assert_eq!(NumberOrTemplate::Template("lots".into()).count(&ctx), 0);

        let huge: NumberOrTemplate = parse_config("1e15").unwrap();
        assert_eq!(huge.count(&ctx), MAX_COUNT);
        assert_eq!(NumberOrTemplate::Template("{{ multiply 1000 1000 }}".into()).count(&ctx), MAX_COUNT);
    }

    #[test]
    fn test_builtin_names() {
        assert!(BUILTIN_BLOCKS.contains(&crate::template::TRAITS_BLOCK));
        assert_eq!(BUILTIN_BLOCKS.len(), 4);
    }

    #[test]
    fn test_scoped_key() {
        let doc = DocPath::from("sheets/hero.md");
        assert_eq!(scoped_key("tracker", "hp", Scope::Global, &doc), "tracker:hp");
        assert_eq!(
            scoped_key("tracker", "hp", Scope::Document, &doc),
            "tracker:hp::sheets/hero.md"
        );
    }

    #[test]
    fn test_diagnostic_line() {
        let surface = Surface::new();
        diagnostic(&surface, "tracker", "missing field `state_key`");
        assert_eq!(surface.text(), "⚠ tracker: missing field `state_key`");
    }
}
