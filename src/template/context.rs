//! Per-render template context.

use crate::{
    abilities::{AbilityTotals, compute_totals},
    blocks::{DocumentHost, RenderContext},
    document::{Frontmatter, fenced_blocks, nearest_preceding},
};
use serde_json::{Map, Value};

/// Block kind whose text feeds `abilities.*`.
pub const TRAITS_BLOCK: &str = "traits";

/// Values visible to template expressions.
///
/// Built fresh for every resolution; metadata may have changed since the
/// previous render, so nothing here is cached.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub frontmatter: Frontmatter,
    pub abilities: AbilityTotals,
    pub skills: Map<String, Value>,
}

impl TemplateContext {
    /// Context over explicit values. Skills come from the `skills` metadata mapping.
    pub fn new(frontmatter: Frontmatter, abilities: AbilityTotals) -> Self {
        let skills = frontmatter
            .get("skills")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self {
            frontmatter,
            abilities,
            skills,
        }
    }

    /// Context for the block rendered at `ctx`.
    ///
    /// `metadata` overrides the host's snapshot; reconciliation passes the fresh
    /// values from the change notification because the host cache may lag.
    pub fn build(
        host: &dyn DocumentHost,
        ctx: &RenderContext,
        metadata: Option<&Frontmatter>,
    ) -> Self {
        let frontmatter = metadata
            .cloned()
            .or_else(|| host.metadata(&ctx.document))
            .unwrap_or_default();

        let abilities = host
            .section_info(ctx)
            .map(|section| abilities_before(&section.text, section.line_start))
            .unwrap_or_default();

        Self::new(frontmatter, abilities)
    }
}

/// Totals from the nearest traits block that ends before `line`.
pub fn abilities_before(text: &str, line: usize) -> AbilityTotals {
    let blocks = fenced_blocks(text);
    nearest_preceding(&blocks, TRAITS_BLOCK, line)
        .map(|block| compute_totals(&block.body))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{DocPath, MetadataListener, SectionInfo};
    use serde_json::json;

    const DOC: &str = "---\nlevel: 3\n---\n```traits\nbase: { agility: 1 }\n```\n```badges\nitems: []\n```\n```traits\nbase: { agility: 5 }\n```\n";

    struct FakeHost;

    impl DocumentHost for FakeHost {
        fn metadata(&self, _: &DocPath) -> Option<Frontmatter> {
            json!({ "level": 3 }).as_object().cloned()
        }

        fn section_info(&self, ctx: &RenderContext) -> Option<SectionInfo> {
            Some(SectionInfo {
                text: DOC.to_string(),
                line_start: ctx.line_start,
                line_end: ctx.line_end,
            })
        }

        fn on_metadata_changed(&self, _: MetadataListener) {}
    }

    #[test]
    fn test_build_uses_nearest_preceding_traits() {
        let ctx = RenderContext::new("hero.md", 6, 8);
        let tctx = TemplateContext::build(&FakeHost, &ctx, None);
        assert_eq!(tctx.frontmatter["level"], 3);
        assert_eq!(tctx.abilities.get("agility"), Some(1.0));
    }

    #[test]
    fn test_build_without_traits_defaults_to_zero() {
        let ctx = RenderContext::new("hero.md", 2, 2);
        let tctx = TemplateContext::build(&FakeHost, &ctx, None);
        assert_eq!(tctx.abilities, AbilityTotals::default());
    }

    #[test]
    fn test_override_wins_over_host() {
        let fresh = json!({ "level": 9 }).as_object().cloned().unwrap();
        let ctx = RenderContext::new("hero.md", 6, 8);
        let tctx = TemplateContext::build(&FakeHost, &ctx, Some(&fresh));
        assert_eq!(tctx.frontmatter["level"], 9);
    }

    #[test]
    fn test_skills_from_frontmatter() {
        let fm = json!({ "skills": { "stealth": 2 } }).as_object().cloned().unwrap();
        let tctx = TemplateContext::new(fm, AbilityTotals::default());
        assert_eq!(tctx.skills["stealth"], 2);
    }
}
