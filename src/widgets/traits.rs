//! `traits`: the six ability totals of a character.
//!
//! The block body is also what `abilities.*` in later blocks reads from.

use crate::{
    abilities::compute_totals,
    blocks::{RenderEnv, Renderer, Surface},
    template::format_number,
};
use anyhow::Result;

pub(super) const BLOCK: &str = crate::template::TRAITS_BLOCK;

pub struct Traits;

impl Renderer for Traits {
    fn render(&self, surface: &Surface, source: &str, _: &RenderEnv<'_>) -> Result<()> {
        let totals = compute_totals(source);
        let cells: Vec<String> = totals
            .iter()
            .map(|(name, total)| format!("{} {}", capitalize(name), signed(total)))
            .collect();
        surface.set_lines(vec![cells.join(" | ")]);
        Ok(())
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `+2`, `-1`, `0`
fn signed(n: f64) -> String {
    if n > 0.0 {
        format!("+{}", format_number(n))
    } else {
        format_number(n)
    }
}
