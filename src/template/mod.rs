//! `{{ ... }}` template expressions inside widget configuration strings.
//!
//! # Grammar
//!
//! Expressions are flat and whitespace-delimited. There is no precedence, no
//! parentheses and no nesting.
//!
//! | Expression                     | Result                                   |
//! |--------------------------------|------------------------------------------|
//! | `frontmatter.level`            | string form of the metadata field        |
//! | `abilities.agility`            | ability total from the nearest traits    |
//! | `skills.stealth`               | value from the skills map                |
//! | `add 2 frontmatter.level`      | `add`, `subtract`, `multiply`, `divide`  |
//! | `floor abilities.agility`      | `floor`, `ceil`, `round`, `modifier`     |
//! | `12`                           | numeric literal                          |
//!
//! A span that fails to evaluate renders as the empty string; other spans in
//! the same text are unaffected.
//!
//! `floor divide 7 2` does not nest: `divide` is just an unknown argument of
//! `floor`, resolves to 0, and the span renders `0`.

mod context;
mod expr;

pub use context::{TRAITS_BLOCK, TemplateContext};
pub use expr::{TemplateError, evaluate};

use regex::{Captures, Regex};
use std::{borrow::Cow, sync::LazyLock};

static SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").unwrap());

/// Resolve every `{{ ... }}` span of `text` against `ctx`.
///
/// Text without a `{{`/`}}` pair is returned borrowed and unchanged.
pub fn process_template<'a>(text: &'a str, ctx: &TemplateContext) -> Cow<'a, str> {
    if !text.contains("{{") || !text.contains("}}") {
        return Cow::Borrowed(text);
    }

    SPAN.replace_all(text, |caps: &Captures| {
        evaluate(caps[1].trim(), ctx).unwrap_or_default()
    })
}

/// Format a number the way document authors expect to read it.
///
/// Integral values have no fractional part, `NaN` and the infinities are
/// spelled out, negative zero prints as `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}
