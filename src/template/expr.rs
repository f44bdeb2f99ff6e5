//! Evaluation of a single template expression.

use super::{TemplateContext, format_number};
use serde_json::Value;
use smallvec::SmallVec;
use thiserror::Error;

/// Why a span could not be evaluated. Never escapes `process_template`.
#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unknown token `{0}`")]
    UnknownToken(String),

    #[error("`{token}` is not numeric (found `{found}`)")]
    NotNumeric { token: String, found: String },

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

/// The fixed set of functions an expression may start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Add,
    Subtract,
    Multiply,
    Divide,
    Floor,
    Ceil,
    Round,
    Modifier,
}

impl Function {
    fn parse(head: &str) -> Option<Self> {
        Some(match head.to_ascii_lowercase().as_str() {
            "add" => Self::Add,
            "subtract" => Self::Subtract,
            "multiply" => Self::Multiply,
            "divide" => Self::Divide,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "modifier" => Self::Modifier,
            _ => return None,
        })
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Modifier => "modifier",
        }
    }

    fn apply(self, args: &[f64]) -> Result<f64, TemplateError> {
        let first = || args.first().copied().ok_or(TemplateError::MissingArgument(self.name()));

        Ok(match self {
            Self::Add => args.iter().sum(),
            Self::Multiply => args.iter().product(),
            Self::Subtract => fold(args, |acc, x| acc - x),
            Self::Divide => fold(args, |acc, x| if x == 0.0 { f64::NAN } else { acc / x }),
            Self::Floor => first()?.floor(),
            Self::Ceil => first()?.ceil(),
            Self::Round => first()?.round(),
            Self::Modifier => first()?,
        })
    }
}

/// Left fold starting from the first argument; no arguments folds to 0.
fn fold(args: &[f64], op: impl Fn(f64, f64) -> f64) -> f64 {
    match args.split_first() {
        Some((first, rest)) => rest.iter().fold(*first, |acc, x| op(acc, *x)),
        None => 0.0,
    }
}

/// A resolved token.
#[derive(Debug)]
enum Resolved {
    Number(f64),
    Text(String),
    /// A well-formed path to something that is not there
    Missing,
}

/// Evaluate one trimmed expression (the inside of a `{{ ... }}` span).
pub fn evaluate(expr: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let tokens: SmallVec<[&str; 6]> = expr.split_whitespace().collect();

    if let Some((head, args)) = tokens.split_first()
        && let Some(function) = Function::parse(head)
    {
        let args = args
            .iter()
            .map(|token| resolve_number(token, ctx))
            .collect::<Result<SmallVec<[f64; 6]>, _>>()?;
        return function.apply(&args).map(format_number);
    }

    match resolve(expr, ctx) {
        Some(Resolved::Number(n)) => Ok(format_number(n)),
        Some(Resolved::Text(s)) => Ok(s),
        Some(Resolved::Missing) => Ok(String::new()),
        None => Err(TemplateError::UnknownToken(expr.to_string())),
    }
}

/// Resolve a function argument. Unknown tokens and missing paths count as 0.
fn resolve_number(token: &str, ctx: &TemplateContext) -> Result<f64, TemplateError> {
    match resolve(token, ctx) {
        Some(Resolved::Number(n)) => Ok(n),
        Some(Resolved::Text(s)) => parse_literal(&s).ok_or_else(|| TemplateError::NotNumeric {
            token: token.to_string(),
            found: s,
        }),
        Some(Resolved::Missing) | None => Ok(0.0),
    }
}

/// Resolve a literal or dotted path. `None` means the token is not understood.
fn resolve(token: &str, ctx: &TemplateContext) -> Option<Resolved> {
    if let Some(n) = parse_literal(token) {
        return Some(Resolved::Number(n));
    }

    let (root, path) = token.split_once('.')?;
    if path.is_empty() {
        return None;
    }

    Some(match root {
        "frontmatter" => walk(&ctx.frontmatter, path),
        "abilities" => ctx
            .abilities
            .get(path)
            .map_or(Resolved::Missing, Resolved::Number),
        "skills" => walk(&ctx.skills, path),
        _ => return None,
    })
}

/// Walk a dotted path through nested objects.
fn walk(map: &serde_json::Map<String, Value>, path: &str) -> Resolved {
    let mut segments = path.split('.');
    let Some(mut current) = segments.next().and_then(|s| map.get(s)) else {
        return Resolved::Missing;
    };
    for segment in segments {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Resolved::Missing,
        }
    }
    from_value(current)
}

fn from_value(value: &Value) -> Resolved {
    match value {
        Value::Null => Resolved::Missing,
        Value::Number(n) => n.as_f64().map_or(Resolved::Missing, Resolved::Number),
        other => Resolved::Text(stringify(other)),
    }
}

/// String form of a metadata value as it appears in rendered text.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Parse a plain decimal literal (`3`, `-2`, `0.5`, `.5`, `+1.`).
///
/// Words like `inf` or `NaN` that `f64::from_str` accepts are not literals here.
fn parse_literal(token: &str) -> Option<f64> {
    let token = token.trim();
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityTotals;
    use serde_json::json;

    fn ctx() -> TemplateContext {
        let fm = json!({ "level": 4, "hp": "6", "alive": true, "gone": null });
        TemplateContext::new(fm.as_object().cloned().unwrap_or_default(), AbilityTotals::default())
    }

    #[test]
    fn test_function_heads() {
        assert_eq!(Function::parse("Add"), Some(Function::Add));
        assert_eq!(Function::parse("MODIFIER"), Some(Function::Modifier));
        assert_eq!(Function::parse("pow"), None);
    }

    #[test]
    fn test_empty_argument_lists() {
        let ctx = ctx();
        assert_eq!(evaluate("add", &ctx).unwrap(), "0");
        assert_eq!(evaluate("multiply", &ctx).unwrap(), "1");
        assert_eq!(evaluate("subtract", &ctx).unwrap(), "0");
        assert_eq!(
            evaluate("floor", &ctx),
            Err(TemplateError::MissingArgument("floor"))
        );
    }

    #[test]
    fn test_unary_uses_first_argument_only() {
        assert_eq!(evaluate("ceil 1.2 99", &ctx()).unwrap(), "2");
    }

    #[test]
    fn test_divide_by_zero_mid_fold() {
        assert_eq!(evaluate("divide 8 2 0 4", &ctx()).unwrap(), "NaN");
        assert_eq!(evaluate("divide 8 2 2", &ctx()).unwrap(), "2");
    }

    #[test]
    fn test_arguments_default_to_zero() {
        let ctx = ctx();
        assert_eq!(evaluate("add 1 frontmatter.missing", &ctx).unwrap(), "1");
        assert_eq!(evaluate("add 1 whatever", &ctx).unwrap(), "1");
        assert_eq!(evaluate("add 1 frontmatter.gone", &ctx).unwrap(), "1");
    }

    #[test]
    fn test_non_numeric_argument_fails() {
        let err = evaluate("add frontmatter.alive 1", &ctx()).unwrap_err();
        assert!(matches!(err, TemplateError::NotNumeric { .. }));
    }

    #[test]
    fn test_bare_tokens() {
        let ctx = ctx();
        assert_eq!(evaluate("frontmatter.hp", &ctx).unwrap(), "6");
        assert_eq!(evaluate("frontmatter.alive", &ctx).unwrap(), "true");
        assert_eq!(evaluate("frontmatter.gone", &ctx).unwrap(), "");
        assert_eq!(evaluate("007", &ctx).unwrap(), "7");
        assert_eq!(evaluate("abilities.luck", &ctx).unwrap(), "");
        assert!(matches!(evaluate("level", &ctx), Err(TemplateError::UnknownToken(_))));
        assert!(matches!(evaluate("frontmatter.", &ctx), Err(TemplateError::UnknownToken(_))));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("3"), Some(3.0));
        assert_eq!(parse_literal("-2.5"), Some(-2.5));
        assert_eq!(parse_literal(".5"), Some(0.5));
        assert_eq!(parse_literal("inf"), None);
        assert_eq!(parse_literal("NaN"), None);
        assert_eq!(parse_literal("1.2.3"), None);
        assert_eq!(parse_literal("-"), None);
        assert_eq!(parse_literal(""), None);
    }
}
