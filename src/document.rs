//! Markdown document structure: YAML frontmatter and fenced blocks.
//!
//! Only the two things the block system needs are parsed here. Everything else
//! in a document is opaque text.
//!
//! ```text
//! ---                      ┐
//! name: Ilsa               │ frontmatter (YAML → JSON value model)
//! level: 4                 │
//! ---                      ┘
//! # Sheet
//! ```traits                ┐
//! base: { agility: 1 }     │ FencedBlock { lang: "traits", line_start: 5, .. }
//! ```                      ┘
//! ```

use serde_json::Value;

/// Document metadata. Owned by the host, read-only for blocks.
pub type Frontmatter = serde_json::Map<String, Value>;

/// A fenced code block found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// First word of the info string (e.g. `tracker`)
    pub lang: String,
    /// Raw text between the fences, without the fence lines
    pub body: String,
    /// Zero-based line of the opening fence
    pub line_start: usize,
    /// Zero-based line of the closing fence (last line if unclosed)
    pub line_end: usize,
}

/// Locate the frontmatter of `text`.
///
/// Returns the raw YAML and the zero-based line where the body starts.
pub fn frontmatter_span(text: &str) -> Option<(String, usize)> {
    let mut lines = text.lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }

    let mut yaml = Vec::new();
    for (i, line) in lines.enumerate() {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            // +1 for the opening fence, +1 to step past the closing fence
            return Some((yaml.join("\n"), i + 2));
        }
        yaml.push(line);
    }
    None
}

/// Parse the frontmatter of `text`.
///
/// A document without frontmatter has empty metadata. A frontmatter block that
/// is not a YAML mapping is an error so the host can report it.
pub fn parse_frontmatter(text: &str) -> Result<Frontmatter, serde_yaml::Error> {
    let Some((yaml, _)) = frontmatter_span(text) else {
        return Ok(Frontmatter::new());
    };
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::new());
    }
    match serde_yaml::from_str::<Value>(&yaml)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Frontmatter::new()),
        _ => Err(serde::de::Error::custom("frontmatter must be a mapping")),
    }
}

/// Scan `text` for fenced blocks (``` or ~~~), skipping the frontmatter.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let skip = frontmatter_span(text).map_or(0, |(_, body)| body);
    let mut blocks = Vec::new();
    let mut open: Option<(char, usize, String, usize, Vec<&str>)> = None;
    let mut last_line = 0;

    for (i, line) in text.lines().enumerate().skip(skip) {
        last_line = i;
        let trimmed = line.trim_start();

        match open.as_mut() {
            None => {
                if let Some((ch, len)) = fence(trimmed) {
                    let lang = trimmed[len..]
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    open = Some((ch, len, lang, i, Vec::new()));
                }
            }
            Some((ch, len, _, _, body)) => {
                let closes = fence(trimmed).is_some_and(|(c, l)| {
                    c == *ch && l >= *len && trimmed[l..].trim().is_empty()
                });
                if closes {
                    if let Some((_, _, lang, start, body)) = open.take() {
                        blocks.push(FencedBlock {
                            lang,
                            body: body.join("\n"),
                            line_start: start,
                            line_end: i,
                        });
                    }
                } else {
                    body.push(line);
                }
            }
        }
    }

    // An unclosed fence runs to the end of the document.
    if let Some((_, _, lang, start, body)) = open {
        blocks.push(FencedBlock {
            lang,
            body: body.join("\n"),
            line_start: start,
            line_end: last_line,
        });
    }

    blocks
}

/// The closest block of kind `lang` that ends before `line`.
pub fn nearest_preceding<'a>(
    blocks: &'a [FencedBlock],
    lang: &str,
    line: usize,
) -> Option<&'a FencedBlock> {
    blocks
        .iter()
        .filter(|b| b.lang == lang && b.line_end < line)
        .max_by_key(|b| b.line_end)
}

/// Fence character and run length if `line` opens or closes a fence.
fn fence(line: &str) -> Option<(char, usize)> {
    let ch = line.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = line.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "---\nname: Ilsa\nlevel: 4\nstats:\n  hp: 6\n---\n# Sheet\n\n```traits\nbase:\n  agility: 1\n```\n\ntext\n\n~~~~tracker extra\nuses: 6\n~~~~\n";

    #[test]
    fn test_parse_frontmatter() {
        let fm = parse_frontmatter(SHEET).unwrap();
        assert_eq!(fm["name"], "Ilsa");
        assert_eq!(fm["level"], 4);
        assert_eq!(fm["stats"]["hp"], 6);
    }

    #[test]
    fn test_no_frontmatter() {
        assert!(parse_frontmatter("# Title\nbody").unwrap().is_empty());
        assert!(parse_frontmatter("---\n---\nbody").unwrap().is_empty());
        assert!(frontmatter_span("---\nunterminated: true\n").is_none());
    }

    #[test]
    fn test_frontmatter_not_a_mapping() {
        assert!(parse_frontmatter("---\n- a\n- b\n---\n").is_err());
        assert!(parse_frontmatter("---\nkey: [unclosed\n---\n").is_err());
    }

    #[test]
    fn test_frontmatter_span_body_line() {
        let (_, body) = frontmatter_span(SHEET).unwrap();
        assert_eq!(SHEET.lines().nth(body), Some("# Sheet"));
    }

    #[test]
    fn test_fenced_blocks() {
        let blocks = fenced_blocks(SHEET);
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].lang, "traits");
        assert_eq!(blocks[0].body, "base:\n  agility: 1");
        assert_eq!(blocks[0].line_start, 8);
        assert_eq!(blocks[0].line_end, 11);

        assert_eq!(blocks[1].lang, "tracker");
        assert_eq!(blocks[1].body, "uses: 6");
    }

    #[test]
    fn test_shorter_fence_does_not_close() {
        let blocks = fenced_blocks("````badges\n```\ninner\n```\n````\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "```\ninner\n```");
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let blocks = fenced_blocks("intro\n```tracker\nuses: 3\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].line_end, 2);
        assert_eq!(blocks[0].body, "uses: 3");
    }

    #[test]
    fn test_nearest_preceding() {
        let text = "```traits\nbase: {agility: 1}\n```\n```traits\nbase: {agility: 2}\n```\n```badges\n```\n```traits\n```\n";
        let blocks = fenced_blocks(text);
        let badges = blocks.iter().find(|b| b.lang == "badges").unwrap();

        let traits = nearest_preceding(&blocks, "traits", badges.line_start).unwrap();
        assert_eq!(traits.body, "base: {agility: 2}");
        assert!(nearest_preceding(&blocks, "traits", 0).is_none());
    }
}
