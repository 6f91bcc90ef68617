//! Seed Path and Argument Parsing
//!
//! Path syntax: `/segment/segment/.../key^tab$cmd`
//!
//! - `^tab` selects a tab on the final target (default: first tab)
//! - `$cmd` carries a command line for command/write runners
//! - segments containing separators may be quoted with `'` or `"`
//! - the sentinel tab name `<u>` means unsubscribe

use super::error::{OpErr, OpResult};

/// Sentinel tab name: subscribe runners treat it as unsubscribe.
pub const UNSUBSCRIBE_TAB: &str = "<u>";

/// A parsed seed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPath {
    /// Path segments, quotes resolved. Empty for the root path.
    pub segments: Vec<String>,
    /// `^tab` selector on the final segment.
    pub tab: Option<String>,
    /// `$cmd` remainder on the final segment.
    pub cmd: Option<String>,
    /// True when the path started with `/` (absolute).
    pub is_absolute: bool,
}

impl SeedPath {
    /// Parse `path`. Quoting applies inside segments; `^` and `$` are only
    /// markers outside quotes, and `$` ends segment parsing (the command
    /// line is taken verbatim).
    pub fn parse(path: &str) -> OpResult<Self> {
        let mut segments: Vec<String> = Vec::new();
        let mut tab: Option<String> = None;
        let mut cmd: Option<String> = None;

        let is_absolute = path.starts_with('/');
        let mut cur = String::new();
        let mut cur_is_tab = false;
        let mut chars = path.char_indices();
        if is_absolute {
            chars.next();
        }

        let mut push_part = |part: String, is_tab: bool, segments: &mut Vec<String>| {
            if is_tab {
                tab = Some(part);
            } else if !part.is_empty() {
                segments.push(part);
            }
        };

        while let Some((i, ch)) = chars.next() {
            match ch {
                '\'' | '"' => {
                    // Quoted run: consumed verbatim up to the closing quote.
                    let mut closed = false;
                    for (_, qc) in chars.by_ref() {
                        if qc == ch {
                            closed = true;
                            break;
                        }
                        cur.push(qc);
                    }
                    if !closed {
                        return Err(OpErr::PathFormatError);
                    }
                }
                '/' => {
                    if cur_is_tab {
                        return Err(OpErr::PathFormatError);
                    }
                    push_part(std::mem::take(&mut cur), false, &mut segments);
                }
                '^' => {
                    if cur_is_tab {
                        return Err(OpErr::PathFormatError);
                    }
                    push_part(std::mem::take(&mut cur), false, &mut segments);
                    cur_is_tab = true;
                }
                '$' => {
                    cmd = Some(path[i + 1..].to_string());
                    break;
                }
                _ => cur.push(ch),
            }
        }
        push_part(cur, cur_is_tab, &mut segments);

        Ok(Self {
            segments,
            tab,
            cmd,
            is_absolute,
        })
    }
}

/// Split `s` on top-level `sep`, honoring `{}`/`[]`/`()` nesting and both
/// quote styles. Used for `field=value,field=value` write arguments where
/// values may carry sub-bracketed content.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '{' | '[' | '(' => depth += 1,
                '}' | ']' | ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + ch.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Strip one layer of matching quotes, if present.
pub fn strip_quotes(s: &str) -> &str {
    let b = s.as_bytes();
    if b.len() >= 2 && (b[0] == b'\'' || b[0] == b'"') && b[b.len() - 1] == b[0] {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
