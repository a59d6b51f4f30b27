//! Lexical helpers shared by the extractors: comment stripping, balanced
//! delimiter matching and parameter splitting.
//!
//! Every transformation here preserves byte offsets and line breaks, so a
//! position found in stripped text is valid in the original source.

/// Comment and string syntax of one language
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: &'static [(&'static str, &'static str)],
    pub nested_blocks: bool,
    pub quotes: &'static [char],
}

pub const C_STYLE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: &[("/*", "*/")],
    nested_blocks: false,
    quotes: &['"'],
};

/// C-style comments with both quote characters delimiting strings
pub const C_STYLE_QUOTES: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: &[("/*", "*/")],
    nested_blocks: false,
    quotes: &['"', '\''],
};

pub const FUNC_STYLE: CommentSyntax = CommentSyntax {
    line: &[";;"],
    block: &[("{-", "-}")],
    nested_blocks: true,
    quotes: &['"'],
};

pub const HASH_STYLE: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: &[],
    nested_blocks: false,
    quotes: &['"', '\''],
};

pub const LISP_STYLE: CommentSyntax = CommentSyntax {
    line: &[";"],
    block: &[],
    nested_blocks: false,
    quotes: &['"'],
};

pub const ML_STYLE: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[("(*", "*)")],
    nested_blocks: true,
    quotes: &['"'],
};

/// Replace every comment with spaces, keeping newlines and string literals intact
pub fn strip_comments(source: &str, syntax: &CommentSyntax) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];

        if let Some(&quote) = syntax.quotes.iter().find(|q| rest[0] == **q as u8) {
            i = skip_string(bytes, i, quote as u8);
            continue;
        }

        if let Some((open, close)) = syntax
            .block
            .iter()
            .find(|(open, _)| rest.starts_with(open.as_bytes()))
        {
            let end = block_comment_end(bytes, i, open.as_bytes(), close.as_bytes(), syntax.nested_blocks);
            blank(&mut out, i, end);
            i = end;
            continue;
        }

        if syntax.line.iter().any(|marker| rest.starts_with(marker.as_bytes())) {
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| i + p)
                .unwrap_or(bytes.len());
            blank(&mut out, i, end);
            i = end;
            continue;
        }

        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn blank(out: &mut [u8], start: usize, end: usize) {
    for b in &mut out[start..end] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

/// Index just past the string starting at `start`
fn skip_string(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' if quote == b'\'' => return i, // stray apostrophe, not a string
            _ => i += 1,
        }
    }
    bytes.len()
}

fn block_comment_end(bytes: &[u8], start: usize, open: &[u8], close: &[u8], nested: bool) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i..].starts_with(open) && (nested || depth == 0) {
            depth += 1;
            i += open.len();
        } else if bytes[i..].starts_with(close) {
            depth -= 1;
            i += close.len();
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Position of the delimiter closing the one at `open_pos`.
///
/// Depth is tracked with a running counter, so nesting of any depth works.
/// Text inside `quotes` is skipped. Returns `None` when the depth never returns
/// to zero.
pub fn match_delimiter(text: &str, open_pos: usize, open: u8, close: u8, quotes: &[char]) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open_pos) != Some(&open) {
        return None;
    }

    let mut depth = 0usize;
    let mut i = open_pos;
    while i < bytes.len() {
        let b = bytes[i];
        if quotes.iter().any(|q| *q as u8 == b) {
            i = skip_string(bytes, i, b);
            continue;
        }
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Split a parameter list on top-level commas
pub fn split_params(params: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut previous = ' ';

    for c in params.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '<' => depth += 1,
            '>' if previous != '-' && previous != '=' => depth -= 1,
            ',' if depth <= 0 => {
                push_param(&mut parts, &current);
                current.clear();
                previous = c;
                continue;
            }
            _ => {}
        }
        current.push(c);
        previous = c;
    }
    push_param(&mut parts, &current);
    parts
}

fn push_param(parts: &mut Vec<String>, raw: &str) {
    let param = collapse_whitespace(raw);
    if !param.is_empty() {
        parts.push(param);
    }
}

/// Squash runs of whitespace (including newlines) into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Start of the line containing `offset`
pub fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_preserves_offsets_and_lines() {
        let source = "a(); // call b()\n/* c() */ d();";
        let stripped = strip_comments(source, &C_STYLE);
        assert_eq!(stripped.len(), source.len());
        assert_eq!(stripped.lines().count(), source.lines().count());
        assert!(!stripped.contains("b()"));
        assert!(!stripped.contains("c()"));
        assert!(stripped.contains("d();"));
    }

    #[test]
    fn test_strip_nested_func_comments() {
        let source = "{- outer {- inner -} still comment foo() -} int x() { return 1; } ;; tail";
        let stripped = strip_comments(source, &FUNC_STYLE);
        assert!(!stripped.contains("foo"));
        assert!(stripped.contains("int x() { return 1; }"));
        assert!(!stripped.contains("tail"));
    }

    #[test]
    fn test_comment_markers_inside_strings_survive() {
        let source = "x = \"http://example.com\"; // gone";
        let stripped = strip_comments(source, &C_STYLE);
        assert!(stripped.contains("http://example.com"));
        assert!(!stripped.contains("gone"));
    }

    #[test]
    fn test_match_delimiter_nested() {
        let text = "f(a, (b, c), g(d)) + 1";
        assert_eq!(match_delimiter(text, 1, b'(', b')', &[]), Some(17));
        assert_eq!(match_delimiter("{ { }", 0, b'{', b'}', &[]), None);
    }

    #[test]
    fn test_match_delimiter_skips_strings() {
        let text = "{ s = \"}\"; }";
        assert_eq!(match_delimiter(text, 0, b'{', b'}', &['"']), Some(text.len() - 1));
    }

    #[test]
    fn test_split_params() {
        assert_eq!(
            split_params("int a, (int, cell) b,\n  Map<Address, Int> m"),
            vec!["int a", "(int, cell) b", "Map<Address, Int> m"]
        );
        assert!(split_params("  ").is_empty());
        assert_eq!(split_params("f: fn(u8) -> u8, x: u8"), vec!["f: fn(u8) -> u8", "x: u8"]);
    }
}
