use regex::Regex;

use crate::error::Result;
use super::lexer::{line_start, match_delimiter};

/// A `keyword name(params) ... { body }` span found by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFunction<'a> {
    pub name: &'a str,
    pub keyword: &'a str,
    pub params: &'a str,
    pub body: &'a str,
    /// Declaration text from the start of its line (plus any attribute or
    /// decorator lines directly above) up to the opening brace
    pub declaration: &'a str,
    pub offset: usize,
}

/// Reusable scanner for languages whose functions look like
/// `keyword name ( params ) [return clause] { body }`.
///
/// Parentheses and braces are matched with a running depth counter. Comments
/// and strings are not stripped first, so a keyword inside a string literal
/// can produce a false match.
pub struct FunctionScanner {
    pattern: Regex,
}

impl FunctionScanner {
    /// `keyword` and `identifier` are regex fragments
    pub fn new(keyword: &str, identifier: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"(?:^|[^\w$.#])(?P<keyword>{keyword})\s+(?P<name>{identifier})\s*(?:<[^(){{}};]*>\s*)?\("
        ))?;
        Ok(Self { pattern })
    }

    /// Every function in source order; names are not deduplicated
    pub fn scan<'a>(&self, source: &'a str) -> Vec<ScannedFunction<'a>> {
        let mut functions = Vec::new();
        let mut pos = 0;

        while pos < source.len() {
            let Some(caps) = self.pattern.captures_at(source, pos) else {
                break;
            };
            let (Some(keyword), Some(name)) = (caps.name("keyword"), caps.name("name")) else {
                break;
            };
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(name.end());
            let open_paren = whole - 1;
            // Continue after the name so nested functions inside a body are found too
            pos = name.end();

            let Some(close_paren) = match_delimiter(source, open_paren, b'(', b')', &[]) else {
                continue;
            };
            let Some(open_brace) = find_body_start(source, close_paren + 1) else {
                continue;
            };
            let Some(close_brace) = match_delimiter(source, open_brace, b'{', b'}', &[]) else {
                continue;
            };

            let decl_start = declaration_start(source, keyword.start());
            functions.push(ScannedFunction {
                name: name.as_str(),
                keyword: keyword.as_str(),
                params: &source[open_paren + 1..close_paren],
                body: &source[open_brace + 1..close_brace],
                declaration: &source[decl_start..open_brace],
                offset: keyword.start(),
            });
        }

        functions
    }
}

/// Skip a return clause (`-> u64`, `returns (bool)`, `: async Nat`,
/// `= takes(0) returns(0)`) and find the opening brace of the body.
/// A `;` or `}` at paren depth zero means the declaration has no body.
pub fn find_body_start(source: &str, from: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in source.as_bytes()[from..].iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'{' if depth <= 0 => return Some(from + i),
            b';' | b'}' if depth <= 0 => return None,
            _ => {}
        }
    }
    None
}

/// Extend a declaration upward over attribute/decorator lines
pub fn declaration_start(source: &str, keyword_start: usize) -> usize {
    let mut start = line_start(source, keyword_start);
    while start > 0 {
        let previous_start = line_start(source, start - 1);
        let previous = source[previous_start..start].trim();
        if previous.starts_with('@') || previous.starts_with("#[") {
            start = previous_start;
        } else {
            break;
        }
    }
    start
}
