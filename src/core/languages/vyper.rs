use std::collections::HashSet;
use regex::Regex;
use tracing::debug;

use crate::core::call_graph::{edges_from, CallLinks, CallMatcher, CallSyntax, FunctionRecord, WORD_CHARS};
use crate::error::Result;
use super::lexer::{match_delimiter, split_params, strip_comments, HASH_STYLE};
use super::syntax_tree::starts_with_word;
use super::{LanguageAdapter, ParserContext, SourceUnit};

/// Vyper adapter. Bodies are delimited by indentation rather than braces.
pub struct VyperAdapter {
    def: Regex,
}

/// Byte span of one line, without its newline
#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    end: usize,
    indent: usize,
}

fn lines_of(code: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in code.split_inclusive('\n') {
        let text = raw.trim_end_matches(['\n', '\r']);
        let indent = text.len() - text.trim_start().len();
        lines.push(Line { start, end: start + text.len(), indent });
        start += raw.len();
    }
    lines
}

/// entry > pure > view > public > regular
fn classify(name: &str, decorators: &[String]) -> &'static str {
    let has = |d: &str| decorators.iter().any(|x| x == d);
    if name == "__init__" || has("deploy") {
        "entry"
    } else if has("pure") {
        "pure"
    } else if has("view") {
        "view"
    } else if has("external") {
        "public"
    } else {
        "regular"
    }
}

impl VyperAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            def: Regex::new(r"^def\s+(?P<name>[A-Za-z_]\w*)\s*\(")?,
        })
    }

    /// Parse the `def` starting on `lines[index]`; returns the record and the
    /// index of the first line after the body
    fn parse_def(&self, code: &str, lines: &[Line], index: usize, decorators: &[String]) -> Option<(FunctionRecord, usize)> {
        let line = lines[index];
        let head_start = line.start + line.indent;
        let caps = self.def.captures(&code[head_start..])?;
        let name = caps.name("name")?.as_str();
        let open = head_start + caps.get(0)?.end() - 1;
        let close = match_delimiter(code, open, b'(', b')', HASH_STYLE.quotes)?;

        // The header ends at the first `:` after the parameters, outside brackets
        let mut depth = 0i32;
        let mut colon = None;
        for (i, b) in code.as_bytes()[close + 1..].iter().enumerate() {
            match b {
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                b':' if depth <= 0 => {
                    colon = Some(close + 1 + i);
                    break;
                }
                _ => {}
            }
        }
        let colon = colon?;

        let header_line = lines.iter().position(|l| l.start <= colon && colon <= l.end)?;
        let inline_body = code[colon + 1..lines[header_line].end].trim();

        let mut next = header_line + 1;
        while next < lines.len() {
            let l = lines[next];
            let blank = l.start == l.end || code[l.start..l.end].trim().is_empty();
            if !blank && l.indent <= line.indent {
                break;
            }
            next += 1;
        }

        let body = if inline_body.is_empty() {
            let body_start = lines.get(header_line + 1).map(|l| l.start).unwrap_or(code.len());
            let body_end = lines.get(next - 1).map(|l| l.end).unwrap_or(code.len()).max(body_start);
            &code[body_start..body_end]
        } else {
            inline_body
        };

        let record = FunctionRecord::new(name, name)
            .with_parameters(split_params(&code[open + 1..close]))
            .with_body(body)
            .with_classification(classify(name, decorators));
        Some((record, next))
    }
}

impl LanguageAdapter for VyperAdapter {
    fn language_id(&self) -> &'static str {
        "vyper"
    }

    fn language_name(&self) -> &'static str {
        "Vyper"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["vy", "vyi"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &HASH_STYLE);
        let lines = lines_of(&code);
        let mut functions = Vec::new();
        let mut decorators: Vec<String> = Vec::new();
        let mut skip_indented = false;

        let mut index = 0;
        while index < lines.len() {
            let line = lines[index];
            let text = code[line.start..line.end].trim();
            index += 1;

            if text.is_empty() {
                continue;
            }
            if skip_indented {
                if line.indent > 0 {
                    continue;
                }
                skip_indented = false;
            }

            if line.indent == 0 && starts_with_word(text, "interface") && text.ends_with(':') {
                skip_indented = true;
                decorators.clear();
            } else if let Some(decorator) = text.strip_prefix('@') {
                let name = decorator.split(|c: char| c == '(' || c.is_whitespace()).next().unwrap_or("");
                decorators.push(name.to_string());
            } else if starts_with_word(text, "def") {
                match self.parse_def(&code, &lines, index - 1, &decorators) {
                    Some((record, next)) => {
                        functions.push(record);
                        index = next;
                    }
                    None => debug!("Skipping malformed Vyper def: {}", text),
                }
                decorators.clear();
            } else {
                decorators.clear();
            }
        }

        Ok(SourceUnit::with_functions(functions))
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        let defined: HashSet<&str> = unit.functions.iter().map(|f| f.id.as_str()).collect();
        let Ok(matcher) = CallMatcher::new(defined.iter().copied(), CallSyntax::Parenthesized, WORD_CHARS, HASH_STYLE.line) else {
            return CallLinks::default();
        };

        let mut edges = Vec::new();
        for function in &unit.functions {
            let targets = matcher
                .find_call_sites(&function.body_text)
                .into_iter()
                .filter(|site| site.receiver == Some("self"))
                .map(|site| site.name);
            edges.extend(edges_from(&function.id, targets));
        }
        CallLinks { edges, external: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::CallEdge;

    const VAULT: &str = r#"
# @version ^0.3.9

interface ERC20:
    def transfer(to: address, amount: uint256) -> bool: nonpayable
    def balanceOf(who: address) -> uint256: view

owner: public(address)

@external
def __init__():
    self.owner = msg.sender

@external
@view
def balance(
    who: address,
    token: address,
) -> uint256:
    # self._ghost(who)
    return self._read(who)

@internal
@pure
def _read(who: address) -> uint256:
    return 0

@external
def withdraw(amount: uint256):
    assert self.balance(msg.sender, empty(address)) >= amount
    self._read(msg.sender)
    ERC20(self.owner).transfer(msg.sender, amount)
"#;

    fn parse(source: &str) -> (SourceUnit, CallLinks) {
        let adapter = VyperAdapter::new().unwrap();
        let mut ctx = ParserContext::new().unwrap();
        let unit = adapter.parse(&mut ctx, source).unwrap();
        let links = adapter.build_call_graph(&unit);
        (unit, links)
    }

    #[test]
    fn test_interface_block_is_skipped() {
        let (unit, _) = parse(VAULT);
        let ids: Vec<_> = unit.functions.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["__init__", "balance", "_read", "withdraw"]);
    }

    #[test]
    fn test_multiline_signature_and_decorators() {
        let (unit, _) = parse(VAULT);
        let balance = &unit.functions[1];
        assert_eq!(balance.parameters, vec!["who: address", "token: address"]);
        assert_eq!(balance.classification, "view");
        assert!(balance.body_text.contains("return self._read(who)"));
        assert_eq!(unit.functions[0].classification, "entry");
        assert_eq!(unit.functions[2].classification, "pure");
        assert_eq!(unit.functions[3].classification, "public");
    }

    #[test]
    fn test_self_calls_only() {
        let (_, links) = parse(VAULT);
        assert_eq!(
            links.edges,
            vec![
                CallEdge::new("balance", "_read"),
                CallEdge::new("withdraw", "balance"),
                CallEdge::new("withdraw", "_read"),
            ]
        );
    }

    #[test]
    fn test_one_line_body() {
        let (unit, links) = parse("@internal\ndef a() -> uint256: return self.b()\n@internal\ndef b() -> uint256: return 1\n");
        assert_eq!(unit.functions.len(), 2);
        assert_eq!(unit.functions[0].body_text, "return self.b()");
        assert_eq!(links.edges, vec![CallEdge::new("a", "b")]);
    }
}
