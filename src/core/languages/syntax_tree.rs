//! Generic syntax tree shared by the structural extractors.
//!
//! Trees come from two places: tree-sitter grammars (converted node for node)
//! and the brace-structured item walker used for languages without a grammar
//! crate. Extractors only ever see `SyntaxNode`, and traverse it with explicit
//! stacks rather than recursion.

use std::ops::Range;
use tree_sitter::{Parser, Tree};

use crate::error::{ContractScopeError, Result};
use super::lexer::match_delimiter;

#[derive(Debug, Clone, Default)]
pub struct SyntaxNode {
    pub kind: &'static str,
    /// Field name under which the parent holds this node, if any
    pub field: Option<&'static str>,
    /// Whole node for tree-sitter nodes, the item head for walked items
    pub span: Range<usize>,
    /// Inside of the braces for walked block items
    pub body: Option<Range<usize>>,
    pub children: Vec<SyntaxNode>,
    named: bool,
}

impl SyntaxNode {
    pub fn new(kind: &'static str, span: Range<usize>) -> Self {
        Self {
            kind,
            field: None,
            span,
            body: None,
            children: Vec::new(),
            named: true,
        }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.span.clone()).unwrap_or("")
    }

    pub fn body_text<'a>(&self, source: &'a str) -> &'a str {
        self.body
            .as_ref()
            .and_then(|body| source.get(body.clone()))
            .unwrap_or("")
    }

    pub fn child_by_field(&self, field: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    pub fn child_of_kind(&self, kind: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// Pre-order traversal driven by an explicit stack
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    fn adopt(&mut self, child: SyntaxNode) {
        if child.named {
            self.children.push(child);
        }
    }

    /// Convert a tree-sitter tree, keeping named nodes only
    pub fn from_tree(tree: &Tree) -> SyntaxNode {
        let mut cursor = tree.walk();
        let mut stack = vec![Self::from_ts(cursor.node(), None)];
        if !cursor.goto_first_child() {
            return fold(stack);
        }

        loop {
            stack.push(Self::from_ts(cursor.node(), cursor.field_name()));
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                let Some(finished) = stack.pop() else {
                    return SyntaxNode::default();
                };
                match stack.last_mut() {
                    Some(parent) => parent.adopt(finished),
                    None => return finished,
                }
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return fold(stack);
                }
            }
        }
    }

    fn from_ts(node: tree_sitter::Node, field: Option<&'static str>) -> Self {
        Self {
            kind: node.kind(),
            field,
            span: node.byte_range(),
            body: None,
            children: Vec::new(),
            named: node.is_named(),
        }
    }
}

fn fold(mut stack: Vec<SyntaxNode>) -> SyntaxNode {
    while stack.len() > 1 {
        if let Some(child) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.adopt(child);
            }
        }
    }
    stack.pop().unwrap_or_default()
}

pub struct Descendants<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Rules for splitting brace-structured source into items
pub struct ItemWalker<'a> {
    /// Item kind from the item's head text
    pub classify: &'a dyn Fn(&str) -> &'static str,
    /// Kinds whose bodies contain further items
    pub containers: &'a [&'static str],
    /// Heads whose braces belong to the statement (`use a::{b, c};`)
    pub statement_prefixes: &'a [&'static str],
    pub quotes: &'a [char],
}

impl ItemWalker<'_> {
    /// Split `text` (already comment-stripped) into a tree of items
    pub fn walk(&self, text: &str) -> SyntaxNode {
        struct Frame {
            node: SyntaxNode,
            pos: usize,
            end: usize,
        }

        let mut stack = vec![Frame {
            node: SyntaxNode::new("source_file", 0..text.len()),
            pos: 0,
            end: text.len(),
        }];

        loop {
            let Some(top) = stack.last_mut() else {
                return SyntaxNode::default();
            };
            match self.next_item(text, top.pos, top.end) {
                Some((item, next)) => {
                    top.pos = next;
                    match (&item.body, self.containers.contains(&item.kind)) {
                        (Some(body), true) => {
                            let (pos, end) = (body.start, body.end);
                            stack.push(Frame { node: item, pos, end });
                        }
                        _ => top.node.children.push(item),
                    }
                }
                None => {
                    let Some(done) = stack.pop() else {
                        return SyntaxNode::default();
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.node.children.push(done.node),
                        None => return done.node,
                    }
                }
            }
        }
    }

    fn next_item(&self, text: &str, pos: usize, end: usize) -> Option<(SyntaxNode, usize)> {
        let bytes = text.as_bytes();
        let mut start = pos;
        while start < end && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        if start >= end {
            return None;
        }

        let mut depth = 0i32;
        let mut i = start;
        while i < end {
            let b = bytes[i];
            if self.quotes.iter().any(|q| *q as u8 == b) {
                i = skip_quoted(bytes, i, end);
                continue;
            }
            match b {
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                b';' if depth <= 0 => {
                    return Some((self.item(text, start, i, None), i + 1));
                }
                b'}' if depth <= 0 => {
                    // Stray closer: end the current head here
                    return Some((self.item(text, start, i, None), i + 1));
                }
                b'{' if depth <= 0 => {
                    let head = text[start..i].trim();
                    let close = match_delimiter(&text[..end], i, b'{', b'}', self.quotes);
                    if self.statement_prefixes.iter().any(|p| starts_with_word(head, p)) {
                        // Braces are part of the statement; keep scanning for `;`
                        i = close.map(|c| c + 1).unwrap_or(end);
                        continue;
                    }
                    return Some(match close {
                        Some(close) => (self.item(text, start, i, Some(i + 1..close)), close + 1),
                        // Unterminated block: the item has no usable body
                        None => (self.item(text, start, i, None), end),
                    });
                }
                _ => {}
            }
            i += 1;
        }

        Some((self.item(text, start, end, None), end))
    }

    fn item(&self, text: &str, start: usize, end: usize, body: Option<Range<usize>>) -> SyntaxNode {
        let head = text[start..end].trim_end();
        let mut node = SyntaxNode::new((self.classify)(head), start..start + head.len());
        node.body = body;
        node
    }
}

fn skip_quoted(bytes: &[u8], start: usize, end: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < end {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    end
}

/// `head` begins with `word` followed by a non-identifier character
pub fn starts_with_word(head: &str, word: &str) -> bool {
    head.strip_prefix(word)
        .map(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
        .unwrap_or(false)
}

/// Split leading `#[...]` attributes off an item head
pub fn split_attributes(head: &str) -> (Vec<&str>, &str) {
    let mut attributes = Vec::new();
    let mut rest = head.trim_start();
    while rest.starts_with("#[") {
        let Some(close) = match_delimiter(rest, 1, b'[', b']', &['"']) else {
            break;
        };
        attributes.push(&rest[2..close]);
        rest = rest[close + 1..].trim_start();
    }
    (attributes, rest)
}

/// Owner of the grammar parsers used by tree-based extractors.
///
/// Created once by the host and passed into every parse call; adapters keep no
/// parser state of their own.
pub struct ParserContext {
    rust: Parser,
    python: Parser,
}

impl ParserContext {
    pub fn new() -> Result<Self> {
        let mut rust = Parser::new();
        rust.set_language(&tree_sitter_rust::language())
            .map_err(|e| ContractScopeError::Parser(format!("Failed to set Rust language: {}", e)))?;

        let mut python = Parser::new();
        python
            .set_language(&tree_sitter_python::language())
            .map_err(|e| ContractScopeError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self { rust, python })
    }

    pub fn parse_rust(&mut self, source: &str) -> Result<SyntaxNode> {
        let tree = self
            .rust
            .parse(source, None)
            .ok_or_else(|| ContractScopeError::Parser("Failed to parse Rust code".to_string()))?;
        Ok(SyntaxNode::from_tree(&tree))
    }

    pub fn parse_python(&mut self, source: &str) -> Result<SyntaxNode> {
        let tree = self
            .python
            .parse(source, None)
            .ok_or_else(|| ContractScopeError::Parser("Failed to parse Python code".to_string()))?;
        Ok(SyntaxNode::from_tree(&tree))
    }
}
