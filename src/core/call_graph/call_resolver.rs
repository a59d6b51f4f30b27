// src/core/call_graph/call_resolver.rs
use std::collections::{HashMap, HashSet};
use regex::Regex;
use tracing::warn;

use crate::error::Result;
use super::{CallEdge, FunctionRecord};

/// Shape of a call site in the source language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSyntax {
    /// `name(args)`
    Parenthesized,
    /// `(name args)` as in the Lisp family
    Prefix,
    /// `Name arg arg` as in Scilla procedure calls
    Word,
}

/// Identifier character class for C-like languages, used inside `[...]`
pub const WORD_CHARS: &str = "A-Za-z0-9_";

/// Finds references to a fixed set of names in function bodies.
///
/// All names are folded into one alternation ordered by decreasing length, so a
/// call to `foobar` is never reported as a call to `foo`.
pub struct CallMatcher {
    pattern: Option<Regex>,
    comment_markers: Vec<String>,
}

impl CallMatcher {
    pub fn new<'a>(
        names: impl IntoIterator<Item = &'a str>,
        syntax: CallSyntax,
        ident_chars: &str,
        comment_markers: &[&str],
    ) -> Result<Self> {
        let mut names: Vec<&str> = names.into_iter().filter(|n| !n.is_empty()).collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();

        let comment_markers = comment_markers.iter().map(|m| m.to_string()).collect();
        if names.is_empty() {
            return Ok(Self { pattern: None, comment_markers });
        }

        let alternation = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");

        let source = match syntax {
            CallSyntax::Parenthesized => {
                format!(r"(?:^|[^{ident_chars}])(?P<name>{alternation})\s*\(")
            }
            CallSyntax::Prefix => format!(r"\(\s*(?P<name>{alternation})(?:[\s)]|$)"),
            CallSyntax::Word => {
                format!(r"(?:^|[^{ident_chars}])(?P<name>{alternation})(?:[^{ident_chars}]|$)")
            }
        };

        Ok(Self {
            pattern: Some(Regex::new(&source)?),
            comment_markers,
        })
    }

    /// Names referenced by `body`, unique, in order of first occurrence
    pub fn find_calls<'b>(&self, body: &'b str) -> Vec<&'b str> {
        let mut seen = HashSet::new();
        self.find_call_sites(body)
            .into_iter()
            .map(|site| site.name)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Every distinct `(receiver, name)` call site in `body`, in source order
    pub fn find_call_sites<'b>(&self, body: &'b str) -> Vec<CallSite<'b>> {
        let mut found = Vec::new();
        let Some(pattern) = &self.pattern else {
            return found;
        };

        let mut seen = HashSet::new();
        let mut pos = 0;
        // Restart right after each name so the delimiter that ended one match
        // can serve as the boundary of the next (`a(b(`).
        while pos < body.len() {
            let Some(caps) = pattern.captures_at(body, pos) else {
                break;
            };
            let Some(name) = caps.name("name") else {
                break;
            };
            pos = name.end();

            if self.is_commented_or_quoted(body, name.start()) {
                continue;
            }
            let site = CallSite {
                name: name.as_str(),
                receiver: receiver_before(body, name.start()),
            };
            if seen.insert(site) {
                found.push(site);
            }
        }

        found
    }

    fn is_commented_or_quoted(&self, body: &str, offset: usize) -> bool {
        is_commented_or_quoted(body, offset, &self.comment_markers)
    }
}

/// The text before `offset` on its line holds a comment marker or an open string
pub fn is_commented_or_quoted<S: AsRef<str>>(body: &str, offset: usize, comment_markers: &[S]) -> bool {
    let line_start = body[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &body[line_start..offset];

    if comment_markers.iter().any(|marker| prefix.contains(marker.as_ref())) {
        return true;
    }

    let mut quotes = 0;
    let mut escaped = false;
    for c in prefix.chars() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                continue;
            }
            '"' if !escaped => quotes += 1,
            _ => {}
        }
        escaped = false;
    }
    quotes % 2 == 1
}

/// Finds call targets with their full path: `coin::split(`, `Self::f(`,
/// `0x1::m::f(`, `self.f(` (reported as `self.f`) and bare `f(`.
///
/// Used by module-oriented extractors, which qualify the raw paths against
/// their alias tables instead of matching a fixed set of known names.
pub struct PathCallFinder {
    pattern: Regex,
    keywords: &'static [&'static str],
    comment_markers: &'static [&'static str],
}

impl PathCallFinder {
    pub fn new(keywords: &'static [&'static str], comment_markers: &'static [&'static str]) -> Result<Self> {
        let pattern = Regex::new(
            r"(?:^|[^\w:.$])(?:(?P<receiver>[A-Za-z_]\w*)\s*\.\s*)?(?P<path>(?:(?:0x[0-9A-Fa-f]+|[A-Za-z_]\w*)\s*::\s*(?:<[^;{}()]*>\s*::\s*)?)*[A-Za-z_]\w*)\s*(?:::\s*)?(?:<[^;{}()]*>)?\s*\(",
        )?;
        Ok(Self { pattern, keywords, comment_markers })
    }

    /// Raw targets in order of first occurrence, whitespace removed
    pub fn find(&self, body: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut pos = 0;

        while pos < body.len() {
            let Some(caps) = self.pattern.captures_at(body, pos) else {
                break;
            };
            let Some(path) = caps.name("path") else {
                break;
            };
            pos = path.end();

            let start = caps.name("receiver").map(|r| r.start()).unwrap_or(path.start());
            if is_commented_or_quoted(body, start, self.comment_markers) {
                continue;
            }
            let path: String = path.as_str().chars().filter(|c| !c.is_whitespace()).collect();
            if self.keywords.contains(&path.as_str()) {
                continue;
            }
            let target = match caps.name("receiver") {
                Some(receiver) => format!("{}.{}", receiver.as_str(), path),
                None => path,
            };
            if seen.insert(target.clone()) {
                found.push(target);
            }
        }

        found
    }
}

/// A call and the path segment it was made through, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite<'b> {
    pub name: &'b str,
    /// Identifier before a `.` or `::` preceding the name: `self` in
    /// `self.f(`, `Impl` in `Impl::f(`. Empty when the qualifier is an
    /// expression such as `get().f(`.
    pub receiver: Option<&'b str>,
}

fn receiver_before(body: &str, name_start: usize) -> Option<&str> {
    let before = body[..name_start].trim_end();
    let before = before
        .strip_suffix("::")
        .or_else(|| before.strip_suffix('.'))?
        .trim_end();
    let start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '$')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(before.len());
    Some(&before[start..])
}

/// Name-based resolver for adapters whose function ids are plain names
pub struct CallResolver {
    pub syntax: CallSyntax,
    pub ident_chars: &'static str,
    pub comment_markers: &'static [&'static str],
}

impl CallResolver {
    pub const fn new(
        syntax: CallSyntax,
        ident_chars: &'static str,
        comment_markers: &'static [&'static str],
    ) -> Self {
        Self { syntax, ident_chars, comment_markers }
    }

    /// Build edges between `functions` by scanning every body for the others' ids
    pub fn resolve(&self, functions: &[FunctionRecord]) -> Vec<CallEdge> {
        let matcher = match CallMatcher::new(
            functions.iter().map(|f| f.id.as_str()),
            self.syntax,
            self.ident_chars,
            self.comment_markers,
        ) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Could not build call pattern for {} functions: {}", functions.len(), e);
                return Vec::new();
            }
        };

        let mut edges = Vec::new();
        for function in functions {
            edges.extend(edges_from(&function.id, matcher.find_calls(&function.body_text)));
        }
        edges
    }
}

/// Turn the targets found in one body into deduplicated edges, dropping self matches
pub fn edges_from<I, S>(from: &str, targets: I) -> Vec<CallEdge>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    for target in targets {
        let target = target.as_ref();
        if target == from {
            continue;
        }
        let edge = CallEdge::new(from, target);
        if seen.insert(edge.key()) {
            edges.push(edge);
        }
    }
    edges
}

/// Map of bare name -> qualified id for name lookups inside one scope
pub type NameTable = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, body: &str) -> FunctionRecord {
        FunctionRecord::new(id, id).with_body(body)
    }

    #[test]
    fn test_longest_name_wins() {
        let matcher = CallMatcher::new(["foo", "foobar"], CallSyntax::Parenthesized, WORD_CHARS, &["//"]).unwrap();
        assert_eq!(matcher.find_calls("  foobar(1);"), vec!["foobar"]);
        assert_eq!(matcher.find_calls("  foo(1); foobar(2);"), vec!["foo", "foobar"]);
    }

    #[test]
    fn test_no_partial_identifier_match() {
        let matcher = CallMatcher::new(["load"], CallSyntax::Parenthesized, WORD_CHARS, &[]).unwrap();
        assert!(matcher.find_calls("preload(x); loader(y);").is_empty());
    }

    #[test]
    fn test_adjacent_calls_share_delimiter() {
        let matcher = CallMatcher::new(["a", "b"], CallSyntax::Parenthesized, WORD_CHARS, &[]).unwrap();
        assert_eq!(matcher.find_calls("a(b(1))"), vec!["a", "b"]);
    }

    #[test]
    fn test_comment_and_string_exclusion() {
        let matcher = CallMatcher::new(["helper"], CallSyntax::Parenthesized, WORD_CHARS, &[";;"]).unwrap();
        assert!(matcher.find_calls(";; helper()\n").is_empty());
        assert!(matcher.find_calls("x = \"helper(\";\n").is_empty());
        assert_eq!(matcher.find_calls(";; note\nhelper();"), vec!["helper"]);
    }

    #[test]
    fn test_prefix_syntax() {
        let matcher = CallMatcher::new(["get-balance", "get"], CallSyntax::Prefix, r"\w\-?!", &[";"]).unwrap();
        assert_eq!(matcher.find_calls("(begin (get-balance tx-sender) (get))"), vec!["get-balance", "get"]);
    }

    #[test]
    fn test_word_syntax() {
        let matcher = CallMatcher::new(["ThrowError"], CallSyntax::Word, WORD_CHARS, &[]).unwrap();
        assert_eq!(matcher.find_calls("  ThrowError err\n"), vec!["ThrowError"]);
        assert!(matcher.find_calls("ThrowErrors x").is_empty());
    }

    #[test]
    fn test_call_site_receivers() {
        let matcher = CallMatcher::new(["pay", "check"], CallSyntax::Parenthesized, WORD_CHARS, &["//"]).unwrap();
        let sites = matcher.find_call_sites("self.pay(1); Lib.check(); Impl::pay(); get().check(); pay();");
        let pairs: Vec<_> = sites.iter().map(|s| (s.receiver, s.name)).collect();
        assert_eq!(
            pairs,
            vec![
                (Some("self"), "pay"),
                (Some("Lib"), "check"),
                (Some("Impl"), "pay"),
                (Some(""), "check"),
                (None, "pay"),
            ]
        );
    }

    #[test]
    fn test_path_call_finder() {
        let finder = PathCallFinder::new(&["if", "while"], &["//"]).unwrap();
        let body = "if (x) { coin::split<T>(c, 1); Self::helper(); 0x1::signer::address_of(a); }\n\
                    self.pay(); vector::empty<u64>(); helper(); helper();\n\
                    // ghost::call();\n\
                    let s = \"fake::call(\";";
        assert_eq!(
            finder.find(body),
            vec![
                "coin::split",
                "Self::helper",
                "0x1::signer::address_of",
                "self.pay",
                "vector::empty",
                "helper",
            ]
        );
    }

    #[test]
    fn test_resolve_dedups_and_skips_self() {
        let resolver = CallResolver::new(CallSyntax::Parenthesized, WORD_CHARS, &["//"]);
        let functions = vec![
            record("main", "foo(); foo(); main();"),
            record("foo", "return 1;"),
        ];
        let edges = resolver.resolve(&functions);
        assert_eq!(edges, vec![CallEdge::new("main", "foo")]);
    }

    #[test]
    fn test_special_characters_in_names() {
        let matcher = CallMatcher::new(["udict_get?", "udict_get"], CallSyntax::Parenthesized, "A-Za-z0-9_?!'", &[]).unwrap();
        assert_eq!(matcher.find_calls("(v, f) = d.udict_get?(32, k);"), vec!["udict_get?"]);
    }
}
