use std::collections::{HashMap, HashSet, VecDeque};
use regex::Regex;

use crate::core::call_graph::{
    edges_from, CallEdge, CallLinks, CallMatcher, CallSyntax, FunctionRecord, Grouping,
};
use crate::error::Result;
use super::lexer::{match_delimiter, split_params, strip_comments, C_STYLE_QUOTES};
use super::scope::join_path;
use super::syntax_tree::{ItemWalker, SyntaxNode};
use super::{ImportKind, ImportRule, LanguageAdapter, ParserContext, SourceUnit};

const SOLIDITY_CHARS: &str = "A-Za-z0-9_$";

const SOLIDITY_IMPORT: ImportRule = ImportRule {
    kind: ImportKind::Path,
    pattern: r#"(?m)^[ \t]*import\s+(?:[^"';]*?\bfrom\s+)?["'](?P<target>[^"']+)["'][^;]*;"#,
};

/// Solidity adapter; functions are grouped by contract
pub struct SolidityAdapter {
    container: Regex,
    function: Regex,
    special: Regex,
    modifier: Regex,
    using: Regex,
    identifier: Regex,
}

impl SolidityAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            container: Regex::new(
                r"(?s)^(?:abstract\s+)?(?:contract|interface|library)\s+(?P<name>[A-Za-z_$][\w$]*)(?:\s+is\s+(?P<parents>.+))?$",
            )?,
            function: Regex::new(r"^function\s+(?P<name>[A-Za-z_$][\w$]*)\s*\(")?,
            special: Regex::new(r"^(?P<name>constructor|receive|fallback)\s*\(")?,
            modifier: Regex::new(r"^modifier\s+(?P<name>[A-Za-z_$][\w$]*)")?,
            using: Regex::new(r"^using\s+(?P<library>[A-Za-z_$][\w$.]*)\s+for\b")?,
            identifier: Regex::new(r"[A-Za-z_$][\w$]*")?,
        })
    }

    fn classify_head(&self, head: &str) -> &'static str {
        if self.container.is_match(head) {
            "container"
        } else if self.function.is_match(head) || self.special.is_match(head) {
            "function"
        } else if self.modifier.is_match(head) {
            "modifier"
        } else if self.using.is_match(head) {
            "using"
        } else {
            "other"
        }
    }

    /// Record plus the identifiers written between the parameter list and the body
    fn function_record(&self, head: &str, body: &str, scope: &str) -> Option<(FunctionRecord, Vec<String>)> {
        let (name, open, is_special) = if let Some(caps) = self.special.captures(head) {
            (caps.name("name")?.as_str(), caps.get(0)?.end() - 1, true)
        } else {
            let caps = self.function.captures(head)?;
            (caps.name("name")?.as_str(), caps.get(0)?.end() - 1, false)
        };
        let close = match_delimiter(head, open, b'(', b')', &[])?;
        let specifiers = &head[close + 1..];
        let words: Vec<&str> = self.identifier.find_iter(specifiers).map(|m| m.as_str()).collect();

        let classification = if is_special {
            "entry"
        } else if words.contains(&"pure") {
            "pure"
        } else if words.contains(&"view") {
            "view"
        } else if words.contains(&"public") || words.contains(&"external") {
            "public"
        } else {
            "regular"
        };

        let record = FunctionRecord::new(join_path(scope, name), name)
            .with_parameters(split_params(&head[open + 1..close]))
            .with_body(body)
            .with_classification(classification)
            .with_scope(scope);
        Some((record, words.into_iter().map(str::to_string).collect()))
    }

    fn modifier_record(&self, head: &str, body: &str, scope: &str) -> Option<FunctionRecord> {
        let caps = self.modifier.captures(head)?;
        let name = caps.name("name")?.as_str();
        let rest = head[caps.get(0)?.end()..].trim_start();
        let parameters = if rest.starts_with('(') {
            let close = match_delimiter(rest, 0, b'(', b')', &[])?;
            split_params(&rest[1..close])
        } else {
            Vec::new()
        };
        Some(
            FunctionRecord::new(join_path(scope, name), name)
                .with_parameters(parameters)
                .with_body(body)
                .with_classification("modifier")
                .with_scope(scope),
        )
    }
}

/// Base contract names from an `is A, B(arg), C` list
fn parent_names(list: &str) -> Vec<String> {
    split_params(list)
        .iter()
        .map(|p| p.split('(').next().unwrap_or(p).trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// The contract followed by its bases, most derived first
fn ancestry(unit: &SourceUnit, scope: &str) -> Vec<String> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([scope.to_string()]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(info) = unit.scopes.get(&current) {
            // Rightmost base is the most derived
            queue.extend(info.parents.iter().rev().cloned());
        }
        order.push(current);
    }
    order
}

impl LanguageAdapter for SolidityAdapter {
    fn language_id(&self) -> &'static str {
        "solidity"
    }

    fn language_name(&self) -> &'static str {
        "Solidity"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["sol"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &C_STYLE_QUOTES);
        let classify = |head: &str| self.classify_head(head);
        let walker = ItemWalker {
            classify: &classify,
            containers: &["container"],
            statement_prefixes: &[],
            quotes: C_STYLE_QUOTES.quotes,
        };
        let root = walker.walk(&code);
        let mut unit = SourceUnit::default();

        let mut stack: Vec<(&SyntaxNode, String)> = root.children.iter().rev().map(|n| (n, String::new())).collect();
        while let Some((node, scope)) = stack.pop() {
            let head = node.text(&code);
            match node.kind {
                "container" => {
                    let Some(caps) = self.container.captures(head) else {
                        continue;
                    };
                    let Some(name) = caps.name("name").map(|m| m.as_str().to_string()) else {
                        continue;
                    };
                    let parents = caps.name("parents").map(|p| parent_names(p.as_str())).unwrap_or_default();
                    unit.scope(&name).parents = parents;
                    stack.extend(node.children.iter().rev().map(|c| (c, name.clone())));
                }
                "using" => {
                    if let Some(library) = self.using.captures(head).and_then(|c| c.name("library")) {
                        let library = library.as_str().to_string();
                        unit.scope(&scope).aliases.insert(library.clone(), library);
                    }
                }
                "function" if node.body.is_some() => {
                    if let Some((record, specifiers)) = self.function_record(head, node.body_text(&code), &scope) {
                        unit.call_sites.insert(record.id.clone(), specifiers);
                        unit.functions.push(record);
                    }
                }
                "modifier" if node.body.is_some() => {
                    if let Some(record) = self.modifier_record(head, node.body_text(&code), &scope) {
                        unit.functions.push(record);
                    }
                }
                _ => {}
            }
        }

        Ok(unit)
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        let ids: HashSet<&str> = unit.functions.iter().map(|f| f.id.as_str()).collect();
        let modifiers: HashSet<&str> = unit
            .functions
            .iter()
            .filter(|f| f.classification == "modifier")
            .map(|f| f.id.as_str())
            .collect();
        let Ok(matcher) = CallMatcher::new(
            unit.functions.iter().map(|f| f.short_name()),
            CallSyntax::Parenthesized,
            SOLIDITY_CHARS,
            C_STYLE_QUOTES.line,
        ) else {
            return CallLinks::default();
        };

        let mut chains: HashMap<&str, Vec<String>> = HashMap::new();
        for function in &unit.functions {
            chains
                .entry(function.origin_scope.as_str())
                .or_insert_with(|| ancestry(unit, &function.origin_scope));
        }

        let first_defined = |scopes: &[String], name: &str| -> Option<String> {
            scopes.iter().map(|s| join_path(s, name)).find(|id| ids.contains(id.as_str()))
        };

        let mut edges = Vec::new();
        for function in &unit.functions {
            let scope = function.origin_scope.as_str();
            let chain = chains.get(scope).map(Vec::as_slice).unwrap_or(&[]);

            let targets = matcher.find_call_sites(&function.body_text).into_iter().filter_map(|site| {
                match site.receiver {
                    None | Some("this") => first_defined(chain, site.name)
                        .or_else(|| ids.contains(site.name).then(|| site.name.to_string())),
                    Some("super") => first_defined(chain.get(1..).unwrap_or(&[]), site.name),
                    Some(receiver) if unit.scopes.contains_key(receiver) => {
                        first_defined(&ancestry(unit, receiver), site.name)
                    }
                    // A value: only libraries attached with `using ... for` apply
                    Some(_) => {
                        let libraries: Vec<String> = chain
                            .iter()
                            .filter_map(|s| unit.aliases(s))
                            .flat_map(|aliases| aliases.values().cloned())
                            .collect();
                        first_defined(&libraries, site.name)
                    }
                }
            });
            edges.extend(edges_from(&function.id, targets));

            let mut seen = HashSet::new();
            for word in unit.call_sites.get(&function.id).into_iter().flatten() {
                if let Some(target) = first_defined(chain, word) {
                    if modifiers.contains(target.as_str()) && seen.insert(target.clone()) {
                        edges.push(CallEdge::labelled(&function.id, target, "modifier"));
                    }
                }
            }
        }

        CallLinks { edges, external: Vec::new() }
    }

    fn grouping(&self) -> Grouping {
        Grouping::ByScope
    }

    fn import_rules(&self) -> &'static [ImportRule] {
        &[SOLIDITY_IMPORT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = r#"
// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

import "./Base.sol";
import {Math} from "@openzeppelin/contracts/utils/math/Math.sol";

library SafeMath {
    function add(uint256 a, uint256 b) internal pure returns (uint256) { return a + b; }
}

interface IToken {
    function transfer(address to, uint256 amount) external returns (bool);
}

abstract contract Owned {
    address owner;
    modifier onlyOwner() { require(msg.sender == owner, "not owner"); _; }
    function _authorize() internal view virtual { }
    function transfer(address to, uint256 amount) public virtual returns (bool) { return true; }
}

contract Token is IToken, Owned {
    using SafeMath for uint256;
    mapping(address => uint256) balances;

    constructor() { owner = msg.sender; }

    function transfer(address to, uint256 amount) public override(IToken, Owned) onlyOwner returns (bool) {
        _authorize();
        balances[to] = balances[to].add(amount);
        /* _move(to); */
        return super.transfer(to, amount);
    }

    function mint(uint256 amount) external onlyOwner {
        balances[owner] = SafeMath.add(balances[owner], amount);
        this.transfer(owner, amount);
    }

    receive() external payable {}
}

function helper() pure returns (uint256) { return 1; }
"#;

    fn parse(source: &str) -> (SourceUnit, CallLinks) {
        let adapter = SolidityAdapter::new().unwrap();
        let mut ctx = ParserContext::new().unwrap();
        let unit = adapter.parse(&mut ctx, source).unwrap();
        let links = adapter.build_call_graph(&unit);
        (unit, links)
    }

    fn has_edge(links: &CallLinks, from: &str, to: &str) -> bool {
        links.edges.iter().any(|e| e.from == from && e.to == to)
    }

    #[test]
    fn test_functions_and_classification() {
        let (unit, _) = parse(TOKEN);
        let tags: HashMap<&str, &str> = unit
            .functions
            .iter()
            .map(|f| (f.id.as_str(), f.classification.as_str()))
            .collect();

        assert_eq!(tags["SafeMath::add"], "pure");
        assert_eq!(tags["Owned::onlyOwner"], "modifier");
        assert_eq!(tags["Owned::_authorize"], "view");
        assert_eq!(tags["Token::constructor"], "entry");
        assert_eq!(tags["Token::receive"], "entry");
        assert_eq!(tags["Token::mint"], "public");
        assert_eq!(tags["helper"], "pure");
        // Interface declarations have no body
        assert!(!tags.contains_key("IToken::transfer"));
    }

    #[test]
    fn test_inherited_and_library_calls() {
        let (_, links) = parse(TOKEN);
        assert!(has_edge(&links, "Token::transfer", "Owned::_authorize"));
        assert!(has_edge(&links, "Token::transfer", "SafeMath::add"));
        assert!(has_edge(&links, "Token::transfer", "Owned::transfer"));
        assert!(has_edge(&links, "Token::mint", "SafeMath::add"));
        assert!(!has_edge(&links, "Token::transfer", "_move"));
    }

    #[test]
    fn test_this_call_skips_self_edge() {
        let (_, links) = parse(TOKEN);
        assert!(!has_edge(&links, "Token::transfer", "Token::transfer"));
        assert!(has_edge(&links, "Token::mint", "Token::transfer"));
    }

    #[test]
    fn test_modifier_edges_are_labelled() {
        let (_, links) = parse(TOKEN);
        let modifier_edges: Vec<_> = links.edges.iter().filter(|e| e.label == "modifier").collect();
        assert_eq!(modifier_edges.len(), 2);
        assert!(modifier_edges.iter().all(|e| e.to == "Owned::onlyOwner"));
    }

    #[test]
    fn test_scope_grouping_and_imports() {
        let adapter = SolidityAdapter::new().unwrap();
        assert_eq!(adapter.grouping(), Grouping::ByScope);

        let pattern = Regex::new(adapter.import_rules()[0].pattern).unwrap();
        let targets: Vec<_> = pattern
            .captures_iter(TOKEN)
            .filter_map(|c| c.name("target"))
            .map(|m| m.as_str())
            .collect();
        assert_eq!(targets, vec!["./Base.sol", "@openzeppelin/contracts/utils/math/Math.sol"]);
    }
}
