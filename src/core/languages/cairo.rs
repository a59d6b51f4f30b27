use std::collections::HashSet;
use regex::Regex;

use crate::core::call_graph::{edges_from, CallLinks, FunctionRecord, Grouping, PathCallFinder};
use crate::error::Result;
use super::lexer::{match_delimiter, split_params, strip_comments, C_STYLE};
use super::scope::{
    absolute_use_path, expand_use_tree, first_segment, is_snake_case, join_path, last_segment, parent_path,
    qualify, AliasTable,
};
use super::syntax_tree::{split_attributes, ItemWalker, SyntaxNode};
use super::{ImportRule, LanguageAdapter, ParserContext, SourceUnit, MOD_DECLARATION};

const CAIRO_KEYWORDS: &[&str] = &["if", "while", "loop", "match", "return", "let", "for"];

/// Corelib modules never turned into placeholder nodes
const CAIRO_DENYLIST: &[&str] = &[
    "core", "array", "option", "result", "traits", "integer", "box", "dict", "serde", "debug", "panics",
    "poseidon", "pedersen", "keccak", "ecdsa", "num", "clone", "hash", "byte_array", "fmt", "ops", "cmp",
];

/// Cairo (Starknet) adapter; impl blocks are folded into their module
pub struct CairoAdapter {
    function: Regex,
    named: Regex,
    calls: PathCallFinder,
}

/// Item head without attributes and visibility
fn item_keywords(head: &str) -> (Vec<&str>, &str) {
    let (attributes, rest) = split_attributes(head);
    let rest = rest.strip_prefix("pub(crate)").unwrap_or(rest).trim_start();
    let rest = rest.strip_prefix("pub ").unwrap_or(rest).trim_start();
    (attributes, rest)
}

fn classify_head(head: &str) -> &'static str {
    let (_, rest) = item_keywords(head);
    let first = rest.split(|c: char| c.is_whitespace() || c == '<').next().unwrap_or("");
    match first {
        "mod" => "module",
        "impl" => "impl",
        "trait" => "trait",
        "use" => "use",
        _ if rest.split_whitespace().any(|w| w == "fn") => "function",
        _ => "other",
    }
}

/// Context handed down to the items of a module or impl
#[derive(Clone)]
struct Frame {
    module: String,
    exposed: bool,
}

impl CairoAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            function: Regex::new(r"\bfn\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^()]*>)?\s*\(")?,
            named: Regex::new(r"^(?:mod|impl|trait)\s+(?P<name>[A-Za-z_]\w*)(?:<[^{]*?>)?(?:\s+of\s+(?P<of>[\w:]+))?")?,
            calls: PathCallFinder::new(CAIRO_KEYWORDS, C_STYLE.line)?,
        })
    }

    fn function_record(&self, head: &str, body: &str, frame: &Frame) -> Option<FunctionRecord> {
        let (attributes, rest) = item_keywords(head);
        let caps = self.function.captures(rest)?;
        let name = caps.name("name")?.as_str();
        let open = caps.get(0)?.end() - 1;
        let close = match_delimiter(rest, open, b'(', b')', &[])?;
        let parameters = split_params(&rest[open + 1..close]);
        let has = |attribute: &str| attributes.iter().any(|a| a.trim().starts_with(attribute));

        let classification = if has("constructor") || has("l1_handler") {
            "entry"
        } else if has("view") || parameters.iter().any(|p| p.replace(' ', "").starts_with("self:@")) {
            "view"
        } else if frame.exposed || has("external") {
            "public"
        } else if has("inline") {
            "inline"
        } else {
            "regular"
        };

        Some(
            FunctionRecord::new(join_path(&frame.module, name), name)
                .with_parameters(parameters)
                .with_body(body)
                .with_classification(classification)
                .with_scope(frame.module.as_str()),
        )
    }
}

impl LanguageAdapter for CairoAdapter {
    fn language_id(&self) -> &'static str {
        "cairo"
    }

    fn language_name(&self) -> &'static str {
        "Cairo"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["cairo"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &C_STYLE);
        let walker = ItemWalker {
            classify: &classify_head,
            containers: &["module", "impl", "trait"],
            statement_prefixes: &["use"],
            quotes: &['"'],
        };
        let root = walker.walk(&code);
        let mut unit = SourceUnit::default();

        let top = Frame { module: String::new(), exposed: false };
        let mut stack: Vec<(&SyntaxNode, Frame)> = root.children.iter().rev().map(|n| (n, top.clone())).collect();

        while let Some((node, frame)) = stack.pop() {
            let head = node.text(&code);
            let (attributes, rest) = item_keywords(head);
            match node.kind {
                "module" | "impl" | "trait" if node.body.is_some() => {
                    let Some(caps) = self.named.captures(rest) else {
                        continue;
                    };
                    let Some(name) = caps.name("name").map(|m| m.as_str()) else {
                        continue;
                    };
                    let child = if node.kind == "module" {
                        let module = join_path(&frame.module, name);
                        unit.scope(&module);
                        Frame { module, exposed: false }
                    } else {
                        // `Impl::f` and `Trait::f` refer to functions of the enclosing module
                        let aliases = &mut unit.scope(&frame.module).aliases;
                        aliases.insert(name.to_string(), frame.module.clone());
                        if let Some(of) = caps.name("of") {
                            aliases.insert(last_segment(of.as_str()).to_string(), frame.module.clone());
                        }
                        let exposed = attributes
                            .iter()
                            .any(|a| a.replace(' ', "").contains("embed_v0") || a.trim().starts_with("external"));
                        Frame { module: frame.module.clone(), exposed }
                    };
                    stack.extend(node.children.iter().rev().map(|c| (c, child.clone())));
                }
                "use" => {
                    let tree = rest.trim_start_matches("use").trim();
                    for (alias, path) in expand_use_tree(tree) {
                        let path = absolute_use_path(&path, &frame.module);
                        unit.scope(&frame.module).aliases.insert(alias, path);
                    }
                }
                "function" if node.body.is_some() => {
                    if let Some(record) = self.function_record(head, node.body_text(&code), &frame) {
                        unit.call_sites.insert(record.id.clone(), self.calls.find(&record.body_text));
                        unit.functions.push(record);
                    }
                }
                _ => {}
            }
        }

        Ok(unit)
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        let defined: HashSet<&str> = unit.functions.iter().map(|f| f.id.as_str()).collect();
        let no_aliases = AliasTable::new();
        let mut links = CallLinks::default();
        let mut placeholders = HashSet::new();

        for function in &unit.functions {
            let module = function.origin_scope.as_str();
            let aliases = unit.aliases(module).unwrap_or(&no_aliases);

            let mut targets = Vec::new();
            for raw in unit.call_sites.get(&function.id).into_iter().flatten() {
                let (receiver, path) = match raw.split_once('.') {
                    Some((receiver, path)) => (Some(receiver), path),
                    None => (None, raw.as_str()),
                };
                let qualified = match receiver {
                    // Contract state methods live in the same module
                    Some("self") => join_path(module, path),
                    // Calls on other values cannot be typed
                    Some(_) => continue,
                    None => qualify(path, module, aliases),
                };

                if defined.contains(qualified.as_str()) {
                    targets.push(qualified);
                    continue;
                }

                let imported = path.contains("::") || aliases.contains_key(path);
                let owner = parent_path(&qualified);
                if imported
                    && !owner.is_empty()
                    && is_snake_case(last_segment(owner))
                    && !CAIRO_DENYLIST.contains(&first_segment(&qualified))
                {
                    if placeholders.insert(qualified.clone()) {
                        links.external.push(FunctionRecord::external(&qualified, owner));
                    }
                    targets.push(qualified);
                }
            }
            links.edges.extend(edges_from(&function.id, targets));
        }

        links
    }

    fn grouping(&self) -> Grouping {
        Grouping::ByScope
    }

    fn import_rules(&self) -> &'static [ImportRule] {
        &[MOD_DECLARATION]
    }
}
