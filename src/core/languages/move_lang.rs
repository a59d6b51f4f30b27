use std::collections::HashSet;
use regex::Regex;

use crate::core::call_graph::{edges_from, CallLinks, FunctionRecord, Grouping, PathCallFinder};
use crate::error::Result;
use super::lexer::{match_delimiter, split_params, strip_comments, C_STYLE};
use super::scope::{expand_use_tree, join_path, last_segment, qualify, AliasTable};
use super::syntax_tree::{split_attributes, starts_with_word, ItemWalker, SyntaxNode};
use super::{LanguageAdapter, ParserContext, SourceUnit};

const MOVE_KEYWORDS: &[&str] = &[
    "if", "while", "loop", "return", "abort", "let", "match", "assert", "spec", "move_to", "move_from",
    "borrow_global", "borrow_global_mut", "exists", "freeze",
];

/// Move (Aptos / Sui) adapter; functions are qualified as `module::name`
pub struct MoveAdapter {
    function: Regex,
    module: Regex,
    calls: PathCallFinder,
}

/// Drop the leading address segment: `sui::coin::split` -> `coin::split`
fn without_address(path: &str) -> String {
    match path.split_once("::") {
        Some((_, rest)) => rest.to_string(),
        None => path.to_string(),
    }
}

fn classify_head(head: &str) -> &'static str {
    let (_, rest) = split_attributes(head);
    if starts_with_word(rest, "module") {
        "module"
    } else if starts_with_word(rest, "address") {
        "address"
    } else if starts_with_word(rest, "script") {
        "script"
    } else if starts_with_word(rest, "use") {
        "use"
    } else if rest.split_whitespace().any(|w| w == "fun") {
        "function"
    } else {
        "other"
    }
}

impl MoveAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            function: Regex::new(r"\bfun\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^()]*>)?\s*\(")?,
            module: Regex::new(r"^module\s+(?:(?:0x[0-9A-Fa-f]+|[A-Za-z_]\w*)\s*::\s*)*(?P<name>[A-Za-z_]\w*)")?,
            calls: PathCallFinder::new(MOVE_KEYWORDS, C_STYLE.line)?,
        })
    }

    fn module_name(&self, head: &str) -> Option<String> {
        let (_, rest) = split_attributes(head);
        self.module.captures(rest).and_then(|c| c.name("name")).map(|m| m.as_str().to_string())
    }

    fn function_record(&self, head: &str, body: &str, module: &str) -> Option<FunctionRecord> {
        let (attributes, rest) = split_attributes(head);
        let caps = self.function.captures(rest)?;
        let name = caps.name("name")?.as_str();
        let open = caps.get(0)?.end() - 1;
        let close = match_delimiter(rest, open, b'(', b')', &[])?;
        let modifiers: Vec<&str> = rest[..caps.get(0)?.start()].split_whitespace().collect();

        let classification = if modifiers.contains(&"entry") {
            "entry"
        } else if attributes.iter().any(|a| a.trim() == "view") {
            "view"
        } else if modifiers.iter().any(|m| m.starts_with("public")) {
            "public"
        } else if modifiers.contains(&"inline") {
            "inline"
        } else {
            "regular"
        };

        Some(
            FunctionRecord::new(join_path(module, name), name)
                .with_parameters(split_params(&rest[open + 1..close]))
                .with_body(body)
                .with_classification(classification)
                .with_scope(module),
        )
    }

    /// Queue the items of `parent`; `module a::b;` applies to every item after it
    fn push_children<'n>(
        &self,
        code: &str,
        stack: &mut Vec<(&'n SyntaxNode, String)>,
        parent: &'n SyntaxNode,
        scope: &str,
    ) {
        let mut current = scope.to_string();
        let mut items = Vec::new();
        for child in &parent.children {
            if child.kind == "module" && child.body.is_none() {
                if let Some(name) = self.module_name(child.text(code)) {
                    current = name;
                }
                continue;
            }
            items.push((child, current.clone()));
        }
        stack.extend(items.into_iter().rev());
    }

    fn aliases_from_use(&self, head: &str, aliases: &mut AliasTable) {
        let tree = head.trim_start().trim_start_matches("use").trim();
        for (alias, path) in expand_use_tree(tree) {
            aliases.insert(alias, without_address(&path));
        }
    }
}

impl LanguageAdapter for MoveAdapter {
    fn language_id(&self) -> &'static str {
        "move"
    }

    fn language_name(&self) -> &'static str {
        "Move"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["move"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &C_STYLE);
        let walker = ItemWalker {
            classify: &classify_head,
            containers: &["module", "address", "script"],
            statement_prefixes: &["use", "friend"],
            quotes: C_STYLE.quotes,
        };
        let root = walker.walk(&code);
        let mut unit = SourceUnit::default();

        let mut stack: Vec<(&SyntaxNode, String)> = Vec::new();
        self.push_children(&code, &mut stack, &root, "");

        while let Some((node, scope)) = stack.pop() {
            let head = node.text(&code);
            match node.kind {
                "module" => {
                    if let Some(name) = self.module_name(head) {
                        unit.scope(&name);
                        self.push_children(&code, &mut stack, node, &name);
                    }
                }
                "address" => self.push_children(&code, &mut stack, node, &scope),
                "script" => self.push_children(&code, &mut stack, node, "script"),
                "use" => self.aliases_from_use(head, &mut unit.scope(&scope).aliases),
                "function" if node.body.is_some() => {
                    if let Some(record) = self.function_record(head, node.body_text(&code), &scope) {
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
            let scope = function.origin_scope.as_str();
            let aliases = unit.aliases(scope).unwrap_or(&no_aliases);

            let mut targets = Vec::new();
            for raw in unit.call_sites.get(&function.id).into_iter().flatten() {
                // Receiver syntax `c.value()` cannot be typed; try the own module
                let raw = raw.rsplit('.').next().unwrap_or(raw);
                let qualified = qualify(raw, scope, aliases);
                let qualified = if qualified.starts_with("0x") {
                    without_address(&qualified)
                } else {
                    qualified
                };

                if defined.contains(qualified.as_str()) {
                    targets.push(qualified);
                } else if raw.contains("::") && qualified.contains("::") {
                    // Cross-module call into code that is not part of the source
                    let module = qualified.rsplit_once("::").map(|(m, _)| m).unwrap_or("");
                    if placeholders.insert(qualified.clone()) {
                        links.external.push(FunctionRecord::external(&qualified, last_segment(module)));
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
}
