use std::collections::HashSet;
use regex::Regex;
use tracing::debug;

use crate::core::call_graph::{CallLinks, CallResolver, CallSyntax, FunctionRecord};
use crate::error::Result;
use super::lexer::{collapse_whitespace, match_delimiter, split_params, strip_comments, FUNC_STYLE};
use super::syntax_tree::{starts_with_word, ItemWalker};
use super::{ImportRule, LanguageAdapter, ParserContext, SourceUnit, C_INCLUDE};

/// Characters FunC allows inside identifiers (`udict_get?`, `begin_cell`)
const FUNC_IDENT_CHARS: &str = "A-Za-z0-9_?!'$";

/// FunC (TON) adapter
pub struct FuncAdapter {
    name_pattern: Regex,
    resolver: CallResolver,
}

impl FuncAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            name_pattern: Regex::new(r"(?:^|[^A-Za-z0-9_?!'$])[~.]?(?P<name>[A-Za-z_$][A-Za-z0-9_?!'$]*)\s*\(")?,
            resolver: CallResolver::new(CallSyntax::Parenthesized, FUNC_IDENT_CHARS, FUNC_STYLE.line),
        })
    }

    fn function_from_head(&self, head: &str, body: &str) -> Option<FunctionRecord> {
        let caps = self.name_pattern.captures(head)?;
        let name = caps.name("name")?.as_str();
        let open = caps.get(0)?.end() - 1;
        let close = match_delimiter(head, open, b'(', b')', &[])?;
        let specifiers = &head[close + 1..];

        Some(
            FunctionRecord::new(name, name)
                .with_parameters(split_params(&head[open + 1..close]))
                .with_body(body)
                .with_classification(classify(specifiers)),
        )
    }
}

/// impure > get (method_id) > inline > regular
fn classify(specifiers: &str) -> &'static str {
    let words: Vec<&str> = specifiers
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    if words.contains(&"impure") {
        "impure"
    } else if words.contains(&"method_id") {
        "get"
    } else if words.contains(&"inline") || words.contains(&"inline_ref") {
        "inline"
    } else {
        "regular"
    }
}

fn classify_head(head: &str) -> &'static str {
    if starts_with_word(head, "global") {
        "global"
    } else if starts_with_word(head, "const") {
        "const"
    } else if head.starts_with('#') {
        "directive"
    } else if head.contains('(') {
        "function"
    } else {
        "other"
    }
}

/// Variable names introduced by `global T a, b;`
fn global_names(head: &str) -> Vec<String> {
    let declared = head.trim_start_matches("global").trim();
    split_params(declared)
        .iter()
        .filter_map(|part| part.split_whitespace().last())
        .map(|name| name.trim_start_matches(')').to_string())
        .collect()
}

impl LanguageAdapter for FuncAdapter {
    fn language_id(&self) -> &'static str {
        "func"
    }

    fn language_name(&self) -> &'static str {
        "FunC"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["fc", "func"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &FUNC_STYLE);
        let walker = ItemWalker {
            classify: &classify_head,
            containers: &[],
            statement_prefixes: &[],
            quotes: FUNC_STYLE.quotes,
        };
        let root = walker.walk(&code);

        let mut globals = HashSet::new();
        let mut functions = Vec::new();

        for item in &root.children {
            let head = item.text(&code);
            match item.kind {
                "global" => globals.extend(global_names(head)),
                "function" => {
                    let record = match &item.body {
                        Some(_) => self.function_from_head(head, item.body_text(&code)),
                        // `asm` bodies carry no braces
                        None => head.find(" asm").and_then(|at| {
                            let (signature, asm) = head.split_at(at);
                            self.function_from_head(signature, asm.trim_start())
                        }),
                    };
                    match record {
                        Some(record) => functions.push(record),
                        None => debug!("Skipping FunC declaration: {}", collapse_whitespace(head)),
                    }
                }
                _ => {}
            }
        }

        functions.retain(|f| !globals.contains(&f.id));
        Ok(SourceUnit::with_functions(functions))
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        CallLinks {
            edges: self.resolver.resolve(&unit.functions),
            external: Vec::new(),
        }
    }

    fn import_rules(&self) -> &'static [ImportRule] {
        &[C_INCLUDE]
    }
}
