use std::collections::HashSet;

use crate::core::call_graph::{edges_from, CallLinks, FunctionRecord};
use crate::error::Result;
use super::lexer::collapse_whitespace;
use super::scope::join_path;
use super::syntax_tree::SyntaxNode;
use super::{LanguageAdapter, ParserContext, SourceUnit};

/// Python adapter for SmartPy and Algorand Python contracts
pub struct PythonAdapter;

impl PythonAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }

    fn function_record(&self, node: &SyntaxNode, scope: &str, decorators: &[String], source: &str) -> Option<FunctionRecord> {
        let name = node.child_by_field("name")?.text(source);
        let body = node.child_by_field("body")?;
        let parameters = node
            .child_by_field("parameters")
            .map(|list| list.children.iter().filter(|p| p.kind != "comment").map(|p| collapse_whitespace(p.text(source))).collect())
            .unwrap_or_default();

        Some(
            FunctionRecord::new(join_path(scope, name), name)
                .with_parameters(parameters)
                .with_body(body.text(source))
                .with_classification(classify(name, decorators))
                .with_scope(scope),
        )
    }
}

/// Decorator name without `@` and call arguments: `@arc4.abimethod(readonly=True)` -> `arc4.abimethod`
fn decorator_name(decorator: &str) -> &str {
    decorator.split('(').next().unwrap_or(decorator).trim()
}

/// view > entry > inline > public > regular
fn classify(name: &str, decorators: &[String]) -> &'static str {
    let last = |d: &String| decorator_name(d).rsplit('.').next().unwrap_or("").to_string();
    let names: Vec<String> = decorators.iter().map(last).collect();
    let has = |n: &str| names.iter().any(|x| x == n);
    let compact = |d: &String| d.replace(' ', "");

    let readonly = decorators
        .iter()
        .any(|d| decorator_name(d).ends_with("abimethod") && compact(d).contains("readonly=True"));
    let inline_subroutine = decorators
        .iter()
        .any(|d| decorator_name(d).ends_with("subroutine") && compact(d).contains("inline=True"));

    if has("onchain_view") || has("offchain_view") || readonly {
        "view"
    } else if has("entrypoint")
        || has("entry_point")
        || has("abimethod")
        || has("baremethod")
        || matches!(name, "__init__" | "approval_program" | "clear_state_program")
    {
        "entry"
    } else if has("private") || has("private_lambda") || has("inline_result") || inline_subroutine {
        "inline"
    } else if has("subroutine") || !name.starts_with('_') {
        "public"
    } else {
        "regular"
    }
}

/// Raw callee text: `helper`, `self.helper` or `Counter.helper`
fn call_target(call: &SyntaxNode, source: &str) -> Option<String> {
    let callee = call.child_by_field("function")?;
    match callee.kind {
        "identifier" => Some(callee.text(source).to_string()),
        "attribute" => {
            let object = callee.child_by_field("object")?;
            let attribute = callee.child_by_field("attribute")?.text(source);
            let receiver = if object.kind == "identifier" { object.text(source) } else { "" };
            Some(format!("{}.{}", receiver, attribute))
        }
        _ => None,
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language_id(&self) -> &'static str {
        "python"
    }

    fn language_name(&self) -> &'static str {
        "Python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn parse(&self, ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let root = ctx.parse_python(source)?;
        let mut unit = SourceUnit::default();

        let mut stack: Vec<(&SyntaxNode, String, Vec<String>)> =
            root.children.iter().rev().map(|n| (n, String::new(), Vec::new())).collect();

        while let Some((node, scope, decorators)) = stack.pop() {
            match node.kind {
                "decorated_definition" => {
                    let Some(definition) = node.child_by_field("definition") else {
                        continue;
                    };
                    let names = node
                        .children
                        .iter()
                        .filter(|c| c.kind == "decorator")
                        .map(|c| collapse_whitespace(c.text(source).trim_start_matches('@')))
                        .collect();
                    stack.push((definition, scope, names));
                }
                "class_definition" => {
                    let (Some(name), Some(body)) = (node.child_by_field("name"), node.child_by_field("body")) else {
                        continue;
                    };
                    let class_scope = join_path(&scope, name.text(source));
                    unit.scope(&class_scope).parents = vec![scope.clone()];
                    stack.extend(body.children.iter().rev().map(|c| (c, class_scope.clone(), Vec::new())));
                }
                // `@sp.module def main():` holds contract classes rather than code
                "function_definition" if decorators.iter().any(|d| decorator_name(d) == "sp.module") => {
                    let (Some(name), Some(body)) = (node.child_by_field("name"), node.child_by_field("body")) else {
                        continue;
                    };
                    let module = join_path(&scope, name.text(source));
                    unit.scope(&module).parents = vec![scope.clone()];
                    stack.extend(body.children.iter().rev().map(|c| (c, module.clone(), Vec::new())));
                }
                "function_definition" => {
                    if let Some(record) = self.function_record(node, &scope, &decorators, source) {
                        let mut seen = HashSet::new();
                        let targets = node
                            .child_by_field("body")
                            .map(|body| {
                                body.descendants()
                                    .filter(|n| n.kind == "call")
                                    .filter_map(|n| call_target(n, source))
                                    .filter(|t| seen.insert(t.clone()))
                                    .collect()
                            })
                            .unwrap_or_default();
                        unit.call_sites.insert(record.id.clone(), targets);
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
        let mut edges = Vec::new();

        for function in &unit.functions {
            let scope = function.origin_scope.as_str();
            let outer = unit
                .scopes
                .get(scope)
                .and_then(|info| info.parents.first())
                .map(String::as_str)
                .unwrap_or(scope);

            let mut targets = Vec::new();
            for raw in unit.call_sites.get(&function.id).into_iter().flatten() {
                let candidates = match raw.split_once('.') {
                    Some(("self", method)) => vec![join_path(scope, method)],
                    Some(("", _)) => continue,
                    Some((class, method)) => vec![join_path(&join_path(outer, class), method)],
                    None => vec![join_path(scope, raw), join_path(outer, raw), raw.clone()],
                };
                if let Some(found) = candidates.into_iter().find(|c| defined.contains(c.as_str())) {
                    targets.push(found);
                }
            }
            edges.extend(edges_from(&function.id, targets));
        }

        CallLinks { edges, external: Vec::new() }
    }
}
