use std::collections::HashSet;

use crate::core::call_graph::{edges_from, CallLinks, FunctionRecord, Grouping};
use crate::error::Result;
use super::lexer::collapse_whitespace;
use super::scope::{
    absolute_use_path, expand_use_tree, first_segment, is_snake_case, join_path, last_segment, parent_path,
    qualify, strip_generics, AliasTable,
};
use super::syntax_tree::SyntaxNode;
use super::{ImportRule, LanguageAdapter, ParserContext, SourceUnit, MOD_DECLARATION};

/// Crates whose functions never become placeholder nodes
const RUST_DENYLIST: &[&str] = &["std", "core", "alloc"];

/// Rust adapter (ink!, CosmWasm, Anchor, NEAR) using the tree-sitter grammar
pub struct RustAdapter;

/// Where an item sits: its module, and the impl or trait it belongs to
#[derive(Debug, Clone, Default)]
struct Context {
    module: String,
    scope: String,
    /// Inside an Anchor `#[program]` module
    program: bool,
}

impl RustAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }

    /// Queue the items of a `declaration_list` (or the file), attaching the
    /// attributes written directly above each one
    fn push_items<'n>(
        &self,
        stack: &mut Vec<(&'n SyntaxNode, Context, Vec<String>)>,
        container: &'n SyntaxNode,
        context: &Context,
        source: &str,
    ) {
        let mut items = Vec::new();
        let mut attributes = Vec::new();
        for child in &container.children {
            match child.kind {
                "attribute_item" => {
                    let text = child.text(source).trim();
                    let inner = text.strip_prefix("#[").and_then(|t| t.strip_suffix(']')).unwrap_or(text);
                    attributes.push(collapse_whitespace(inner));
                }
                "line_comment" | "block_comment" => {}
                _ => items.push((child, context.clone(), std::mem::take(&mut attributes))),
            }
        }
        stack.extend(items.into_iter().rev());
    }

    fn function_record(&self, node: &SyntaxNode, context: &Context, attributes: &[String], source: &str) -> Option<FunctionRecord> {
        let name = node.child_by_field("name")?.text(source);
        let body = node.child_by_field("body")?;
        let parameters = node
            .child_by_field("parameters")
            .map(|list| list.children.iter().filter(|p| p.kind != "attribute_item").map(|p| collapse_whitespace(p.text(source))).collect())
            .unwrap_or_default();

        let public = node.child_of_kind("visibility_modifier").is_some();
        let has = |needle: &str| attributes.iter().any(|a| a.contains(needle));
        let entry = has("ink(message") || has("ink(constructor") || has("entry_point") || attributes.iter().any(|a| a == "init") || (context.program && public);

        let classification = if entry {
            "entry"
        } else if public {
            "public"
        } else if attributes.iter().any(|a| a.starts_with("inline")) {
            "inline"
        } else {
            "regular"
        };

        let block = body.text(source);
        let inner = block.strip_prefix('{').and_then(|b| b.strip_suffix('}')).unwrap_or(block);

        Some(
            FunctionRecord::new(join_path(&context.scope, name), name)
                .with_parameters(parameters)
                .with_body(inner)
                .with_classification(classification)
                .with_scope(context.scope.as_str()),
        )
    }
}

/// The callee of a `call_expression` as a raw path, `self.f` for method calls
fn call_target(call: &SyntaxNode, source: &str) -> Option<String> {
    let mut callee = call.child_by_field("function")?;
    if callee.kind == "generic_function" {
        callee = callee.child_by_field("function")?;
    }
    match callee.kind {
        "identifier" => Some(callee.text(source).to_string()),
        "scoped_identifier" => {
            let text: String = callee.text(source).chars().filter(|c| !c.is_whitespace()).collect();
            Some(strip_generics(&text))
        }
        "field_expression" => {
            let value = callee.child_by_field("value")?;
            let field = callee.child_by_field("field")?.text(source);
            let receiver = match value.kind {
                "self" | "identifier" => value.text(source),
                _ => "",
            };
            Some(format!("{}.{}", receiver, field))
        }
        _ => None,
    }
}

fn call_targets(body: &SyntaxNode, source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.descendants()
        .filter(|n| n.kind == "call_expression")
        .filter_map(|n| call_target(n, source))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

impl LanguageAdapter for RustAdapter {
    fn language_id(&self) -> &'static str {
        "rust"
    }

    fn language_name(&self) -> &'static str {
        "Rust"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse(&self, ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let root = ctx.parse_rust(source)?;
        let mut unit = SourceUnit::default();

        let mut stack = Vec::new();
        self.push_items(&mut stack, &root, &Context::default(), source);

        while let Some((node, context, attributes)) = stack.pop() {
            match node.kind {
                "mod_item" => {
                    let (Some(name), Some(body)) = (node.child_by_field("name"), node.child_by_field("body")) else {
                        continue;
                    };
                    let module = join_path(&context.module, name.text(source));
                    unit.scope(&module);
                    let inner = Context {
                        module: module.clone(),
                        scope: module,
                        program: attributes.iter().any(|a| a == "program"),
                    };
                    self.push_items(&mut stack, body, &inner, source);
                }
                "impl_item" | "trait_item" => {
                    let name_field = if node.kind == "impl_item" { "type" } else { "name" };
                    let (Some(name), Some(body)) = (node.child_by_field(name_field), node.child_by_field("body")) else {
                        continue;
                    };
                    let type_name = strip_generics(name.text(source));
                    let scope = join_path(&context.module, last_segment(&type_name));
                    unit.scope(&scope).parents = vec![context.module.clone()];
                    let inner = Context {
                        module: context.module.clone(),
                        scope,
                        program: false,
                    };
                    self.push_items(&mut stack, body, &inner, source);
                }
                "use_declaration" => {
                    let Some(argument) = node.child_by_field("argument") else {
                        continue;
                    };
                    let tree = collapse_whitespace(argument.text(source));
                    for (alias, path) in expand_use_tree(&tree) {
                        let path = absolute_use_path(&path, &context.module);
                        unit.scope(&context.module).aliases.insert(alias, path);
                    }
                }
                "function_item" => {
                    if let Some(record) = self.function_record(node, &context, &attributes, source) {
                        let targets = node
                            .child_by_field("body")
                            .map(|body| call_targets(body, source))
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
        let no_aliases = AliasTable::new();
        let mut links = CallLinks::default();
        let mut placeholders = HashSet::new();

        for function in &unit.functions {
            let scope = function.origin_scope.as_str();
            let module = unit
                .scopes
                .get(scope)
                .and_then(|info| info.parents.first())
                .map(String::as_str)
                .unwrap_or(scope);
            let aliases = unit.aliases(module).unwrap_or(&no_aliases);

            let mut targets = Vec::new();
            for raw in unit.call_sites.get(&function.id).into_iter().flatten() {
                let candidates = match raw.split_once('.') {
                    Some(("self", method)) => vec![join_path(scope, method)],
                    Some(_) => continue,
                    None if first_segment(raw) == "Self" => vec![qualify(raw, scope, aliases)],
                    None => vec![qualify(raw, module, aliases), join_path(module, raw)],
                };

                if let Some(found) = candidates.iter().find(|c| defined.contains(c.as_str())) {
                    targets.push(found.clone());
                    continue;
                }

                let Some(qualified) = candidates.first() else {
                    continue;
                };
                let imported = raw.contains("::") || aliases.contains_key(raw.as_str());
                let owner = parent_path(qualified);
                if imported
                    && !owner.is_empty()
                    && is_snake_case(last_segment(owner))
                    && !RUST_DENYLIST.contains(&first_segment(qualified))
                    && first_segment(raw) != "Self"
                {
                    if placeholders.insert(qualified.clone()) {
                        links.external.push(FunctionRecord::external(qualified, owner));
                    }
                    targets.push(qualified.clone());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::CallEdge;

    fn parse(source: &str) -> (SourceUnit, CallLinks) {
        let adapter = RustAdapter::new().unwrap();
        let mut ctx = ParserContext::new().unwrap();
        let unit = adapter.parse(&mut ctx, source).unwrap();
        let links = adapter.build_call_graph(&unit);
        (unit, links)
    }

    fn tags(unit: &SourceUnit) -> Vec<(&str, &str)> {
        unit.functions.iter().map(|f| (f.id.as_str(), f.classification.as_str())).collect()
    }

    #[test]
    fn test_ink_contract() {
        let source = r#"
#[ink::contract]
mod flipper {
    #[ink(storage)]
    pub struct Flipper { value: bool }

    impl Flipper {
        #[ink(constructor)]
        pub fn new(init_value: bool) -> Self {
            Self { value: init_value }
        }

        #[ink(message)]
        pub fn flip(&mut self) {
            self.value = !self.value;
            self.log();
            Self::check(self.value);
        }

        #[inline]
        fn log(&self) {}

        fn check(value: bool) {}
    }
}
"#;
        let (unit, links) = parse(source);
        assert_eq!(
            tags(&unit),
            vec![
                ("flipper::Flipper::new", "entry"),
                ("flipper::Flipper::flip", "entry"),
                ("flipper::Flipper::log", "inline"),
                ("flipper::Flipper::check", "regular"),
            ]
        );
        assert_eq!(
            links.edges,
            vec![
                CallEdge::new("flipper::Flipper::flip", "flipper::Flipper::log"),
                CallEdge::new("flipper::Flipper::flip", "flipper::Flipper::check"),
            ]
        );
        assert_eq!(unit.functions[1].parameters, vec!["&mut self"]);
    }

    #[test]
    fn test_cosmwasm_entry_points_and_modules() {
        let source = r#"
use cosmwasm_std::{entry_point, to_json_binary, DepsMut, Response};

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(deps: DepsMut, msg: ExecuteMsg) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::Increment {} => execute::increment(deps),
    }
}

#[entry_point]
pub fn query(deps: Deps) -> StdResult<Binary> {
    to_json_binary(&query::count(deps)?)
}

pub mod execute {
    use super::*;
    pub fn increment(deps: DepsMut) -> Result<Response, ContractError> {
        let state = helpers::load(deps.storage)?;
        Ok(Response::new().add_attribute("count", state.to_string()))
    }
}

pub mod query {
    pub fn count(deps: Deps) -> u64 { 0 }
}
"#;
        let (unit, links) = parse(source);
        assert_eq!(
            tags(&unit),
            vec![
                ("execute", "entry"),
                ("query", "entry"),
                ("execute::increment", "public"),
                ("query::count", "public"),
            ]
        );
        assert!(links.edges.contains(&CallEdge::new("execute", "execute::increment")));
        assert!(links.edges.contains(&CallEdge::new("query", "query::count")));
        assert!(links.edges.contains(&CallEdge::new("query", "cosmwasm_std::to_json_binary")));
        assert!(links.edges.contains(&CallEdge::new("execute::increment", "helpers::load")));
        // Types and prelude items never become nodes
        assert!(!links.edges.iter().any(|e| e.to.contains("Response") || e.to == "Ok"));

        let external: Vec<_> = links.external.iter().map(|f| (f.id.as_str(), f.origin_scope.as_str())).collect();
        assert_eq!(external, vec![("cosmwasm_std::to_json_binary", "cosmwasm_std"), ("helpers::load", "helpers")]);
    }

    #[test]
    fn test_anchor_program_module() {
        let source = r#"
#[program]
pub mod counter {
    use super::*;

    pub fn initialize(ctx: Context<Initialize>) -> Result<()> {
        instructions::init::handler(ctx)
    }

    fn internal() {}
}
"#;
        let (unit, links) = parse(source);
        assert_eq!(tags(&unit), vec![("counter::initialize", "entry"), ("counter::internal", "regular")]);
        assert!(links.edges.contains(&CallEdge::new("counter::initialize", "instructions::init::handler")));
    }

    #[test]
    fn test_denylisted_crates_are_not_placeholders() {
        let source = "fn run() { std::mem::swap(&mut a, &mut b); core::cmp::max(1, 2); helper(); }\nfn helper() {}";
        let (_, links) = parse(source);
        assert_eq!(links.edges, vec![CallEdge::new("run", "helper")]);
        assert!(links.external.is_empty());
    }

    #[test]
    fn test_user_module_named_like_builtin() {
        let source = "mod core { pub fn max() {} }\nfn run() { core::max(); }";
        let (_, links) = parse(source);
        assert_eq!(links.edges, vec![CallEdge::new("run", "core::max")]);
    }
}
