use std::collections::{HashMap, HashSet};
use regex::Regex;

use crate::core::call_graph::{
    edges_from, CallLinks, CallMatcher, CallSyntax, FunctionRecord, WORD_CHARS,
};
use crate::error::Result;
use super::lexer::{collapse_whitespace, match_delimiter, split_params, strip_comments, C_STYLE};
use super::scope::{join_path, strip_generics};
use super::syntax_tree::{starts_with_word, ItemWalker, SyntaxNode};
use super::{ImportRule, LanguageAdapter, ParserContext, ScopeInfo, SourceUnit, QUOTED_IMPORT};

/// Tact (TON) adapter
pub struct TactAdapter {
    container: Regex,
    function: Regex,
    handler: Regex,
}

struct Declared {
    scope: String,
    is_trait: bool,
    record: FunctionRecord,
}

impl TactAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            container: Regex::new(r"^(?:@\w+\([^)]*\)\s*)*(?P<kind>contract|trait)\s+(?P<name>[A-Za-z_]\w*)(?:\s*\([^)]*\))?(?:\s+with\s+(?P<parents>[\w\s,]+))?")?,
            function: Regex::new(r"\bfun\s+(?P<name>[A-Za-z_]\w*)\s*\(")?,
            handler: Regex::new(r"^(?P<kind>init|receive|external|bounced)\s*\(")?,
        })
    }

    fn classify_head(&self, head: &str) -> &'static str {
        if self.container.is_match(head) {
            "container"
        } else if self.handler.is_match(head) {
            "handler"
        } else if self.function.is_match(head) {
            "function"
        } else {
            "other"
        }
    }

    fn function_record(&self, head: &str, body: &str, scope: &str) -> Option<FunctionRecord> {
        if let Some(caps) = self.handler.captures(head) {
            let kind = caps.name("kind")?.as_str();
            let open = caps.get(0)?.end() - 1;
            let close = match_delimiter(head, open, b'(', b')', &['"'])?;
            let argument = head[open + 1..close].trim();
            let name = handler_name(kind, argument);
            let parameters = if argument.is_empty() { Vec::new() } else { vec![collapse_whitespace(argument)] };
            return Some(
                FunctionRecord::new(join_path(scope, &name), kind)
                    .with_parameters(parameters)
                    .with_body(body)
                    .with_classification("entry")
                    .with_scope(scope),
            );
        }

        let caps = self.function.captures(head)?;
        let name = caps.name("name")?.as_str();
        let open = caps.get(0)?.end() - 1;
        let close = match_delimiter(head, open, b'(', b')', &['"'])?;
        let modifiers = &head[..caps.get(0)?.start()];

        Some(
            FunctionRecord::new(join_path(scope, name), name)
                .with_parameters(split_params(&head[open + 1..close]))
                .with_body(body)
                .with_classification(classify_modifiers(modifiers))
                .with_scope(scope),
        )
    }
}

/// `receive("increment")` -> `receive_increment`, `receive(msg: Add)` -> `receive_Add`
fn handler_name(kind: &str, argument: &str) -> String {
    if argument.is_empty() {
        return kind.to_string();
    }
    let suffix = if argument.starts_with('"') {
        argument
            .trim_matches('"')
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect::<String>()
    } else {
        let ty = argument.split_once(':').map(|(_, ty)| ty).unwrap_or(argument).trim();
        // bounced<Add> -> Add
        let inner = ty
            .find('<')
            .and_then(|open| ty.rfind('>').map(|close| &ty[open + 1..close]))
            .unwrap_or(ty);
        strip_generics(inner)
    };
    format!("{}_{}", kind, suffix)
}

/// get > inline > regular
fn classify_modifiers(modifiers: &str) -> &'static str {
    if starts_with_word_anywhere(modifiers, "get") {
        "get"
    } else if starts_with_word_anywhere(modifiers, "inline") {
        "inline"
    } else {
        "regular"
    }
}

fn starts_with_word_anywhere(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|w| starts_with_word(w, word))
}

impl LanguageAdapter for TactAdapter {
    fn language_id(&self) -> &'static str {
        "tact"
    }

    fn language_name(&self) -> &'static str {
        "Tact"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["tact"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &C_STYLE);
        let classify = |head: &str| self.classify_head(head);
        let walker = ItemWalker {
            classify: &classify,
            containers: &["container"],
            statement_prefixes: &[],
            quotes: C_STYLE.quotes,
        };
        let root = walker.walk(&code);

        let mut unit = SourceUnit::default();
        let mut declared = Vec::new();
        let mut traits = HashSet::new();

        // (node, enclosing container, container is a trait)
        let mut stack: Vec<(&SyntaxNode, String, bool)> =
            root.children.iter().rev().map(|n| (n, String::new(), false)).collect();
        while let Some((node, scope, is_trait)) = stack.pop() {
            let head = node.text(&code);
            match node.kind {
                "container" => {
                    let Some(caps) = self.container.captures(head) else {
                        continue;
                    };
                    let (Some(kind), Some(name)) = (caps.name("kind"), caps.name("name")) else {
                        continue;
                    };
                    let name = name.as_str().to_string();
                    let parents = caps
                        .name("parents")
                        .map(|p| {
                            p.as_str()
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                    unit.scopes.insert(name.clone(), ScopeInfo { aliases: HashMap::new(), parents });
                    let is_trait = kind.as_str() == "trait";
                    if is_trait {
                        traits.insert(name.clone());
                    }
                    stack.extend(node.children.iter().rev().map(|c| (c, name.clone(), is_trait)));
                }
                "handler" | "function" if node.body.is_some() => {
                    if let Some(record) = self.function_record(head, node.body_text(&code), &scope) {
                        declared.push(Declared { scope, is_trait, record });
                    }
                }
                _ => {}
            }
        }

        // A trait with exactly one implementer lends its functions to it
        let mut implementers: HashMap<&str, Vec<&str>> = HashMap::new();
        for (name, info) in &unit.scopes {
            if traits.contains(name) {
                continue;
            }
            for parent in &info.parents {
                implementers.entry(parent.as_str()).or_default().push(name.as_str());
            }
        }
        let owner: HashMap<String, String> = implementers
            .into_iter()
            .filter(|(t, list)| list.len() == 1 && traits.contains(*t))
            .map(|(t, list)| (t.to_string(), list[0].to_string()))
            .collect();

        // Trait functions first, so a contract's own definition wins the id
        let (inherited, own): (Vec<_>, Vec<_>) = declared.into_iter().partition(|d| d.is_trait);
        for d in inherited.into_iter().chain(own) {
            let mut record = d.record;
            if let Some(contract) = owner.get(&d.scope) {
                record.id = join_path(contract, record.short_name());
                record.origin_scope = contract.clone();
            }
            unit.functions.push(record);
        }

        Ok(unit)
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        let ids: HashSet<&str> = unit.functions.iter().map(|f| f.id.as_str()).collect();
        let matcher = match CallMatcher::new(
            unit.functions.iter().map(|f| f.short_name()),
            CallSyntax::Parenthesized,
            WORD_CHARS,
            C_STYLE.line,
        ) {
            Ok(matcher) => matcher,
            Err(_) => return CallLinks::default(),
        };

        let resolve_in_scope = |scope: &str, name: &str| -> Option<String> {
            let own = join_path(scope, name);
            if ids.contains(own.as_str()) {
                return Some(own);
            }
            unit.scopes
                .get(scope)
                .into_iter()
                .flat_map(|info| info.parents.iter())
                .map(|parent| join_path(parent, name))
                .find(|id| ids.contains(id.as_str()))
                .or_else(|| ids.contains(name).then(|| name.to_string()))
        };

        let mut edges = Vec::new();
        for function in &unit.functions {
            let targets = matcher.find_call_sites(&function.body_text).into_iter().filter_map(|site| {
                match site.receiver {
                    Some("self") => resolve_in_scope(&function.origin_scope, site.name),
                    // `x.double()` on a value can only be a global extension function
                    Some(_) => ids.contains(site.name).then(|| site.name.to_string()),
                    None => ids
                        .contains(site.name)
                        .then(|| site.name.to_string())
                        .or_else(|| resolve_in_scope(&function.origin_scope, site.name)),
                }
            });
            edges.extend(edges_from(&function.id, targets));
        }

        CallLinks { edges, external: Vec::new() }
    }

    fn import_rules(&self) -> &'static [ImportRule] {
        &[QUOTED_IMPORT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::CallEdge;

    const COUNTER: &str = r#"
import "@stdlib/deploy";

message Add { amount: Int as uint32; }

trait Ownable {
    owner: Address;
    fun requireOwner() {
        require(sender() == self.owner, "Access denied");
    }
    get fun owner(): Address { return self.owner; }
}

contract Counter with Deployable, Ownable {
    counter: Int;
    owner: Address;

    init(owner: Address) { self.owner = owner; self.counter = 0; }

    receive("increment") {
        self.requireOwner();
        self.bump(1);
    }

    receive(msg: Add) {
        self.bump(msg.amount);
    }

    bounced(msg: bounced<Add>) {}

    inline fun bump(by: Int) {
        self.counter = self.counter + clamp(by);
    }

    get fun counter(): Int { return self.counter; }
}

fun clamp(x: Int): Int { return min(x, 100); }
"#;

    fn parse(source: &str) -> (SourceUnit, CallLinks) {
        let adapter = TactAdapter::new().unwrap();
        let mut ctx = ParserContext::new().unwrap();
        let unit = adapter.parse(&mut ctx, source).unwrap();
        let links = adapter.build_call_graph(&unit);
        (unit, links)
    }

    fn record<'a>(unit: &'a SourceUnit, id: &str) -> &'a FunctionRecord {
        unit.functions.iter().find(|f| f.id == id).unwrap_or_else(|| panic!("missing {}", id))
    }

    #[test]
    fn test_handlers_and_functions() {
        let (unit, _) = parse(COUNTER);
        assert_eq!(record(&unit, "Counter::init").classification, "entry");
        assert_eq!(record(&unit, "Counter::receive_increment").parameters, vec!["\"increment\""]);
        assert_eq!(record(&unit, "Counter::receive_Add").display_label, "receive");
        assert_eq!(record(&unit, "Counter::bounced_Add").classification, "entry");
        assert_eq!(record(&unit, "Counter::bump").classification, "inline");
        assert_eq!(record(&unit, "Counter::counter").classification, "get");
        assert_eq!(record(&unit, "clamp").origin_scope, "");
    }

    #[test]
    fn test_single_implementer_owns_trait_functions() {
        let (unit, links) = parse(COUNTER);
        let owner = record(&unit, "Counter::requireOwner");
        assert_eq!(owner.origin_scope, "Counter");
        assert!(links.edges.contains(&CallEdge::new("Counter::receive_increment", "Counter::requireOwner")));
    }

    #[test]
    fn test_self_and_global_resolution() {
        let (_, links) = parse(COUNTER);
        assert!(links.edges.contains(&CallEdge::new("Counter::receive_increment", "Counter::bump")));
        assert!(links.edges.contains(&CallEdge::new("Counter::receive_Add", "Counter::bump")));
        assert!(links.edges.contains(&CallEdge::new("Counter::bump", "clamp")));
        // `min`, `require` and `sender` are built-ins with no definition
        assert!(links.edges.iter().all(|e| e.to != "min" && e.to != "require"));
    }

    #[test]
    fn test_shared_trait_stays_with_trait() {
        let source = r#"
trait Pausable { fun pause() { self.check(); } fun check() {} }
contract A with Pausable { receive("go") { self.pause(); } }
contract B with Pausable { receive("go") { self.pause(); } }
"#;
        let (unit, links) = parse(source);
        assert_eq!(record(&unit, "Pausable::pause").origin_scope, "Pausable");
        assert!(links.edges.contains(&CallEdge::new("A::receive_go", "Pausable::pause")));
        assert!(links.edges.contains(&CallEdge::new("B::receive_go", "Pausable::pause")));
        assert!(links.edges.contains(&CallEdge::new("Pausable::pause", "Pausable::check")));
    }

    #[test]
    fn test_abstract_functions_are_skipped() {
        let source = "trait T { abstract fun todo(); fun done() {} }";
        let (unit, _) = parse(source);
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].id, "T::done");
    }
}
