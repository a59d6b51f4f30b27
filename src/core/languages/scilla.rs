use regex::Regex;
use tracing::debug;

use crate::core::call_graph::{edges_from, is_commented_or_quoted, CallLinks, CallMatcher, CallSyntax, FunctionRecord, WORD_CHARS};
use crate::error::Result;
use super::lexer::{match_delimiter, split_params, strip_comments, ML_STYLE};
use super::{LanguageAdapter, ParserContext, SourceUnit};

/// Scilla (Zilliqa) adapter. Bodies run from the signature to the matching `end`.
pub struct ScillaAdapter {
    component: Regex,
    block: Regex,
    contract: Regex,
}

impl ScillaAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            component: Regex::new(r"\b(?P<keyword>transition|procedure)\s+(?P<name>[A-Za-z_]\w*)\s*\(")?,
            block: Regex::new(r"\b(?:match|end)\b")?,
            contract: Regex::new(r"\bcontract\s+(?P<name>[A-Za-z_]\w*)")?,
        })
    }

    /// Offset of the `end` closing a component body starting at `from`;
    /// every `match` opens a block that its own `end` closes
    fn body_end(&self, code: &str, from: usize) -> Option<usize> {
        let mut depth = 1usize;
        for m in self.block.find_iter(&code[from..]) {
            let offset = from + m.start();
            if is_commented_or_quoted(code, offset, &[] as &[&str]) {
                continue;
            }
            if m.as_str() == "match" {
                depth += 1;
            } else {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
        }
        None
    }
}

impl LanguageAdapter for ScillaAdapter {
    fn language_id(&self) -> &'static str {
        "scilla"
    }

    fn language_name(&self) -> &'static str {
        "Scilla"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["scilla", "scillib"]
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &ML_STYLE);
        let contract = self
            .contract
            .captures(&code)
            .and_then(|c| c.name("name"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let mut functions = Vec::new();
        let mut pos = 0;
        while let Some(caps) = self.component.captures_at(&code, pos) {
            let (Some(whole), Some(keyword), Some(name)) = (caps.get(0), caps.name("keyword"), caps.name("name")) else {
                break;
            };
            pos = whole.end();

            let open = whole.end() - 1;
            let Some(close) = match_delimiter(&code, open, b'(', b')', ML_STYLE.quotes) else {
                debug!("Unterminated parameter list for Scilla {}", name.as_str());
                continue;
            };
            let Some(end) = self.body_end(&code, close + 1) else {
                debug!("No closing `end` for Scilla {}", name.as_str());
                continue;
            };

            let classification = if keyword.as_str() == "transition" { "entry" } else { "regular" };
            functions.push(
                FunctionRecord::new(name.as_str(), name.as_str())
                    .with_parameters(split_params(&code[open + 1..close]))
                    .with_body(code[close + 1..end].trim())
                    .with_classification(classification)
                    .with_scope(contract.as_str()),
            );
            pos = end + 3;
        }

        Ok(SourceUnit::with_functions(functions))
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        // Only procedures can be invoked from code
        let procedures = unit
            .functions
            .iter()
            .filter(|f| f.classification != "entry")
            .map(|f| f.id.as_str());
        let Ok(matcher) = CallMatcher::new(procedures, CallSyntax::Word, WORD_CHARS, &[]) else {
            return CallLinks::default();
        };

        let mut edges = Vec::new();
        for function in &unit.functions {
            edges.extend(edges_from(&function.id, matcher.find_calls(&function.body_text)));
        }
        CallLinks { edges, external: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::CallEdge;

    const COUNTER: &str = r#"
scilla_version 0

library Counter

let zero = Uint128 0

contract Counter(owner: ByStr20)

field count : Uint128 = zero

(* IsOwner must run before every state change *)
procedure ThrowError(code: Int32)
  e = { _exception : "Error"; code : code };
  throw e
end

procedure IsOwner(address: ByStr20)
  is_owner = builtin eq owner address;
  match is_owner with
  | False =>
    err = Int32 1;
    ThrowError err
  | True =>
  end
end

transition Increment(by: Uint128, note: String)
  IsOwner _sender;
  (* ThrowError legacy *)
  c <- count;
  new = builtin add c by;
  count := new;
  e = { _eventname : "IsOwner"; value : new };
  event e
end

transition Reset()
  IsOwner _sender
end
"#;

    fn parse(source: &str) -> (SourceUnit, CallLinks) {
        let adapter = ScillaAdapter::new().unwrap();
        let mut ctx = ParserContext::new().unwrap();
        let unit = adapter.parse(&mut ctx, source).unwrap();
        let links = adapter.build_call_graph(&unit);
        (unit, links)
    }

    #[test]
    fn test_components_with_nested_match() {
        let (unit, _) = parse(COUNTER);
        let tags: Vec<_> = unit.functions.iter().map(|f| (f.id.as_str(), f.classification.as_str())).collect();
        assert_eq!(
            tags,
            vec![
                ("ThrowError", "regular"),
                ("IsOwner", "regular"),
                ("Increment", "entry"),
                ("Reset", "entry"),
            ]
        );
        assert!(unit.functions[1].body_text.ends_with("| True =>\n  end"));
        assert_eq!(unit.functions[2].parameters, vec!["by: Uint128", "note: String"]);
        assert!(unit.functions.iter().all(|f| f.origin_scope == "Counter"));
    }

    #[test]
    fn test_procedure_calls() {
        let (_, links) = parse(COUNTER);
        assert_eq!(
            links.edges,
            vec![
                CallEdge::new("IsOwner", "ThrowError"),
                CallEdge::new("Increment", "IsOwner"),
                CallEdge::new("Reset", "IsOwner"),
            ]
        );
    }
}
