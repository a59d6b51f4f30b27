use std::collections::HashSet;
use regex::Regex;
use tracing::debug;

use crate::core::call_graph::{edges_from, CallLinks, CallMatcher, CallSyntax, FunctionRecord};
use crate::error::Result;
use super::lexer::{collapse_whitespace, match_delimiter, strip_comments, LISP_STYLE};
use super::{LanguageAdapter, ParserContext, SourceUnit};

const LISP_IDENT: &str = r"[A-Za-z_][\w\-?!*+<>=/]*";

/// S-expression languages sharing one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LispDialect {
    /// Stacks Clarity: `(define-public (name (arg type)) body)`
    Clarity,
    /// Kadena Pact: `(defun name:type (arg:type) body)`
    Pact,
}

pub struct LispAdapter {
    dialect: LispDialect,
    definition: Regex,
    container: Regex,
    contract_call: Regex,
}

impl LispAdapter {
    pub fn new(dialect: LispDialect) -> Result<Self> {
        let definition = match dialect {
            LispDialect::Clarity => format!(
                r"\(\s*(?P<keyword>define-public|define-read-only|define-private)\s*\(\s*(?P<name>{LISP_IDENT})"
            ),
            LispDialect::Pact => format!(
                r"\(\s*(?P<keyword>defun|defcap|defpact)\s+(?P<name>{LISP_IDENT})(?::[\w.{{}}\[\]]+)?\s*\("
            ),
        };
        Ok(Self {
            dialect,
            definition: Regex::new(&definition)?,
            container: Regex::new(&format!(r"\(\s*(?:module|interface)\s+(?P<name>{LISP_IDENT})"))?,
            contract_call: Regex::new(
                r"\(\s*contract-call\?\s+'?(?:[A-Z0-9]+)?\.(?P<contract>[A-Za-z][\w\-]*)\s+(?P<function>[A-Za-z][\w\-?!]*)",
            )?,
        })
    }

    fn classify(&self, keyword: &str) -> &'static str {
        match keyword {
            "define-public" => "public",
            "define-read-only" => "get",
            "defpact" => "entry",
            "defcap" => "capability",
            _ => "regular",
        }
    }

    /// Pact `(module name ...)` spans, used as origin scopes
    fn modules(&self, code: &str) -> Vec<(String, usize, usize)> {
        self.container
            .captures_iter(code)
            .filter_map(|caps| {
                let open = caps.get(0)?.start();
                let close = match_delimiter(code, open, b'(', b')', LISP_STYLE.quotes)?;
                Some((caps.name("name")?.as_str().to_string(), open, close))
            })
            .collect()
    }

    /// Parameters and the position right after the signature
    fn signature(&self, code: &str, name_end: usize, form_close: usize) -> Option<(Vec<String>, usize)> {
        match self.dialect {
            LispDialect::Clarity => {
                // `(name (a uint) (b principal))`: the signature list opened before the name
                let open = code[..name_end].rfind('(')?;
                let close = match_delimiter(code, open, b'(', b')', LISP_STYLE.quotes)?;
                let mut parameters = Vec::new();
                let mut pos = name_end;
                while let Some(offset) = code[pos..close].find('(') {
                    let group_open = pos + offset;
                    let group_close = match_delimiter(code, group_open, b'(', b')', LISP_STYLE.quotes)?;
                    parameters.push(collapse_whitespace(&code[group_open + 1..group_close]));
                    pos = group_close + 1;
                }
                Some((parameters, close + 1))
            }
            LispDialect::Pact => {
                let open = name_end + code[name_end..form_close].find('(')?;
                let close = match_delimiter(code, open, b'(', b')', LISP_STYLE.quotes)?;
                let parameters = code[open + 1..close].split_whitespace().map(str::to_string).collect();
                Some((parameters, close + 1))
            }
        }
    }
}

impl LanguageAdapter for LispAdapter {
    fn language_id(&self) -> &'static str {
        match self.dialect {
            LispDialect::Clarity => "clarity",
            LispDialect::Pact => "pact",
        }
    }

    fn language_name(&self) -> &'static str {
        match self.dialect {
            LispDialect::Clarity => "Clarity",
            LispDialect::Pact => "Pact",
        }
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        match self.dialect {
            LispDialect::Clarity => &["clar"],
            LispDialect::Pact => &["pact"],
        }
    }

    fn parse(&self, _ctx: &mut ParserContext, source: &str) -> Result<SourceUnit> {
        let code = strip_comments(source, &LISP_STYLE);
        let modules = self.modules(&code);
        let mut functions = Vec::new();

        for caps in self.definition.captures_iter(&code) {
            let (Some(whole), Some(keyword), Some(name)) = (caps.get(0), caps.name("keyword"), caps.name("name")) else {
                continue;
            };
            let Some(form_close) = match_delimiter(&code, whole.start(), b'(', b')', LISP_STYLE.quotes) else {
                debug!("Unterminated {} form for {}", keyword.as_str(), name.as_str());
                continue;
            };
            let Some((parameters, body_start)) = self.signature(&code, name.end(), form_close) else {
                continue;
            };

            let scope = modules
                .iter()
                .filter(|(_, open, close)| *open < whole.start() && whole.start() < *close)
                .max_by_key(|(_, open, _)| *open)
                .map(|(module, _, _)| module.as_str())
                .unwrap_or("");

            let body = code.get(body_start..form_close).unwrap_or("").trim();
            functions.push(
                FunctionRecord::new(name.as_str(), name.as_str())
                    .with_parameters(parameters)
                    .with_body(body)
                    .with_classification(self.classify(keyword.as_str()))
                    .with_scope(scope),
            );
        }

        Ok(SourceUnit::with_functions(functions))
    }

    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks {
        let names = unit.functions.iter().map(|f| f.id.as_str());
        let Ok(matcher) = CallMatcher::new(names, CallSyntax::Prefix, "", LISP_STYLE.line) else {
            return CallLinks::default();
        };

        let mut links = CallLinks::default();
        let mut placeholders = HashSet::new();
        for function in &unit.functions {
            let mut targets: Vec<String> = matcher
                .find_calls(&function.body_text)
                .into_iter()
                .map(str::to_string)
                .collect();

            if self.dialect == LispDialect::Clarity {
                for caps in self.contract_call.captures_iter(&function.body_text) {
                    let (Some(contract), Some(callee)) = (caps.name("contract"), caps.name("function")) else {
                        continue;
                    };
                    let id = format!("{}::{}", contract.as_str(), callee.as_str());
                    if placeholders.insert(id.clone()) {
                        links.external.push(FunctionRecord::external(&id, contract.as_str()));
                    }
                    targets.push(id);
                }
            }
            links.edges.extend(edges_from(&function.id, targets));
        }
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::CallEdge;

    fn parse(dialect: LispDialect, source: &str) -> (SourceUnit, CallLinks) {
        let adapter = LispAdapter::new(dialect).unwrap();
        let mut ctx = ParserContext::new().unwrap();
        let unit = adapter.parse(&mut ctx, source).unwrap();
        let links = adapter.build_call_graph(&unit);
        (unit, links)
    }

    const COUNTER: &str = r#"
;; counter contract
(define-data-var counter uint u0)

(define-private (check-owner)
  (ok (asserts! (is-eq tx-sender contract-owner) (err u100))))

(define-read-only (get-counter)
  (ok (var-get counter)))

(define-public (increment (by uint) (memo (optional (buff 34))))
  (begin
    (try! (check-owner))
    ;; (reset)
    (try! (contract-call? .token-v2 transfer by tx-sender contract-owner none))
    (var-set counter (+ (unwrap-panic (get-counter)) by))
    (ok true)))
"#;

    #[test]
    fn test_clarity_definitions() {
        let (unit, _) = parse(LispDialect::Clarity, COUNTER);
        let tags: Vec<_> = unit.functions.iter().map(|f| (f.id.as_str(), f.classification.as_str())).collect();
        assert_eq!(tags, vec![("check-owner", "regular"), ("get-counter", "get"), ("increment", "public")]);
        assert_eq!(unit.functions[2].parameters, vec!["by uint", "memo (optional (buff 34))"]);
        assert!(unit.functions[0].parameters.is_empty());
    }

    #[test]
    fn test_clarity_calls_and_contract_calls() {
        let (_, links) = parse(LispDialect::Clarity, COUNTER);
        assert_eq!(
            links.edges,
            vec![
                CallEdge::new("increment", "check-owner"),
                CallEdge::new("increment", "get-counter"),
                CallEdge::new("increment", "token-v2::transfer"),
            ]
        );
        assert_eq!(links.external.len(), 1);
        assert_eq!(links.external[0].origin_scope, "token-v2");
    }

    #[test]
    fn test_pact_module() {
        let source = r#"
(module coin GOVERNANCE
  (defcap TRANSFER:bool (sender:string receiver:string amount:decimal)
    (enforce (!= sender receiver) "same account"))

  (defun transfer:string (sender:string receiver:string amount:decimal)
    @doc "Move funds"
    (with-capability (TRANSFER sender receiver amount)
      (debit sender amount)))

  (defun debit:string (account:string amount:decimal)
    (update coin-table account { "balance": amount }))

  (defpact transfer-crosschain:string (sender:string)
    (step (transfer sender "x" 1.0)))
)
"#;
        let (unit, links) = parse(LispDialect::Pact, source);
        let tags: Vec<_> = unit.functions.iter().map(|f| (f.id.as_str(), f.classification.as_str())).collect();
        assert_eq!(
            tags,
            vec![
                ("TRANSFER", "capability"),
                ("transfer", "regular"),
                ("debit", "regular"),
                ("transfer-crosschain", "entry"),
            ]
        );
        assert!(unit.functions.iter().all(|f| f.origin_scope == "coin"));
        assert_eq!(unit.functions[1].parameters, vec!["sender:string", "receiver:string", "amount:decimal"]);
        assert_eq!(
            links.edges,
            vec![
                CallEdge::new("transfer", "TRANSFER"),
                CallEdge::new("transfer", "debit"),
                CallEdge::new("transfer-crosschain", "transfer"),
            ]
        );
    }
}
