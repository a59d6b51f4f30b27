use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ParsingConfig;
use crate::error::{ContractScopeError, Result};
use super::call_graph::{ContractGraph, GraphAssembler};
use super::languages::{LanguageAdapter, LanguageRegistry, ParserContext};

/// Multi-language parser that delegates to the registered language adapters
pub struct CodeParser {
    config: ParsingConfig,
    registry: LanguageRegistry,
    context: ParserContext,
}

impl CodeParser {
    pub fn new(config: &ParsingConfig) -> Result<Self> {
        let registry = LanguageRegistry::with_builtin()?;

        if registry.get(&config.default_language).is_none() {
            return Err(ContractScopeError::UnknownLanguage(config.default_language.clone()));
        }
        for (extension, language) in &config.extension_overrides {
            if registry.get(language).is_none() {
                return Err(ContractScopeError::Config(format!(
                    "extension override '{}' names unknown language '{}'",
                    extension, language
                )));
            }
        }

        Ok(Self {
            config: config.clone(),
            registry,
            context: ParserContext::new()?,
        })
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Language id for `path`; unrecognised extensions map to the default language
    pub fn detect_language(&self, path: &Path) -> String {
        match self.recognised_language(path) {
            Some(language) => language,
            None => {
                debug!(
                    "No language registered for {}, using {}",
                    path.display(),
                    self.config.default_language
                );
                self.config.default_language.clone()
            }
        }
    }

    /// Language id for `path` when its extension is known, without the fallback
    pub fn recognised_language(&self, path: &Path) -> Option<String> {
        let extension = path.extension().and_then(|ext| ext.to_str())?.to_ascii_lowercase();

        if let Some(language) = self.config.extension_overrides.get(&extension) {
            return Some(language.clone());
        }
        self.registry
            .for_extension(&extension)
            .map(|adapter| adapter.language_id().to_string())
    }

    pub fn adapter(&self, language_id: &str) -> Result<Arc<dyn LanguageAdapter>> {
        self.registry
            .get(language_id)
            .ok_or_else(|| ContractScopeError::UnknownLanguage(language_id.to_string()))
    }

    /// Extract the call graph of `source`.
    ///
    /// A source the adapter cannot handle at all yields an empty graph; only
    /// an unknown language id is an error.
    pub fn parse_source(&mut self, source: &str, language_id: &str) -> Result<ContractGraph> {
        let adapter = self.adapter(language_id)?;
        let mut assembler = GraphAssembler::new(language_id, adapter.grouping());

        let unit = match adapter.parse(&mut self.context, source) {
            Ok(unit) => unit,
            Err(e) => {
                warn!("Failed to parse {} source: {}", adapter.language_name(), e);
                return Ok(assembler.finish());
            }
        };

        let links = adapter.build_call_graph(&unit);
        assembler.add_functions(unit.functions);
        assembler.add_links(links);
        let graph = assembler.finish();

        let stats = graph.get_statistics();
        info!(
            "Extracted {} functions and {} calls ({} external) from {} source",
            stats.total_functions,
            stats.total_calls,
            stats.external_functions,
            adapter.language_name()
        );
        Ok(graph)
    }

    /// Whether a directory walk should pick up `path`
    pub fn should_parse_file(&self, path: &Path) -> bool {
        self.recognised_language(path).is_some()
    }

    pub fn max_file_size(&self) -> usize {
        self.config.max_file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::call_graph::CallEdge;

    fn parser() -> CodeParser {
        CodeParser::new(&Config::default().parsing).unwrap()
    }

    #[test]
    fn test_detect_language_with_fallback() {
        let parser = parser();
        assert_eq!(parser.detect_language(Path::new("wallet.fc")), "func");
        assert_eq!(parser.detect_language(Path::new("Token.SOL")), "solidity");
        assert_eq!(parser.detect_language(Path::new("src/lib.rs")), "rust");
        assert_eq!(parser.detect_language(Path::new("README")), "func");
        assert_eq!(parser.detect_language(Path::new("notes.txt")), "func");
    }

    #[test]
    fn test_extension_overrides_win() {
        let mut config = Config::default().parsing;
        config.extension_overrides.insert("fif".to_string(), "func".to_string());
        config.extension_overrides.insert("js".to_string(), "typescript".to_string());
        let parser = CodeParser::new(&config).unwrap();
        assert_eq!(parser.detect_language(Path::new("a.fif")), "func");
        assert_eq!(parser.detect_language(Path::new("a.js")), "typescript");
        assert!(parser.should_parse_file(Path::new("a.fif")));
        assert!(!parser.should_parse_file(Path::new("a.txt")));
    }

    #[test]
    fn test_unknown_languages_are_rejected() {
        let mut config = Config::default().parsing;
        config.default_language = "cobol".to_string();
        assert!(matches!(CodeParser::new(&config), Err(ContractScopeError::UnknownLanguage(_))));

        let mut parser = parser();
        assert!(matches!(parser.parse_source("", "cobol"), Err(ContractScopeError::UnknownLanguage(_))));
    }

    #[test]
    fn test_baseline_scenario() {
        let mut parser = parser();
        let graph = parser.parse_source("int foo() { return 1; } int main() { foo(); }", "func").unwrap();
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["foo", "main"]);
        assert_eq!(graph.edges, vec![CallEdge::new("main", "foo")]);
    }

    #[test]
    fn test_independent_functions_have_no_edges() {
        let mut parser = parser();
        let source = "function a() {}\nfunction b() {}\nfunction c() {}";
        let graph = parser.parse_source(source, "javascript").unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_placeholders_join_the_graph() {
        let mut parser = parser();
        let source = "module 0x1::shop {\n    use 0x1::ledger;\n    public fun buy() { ledger::log(); }\n}";
        let graph = parser.parse_source(source, "move").unwrap();
        assert!(graph.node("ledger::log").is_some());
        assert!(graph.contains_edge("shop::buy", "ledger::log"));
        assert_eq!(graph.get_statistics().external_functions, 1);
    }
}
