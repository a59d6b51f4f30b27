//! Language adapters: one per supported contract language.
//!
//! Every adapter turns source text into a `SourceUnit` (functions plus the
//! scope context needed to resolve calls) and then into call edges. Adapters
//! are immutable once built and are looked up through the `LanguageRegistry`.

pub mod lexer;
pub mod scanner;
pub mod scope;
pub mod syntax_tree;

mod cairo;
mod func;
mod generic;
mod lisp;
mod move_lang;
mod python;
mod rust;
mod scilla;
mod solidity;
mod tact;
mod vyper;

pub use cairo::CairoAdapter;
pub use func::FuncAdapter;
pub use generic::{GenericAdapter, GenericSpec, GENERIC_LANGUAGES};
pub use lisp::{LispAdapter, LispDialect};
pub use move_lang::MoveAdapter;
pub use python::PythonAdapter;
pub use rust::RustAdapter;
pub use scilla::ScillaAdapter;
pub use solidity::SolidityAdapter;
pub use syntax_tree::{ParserContext, SyntaxNode};
pub use tact::TactAdapter;
pub use vyper::VyperAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use super::call_graph::{CallLinks, FunctionRecord, Grouping};
use scope::AliasTable;

/// Trait that all language adapters must implement
pub trait LanguageAdapter: Send + Sync {
    /// Registry id, e.g. `func`
    fn language_id(&self) -> &'static str;

    /// Human readable name
    fn language_name(&self) -> &'static str;

    /// Extensions without the leading dot
    fn file_extensions(&self) -> &'static [&'static str];

    /// Extract functions and their scope context.
    ///
    /// Unparseable fragments are skipped; an `Err` means the whole source could
    /// not be handed to the underlying parser at all.
    fn parse(&self, ctx: &mut ParserContext, source: &str) -> Result<SourceUnit>;

    /// Resolve the calls made by the functions of `unit`
    fn build_call_graph(&self, unit: &SourceUnit) -> CallLinks;

    fn grouping(&self) -> Grouping {
        Grouping::Connectivity
    }

    /// Directives the import resolver follows for this language
    fn import_rules(&self) -> &'static [ImportRule] {
        &[]
    }
}

/// Alias table and parent scopes of one module, contract or trait
#[derive(Debug, Clone, Default)]
pub struct ScopeInfo {
    pub aliases: AliasTable,
    pub parents: Vec<String>,
}

/// Structural result of parsing one source text
#[derive(Debug, Clone, Default)]
pub struct SourceUnit {
    pub functions: Vec<FunctionRecord>,
    pub scopes: HashMap<String, ScopeInfo>,
    /// Raw call targets per function id, filled by tree-based adapters
    pub call_sites: HashMap<String, Vec<String>>,
}

impl SourceUnit {
    pub fn with_functions(functions: Vec<FunctionRecord>) -> Self {
        Self {
            functions,
            ..Self::default()
        }
    }

    pub fn scope(&mut self, name: &str) -> &mut ScopeInfo {
        self.scopes.entry(name.to_string()).or_default()
    }

    pub fn aliases(&self, scope: &str) -> Option<&AliasTable> {
        self.scopes.get(scope).map(|info| &info.aliases)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Quoted path, the imported file is prepended to the importing one
    Path,
    /// `mod name;`, the module file replaces the declaration as `mod name { ... }`
    Module,
}

/// One import directive form; `pattern` captures the target as `target`
#[derive(Debug, Clone, Copy)]
pub struct ImportRule {
    pub kind: ImportKind,
    pub pattern: &'static str,
}

pub const C_INCLUDE: ImportRule = ImportRule {
    kind: ImportKind::Path,
    pattern: r#"(?m)^[ \t]*#include\s+"(?P<target>[^"]+)"[ \t]*;?"#,
};

pub const QUOTED_IMPORT: ImportRule = ImportRule {
    kind: ImportKind::Path,
    pattern: r#"(?m)^[ \t]*import\s+"(?P<target>[^"]+)"[ \t]*;"#,
};

pub const CIRCOM_INCLUDE: ImportRule = ImportRule {
    kind: ImportKind::Path,
    pattern: r#"(?m)^[ \t]*include\s+"(?P<target>[^"]+)"[ \t]*;"#,
};

pub const MOD_DECLARATION: ImportRule = ImportRule {
    kind: ImportKind::Module,
    pattern: r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?mod\s+(?P<target>[A-Za-z_]\w*)\s*;",
};

/// Extension -> adapter lookup table
#[derive(Default)]
pub struct LanguageRegistry {
    adapters: Vec<Arc<dyn LanguageAdapter>>,
    by_id: HashMap<&'static str, usize>,
    by_extension: HashMap<String, usize>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(FuncAdapter::new()?));
        registry.register(Arc::new(TactAdapter::new()?));
        registry.register(Arc::new(SolidityAdapter::new()?));
        registry.register(Arc::new(VyperAdapter::new()?));
        registry.register(Arc::new(MoveAdapter::new()?));
        registry.register(Arc::new(CairoAdapter::new()?));
        registry.register(Arc::new(RustAdapter::new()?));
        registry.register(Arc::new(PythonAdapter::new()?));
        registry.register(Arc::new(LispAdapter::new(LispDialect::Clarity)?));
        registry.register(Arc::new(LispAdapter::new(LispDialect::Pact)?));
        registry.register(Arc::new(ScillaAdapter::new()?));
        for spec in GENERIC_LANGUAGES {
            registry.register(Arc::new(GenericAdapter::new(spec)?));
        }
        Ok(registry)
    }

    /// Add an adapter; a later adapter claiming an id or extension replaces the earlier one
    pub fn register(&mut self, adapter: Arc<dyn LanguageAdapter>) {
        let slot = match self.by_id.get(adapter.language_id()) {
            Some(&slot) => {
                self.adapters[slot] = adapter.clone();
                slot
            }
            None => {
                self.adapters.push(adapter.clone());
                self.adapters.len() - 1
            }
        };
        self.by_id.insert(adapter.language_id(), slot);
        for extension in adapter.file_extensions() {
            self.by_extension.insert(extension.to_ascii_lowercase(), slot);
        }
    }

    pub fn get(&self, language_id: &str) -> Option<Arc<dyn LanguageAdapter>> {
        self.by_id.get(language_id).map(|&slot| self.adapters[slot].clone())
    }

    pub fn for_extension(&self, extension: &str) -> Option<Arc<dyn LanguageAdapter>> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.get(&extension).map(|&slot| self.adapters[slot].clone())
    }

    /// Adapters in registration order
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn LanguageAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_all_languages() {
        let registry = LanguageRegistry::with_builtin().unwrap();
        assert_eq!(registry.len(), 28);

        for (extension, id) in [
            ("fc", "func"),
            ("func", "func"),
            ("tact", "tact"),
            ("sol", "solidity"),
            ("vy", "vyper"),
            ("move", "move"),
            ("cairo", "cairo"),
            ("rs", "rust"),
            ("py", "python"),
            ("clar", "clarity"),
            ("pact", "pact"),
            ("scilla", "scilla"),
            ("tolk", "tolk"),
            ("huff", "huff"),
            ("sw", "sway"),
            ("nr", "noir"),
            ("mjs", "javascript"),
            ("RELL", "rell"),
        ] {
            let adapter = registry.for_extension(extension);
            assert_eq!(adapter.map(|a| a.language_id()), Some(id), "extension {}", extension);
        }
        assert!(registry.for_extension("txt").is_none());
    }

    #[test]
    fn test_ids_and_extensions_are_unique() {
        let registry = LanguageRegistry::with_builtin().unwrap();
        let mut extensions = std::collections::HashSet::new();
        for adapter in registry.adapters() {
            for extension in adapter.file_extensions() {
                assert!(extensions.insert(*extension), "duplicate extension {}", extension);
            }
        }
    }

    #[test]
    fn test_import_rules_compile() {
        let registry = LanguageRegistry::with_builtin().unwrap();
        for adapter in registry.adapters() {
            for rule in adapter.import_rules() {
                assert!(regex::Regex::new(rule.pattern).is_ok(), "{}", adapter.language_id());
            }
        }
    }
}
