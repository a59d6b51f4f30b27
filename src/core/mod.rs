// src/core/mod.rs
mod engine;
mod imports;
mod parser;

// Call graph model, resolution and clustering
pub mod call_graph;

// Diagram synthesis and filtering
pub mod diagram;

// Language adapters
pub mod languages;

pub use call_graph::{cluster, CallEdge, ClusterMap, ContractGraph, FunctionRecord, Grouping};
pub use diagram::{DiagramDocument, DiagramFilter, DiagramSynthesizer};
pub use imports::{ImportResolver, ResolvedSource};
pub use languages::{LanguageAdapter, LanguageRegistry, ParserContext};
pub use parser::CodeParser;

// Export the main engine
pub use engine::Engine;
