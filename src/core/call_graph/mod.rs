// src/core/call_graph/mod.rs
//! Call graph model, name-based call resolution and clustering.
//!
//! Extractors produce `FunctionRecord`s; the resolver links them by scanning
//! bodies; the assembler folds everything into one `ContractGraph`; clustering
//! groups its nodes for the diagram.

mod call_graph;
mod call_resolver;
mod clustering;

pub use call_graph::{
    CallEdge, CallLinks, ContractGraph, FunctionRecord, GraphAssembler, GraphStats, Grouping,
};
pub use call_resolver::{
    edges_from, is_commented_or_quoted, CallMatcher, CallResolver, CallSite, CallSyntax, NameTable,
    PathCallFinder, WORD_CHARS,
};
pub use clustering::{cluster, ClusterMap, GLOBAL_CLUSTER, ISOLATED_CLUSTER};
