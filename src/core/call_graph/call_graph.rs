// src/core/call_graph/call_graph.rs
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A function (or handler, macro, transition...) extracted from source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Qualified identifier, e.g. `coin::transfer`; unique within a graph
    pub id: String,
    /// Name shown in the diagram
    pub display_label: String,
    /// Parameter list in declaration order
    pub parameters: Vec<String>,
    /// Raw body text (empty for placeholders)
    pub body_text: String,
    /// Language specific tag: regular, inline, impure, entry, public, get, ...
    pub classification: String,
    /// Module, contract or trait the function was declared in
    pub origin_scope: String,
}

impl FunctionRecord {
    pub fn new(id: impl Into<String>, display_label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_label: display_label.into(),
            parameters: Vec::new(),
            body_text: String::new(),
            classification: "regular".to_string(),
            origin_scope: String::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body_text = body.into();
        self
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = classification.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.origin_scope = scope.into();
        self
    }

    /// Placeholder for a call into a module that is not part of the parsed source
    pub fn external(id: impl Into<String>, scope: impl Into<String>) -> Self {
        let id = id.into();
        let label = id.rsplit("::").next().unwrap_or(&id).to_string();
        Self::new(id, label)
            .with_classification("external")
            .with_scope(scope)
    }

    /// The bare function name, without any scope qualification
    pub fn short_name(&self) -> &str {
        self.id.rsplit("::").next().unwrap_or(&self.id)
    }
}

/// Directed call from one function to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

impl CallEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: String::new(),
        }
    }

    pub fn labelled(from: impl Into<String>, to: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: label.into(),
        }
    }

    /// Key used by per-source seen-sets
    pub fn key(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

/// How the nodes of a graph are grouped into clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Grouping {
    /// Connected components over the call edges
    #[default]
    Connectivity,
    /// The originating module/contract name of each node
    ByScope,
}

/// Edges produced by an adapter, plus any placeholder nodes it synthesized
#[derive(Debug, Clone, Default)]
pub struct CallLinks {
    pub edges: Vec<CallEdge>,
    pub external: Vec<FunctionRecord>,
}

/// Complete call graph for one parse request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractGraph {
    pub language: String,
    pub nodes: Vec<FunctionRecord>,
    pub edges: Vec<CallEdge>,
    pub grouping: Grouping,
}

impl ContractGraph {
    pub fn new(language: impl Into<String>, grouping: Grouping) -> Self {
        Self {
            language: language.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            grouping,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&FunctionRecord> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|edge| edge.from == from && edge.to == to)
    }

    /// Get statistics about the call graph
    pub fn get_statistics(&self) -> GraphStats {
        let mut out_degree: HashMap<&str, usize> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for edge in &self.edges {
            *out_degree.entry(edge.from.as_str()).or_default() += 1;
            *in_degree.entry(edge.to.as_str()).or_default() += 1;
        }

        GraphStats {
            total_functions: self.nodes.len(),
            total_calls: self.edges.len(),
            external_functions: self.nodes.iter().filter(|n| n.classification == "external").count(),
            max_in_degree: in_degree.values().copied().max().unwrap_or(0),
            max_out_degree: out_degree.values().copied().max().unwrap_or(0),
        }
    }

    /// Concatenate another graph into this one, keeping the id uniqueness rule
    pub fn merge(&mut self, other: ContractGraph) {
        if self.nodes.is_empty() && self.edges.is_empty() {
            self.grouping = other.grouping;
        } else if self.grouping != other.grouping {
            // Mixed languages: scope names are not comparable, fall back to connectivity
            self.grouping = Grouping::Connectivity;
        }
        let mut assembler = GraphAssembler::from_graph(std::mem::take(self));
        assembler.add_functions(other.nodes);
        assembler.add_edges(other.edges);
        *self = assembler.finish();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_functions: usize,
    pub total_calls: usize,
    pub external_functions: usize,
    pub max_in_degree: usize,
    pub max_out_degree: usize,
}

/// Merges extractor output into a single `ContractGraph`.
///
/// Node ids are unique: a later record with an existing id replaces the earlier
/// one in place. Edges are appended as given.
pub struct GraphAssembler {
    graph: ContractGraph,
    index: HashMap<String, usize>,
}

impl GraphAssembler {
    pub fn new(language: impl Into<String>, grouping: Grouping) -> Self {
        Self::from_graph(ContractGraph::new(language, grouping))
    }

    fn from_graph(graph: ContractGraph) -> Self {
        let index = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        Self { graph, index }
    }

    pub fn add_function(&mut self, record: FunctionRecord) {
        match self.index.get(&record.id) {
            Some(&slot) => {
                debug!("Duplicate function id {}, keeping the later definition", record.id);
                self.graph.nodes[slot] = record;
            }
            None => {
                self.index.insert(record.id.clone(), self.graph.nodes.len());
                self.graph.nodes.push(record);
            }
        }
    }

    pub fn add_functions(&mut self, records: impl IntoIterator<Item = FunctionRecord>) {
        for record in records {
            self.add_function(record);
        }
    }

    /// Placeholders never overwrite a real definition
    pub fn add_external(&mut self, record: FunctionRecord) {
        if !self.index.contains_key(&record.id) {
            self.add_function(record);
        }
    }

    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = CallEdge>) {
        self.graph.edges.extend(edges);
    }

    pub fn add_links(&mut self, links: CallLinks) {
        for record in links.external {
            self.add_external(record);
        }
        self.add_edges(links.edges);
    }

    pub fn finish(self) -> ContractGraph {
        self.graph
    }
}
