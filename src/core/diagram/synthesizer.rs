use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::{default_palette, DiagramConfig};
use crate::core::call_graph::{ClusterMap, ContractGraph, FunctionRecord};
use super::escape::{escape_label, sanitize_id, tag_of};
use super::{DiagramDocument, INDENT};

/// Renders a `ContractGraph` and its cluster assignment as flowchart text
pub struct DiagramSynthesizer {
    direction: String,
    palette: Vec<String>,
    show_parameters: bool,
}

impl DiagramSynthesizer {
    pub fn new(config: &DiagramConfig) -> Self {
        let palette = if config.palette.is_empty() {
            default_palette()
        } else {
            config.palette.clone()
        };
        Self {
            direction: config.direction.clone(),
            palette,
            show_parameters: config.show_parameters,
        }
    }

    pub fn render(&self, graph: &ContractGraph, clusters: &ClusterMap) -> DiagramDocument {
        let mut document = DiagramDocument::new();
        document.push(format!("graph {}", self.direction));

        let ids = node_ids(&graph.nodes);

        let mut members: HashMap<&str, Vec<&FunctionRecord>> = HashMap::new();
        let mut unclustered = Vec::new();
        for node in &graph.nodes {
            match clusters.cluster_of(&node.id) {
                Some(key) => members.entry(key).or_default().push(node),
                None => unclustered.push(node),
            }
        }

        for key in clusters.keys() {
            let Some(nodes) = members.get(key.as_str()) else {
                continue;
            };
            document.push(format!("{}subgraph cluster_{}[\"{}\"]", INDENT, sanitize_id(key), escape_label(key)));
            for node in nodes {
                document.push(format!("{}{}{}", INDENT, INDENT, self.declaration(node, &ids[&node.id])));
            }
            document.push(format!("{}end", INDENT));
        }
        for node in unclustered {
            document.push(format!("{}{}", INDENT, self.declaration(node, &ids[&node.id])));
        }

        let mut seen = HashSet::new();
        for edge in &graph.edges {
            let (Some(from), Some(to)) = (ids.get(&edge.from), ids.get(&edge.to)) else {
                debug!("Not rendering dangling edge {} -> {}", edge.from, edge.to);
                continue;
            };
            if !seen.insert(edge.key()) {
                continue;
            }
            let arrow = if clusters.cluster_of(&edge.from) == clusters.cluster_of(&edge.to) {
                "-->"
            } else {
                "==>"
            };
            let line = if edge.label.is_empty() {
                format!("{}{} {} {}", INDENT, from, arrow, to)
            } else {
                format!("{}{} {}|{}| {}", INDENT, from, arrow, escape_label(&edge.label), to)
            };
            document.push(line);
        }

        for (index, key) in clusters.keys().iter().enumerate() {
            let Some(nodes) = members.get(key.as_str()) else {
                continue;
            };
            document.push(format!("{}classDef cluster{} {}", INDENT, index, self.class_style(index)));
            let targets: Vec<&str> = nodes.iter().map(|n| ids[&n.id].as_str()).collect();
            document.push(format!("{}class {} cluster{}", INDENT, targets.join(","), index));
        }

        document
    }

    fn declaration(&self, node: &FunctionRecord, id: &str) -> String {
        let mut label = node.display_label.clone();
        if self.show_parameters && node.classification != "external" {
            label = format!("{}({})", label, node.parameters.join(", "));
        }
        let label = escape_label(&label);
        match node.classification.as_str() {
            "entry" => format!("{}(\"{}\")", id, label),
            "external" => format!("{}[[\"{}\"]]", id, label),
            _ => format!("{}[\"{}\"]", id, label),
        }
    }

    fn class_style(&self, index: usize) -> String {
        let entry = &self.palette[index % self.palette.len()];
        let mut parts = entry.split(',').map(str::trim);
        let fill = parts.next().unwrap_or("#ECEFF1");
        let stroke = parts.next().unwrap_or("#546E7A");
        let color = parts.next().unwrap_or("#263238");
        format!("fill:{},stroke:{},color:{}", fill, stroke, color)
    }
}

/// Rendered id of every node: sanitized id plus classification tag, made
/// unique when two function ids sanitize to the same text
fn node_ids(nodes: &[FunctionRecord]) -> HashMap<String, String> {
    let mut ids = HashMap::new();
    let mut used = HashSet::new();
    for node in nodes {
        let base = sanitize_id(&node.id);
        let tag = tag_of(&node.classification);
        let mut candidate = format!("{}_{}", base, tag);
        let mut n = 2;
        while used.contains(&candidate) {
            candidate = format!("{}{}_{}", base, n, tag);
            n += 1;
        }
        used.insert(candidate.clone());
        ids.insert(node.id.clone(), candidate);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::call_graph::{cluster, CallEdge, Grouping};

    fn graph() -> ContractGraph {
        let mut graph = ContractGraph::new("func", Grouping::Connectivity);
        graph.nodes = vec![
            FunctionRecord::new("main", "main").with_classification("entry"),
            FunctionRecord::new("helper", "helper").with_parameters(vec!["int x".to_string()]),
            FunctionRecord::new("lonely", "lonely").with_classification("inline"),
        ];
        graph.edges = vec![
            CallEdge::new("main", "helper"),
            CallEdge::new("main", "helper"),
            CallEdge::new("main", "missing"),
        ];
        graph
    }

    fn render(graph: &ContractGraph) -> String {
        DiagramSynthesizer::new(&Config::default().diagram).render(graph, &cluster(graph)).to_text()
    }

    #[test]
    fn test_layout_and_shapes() {
        let text = render(&graph());
        let expected = [
            "graph TB",
            "    subgraph cluster_isolated[\"isolated\"]",
            "        lonely_inline[\"lonely()\"]",
            "    end",
            "    subgraph cluster_component_1[\"component_1\"]",
            "        main_entry(\"main()\")",
            "        helper_regular[\"helper(int x)\"]",
            "    end",
            "    main_entry --> helper_regular",
        ];
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(&lines[..expected.len()], &expected);
        assert!(text.contains("    classDef cluster0 fill:#E3F2FD,stroke:#1E88E5,color:#0D47A1"));
        assert!(text.contains("    class main_entry,helper_regular cluster1"));
    }

    #[test]
    fn test_duplicate_and_dangling_edges() {
        let text = render(&graph());
        assert_eq!(text.matches("main_entry --> helper_regular").count(), 1);
        assert!(!text.contains("missing"));
    }

    #[test]
    fn test_cross_cluster_edges_and_placeholders() {
        let mut graph = ContractGraph::new("move", Grouping::ByScope);
        graph.nodes = vec![
            FunctionRecord::new("vault::deposit", "deposit").with_scope("vault"),
            FunctionRecord::external("coin::value", "coin"),
        ];
        graph.edges = vec![CallEdge::labelled("vault::deposit", "coin::value", "x<T>")];
        let text = render(&graph);
        assert!(text.contains("coin__value_external[[\"value\"]]"));
        assert!(text.contains("vault__deposit_regular ==>|x#lt;T#gt;| coin__value_external"));
    }

    #[test]
    fn test_colliding_ids_stay_distinct() {
        let nodes = vec![FunctionRecord::new("a-b", "a-b"), FunctionRecord::new("a_b", "a_b")];
        let ids = node_ids(&nodes);
        assert_eq!(ids["a-b"], "a_b_regular");
        assert_eq!(ids["a_b"], "a_b2_regular");
    }
}
