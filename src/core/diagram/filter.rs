use std::collections::{HashMap, HashSet};
use regex::Regex;
use tracing::debug;

use crate::error::Result;
use super::escape::{canonical_label, decode_entities, sanitize_id, tag_suffix, unescape_label};
use super::INDENT;

/// Re-filters an already rendered diagram by editing its text.
///
/// The document is parsed back into nodes, clusters, edges and style lines,
/// filtered, and re-emitted in canonical form, so applying the same filter
/// twice gives the same text.
pub struct DiagramFilter {
    default_direction: String,
    directive: Regex,
    subgraph: Regex,
    arrow: Regex,
}

/// `[`..`]`, `("`..`")` and friends around a node label
#[derive(Debug, Clone, PartialEq, Eq)]
struct Shape {
    open: String,
    close: String,
    label: String,
}

#[derive(Debug, Clone)]
struct Node {
    id: String,
    shape: Option<Shape>,
    cluster: Option<usize>,
}

#[derive(Debug, Clone)]
struct Cluster {
    id: String,
    title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Edge {
    from: String,
    to: String,
    arrow: String,
    label: Option<String>,
}

/// Everything recovered from one document
#[derive(Debug, Default)]
struct Parsed {
    directive: Option<String>,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    clusters: Vec<Cluster>,
    edges: Vec<Edge>,
    class_defs: Vec<String>,
    class_assignments: Vec<(Vec<String>, String)>,
    styles: Vec<(String, String)>,
}

impl Parsed {
    /// Record a node mention; the first shape and the first cluster win
    fn mention(&mut self, id: &str, shape: Option<Shape>, cluster: Option<usize>) {
        match self.index.get(id) {
            Some(&slot) => {
                let node = &mut self.nodes[slot];
                if node.shape.is_none() {
                    node.shape = shape;
                }
            }
            None => {
                self.index.insert(id.to_string(), self.nodes.len());
                self.nodes.push(Node {
                    id: id.to_string(),
                    shape,
                    cluster,
                });
            }
        }
    }
}

/// Node shape delimiters, longest openers first
const SHAPES: &[(&str, &str)] = &[
    ("[[", "]]"),
    ("[(", ")]"),
    ("((", "))"),
    ("([", "])"),
    ("{{", "}}"),
    ("[/", "/]"),
    ("[\\", "\\]"),
    ("[", "]"),
    ("(", ")"),
    ("{", "}"),
    (">", "]"),
];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.' || c == ':'
}

/// Split on newlines and on `;` outside quotes, edge labels and brackets
fn statements(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        let mut quoted = false;
        let mut piped = false;
        let mut depth = 0i32;
        for c in line.chars() {
            match c {
                '"' if !piped => quoted = !quoted,
                '|' if !quoted => piped = !piped,
                '[' | '(' | '{' if !quoted && !piped => depth += 1,
                ']' | ')' | '}' if !quoted && !piped => depth -= 1,
                ';' if !quoted && !piped && depth <= 0 => {
                    out.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        out.push(current);
    }
    out.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Leading node reference: id plus optional shape, and the unparsed rest
fn node_ref(text: &str) -> Option<(String, Option<Shape>, &str)> {
    let id_end = text.find(|c: char| !is_id_char(c)).unwrap_or(text.len());
    if id_end == 0 {
        return None;
    }
    let id = text[..id_end].to_string();
    let rest = &text[id_end..];

    let Some((open, close)) = SHAPES.iter().find(|(open, _)| rest.starts_with(open)) else {
        return Some((id, None, rest));
    };
    let inner = &rest[open.len()..];
    let (label, after) = if let Some(quoted) = inner.strip_prefix('"') {
        let end = quoted.find('"')?;
        let after = quoted[end + 1..].strip_prefix(close)?;
        (quoted[..end].to_string(), after)
    } else {
        let end = inner.find(close)?;
        (inner[..end].to_string(), &inner[end + close.len()..])
    };

    let shape = Shape {
        open: open.to_string(),
        close: close.to_string(),
        label,
    };
    Some((id, Some(shape), after))
}

impl DiagramFilter {
    pub fn new(default_direction: &str) -> Result<Self> {
        Ok(Self {
            default_direction: default_direction.to_string(),
            directive: Regex::new(r"^(?P<keyword>graph|flowchart)\b\s*(?P<direction>TB|TD|BT|LR|RL)?\s*$")?,
            subgraph: Regex::new(r#"^subgraph\s+(?P<id>[^\s\["]+)?\s*(?:\[\s*"?(?P<title>[^"\]]*)"?\s*\]|"(?P<bare>[^"]*)")?\s*$"#)?,
            arrow: Regex::new(r"^\s*(?P<arrow><?(?:-{2,}|={2,}|-\.+-)[>ox]?)(?:\|(?P<label>[^|]*)\|)?\s*")?,
        })
    }

    /// Filter `document` and normalise its direction directive
    pub fn apply(&self, document: &str, allowed: &[String], name: &str) -> String {
        self.validate(&self.filter(document, allowed, name))
    }

    /// Type and name filtering by structural surgery on the text.
    ///
    /// An empty `allowed` list means no type restriction. Name matches are
    /// searched among the type survivors, by label first and by id when no
    /// label matches.
    pub fn filter(&self, document: &str, allowed: &[String], name: &str) -> String {
        let parsed = self.parse(&decode_entities(document));

        let allowed: HashSet<String> = allowed.iter().map(|t| t.trim().to_ascii_lowercase()).filter(|t| !t.is_empty()).collect();
        let type_survivors: HashSet<&str> = parsed
            .nodes
            .iter()
            .filter(|node| match tag_suffix(&node.id) {
                Some(tag) if !allowed.is_empty() => allowed.contains(&tag.to_ascii_lowercase()),
                _ => true,
            })
            .map(|node| node.id.as_str())
            .collect();

        let needle = name.trim().to_lowercase();
        let visible: HashSet<&str> = if needle.is_empty() {
            type_survivors.clone()
        } else {
            let (nodes, survivors) = (&parsed.nodes, &type_survivors);
            let candidates = move || nodes.iter().filter(move |n| survivors.contains(n.id.as_str()));
            let mut direct: HashSet<&str> = candidates()
                .filter(|n| {
                    n.shape
                        .as_ref()
                        .is_some_and(|s| unescape_label(&s.label).to_lowercase().contains(&needle))
                })
                .map(|n| n.id.as_str())
                .collect();
            if direct.is_empty() {
                direct = candidates()
                    .filter(|n| n.id.to_lowercase().contains(&needle))
                    .map(|n| n.id.as_str())
                    .collect();
            }

            let mut visible = direct.clone();
            for edge in &parsed.edges {
                if direct.contains(edge.from.as_str()) {
                    visible.insert(edge.to.as_str());
                }
                if direct.contains(edge.to.as_str()) {
                    visible.insert(edge.from.as_str());
                }
            }
            visible.retain(|id| type_survivors.contains(id));
            visible
        };

        debug!("Diagram filter keeps {} of {} nodes", visible.len(), parsed.nodes.len());
        self.emit(&parsed, &visible)
    }

    /// Keep the first direction directive, or add the default one when there is none
    pub fn validate(&self, text: &str) -> String {
        let mut lines = Vec::new();
        let mut directive = None;
        for line in text.lines() {
            if self.directive.is_match(line.trim()) {
                if directive.is_none() {
                    directive = Some(lines.len());
                    lines.push(line.trim().to_string());
                }
                continue;
            }
            lines.push(line.to_string());
        }

        match directive {
            Some(0) => {}
            Some(position) => {
                let line = lines.remove(position);
                lines.insert(0, line);
            }
            None => lines.insert(0, format!("graph {}", self.default_direction)),
        }
        lines.join("\n")
    }

    fn parse(&self, text: &str) -> Parsed {
        let mut parsed = Parsed::default();
        let mut open_clusters: Vec<usize> = Vec::new();

        for statement in statements(text) {
            if statement.starts_with("%%") {
                continue;
            }

            if let Some(caps) = self.directive.captures(&statement) {
                if parsed.directive.is_none() {
                    let keyword = caps.name("keyword").map(|m| m.as_str()).unwrap_or("graph");
                    let direction = caps.name("direction").map(|m| m.as_str()).unwrap_or(&self.default_direction);
                    parsed.directive = Some(format!("{} {}", keyword, direction));
                } else {
                    debug!("Dropping duplicate directive '{}'", statement);
                }
                continue;
            }

            if statement == "end" {
                if open_clusters.pop().is_none() {
                    debug!("Dropping unmatched 'end'");
                }
                continue;
            }

            let mut words = statement.splitn(2, char::is_whitespace);
            let keyword = words.next().unwrap_or("");
            let rest = words.next().unwrap_or("").trim();
            match keyword {
                "subgraph" => {
                    let Some(caps) = self.subgraph.captures(&statement) else {
                        debug!("Dropping malformed subgraph line '{}'", statement);
                        continue;
                    };
                    let title = caps.name("title").or(caps.name("bare")).map(|m| m.as_str().to_string());
                    let id = match (caps.name("id"), &title) {
                        (Some(id), _) => id.as_str().to_string(),
                        (None, Some(title)) => format!("cluster_{}", sanitize_id(title)),
                        (None, None) => format!("cluster_{}", parsed.clusters.len()),
                    };
                    open_clusters.push(parsed.clusters.len());
                    parsed.clusters.push(Cluster { id, title });
                }
                "classDef" => parsed.class_defs.push(format!("classDef {}", rest)),
                "class" => {
                    let mut parts = rest.split_whitespace();
                    let (Some(ids), Some(class)) = (parts.next(), parts.next()) else {
                        continue;
                    };
                    let ids = ids.split(',').map(|id| id.trim().to_string()).filter(|id| !id.is_empty()).collect();
                    parsed.class_assignments.push((ids, class.to_string()));
                }
                "style" => {
                    if let Some((id, style)) = rest.split_once(char::is_whitespace) {
                        parsed.styles.push((id.to_string(), style.trim().to_string()));
                    }
                }
                "linkStyle" | "click" | "direction" => {}
                _ => self.parse_chain(&statement, open_clusters.last().copied(), &mut parsed),
            }
        }

        // Blocks still open at the end of input close there
        if !open_clusters.is_empty() {
            debug!("Closing {} unterminated subgraph block(s)", open_clusters.len());
        }
        parsed
    }

    /// A node declaration or an edge chain `a --> b ==> c`
    fn parse_chain(&self, statement: &str, cluster: Option<usize>, parsed: &mut Parsed) {
        let Some((first, shape, mut rest)) = node_ref(statement) else {
            debug!("Dropping unrecognised line '{}'", statement);
            return;
        };

        let mut refs = vec![(first, shape)];
        let mut arrows = Vec::new();
        loop {
            let trimmed = rest.trim_start();
            if trimmed.is_empty() {
                break;
            }
            let Some(caps) = self.arrow.captures(trimmed) else {
                debug!("Dropping line with unrecognised edge syntax '{}'", statement);
                return;
            };
            let (Some(whole), Some(arrow)) = (caps.get(0), caps.name("arrow")) else {
                return;
            };
            let label = caps.name("label").map(|m| m.as_str().trim().to_string()).filter(|l| !l.is_empty());
            let Some((next, shape, after)) = node_ref(&trimmed[whole.end()..]) else {
                debug!("Dropping edge without a target '{}'", statement);
                return;
            };
            arrows.push((arrow.as_str().to_string(), label));
            refs.push((next, shape));
            rest = after;
        }

        for (id, shape) in &refs {
            parsed.mention(id, shape.clone(), cluster);
        }
        for (i, (arrow, label)) in arrows.into_iter().enumerate() {
            let edge = Edge {
                from: refs[i].0.clone(),
                to: refs[i + 1].0.clone(),
                arrow,
                label,
            };
            if !parsed.edges.contains(&edge) {
                parsed.edges.push(edge);
            }
        }
    }

    fn emit(&self, parsed: &Parsed, visible: &HashSet<&str>) -> String {
        let mut lines = Vec::new();
        lines.push(
            parsed
                .directive
                .clone()
                .unwrap_or_else(|| format!("graph {}", self.default_direction)),
        );

        let declaration = |node: &Node| match &node.shape {
            Some(shape) => format!("{}{}\"{}\"{}", node.id, shape.open, canonical_label(&shape.label), shape.close),
            None => node.id.clone(),
        };
        let surviving = |node: &&Node| visible.contains(node.id.as_str());

        for (index, cluster) in parsed.clusters.iter().enumerate() {
            let members: Vec<&Node> = parsed.nodes.iter().filter(|n| n.cluster == Some(index)).filter(surviving).collect();
            if members.is_empty() {
                continue;
            }
            match &cluster.title {
                Some(title) => lines.push(format!("{}subgraph {}[\"{}\"]", INDENT, cluster.id, canonical_label(title))),
                None => lines.push(format!("{}subgraph {}", INDENT, cluster.id)),
            }
            for node in members {
                lines.push(format!("{}{}{}", INDENT, INDENT, declaration(node)));
            }
            lines.push(format!("{}end", INDENT));
        }
        for node in parsed.nodes.iter().filter(|n| n.cluster.is_none()).filter(surviving) {
            lines.push(format!("{}{}", INDENT, declaration(node)));
        }

        for edge in &parsed.edges {
            if !visible.contains(edge.from.as_str()) || !visible.contains(edge.to.as_str()) {
                continue;
            }
            match &edge.label {
                Some(label) => lines.push(format!("{}{} {}|{}| {}", INDENT, edge.from, edge.arrow, canonical_label(label), edge.to)),
                None => lines.push(format!("{}{} {} {}", INDENT, edge.from, edge.arrow, edge.to)),
            }
        }

        for class_def in &parsed.class_defs {
            lines.push(format!("{}{}", INDENT, class_def));
        }
        for (ids, class) in &parsed.class_assignments {
            let kept: Vec<&str> = ids.iter().map(String::as_str).filter(|id| visible.contains(id)).collect();
            if !kept.is_empty() {
                lines.push(format!("{}class {} {}", INDENT, kept.join(","), class));
            }
        }
        for (id, style) in &parsed.styles {
            if visible.contains(id.as_str()) {
                lines.push(format!("{}style {} {}", INDENT, id, style));
            }
        }

        lines.join("\n")
    }
}
