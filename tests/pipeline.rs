use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use contractscope::core::diagram::{sanitize_id, tag_of};
use contractscope::core::ContractGraph;
use contractscope::{Config, Engine};

fn engine() -> Engine {
    Engine::new(Config::default()).unwrap()
}

fn rendered_id(graph: &ContractGraph, id: &str) -> String {
    let node = graph.node(id).unwrap();
    format!("{}_{}", sanitize_id(&node.id), tag_of(&node.classification))
}

fn declarations(text: &str, id: &str) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(&format!("{}[", id)) || line.starts_with(&format!("{}(", id)))
        .count()
}

#[test]
fn test_baseline_scenario() {
    let mut engine = engine();
    let graph = engine
        .parse_source("int foo() { return 1; } int main() { foo(); }", "func")
        .unwrap();

    let mut ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["foo", "main"]);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!((graph.edges[0].from.as_str(), graph.edges[0].to.as_str()), ("main", "foo"));
}

#[test]
fn test_functions_without_calls_have_no_edges() {
    let mut engine = engine();
    for n in [1, 4, 9] {
        let source: String = (0..n).map(|i| format!("int f{}(int x) {{ return x + {}; }}\n", i, i)).collect();
        let graph = engine.parse_source(&source, "func").unwrap();
        assert_eq!(graph.nodes.len(), n);
        assert!(graph.edges.is_empty());
    }
}

#[test]
fn test_repeated_call_yields_one_edge() {
    let mut engine = engine();
    let source = "int b() { return 1; }\nint a() {\n  b();\n  b();\n  ;; b();\n  return b();\n}\n";
    let graph = engine.parse_source(source, "func").unwrap();
    assert_eq!(graph.edges.iter().filter(|e| e.from == "a" && e.to == "b").count(), 1);
}

#[test]
fn test_unrestricted_filter_keeps_every_node_and_edge() {
    let mut engine = engine();
    let source = r#"
contract Vault {
    address owner;
    modifier onlyOwner() { require(msg.sender == owner); _; }
    function deposit() public onlyOwner { credit(); }
    function credit() internal { log(); }
    function log() internal {}
    function audit() external view {}
}
"#;
    let graph = engine.parse_source(source, "solidity").unwrap();
    assert!(!graph.edges.is_empty());

    let text = engine.render(&graph).to_text();
    let filtered = engine.apply_filters(&text, &[], "");

    for node in &graph.nodes {
        assert_eq!(declarations(&filtered, &rendered_id(&graph, &node.id)), 1, "{}", node.id);
    }
    let mut labelled = 0;
    for edge in &graph.edges {
        let (from, to) = (rendered_id(&graph, &edge.from), rendered_id(&graph, &edge.to));
        let count = filtered
            .lines()
            .map(str::trim)
            .filter(|line| {
                let Some(rest) = line.strip_prefix(&format!("{} ", from)) else {
                    return false;
                };
                let Some(rest) = rest.strip_prefix("-->").or_else(|| rest.strip_prefix("==>")) else {
                    return false;
                };
                let rest = match rest.strip_prefix('|') {
                    Some(labelled) => labelled.split_once('|').map_or("", |(_, after)| after),
                    None => rest,
                };
                rest.trim() == to
            })
            .count();
        assert_eq!(count, 1, "{} -> {}", from, to);
        if !edge.label.is_empty() {
            labelled += 1;
        }
    }
    assert!(labelled > 0);
}

#[test]
fn test_labelled_edge_with_escaped_text_round_trips() {
    use contractscope::core::{CallEdge, FunctionRecord, Grouping};

    let engine = engine();
    let mut graph = ContractGraph::new("func", Grouping::Connectivity);
    graph.nodes = vec![FunctionRecord::new("a", "a"), FunctionRecord::new("b", "b")];
    graph.edges = vec![CallEdge::labelled("a", "b", "x<T> & [y-1]")];

    let text = engine.render(&graph).to_text();
    let edge_line = "    a_regular -->|x#lt;T#gt; #38; #91;y#45;1#93;| b_regular";
    assert!(predicate::str::contains(edge_line).eval(&text));

    let filtered = engine.apply_filters(&text, &[], "");
    assert!(predicate::str::contains(edge_line).eval(&filtered));
}

#[test]
fn test_filter_is_idempotent() {
    let mut engine = engine();
    let source = "int helper() { return 1; }\n() save() impure { helper(); }\nint balance() method_id { return helper(); }\nint lone() { return 0; }\n";
    let graph = engine.parse_source(source, "func").unwrap();
    let text = engine.render(&graph).to_text();

    let cases: [(Vec<String>, &str); 4] = [
        (vec![], ""),
        (vec!["regular".to_string()], ""),
        (vec!["impure".to_string(), "regular".to_string()], "save"),
        (vec!["methodid".to_string()], "help"),
    ];
    for (types, name) in cases {
        let once = engine.apply_filters(&text, &types, name);
        let twice = engine.apply_filters(&once, &types, name);
        assert_eq!(once, twice, "types {:?} name {:?}", types, name);
    }
}

#[test]
fn test_filter_scenarios() {
    let engine = engine();
    let doc = "graph TB; A_impure[\"A\"]; B_regular[\"B\"]; A_impure --> B_regular";

    let regular_only = engine.apply_filters(doc, &["regular".to_string()], "");
    assert!(predicate::str::contains("B_regular").eval(&regular_only));
    assert!(predicate::str::contains("A_impure").not().eval(&regular_only));

    let by_name = engine.apply_filters(doc, &["impure".to_string(), "regular".to_string()], "A");
    assert!(predicate::str::contains("A_impure").and(predicate::str::contains("B_regular")).eval(&by_name));
}

#[tokio::test]
async fn test_cyclic_includes_terminate() {
    let temp = TempDir::new().unwrap();
    temp.child("a.fc").write_str("#include \"b.fc\";\nint a() { return b(); }\n").unwrap();
    temp.child("b.fc").write_str("#include \"a.fc\";\nint b() { return a(); }\n").unwrap();

    let mut config = Config::default();
    config.project.workspace_root = Some(temp.path().to_path_buf());
    let mut engine = Engine::new(config).unwrap();

    let path = temp.child("a.fc");
    let source = std::fs::read_to_string(path.path()).unwrap();
    let graph = engine.parse_with_imports(&source, path.path(), "func").await.unwrap();

    assert!(!graph.is_empty());
    assert!(graph.contains_edge("a", "b"));
    assert!(graph.contains_edge("b", "a"));

    let resolved = engine.resolve_imports(&source, path.path(), "func").await.unwrap();
    assert_eq!(resolved.files.len(), 2);
    temp.close().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_imports_stay_inside_workspace() {
    let outside = TempDir::new().unwrap();
    outside.child("secret.fc").write_str("int secret() { return 42; }\n").unwrap();
    outside.child("plain.fc").write_str("int plain() { return 7; }\n").unwrap();

    let workspace = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.child("secret.fc").path(), workspace.child("link.fc").path()).unwrap();
    let absolute_escape = format!("{}", outside.child("plain.fc").path().display());
    workspace
        .child("main.fc")
        .write_str(&format!(
            "#include \"link.fc\";\n#include \"{}\";\nint main() {{ return 0; }}\n",
            absolute_escape
        ))
        .unwrap();

    let mut config = Config::default();
    config.project.workspace_root = Some(workspace.path().to_path_buf());
    let engine = Engine::new(config).unwrap();

    let main = workspace.child("main.fc");
    let source = std::fs::read_to_string(main.path()).unwrap();
    let resolved = engine.resolve_imports(&source, main.path(), "func").await.unwrap();

    let outside_root = std::fs::canonicalize(outside.path()).unwrap();
    assert!(resolved.files.iter().all(|f| !f.starts_with(&outside_root)));
    assert!(predicate::str::contains("secret").not().eval(&resolved.code));
    assert!(predicate::str::contains("plain()").not().eval(&resolved.code));
    assert!(predicate::str::contains("int main()").eval(&resolved.code));
}

#[tokio::test]
async fn test_directory_diagram_written_to_disk() {
    let temp = TempDir::new().unwrap();
    temp.child("contracts").create_dir_all().unwrap();
    temp.child("contracts/wallet.fc")
        .write_str("int fee() { return 1; }\n() recv_internal() impure { fee(); }\n")
        .unwrap();

    let mut engine = engine();
    let graph = engine.parse_directory(temp.path()).await.unwrap();
    let text = engine.render(&graph).to_text();

    let out = temp.child("wallet.mmd");
    out.write_str(&text).unwrap();
    out.assert(predicate::str::starts_with("graph TB"));
    out.assert(predicate::str::contains("recv_internal_impure --> fee_regular"));
}
