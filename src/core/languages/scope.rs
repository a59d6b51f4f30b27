//! Qualification of call targets for module-oriented languages.

use std::collections::HashMap;

use super::lexer::{match_delimiter, split_params};

/// Alias -> qualified path
pub type AliasTable = HashMap<String, String>;

/// Expand one `use` tree into `(alias, path)` pairs.
///
/// Handles `a::b`, `a::b as c`, `a::{Self, X as Y, c::{d}}`. Glob imports are
/// ignored since they name nothing.
pub fn expand_use_tree(tree: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut pending = vec![tree.trim().trim_end_matches(';').trim().to_string()];

    while let Some(item) = pending.pop() {
        if let Some(open) = item.find('{') {
            let prefix = item[..open].trim().trim_end_matches("::").trim();
            let Some(close) = match_delimiter(&item, open, b'{', b'}', &[]) else {
                continue;
            };
            for member in split_params(&item[open + 1..close]).into_iter().rev() {
                if member == "self" || member == "Self" {
                    pending.push(prefix.to_string());
                } else if let Some(alias) = member
                    .strip_prefix("Self as ")
                    .or_else(|| member.strip_prefix("self as "))
                {
                    pending.push(format!("{} as {}", prefix, alias.trim()));
                } else if prefix.is_empty() {
                    pending.push(member);
                } else {
                    pending.push(format!("{}::{}", prefix, member));
                }
            }
            continue;
        }

        let (path, alias) = match item.split_once(" as ") {
            Some((path, alias)) => (path.trim(), alias.trim()),
            None => (item.trim(), last_segment(item.trim())),
        };
        if path.is_empty() || path.ends_with('*') || alias.is_empty() || alias == "_" {
            continue;
        }
        pairs.push((alias.to_string(), path.to_string()));
    }

    pairs
}

pub fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

pub fn first_segment(path: &str) -> &str {
    path.split("::").next().unwrap_or(path)
}

/// Parent of a `::`-separated path, empty for a single segment
pub fn parent_path(path: &str) -> &str {
    path.rfind("::").map(|i| &path[..i]).unwrap_or("")
}

pub fn join_path(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope, name)
    }
}

/// Remove generic arguments: `coin::value<T>` -> `coin::value`,
/// `Vec::<u8>::new` -> `Vec::new`
pub fn strip_generics(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    let mut depth = 0usize;
    for c in target.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    while let Some(i) = out.find("::::") {
        out.replace_range(i..i + 4, "::");
    }
    out.trim_end_matches("::").trim().to_string()
}

/// Resolve a call target written inside `scope` to a qualified id.
///
/// Already-qualified targets have their first segment looked up in the alias
/// table (`Self`, `self`, `crate` and `super` are understood); bare names go
/// through the alias table first and are otherwise qualified with `scope`.
pub fn qualify(target: &str, scope: &str, aliases: &AliasTable) -> String {
    let target = strip_generics(target);

    let Some((head, rest)) = target.split_once("::") else {
        return match aliases.get(&target) {
            Some(path) => path.clone(),
            None => join_path(scope, &target),
        };
    };

    match head {
        "Self" | "self" => join_path(scope, rest),
        "crate" => rest.to_string(),
        "super" => join_path(parent_path(scope), rest),
        _ => match aliases.get(head) {
            Some(path) => format!("{}::{}", path, rest),
            None => target.clone(),
        },
    }
}

/// Make a `use` path written inside `scope` absolute when it starts with
/// `self`, `super` or `crate`
pub fn absolute_use_path(path: &str, scope: &str) -> String {
    match first_segment(path) {
        "self" | "super" | "crate" if path.contains("::") => qualify(path, scope, &AliasTable::new()),
        _ => path.to_string(),
    }
}

/// `snake_case` identifiers name modules; `CamelCase` ones name types
pub fn is_snake_case(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
