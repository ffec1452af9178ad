use std::collections::{BTreeSet, HashMap};

use tree_sitter::{Node, Tree};

use crate::ast::{node_text, preorder};
use crate::model::MutationType;

/// Marker that introduces an ignore directive inside a comment.
const DIRECTIVE: &str = "gooze:ignore";

/// Set of mutation type names disabled by a directive.
#[derive(Debug, Default, Clone)]
pub struct IgnoreSet {
    all: bool,
    names: BTreeSet<String>,
}

impl IgnoreSet {
    pub fn ignores(&self, mutation_type: &MutationType) -> bool {
        self.all || self.names.contains(&mutation_type.name)
    }

    fn merge(&mut self, other: IgnoreSet) {
        self.all |= other.all;
        self.names.extend(other.names);
    }

    fn is_empty(&self) -> bool {
        !self.all && self.names.is_empty()
    }
}

/// Precomputed ignore directives for one file.
///
/// File-level directives win over everything narrower; there is no
/// un-ignore. Function entries are keyed by the declaration's start byte,
/// line entries by 1-based line number.
#[derive(Debug, Default)]
pub struct IgnoreIndex {
    file: IgnoreSet,
    functions: HashMap<usize, IgnoreSet>,
    lines: HashMap<usize, IgnoreSet>,
}

impl IgnoreIndex {
    pub fn build(tree: &Tree, source: &[u8]) -> IgnoreIndex {
        let root = tree.root_node();
        let package_line = package_clause_line(root);

        let mut index = IgnoreIndex::default();
        let mut directives: Vec<(Node, bool, IgnoreSet)> = Vec::new();

        preorder(root, &mut |node| {
            if node.kind() == "comment" {
                if let Some((file_level, set)) = parse_directive(node_text(node, source)) {
                    directives.push((node, file_level, set));
                }
            }
            true
        });

        let function_starts = function_start_lines(root);

        for (comment, file_level, set) in directives {
            let start_line = comment.start_position().row + 1;
            let end_line = comment.end_position().row + 1;

            if file_level {
                // Only honoured in the file header, next to the package clause.
                if start_line <= package_line + 1 {
                    index.file.merge(set);
                }
                continue;
            }

            if alone_on_line(comment, source) {
                // Leading comment: applies to the next line. If that line
                // starts a function declaration, the whole function is
                // covered.
                if let Some(func_start) = function_starts.get(&(end_line + 1)) {
                    index
                        .functions
                        .entry(*func_start)
                        .or_default()
                        .merge(set.clone());
                }
                index.lines.entry(end_line + 1).or_default().merge(set);
            } else {
                // Trailing comment: applies to its own line.
                index.lines.entry(start_line).or_default().merge(set);
            }
        }

        index
    }

    pub fn file_ignores(&self, mutation_type: &MutationType) -> bool {
        self.file.ignores(mutation_type)
    }

    pub fn function_ignores(&self, func_start_byte: usize, mutation_type: &MutationType) -> bool {
        self.functions
            .get(&func_start_byte)
            .is_some_and(|set| set.ignores(mutation_type))
    }

    pub fn line_ignores(&self, line: usize, mutation_type: &MutationType) -> bool {
        self.lines
            .get(&line)
            .is_some_and(|set| set.ignores(mutation_type))
    }
}

/// Parse the body of a comment into a directive, if it is one.
///
/// Forms: `gooze:ignore file <types|all>` and `gooze:ignore <types|all>`.
/// Type lists are comma or whitespace separated.
fn parse_directive(comment: &str) -> Option<(bool, IgnoreSet)> {
    let body = comment
        .trim()
        .trim_start_matches("//")
        .trim_start_matches("/*")
        .trim_end_matches("*/")
        .trim();

    let rest = body.strip_prefix(DIRECTIVE)?.trim_start();

    let (file_level, list) = match rest.strip_prefix("file") {
        Some(after) if after.is_empty() || after.starts_with(char::is_whitespace) => {
            (true, after.trim_start())
        }
        _ => (false, rest),
    };

    let mut set = IgnoreSet::default();
    for item in list.split(|c: char| c == ',' || c.is_whitespace()) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if item == "all" {
            set.all = true;
        } else {
            set.names.insert(item.to_string());
        }
    }

    if set.is_empty() {
        return None;
    }

    Some((file_level, set))
}

fn package_clause_line(root: Node) -> usize {
    for i in 0..root.child_count() {
        if let Some(child) = root.child(i) {
            if child.kind() == "package_clause" {
                return child.start_position().row + 1;
            }
        }
    }

    1
}

/// Map of start line -> start byte for every function/method declaration.
fn function_start_lines(root: Node) -> HashMap<usize, usize> {
    let mut starts = HashMap::new();
    preorder(root, &mut |node| {
        if node.kind() == "function_declaration" || node.kind() == "method_declaration" {
            starts.insert(node.start_position().row + 1, node.start_byte());
        }
        true
    });

    starts
}

/// True when nothing but whitespace precedes the comment on its line.
fn alone_on_line(comment: Node, source: &[u8]) -> bool {
    let start = comment.start_byte();
    let line_start = source[..start]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);

    source[line_start..start]
        .iter()
        .all(|b| b.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_directive() {
        let (file_level, set) = parse_directive("// gooze:ignore file arithmetic,boolean").unwrap();
        assert!(file_level);
        assert!(set.ignores(&MutationType::arithmetic()));
        assert!(set.ignores(&MutationType::boolean()));
        assert!(!set.ignores(&MutationType::numbers()));
    }

    #[test]
    fn parses_all_directive() {
        let (file_level, set) = parse_directive("// gooze:ignore all").unwrap();
        assert!(!file_level);
        assert!(set.ignores(&MutationType::branch()));
    }

    #[test]
    fn rejects_unrelated_comments() {
        assert!(parse_directive("// just a comment").is_none());
        assert!(parse_directive("// gooze:ignore").is_none());
    }

    #[test]
    fn file_keyword_must_stand_alone() {
        // "filearithmetic" is not the file form; it is a (nonsense) type name.
        let (file_level, _) = parse_directive("// gooze:ignore filearithmetic").unwrap();
        assert!(!file_level);
    }
}
