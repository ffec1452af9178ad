use tree_sitter::Node;

use crate::ast::node_text;

use super::{Patch, EMPTY_CASE_ANCHOR, REMOVE_ELSE_ANCHOR, REMOVE_IF_ANCHOR};

/// Branch mutations: condition rewrites for `if` and `for`, arm removal for
/// `if`/`else`, and case-body emptying for `switch`.
pub(super) fn mutate(node: Node, source: &[u8]) -> Vec<Patch> {
    match node.kind() {
        "if_statement" => mutate_if(node, source),
        "for_statement" => match for_condition(node) {
            Some(cond) => condition_patches(cond, source),
            None => Vec::new(),
        },
        "expression_switch_statement" => mutate_switch(node, source),
        _ => Vec::new(),
    }
}

fn mutate_if(node: Node, source: &[u8]) -> Vec<Patch> {
    let mut patches = Vec::new();

    if let Some(cond) = node.child_by_field_name("condition") {
        patches.extend(condition_patches(cond, source));
    }

    patches.extend(remove_if_arm(node, source));
    patches.extend(remove_else_arm(node));

    patches
}

/// Three mutants per condition: wrap in negation, force true, force false.
pub(super) fn condition_patches(cond: Node, source: &[u8]) -> Vec<Patch> {
    let original = node_text(cond, source);
    let start = cond.start_byte();
    let end = cond.end_byte();

    vec![
        Patch {
            start,
            end,
            replacement: format!("!({original})"),
            anchor: start,
        },
        Patch {
            start,
            end,
            replacement: "true".to_string(),
            anchor: start + 1,
        },
        Patch {
            start,
            end,
            replacement: "false".to_string(),
            anchor: start + 2,
        },
    ]
}

/// Drop the `if` arm. With an `else` block its body is spliced inline; with
/// an `else if` the chained statement takes the whole span; without an
/// `else` the statement disappears.
fn remove_if_arm(node: Node, source: &[u8]) -> Vec<Patch> {
    let start = node.start_byte();
    let end = node.end_byte();

    let replacement = match node.child_by_field_name("alternative") {
        None => String::new(),
        Some(alt) if alt.kind() == "block" => {
            let body = node_text(alt, source);
            // Interior of the block, braces stripped.
            let interior = &body[1..body.len().saturating_sub(1)];
            if interior.is_empty() {
                return Vec::new();
            }
            interior.to_string()
        }
        Some(alt) if alt.kind() == "if_statement" => node_text(alt, source).to_string(),
        Some(_) => return Vec::new(),
    };

    vec![Patch {
        start,
        end,
        replacement,
        anchor: start + REMOVE_IF_ANCHOR,
    }]
}

/// Drop the `else` arm, from just after the `if` block to the end of the
/// alternative.
fn remove_else_arm(node: Node) -> Vec<Patch> {
    let Some(alt) = node.child_by_field_name("alternative") else {
        return Vec::new();
    };
    let Some(consequence) = node.child_by_field_name("consequence") else {
        return Vec::new();
    };

    vec![Patch {
        start: consequence.end_byte(),
        end: alt.end_byte(),
        replacement: String::new(),
        anchor: alt.start_byte() + REMOVE_ELSE_ANCHOR,
    }]
}

/// The loop condition for plain and three-clause `for` loops. Range loops
/// and bare `for {}` have none.
pub(super) fn for_condition(node: Node) -> Option<Node> {
    for i in 0..node.named_child_count() {
        let child = node.named_child(i)?;
        match child.kind() {
            "for_clause" => return child.child_by_field_name("condition"),
            "range_clause" | "block" => continue,
            _ => return Some(child),
        }
    }

    None
}

/// Replace each non-empty case body with an empty one, keeping the colon.
fn mutate_switch(node: Node, _source: &[u8]) -> Vec<Patch> {
    let mut patches = Vec::new();

    for i in 0..node.child_count() {
        let Some(case) = node.child(i) else { continue };
        if !matches!(case.kind(), "expression_case" | "default_case") {
            continue;
        }

        if let Some(patch) = empty_case_body(case) {
            patches.push(patch);
        }
    }

    patches
}

fn empty_case_body(case: Node) -> Option<Patch> {
    let mut colon = None;
    for i in 0..case.child_count() {
        let child = case.child(i)?;
        if child.kind() == ":" {
            colon = Some(child);
            break;
        }
    }
    let colon = colon?;

    let mut last_stmt_end = None;
    for i in 0..case.named_child_count() {
        let child = case.named_child(i)?;
        if child.start_byte() >= colon.end_byte() {
            last_stmt_end = Some(child.end_byte());
        }
    }
    let last_stmt_end = last_stmt_end?;

    Some(Patch {
        start: colon.end_byte(),
        end: last_stmt_end,
        replacement: String::new(),
        anchor: colon.start_byte() + EMPTY_CASE_ANCHOR,
    })
}
