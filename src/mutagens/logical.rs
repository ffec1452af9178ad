use tree_sitter::Node;

use crate::ast::node_text;

use super::Patch;

/// Swap `&&` with `||` and vice versa.
pub(super) fn mutate(node: Node, source: &[u8]) -> Vec<Patch> {
    if node.kind() != "binary_expression" {
        return Vec::new();
    }

    let Some(op) = node.child_by_field_name("operator") else {
        return Vec::new();
    };

    let replacement = match node_text(op, source) {
        "&&" => "||",
        "||" => "&&",
        _ => return Vec::new(),
    };

    vec![Patch {
        start: op.start_byte(),
        end: op.end_byte(),
        replacement: replacement.to_string(),
        anchor: op.start_byte(),
    }]
}
