use tree_sitter::Node;

use crate::ast::node_text;

use super::Patch;

/// Strip a unary `-` or `!` from its operand.
pub(super) fn mutate(node: Node, source: &[u8]) -> Vec<Patch> {
    if node.kind() != "unary_expression" {
        return Vec::new();
    }

    let Some(op) = node.child_by_field_name("operator") else {
        return Vec::new();
    };
    let Some(operand) = node.child_by_field_name("operand") else {
        return Vec::new();
    };

    if !matches!(node_text(op, source), "-" | "!") {
        return Vec::new();
    }

    vec![Patch {
        start: node.start_byte(),
        end: node.end_byte(),
        replacement: node_text(operand, source).to_string(),
        anchor: op.start_byte(),
    }]
}
