use tree_sitter::Node;

use crate::ast::node_text;

use super::{Patch, ALT_STRIDE};

const OPS: &[&str] = &["<", "<=", ">", ">=", "==", "!="];

/// Replace a comparison operator with each alternative from the same set.
pub(super) fn mutate(node: Node, source: &[u8]) -> Vec<Patch> {
    if node.kind() != "binary_expression" {
        return Vec::new();
    }

    let Some(op) = node.child_by_field_name("operator") else {
        return Vec::new();
    };

    let op_text = node_text(op, source);
    if !OPS.contains(&op_text) {
        return Vec::new();
    }

    OPS.iter()
        .enumerate()
        .filter(|(_, alt)| **alt != op_text)
        .map(|(k, alt)| Patch {
            start: op.start_byte(),
            end: op.end_byte(),
            replacement: (*alt).to_string(),
            anchor: op.start_byte() + ALT_STRIDE * k,
        })
        .collect()
}
