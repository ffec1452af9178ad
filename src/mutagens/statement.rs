use tree_sitter::Node;

use super::Patch;

/// Delete an expression statement outright.
pub(super) fn mutate(node: Node, _source: &[u8]) -> Vec<Patch> {
    if node.kind() != "expression_statement" {
        return Vec::new();
    }

    vec![Patch {
        start: node.start_byte(),
        end: node.end_byte(),
        replacement: String::new(),
        anchor: node.start_byte(),
    }]
}
