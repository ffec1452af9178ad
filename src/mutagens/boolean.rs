use tree_sitter::Node;

use super::Patch;

/// Flip a boolean literal.
pub(super) fn mutate(node: Node, _source: &[u8]) -> Vec<Patch> {
    let replacement = match node.kind() {
        "true" => "false",
        "false" => "true",
        _ => return Vec::new(),
    };

    vec![Patch {
        start: node.start_byte(),
        end: node.end_byte(),
        replacement: replacement.to_string(),
        anchor: node.start_byte(),
    }]
}
