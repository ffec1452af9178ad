use tree_sitter::Node;

use super::branch::for_condition;
use super::Patch;

/// Loop mutations: a one-pass-never variant that forces the condition to
/// `false`, and a variant bounding the loop to a single iteration.
pub(super) fn mutate(node: Node, _source: &[u8]) -> Vec<Patch> {
    if node.kind() != "for_statement" {
        return Vec::new();
    }

    let mut patches = Vec::new();

    if let Some(cond) = for_condition(node) {
        patches.push(Patch {
            start: cond.start_byte(),
            end: cond.end_byte(),
            replacement: "false".to_string(),
            anchor: node.start_byte(),
        });
    }

    if let Some(body) = node.child_by_field_name("body") {
        if body.kind() == "block" && body.end_byte() > body.start_byte() + 1 {
            // Insert a break just before the closing brace.
            let rbrace = body.end_byte() - 1;
            patches.push(Patch {
                start: rbrace,
                end: rbrace,
                replacement: "\nbreak\n".to_string(),
                anchor: node.start_byte() + 1,
            });
        }
    }

    patches
}
