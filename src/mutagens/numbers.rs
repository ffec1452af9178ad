use tree_sitter::Node;

use crate::ast::node_text;

use super::{Patch, ALT_STRIDE};

/// Replace a numeric literal with `0`, `1`, `literal+1` and `literal-1`,
/// minus anything equal to the original.
pub(super) fn mutate(node: Node, source: &[u8]) -> Vec<Patch> {
    if !matches!(node.kind(), "int_literal" | "float_literal") {
        return Vec::new();
    }

    let text = node_text(node, source);
    let mut patches = Vec::new();
    let mut emitted: Vec<String> = Vec::new();

    for (slot, candidate) in candidates(text).into_iter().enumerate() {
        let Some(candidate) = candidate else { continue };

        if literal_eq(text, &candidate) || emitted.contains(&candidate) {
            continue;
        }

        emitted.push(candidate.clone());
        patches.push(Patch {
            start: node.start_byte(),
            end: node.end_byte(),
            replacement: candidate,
            anchor: node.start_byte() + ALT_STRIDE * slot,
        });
    }

    patches
}

/// The four candidate slots. Slots keep their position even when a
/// candidate is unavailable so anchors are stable.
fn candidates(text: &str) -> [Option<String>; 4] {
    let plain: String = text.chars().filter(|c| *c != '_').collect();

    if let Ok(value) = plain.parse::<i128>() {
        return [
            Some("0".to_string()),
            Some("1".to_string()),
            Some((value + 1).to_string()),
            Some((value - 1).to_string()),
        ];
    }

    if let Ok(value) = plain.parse::<f64>() {
        return [
            Some("0".to_string()),
            Some("1".to_string()),
            Some(format_float(value + 1.0)),
            Some(format_float(value - 1.0)),
        ];
    }

    // Hex, octal, binary and other exotic spellings: only the constants.
    [Some("0".to_string()), Some("1".to_string()), None, None]
}

fn format_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Numeric equality between the original literal and a candidate, so that
/// `0.0` is not "replaced" with `0`.
fn literal_eq(original: &str, candidate: &str) -> bool {
    let original_plain: String = original.chars().filter(|c| *c != '_').collect();

    if let (Ok(a), Ok(b)) = (original_plain.parse::<i128>(), candidate.parse::<i128>()) {
        return a == b;
    }

    if let (Ok(a), Ok(b)) = (original_plain.parse::<f64>(), candidate.parse::<f64>()) {
        return a == b;
    }

    original == candidate
}
