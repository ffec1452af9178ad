//! Mutation rules and the generator that applies them.
//!
//! Each rule matches a node kind and emits byte patches; the generator
//! splices them into the original file, verifies the result still parses,
//! and assigns deterministic mutation IDs.

mod arithmetic;
mod boolean;
mod branch;
mod comparison;
mod logical;
mod loops;
mod numbers;
mod statement;
mod unary;

use std::collections::HashSet;
use std::path::Path;

use sha2::{Digest, Sha256};
use tree_sitter::Node;

use crate::ast;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::ignore::IgnoreIndex;
use crate::model::{Mutation, MutationType, Source};

/// Additive anchor step separating alternative kinds emitted from one node.
/// Wide enough that neighbouring tokens do not fold onto the same anchor.
pub(crate) const ALT_STRIDE: usize = 1000;

/// Anchor offsets for structural branch variants.
pub(crate) const REMOVE_IF_ANCHOR: usize = 1000;
pub(crate) const REMOVE_ELSE_ANCHOR: usize = 2000;
pub(crate) const EMPTY_CASE_ANCHOR: usize = 3000;

/// A byte-exact replacement produced by a rule.
///
/// `anchor` is the byte offset of the primary token plus the rule's
/// disambiguator for multi-mutant nodes; it feeds the mutation ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Patch {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
    pub anchor: usize,
}

type RuleFn = fn(Node, &[u8]) -> Vec<Patch>;

fn rule_for(name: &str) -> Option<RuleFn> {
    match name {
        "arithmetic" => Some(arithmetic::mutate),
        "boolean" => Some(boolean::mutate),
        "numbers" => Some(numbers::mutate),
        "comparison" => Some(comparison::mutate),
        "logical" => Some(logical::mutate),
        "unary" => Some(unary::mutate),
        "branch" => Some(branch::mutate),
        "statement" => Some(statement::mutate),
        "loop" => Some(loops::mutate),
        _ => None,
    }
}

/// Expand an empty type list to the default set and reject unknown names.
fn resolve_types(types: &[MutationType]) -> Result<Vec<MutationType>, Error> {
    if types.is_empty() {
        return Ok(MutationType::defaults());
    }

    for mutation_type in types {
        if rule_for(&mutation_type.name).is_none() {
            return Err(Error::input(
                "",
                format!("unsupported mutation type: {}", mutation_type.name),
            ));
        }
    }

    Ok(types.to_vec())
}

/// Generate every mutant for a source, honouring ignore directives.
///
/// Patches that no longer parse after splicing are dropped: the rule is
/// simply inapplicable at that position.
pub fn generate(
    source: &Source,
    types: &[MutationType],
    token: &CancelToken,
) -> Result<Vec<Mutation>, Error> {
    if source.origin.path.as_os_str().is_empty() {
        return Err(Error::input("", "missing source origin"));
    }

    let content = std::fs::read(&source.origin.path)
        .map_err(|e| Error::input(&source.origin.path, format!("read: {e}")))?;

    let tree = ast::parse(&source.origin.path, &content, token)?;
    let types = resolve_types(types)?;
    let index = IgnoreIndex::build(&tree, &content);

    let mut mutations = Vec::new();
    let mut seen_ids = HashSet::new();

    for mutation_type in &types {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if index.file_ignores(mutation_type) {
            continue;
        }

        let Some(rule) = rule_for(&mutation_type.name) else {
            continue;
        };

        let patches = collect_patches(tree.root_node(), &content, &index, mutation_type, rule);

        for patch in patches {
            let mutated = splice(&content, &patch);
            if mutated == content {
                continue;
            }
            if !ast::reparses(&mutated) {
                tracing::debug!(
                    path = %source.origin.path.display(),
                    mutation_type = %mutation_type.name,
                    anchor = patch.anchor,
                    "dropping patch that does not reparse"
                );
                continue;
            }

            let id = mutation_id(&source.origin.path, mutation_type, patch.anchor);
            if !seen_ids.insert(id.clone()) {
                tracing::debug!(%id, "dropping mutation with colliding id");
                continue;
            }

            mutations.push(Mutation {
                id,
                source: source.clone(),
                mutation_type: mutation_type.clone(),
                mutated_code: mutated,
                diff: None,
            });
        }
    }

    tracing::debug!(
        path = %source.origin.path.display(),
        count = mutations.len(),
        "generated mutations"
    );

    Ok(mutations)
}

/// Walk the tree for one mutation type, consulting the ignore index before
/// invoking the rule. Function-level ignores skip the whole subtree;
/// line-level ignores skip the node but still descend.
fn collect_patches(
    root: Node,
    content: &[u8],
    index: &IgnoreIndex,
    mutation_type: &MutationType,
    rule: RuleFn,
) -> Vec<Patch> {
    let mut patches = Vec::new();

    ast::preorder(root, &mut |node| {
        if matches!(node.kind(), "function_declaration" | "method_declaration")
            && index.function_ignores(node.start_byte(), mutation_type)
        {
            return false;
        }

        let line = node.start_position().row + 1;
        if index.line_ignores(line, mutation_type) {
            return true;
        }

        patches.extend(rule(node, content));

        true
    });

    patches
}

/// Deterministic 16-hex-char mutation ID.
///
/// The preimage carries the origin path, the type name and version, and the
/// anchor, so IDs are stable across runs and machines and stale cached
/// verdicts drop out when a rule version is bumped.
pub fn mutation_id(origin: &Path, mutation_type: &MutationType, anchor: usize) -> String {
    let preimage = format!(
        "{}-{}-{}-{}",
        origin.display(),
        mutation_type.name,
        mutation_type.version,
        anchor
    );

    let digest = Sha256::digest(preimage.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

/// Splice a patch into the original bytes. Everything outside the patched
/// range is preserved byte for byte; the result always ends with a newline.
fn splice(content: &[u8], patch: &Patch) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + patch.replacement.len());
    out.extend_from_slice(&content[..patch.start]);
    out.extend_from_slice(patch.replacement.as_bytes());
    out.extend_from_slice(&content[patch.end..]);

    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }

    out
}

/// Unified-style diff of original against mutated, insertions and deletions
/// only. Attached to reports for surviving mutants.
pub fn unified_diff(original: &[u8], mutated: &[u8]) -> String {
    use similar::TextDiff;

    let original = String::from_utf8_lossy(original);
    let mutated = String::from_utf8_lossy(mutated);
    let diff = TextDiff::from_lines(original.as_ref(), mutated.as_ref());

    let mut output = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                output.push_str(&format!("- {}", change));
            }
            similar::ChangeTag::Insert => {
                output.push_str(&format!("+ {}", change));
            }
            _ => {}
        }
    }

    output
}
