use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{CodeScope, ScopeKind};

/// Construct a parser for the target language grammar.
fn go_parser() -> Parser {
    let mut parser = Parser::new();
    let language = tree_sitter_go::LANGUAGE;
    parser
        .set_language(&language.into())
        .expect("Failed to set Go grammar");
    parser
}

/// Parse a source file into a typed tree annotated with byte spans.
///
/// A tree containing syntax errors is rejected: the mutation rules rely on
/// well-formed node spans.
pub fn parse(path: &Path, source: &[u8], token: &CancelToken) -> Result<Tree, Error> {
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut parser = go_parser();
    let tree = parser.parse(source, None).ok_or_else(|| Error::Parse {
        path: path.to_path_buf(),
        message: "parser returned no tree".to_string(),
    })?;

    if tree.root_node().has_error() {
        return Err(Error::Parse {
            path: path.to_path_buf(),
            message: "syntax error".to_string(),
        });
    }

    Ok(tree)
}

/// Check that a candidate patch still parses. Used by the mutation
/// generator to drop rules that are inapplicable at a given position.
pub fn reparses(source: &[u8]) -> bool {
    let mut parser = go_parser();
    match parser.parse(source, None) {
        Some(tree) => !tree.root_node().has_error(),
        None => false,
    }
}

/// Slice of the original source covered by a node.
pub fn node_text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

/// Pre-order walk. The callback returns false to skip a node's children.
pub fn preorder<'a>(node: Node<'a>, f: &mut impl FnMut(Node<'a>) -> bool) {
    if !f(node) {
        return;
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            preorder(child, f);
        }
    }
}

/// Extract the scope map for a parsed file: package-level declarations,
/// `init` functions, and named function/method bodies.
pub fn scopes(tree: &Tree, source: &[u8]) -> Vec<CodeScope> {
    let root = tree.root_node();
    let mut scopes = Vec::new();

    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else { continue };

        match child.kind() {
            "function_declaration" | "method_declaration" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                let kind = if name == "init" {
                    ScopeKind::Init
                } else {
                    ScopeKind::Function
                };
                scopes.push(CodeScope {
                    kind,
                    start_line: child.start_position().row + 1,
                    end_line: child.end_position().row + 1,
                    name,
                });
            }
            "const_declaration" | "var_declaration" | "type_declaration" => {
                scopes.push(CodeScope {
                    kind: ScopeKind::Global,
                    start_line: child.start_position().row + 1,
                    end_line: child.end_position().row + 1,
                    name: first_declared_name(child, source),
                });
            }
            _ => {}
        }
    }

    scopes
}

fn first_declared_name(decl: Node, source: &[u8]) -> String {
    let mut name = String::new();
    preorder(decl, &mut |node| {
        if !name.is_empty() {
            return false;
        }
        if node.kind() == "identifier" || node.kind() == "type_identifier" {
            name = node_text(node, source).to_string();
            return false;
        }
        true
    });

    name
}
