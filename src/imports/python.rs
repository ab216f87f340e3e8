//! Python import statement extraction
//!
//! Handles Python import statements:
//! - Simple: `import os`
//! - Dotted: `import urllib.request`
//! - Aliased: `import subprocess as sp`
//! - From: `from os import system`
//! - From multiple: `from os import system, popen`
//! - Relative: `from . import util`, `from ..pkg import mod`
//! - Wildcard: `from os import *`

use tree_sitter::{Node, Tree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Number of leading dots; 0 for absolute imports.
    pub level: usize,
    pub module: Option<String>,
    pub names: Vec<String>,
    pub line: usize,
}

pub fn extract(tree: &Tree, source: &[u8]) -> Vec<ImportStatement> {
    let mut statements = Vec::new();
    extract_recursive(tree.root_node(), source, &mut statements);
    statements
}

fn extract_recursive(node: Node, source: &[u8], statements: &mut Vec<ImportStatement>) {
    match node.kind() {
        "import_statement" => {
            process_import_statement(node, source, statements);
        }
        "import_from_statement" => {
            process_from_import(node, source, statements);
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                extract_recursive(child, source, statements);
            }
        }
    }
}

fn process_import_statement(node: Node, source: &[u8], statements: &mut Vec<ImportStatement>) {
    let line = node.start_position().row + 1;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let module = match child.kind() {
            "dotted_name" => Some(get_node_text(&child, source)),
            "aliased_import" => first_dotted_name(child, source),
            _ => None,
        };

        if let Some(module) = module {
            statements.push(ImportStatement {
                level: 0,
                module: Some(module),
                names: Vec::new(),
                line,
            });
        }
    }
}

fn process_from_import(node: Node, source: &[u8], statements: &mut Vec<ImportStatement>) {
    // from <module_path> import <imported_names>
    let mut level = 0;
    let mut module: Option<String> = None;
    let mut names = Vec::new();
    let mut seen_import_keyword = false;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();

        if kind == "import" {
            seen_import_keyword = true;
            continue;
        }

        if !seen_import_keyword {
            match kind {
                "dotted_name" => module = Some(get_node_text(&child, source)),
                "relative_import" => {
                    let text = get_node_text(&child, source);
                    let rest = text.trim_start_matches('.');
                    level = text.len() - rest.len();
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        module = Some(rest.to_string());
                    }
                }
                _ => {}
            }
        } else {
            collect_name(child, source, &mut names);
        }
    }

    statements.push(ImportStatement {
        level,
        module,
        names,
        line: node.start_position().row + 1,
    });
}

fn collect_name(node: Node, source: &[u8], names: &mut Vec<String>) {
    match node.kind() {
        "wildcard_import" => names.push("*".to_string()),
        "dotted_name" | "identifier" => names.push(get_node_text(&node, source)),
        "aliased_import" => {
            if let Some(name) = first_dotted_name(node, source) {
                names.push(name);
            }
        }
        "comment" | "from" | "," | "(" | ")" => {}
        _ => {
            // import lists and other containers
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_name(child, source, names);
            }
        }
    }
}

fn first_dotted_name(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|child| matches!(child.kind(), "dotted_name" | "identifier"))
        .map(|child| get_node_text(&child, source));
    found
}

fn get_node_text<'a>(node: &Node<'a>, source: &'a [u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}
