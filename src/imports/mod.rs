//! Static import enumeration for Python sources.
//!
//! Statements are extracted with tree-sitter; relative imports are then
//! resolved against the importing file's directory.

mod python;

pub use python::ImportStatement;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::{Parser, Tree};

use crate::error::ImportError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Absolute module names.
    pub modules: BTreeSet<String>,
    /// Files that relative imports resolve to.
    pub dependencies: BTreeSet<PathBuf>,
    /// Relative imports with no matching module or package.
    pub unknown: BTreeSet<PathBuf>,
}

pub fn parse_python(source: &[u8]) -> Result<Option<Tree>, ImportError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
    Ok(parser.parse(source, None))
}

pub fn extract_statements(source: &[u8]) -> Result<Option<Vec<ImportStatement>>, ImportError> {
    Ok(parse_python(source)?.map(|tree| python::extract(&tree, source)))
}

/// Returns `None` when the file has no imports.
pub fn find_imports(py_src: &Path) -> Result<Option<ImportSummary>, ImportError> {
    let source = fs::read(py_src).map_err(|e| ImportError::read(py_src, e))?;
    let statements =
        extract_statements(&source)?.ok_or_else(|| ImportError::Parse(py_src.to_path_buf()))?;

    if statements.is_empty() {
        return Ok(None);
    }
    Ok(Some(resolve(py_src, &statements)))
}

pub fn resolve(py_src: &Path, statements: &[ImportStatement]) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let origin = std::path::absolute(py_src).unwrap_or_else(|_| py_src.to_path_buf());

    for statement in statements {
        if statement.level == 0 {
            if let Some(module) = &statement.module {
                summary.modules.insert(module.clone());
            }
            continue;
        }

        let mut dependency = origin.clone();
        for _ in 0..statement.level {
            dependency.pop();
        }
        if let Some(module) = &statement.module {
            for part in module.split('.') {
                dependency.push(part);
            }
        }

        for name in statement.names.iter().filter(|n| n.as_str() != "*") {
            let candidate = dependency.join(format!("{name}.py"));
            if candidate.is_file() {
                summary.dependencies.insert(candidate);
            }
        }

        let module_file = dependency.with_extension("py");
        let package_init = dependency.join("__init__.py");
        if statement.module.is_some() && module_file.is_file() {
            summary.dependencies.insert(module_file);
        } else if package_init.is_file() {
            summary.dependencies.insert(package_init);
        } else {
            summary.unknown.insert(dependency);
        }
    }

    summary
}
