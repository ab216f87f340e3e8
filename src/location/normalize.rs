//! Display-path normalization for nested locations.
//!
//! A member extracted to `/tmp/pkgaudit_x/setup.py` from `pkg.zip` renders as
//! `pkg.zip$setup.py`: the extraction prefix is stripped and the containing
//! location is prepended with a `$` separator.

use std::path::{Path, MAIN_SEPARATOR};

pub const NESTING_SEPARATOR: char = '$';

/// Strips `strip_path` from `target` and prefixes it with `parent`.
///
/// Only absolute prefixes are elided, and only on a component boundary.
/// What remains is relative, so it can never match the prefix again, and
/// output carrying the `parent$` marker is returned untouched. Applying this
/// to its own output is therefore a no-op.
pub fn strip(target: &str, strip_path: &str, parent: Option<&str>) -> String {
    let parent = parent.filter(|p| !p.is_empty());

    if let Some(parent) = parent {
        if target
            .strip_prefix(parent)
            .is_some_and(|rest| rest.starts_with(NESTING_SEPARATOR))
        {
            return target.to_string();
        }
    }

    let stripped = strip_prefix(target, strip_path);

    match parent {
        Some(parent) if !stripped.starts_with(parent) => {
            format!("{parent}{NESTING_SEPARATOR}{stripped}")
        }
        _ => stripped.to_string(),
    }
}

fn strip_prefix<'a>(target: &'a str, prefix: &str) -> &'a str {
    if !Path::new(prefix).is_absolute() {
        return target;
    }
    let Some(rest) = target.strip_prefix(prefix) else {
        return target;
    };

    if prefix.ends_with(MAIN_SEPARATOR) || rest.is_empty() || rest.starts_with(MAIN_SEPARATOR) {
        rest.trim_start_matches(MAIN_SEPARATOR)
    } else {
        // `/tmp/ab` does not live under `/tmp/a`
        target
    }
}
