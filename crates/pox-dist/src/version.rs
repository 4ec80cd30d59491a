//! Version ordering for update messages.
//!
//! Normalized Composer versions are compared the way PHP's `version_compare`
//! does: versions are split into numeric and alphabetic parts, numbers compare
//! numerically, and stability words order as
//! `dev < alpha = a < beta = b < RC = rc < (release) < patch = pl = p`.

use std::cmp::Ordering;

/// Alias used for the default branch when comparing versions
pub const DEFAULT_BRANCH_ALIAS: &str = "9999999-dev";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part<'a> {
    Number(&'a str),
    Word(&'a str),
}

/// Split a version into numeric and alphabetic runs; separators (`.`, `-`,
/// `_`, `+`) are dropped.
fn parts(version: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let bytes = version.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        let b = bytes[start];
        if !b.is_ascii_alphanumeric() {
            start += 1;
            continue;
        }

        let numeric = b.is_ascii_digit();
        let mut end = start + 1;
        while end < bytes.len()
            && bytes[end].is_ascii_alphanumeric()
            && bytes[end].is_ascii_digit() == numeric
        {
            end += 1;
        }

        let text = &version[start..end];
        parts.push(if numeric { Part::Number(text) } else { Part::Word(text) });
        start = end;
    }

    parts
}

fn word_order(word: &str) -> i32 {
    match word.to_ascii_lowercase().as_str() {
        "dev" => 0,
        "alpha" | "a" => 1,
        "beta" | "b" => 2,
        "rc" => 3,
        "patch" | "pl" | "p" => 5,
        // Unknown words sort below everything
        _ => -1,
    }
}

/// Order of a numeric part relative to the stability words
const RELEASE_ORDER: i32 = 4;

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_parts(a: Part<'_>, b: Part<'_>) -> Ordering {
    match (a, b) {
        (Part::Number(x), Part::Number(y)) => compare_numbers(x, y),
        (Part::Word(x), Part::Word(y)) => word_order(x).cmp(&word_order(y)),
        (Part::Number(_), Part::Word(y)) => RELEASE_ORDER.cmp(&word_order(y)),
        (Part::Word(x), Part::Number(_)) => word_order(x).cmp(&RELEASE_ORDER),
    }
}

/// Compare two normalized versions
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts = parts(a);
    let b_parts = parts(b);

    for (x, y) in a_parts.iter().zip(b_parts.iter()) {
        let cmp = compare_parts(*x, *y);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    // The longer version wins when its next part is a number ("1.0" < "1.0.1"),
    // loses when it is a pre-release word ("1.0" > "1.0-beta")
    match a_parts.len().cmp(&b_parts.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => match a_parts[b_parts.len()] {
            Part::Number(_) => Ordering::Greater,
            Part::Word(w) => word_order(w).cmp(&RELEASE_ORDER),
        },
        Ordering::Less => match b_parts[a_parts.len()] {
            Part::Number(_) => Ordering::Less,
            Part::Word(w) => RELEASE_ORDER.cmp(&word_order(w)),
        },
    }
}

fn normalize_default_branch(version: &str) -> &str {
    match version {
        "dev-master" | "dev-trunk" | "dev-default" => DEFAULT_BRANCH_ALIAS,
        other => other,
    }
}

/// Whether moving from `from` to `to` is an upgrade.
///
/// Equal versions and any move involving a dev branch count as upgrades.
pub fn is_upgrade(from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }

    let from = normalize_default_branch(from);
    let to = normalize_default_branch(to);

    if from.starts_with("dev-") || to.starts_with("dev-") {
        return true;
    }

    compare_versions(from, to) != Ordering::Greater
}
