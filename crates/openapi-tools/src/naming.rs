//! Tool-name derivation.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Tool names are capped at this many characters.
pub const MAX_TOOL_NAME_LEN: usize = 64;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex"));

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("static regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Canonical `{method}_{path}` name: every run of non-alphanumeric characters becomes a single
/// underscore, leading/trailing underscores are trimmed, and the result is capped.
///
/// `("get", "/pet/{petId}")` becomes `get_pet_petId`.
#[must_use]
pub fn generate_canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);
    let name = NON_ALNUM.replace_all(&raw, "_");
    cap(name.trim_matches('_'))
}

/// Summary-derived name: lower-cased, punctuation stripped, whitespace runs to `_`.
///
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn descriptive_name(summary: &str) -> Option<String> {
    let lowered = summary.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    let joined = WHITESPACE.replace_all(stripped.trim(), "_");
    let name = cap(joined.trim_matches('_'));
    (!name.is_empty()).then_some(name)
}

fn cap(name: &str) -> String {
    name.chars().take(MAX_TOOL_NAME_LEN).collect()
}

/// Reserve `base`, or the first free `base_N`, in `tool_names`.
pub fn reserve_unique_tool_name(tool_names: &mut HashSet<String>, base: &str) -> String {
    let base = base.to_string();
    if tool_names.insert(base.clone()) {
        return base;
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if tool_names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
