//! Deterministic, order-sensitive error categorization: a static regex
//! table first, the naive-Bayes pattern store second.

use std::sync::OnceLock;

use debug_types::{ErrorCategory, ErrorContext};
use regex_lite::Regex;
use similar::TextDiff;

use crate::pattern_store::PatternStore;

/// `(category, patterns)` pairs in the exact declaration order the
/// categorizer iterates. `Unknown` has no patterns — it is the fallback
/// when nothing else matches.
const PATTERN_TABLE: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Syntax,
        &[
            "syntaxerror",
            "indentationerror",
            "unexpected token",
            "invalid syntax",
            "unexpected indent",
            "expected an indented block",
        ],
    ),
    (
        ErrorCategory::Type,
        &[
            "typeerror",
            "unsupported operand type",
            "not subscriptable",
            "has no attribute",
            "not a function",
            "expected .* to be a",
            "can't convert .* to",
        ],
    ),
    (
        ErrorCategory::Import,
        &[
            "importerror",
            "modulenotfounderror",
            "no module named",
            "cannot import name",
            "cannot find module",
        ],
    ),
    (
        ErrorCategory::Attribute,
        &["attributeerror", "has no attribute", "object has no attribute"],
    ),
    (
        ErrorCategory::Name,
        &["nameerror", "name .* is not defined", "undefined variable", "referenceerror"],
    ),
    (
        ErrorCategory::Index,
        &["indexerror", "out of range", "list index out of range", "array index out of bounds"],
    ),
    (
        ErrorCategory::Value,
        &[
            "valueerror",
            "invalid literal",
            "could not convert",
            "invalid value",
            "value .* is not a valid",
        ],
    ),
    (
        ErrorCategory::Runtime,
        &["runtimeerror", "recursionerror", "maximum recursion depth exceeded", "stack overflow"],
    ),
    (
        ErrorCategory::Memory,
        &["memoryerror", "out of memory", "memory allocation failed", "cannot allocate"],
    ),
    (
        ErrorCategory::Permission,
        &["permissionerror", "permission denied", "access is denied", "not permitted"],
    ),
    (
        ErrorCategory::Assertion,
        &["assertionerror", "assertion failed", "expected .* but got"],
    ),
    (
        ErrorCategory::Network,
        &[
            "connectionerror",
            "connectionrefusederror",
            "connectionreseterror",
            "timeouterror",
            "connection refused",
            "network is unreachable",
            "connection timed out",
        ],
    ),
    (
        ErrorCategory::Database,
        &[
            "databaseerror",
            "operationalerror",
            "integrityerror",
            "database is locked",
            "constraint failed",
            "syntax error in sql",
            "no such table",
        ],
    ),
];

fn compiled_table() -> &'static Vec<(ErrorCategory, Vec<Regex>)> {
    static TABLE: OnceLock<Vec<(ErrorCategory, Vec<Regex>)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PATTERN_TABLE
            .iter()
            .map(|(category, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|pattern| Regex::new(pattern).expect("pattern table entries are valid regexes"))
                    .collect();
                (*category, compiled)
            })
            .collect()
    })
}

/// Categorize an error from its message and traceback, consulting the
/// pattern store only when no regex in the table matches.
pub fn categorize_error(message: &str, traceback: &str, pattern_store: &PatternStore) -> ErrorCategory {
    let combined = format!("{message}\n{traceback}").to_lowercase();

    for (category, patterns) in compiled_table() {
        if patterns.iter().any(|regex| regex.is_match(&combined)) {
            return *category;
        }
    }

    pattern_store
        .predict(message)
        .and_then(|name| ErrorCategory::parse(&name))
        .unwrap_or(ErrorCategory::Unknown)
}

/// Ratcliff/Obershelp similarity ratio in `[0.0, 1.0]`, backed by the
/// `similar` crate's line-oriented diff ratio.
pub fn text_similarity(text1: &str, text2: &str) -> f64 {
    if text1.is_empty() || text2.is_empty() {
        return 0.0;
    }
    TextDiff::from_chars(text1, text2).ratio() as f64
}

/// Two error contexts are similar iff their categories and file paths
/// match, their line numbers (when both present) are within 5 lines of
/// each other, and their messages are more than 70% similar.
pub fn is_similar_error(a: &ErrorContext, b: &ErrorContext) -> bool {
    if a.category != b.category {
        return false;
    }
    if a.file_path != b.file_path {
        return false;
    }
    if let (Some(line_a), Some(line_b)) = (a.line_number, b.line_number) {
        if line_a.abs_diff(line_b) > 5 {
            return false;
        }
    }
    text_similarity(&a.message, &b.message) > 0.7
}
