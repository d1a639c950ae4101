//! Query expansion and decomposition
//!
//! Widens recall before retrieval: synonym expansion appends canonical
//! English phrases for known trigger vocabulary (the document corpus is
//! mostly English, the queries mostly Spanish), and decomposition splits
//! compound questions into independently searchable sub-queries. Expanded
//! text is used only for search, never shown to the user.

use std::sync::LazyLock;

use crate::text::normalize_for_search;

static CONJUNCTION_SPLIT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(?:y tambi[eé]n|y adem[aá]s|adem[aá]s de|and also|and then)\b")
        .expect("conjunction regex is valid")
});

static QUESTION_MARK_SPLIT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\?\s+").expect("question split regex is valid"));

/// Trigger-keyword groups and the canonical expansion phrase each appends.
/// Groups are not mutually exclusive; every matching group fires.
const SYNONYM_GROUPS: [(&[&str], &str); 6] = [
    (
        &["casa", "remoto", "teletrabajo", "desde fuera", "home office", "remote"],
        "Zscaler VPN remote access",
    ),
    (
        &["conectar", "conecto", "conexion", "internet", "wifi", "sin red", "network"],
        "network connectivity",
    ),
    (
        &["sap", "fiori", "transaccion", "sapgui"],
        "SAP ERP system access",
    ),
    (
        &["planta", "fabrica", "plant", "site", "nave"],
        "manufacturing plant site",
    ),
    (
        &["imprimir", "impresora", "printer", "print"],
        "network printer configuration",
    ),
    (
        &["contrasena", "password", "bloqueado", "bloqueada", "locked", "credenciales"],
        "password reset account unlock",
    ),
];

/// Append canonical expansion phrases for every trigger group found in the
/// query. Output is the original query plus the matched expansions,
/// space-joined.
pub fn expand_with_synonyms(query: &str) -> String {
    let normalized = normalize_for_search(query);

    let mut expanded = query.trim().to_string();
    for (triggers, phrase) in SYNONYM_GROUPS {
        if triggers.iter().any(|t| normalized.contains(t)) {
            expanded.push(' ');
            expanded.push_str(phrase);
        }
    }

    expanded
}

/// Split a compound question into independently searchable sub-queries.
///
/// Conservative by design: only multi-question and explicit-conjunction
/// structure triggers a split, and the original query is always the first
/// element of the result.
pub fn decompose(query: &str) -> Vec<String> {
    let query = query.trim();
    let mut parts = vec![query.to_string()];

    // Short queries are never decomposed.
    if query.split_whitespace().count() < 5 {
        return parts;
    }

    // Multiple question marks: "¿X? ¿Y?"
    let questions: Vec<String> = QUESTION_MARK_SPLIT_RE
        .split(query)
        .map(|s| s.trim().trim_start_matches('¿').to_string())
        .filter(|s| s.split_whitespace().count() >= 2)
        .collect();
    if questions.len() >= 2 {
        for q in questions {
            push_unique(&mut parts, q);
        }
        return parts;
    }

    // Explicit coordinating conjunctions with substantial parts on each side.
    let segments: Vec<String> = CONJUNCTION_SPLIT_RE
        .split(query)
        .map(|s| s.trim().to_string())
        .filter(|s| s.split_whitespace().count() >= 3)
        .collect();
    if segments.len() >= 2 {
        for s in segments {
            push_unique(&mut parts, s);
        }
    }

    parts
}

fn push_unique(parts: &mut Vec<String>, candidate: String) {
    if !parts.iter().any(|p| p == &candidate) {
        parts.push(candidate);
    }
}
