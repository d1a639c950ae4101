//! Text analysis: normalization, term extraction, domain keyword detection
//!
//! The helpdesk serves a bilingual (Spanish/English) user base, so the stop
//! word list and the domain keyword buckets carry both languages. All
//! matching happens on accent-folded lowercase text.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::types::QueryDomain;

/// Bilingual stop words dropped during term extraction.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Spanish
        "de", "la", "el", "en", "los", "las", "un", "una", "unos", "unas", "con", "por",
        "para", "del", "al", "se", "es", "son", "lo", "como", "mas", "pero", "sus", "le",
        "ya", "este", "esta", "estos", "estas", "si", "no", "que", "cual", "cuales",
        "quien", "donde", "cuando", "porque", "entre", "muy", "sin", "sobre", "tambien",
        "me", "mi", "tu", "su", "nos", "hay", "hasta", "desde", "todo", "toda", "todos",
        "otro", "otra", "ese", "esa", "eso", "algo", "puede", "puedo", "quiero", "tengo",
        "hacer", "tiene", "fue", "ser", "estar", "he", "ha", "han",
        // English
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
        "by", "from", "is", "are", "was", "were", "be", "been", "being", "this", "that",
        "these", "those", "it", "its", "as", "has", "have", "had", "do", "does", "did",
        "can", "could", "will", "would", "should", "what", "how", "when", "where", "who",
        "why", "which", "i", "you", "he", "she", "we", "they", "my", "your", "our", "their",
        "not", "there", "about", "into", "than", "then", "them", "some", "any", "all",
    ]
    .into_iter()
    .collect()
});

/// Punctuation treated as a token separator, covering Spanish inverted marks.
const SEPARATORS: [char; 12] = [' ', '?', '¿', '!', '¡', ',', '.', ':', ';', '"', '(', ')'];

/// Lowercase and fold common accented Latin characters to their base form.
pub fn normalize_for_search(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Split a query into deduplicated search terms.
///
/// Tokens shorter than `min_length` and stop words are dropped. First-seen
/// order is preserved so downstream keyword ranking stays deterministic.
pub fn extract_search_terms(query: &str, min_length: usize) -> Vec<String> {
    let normalized = normalize_for_search(query);
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for token in normalized.split(|c: char| SEPARATORS.contains(&c) || c == '\'' || c.is_whitespace()) {
        let token = token.trim();
        if token.len() < min_length || STOP_WORDS.contains(token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            terms.push(token.to_string());
        }
    }

    terms
}

/// Keyword buckets checked in specificity order; the first bucket with a hit
/// wins. Generic connectivity vocabulary sits last among the non-default
/// buckets so "red de planta MES" routes to MES, not Network.
const DOMAIN_BUCKETS: [(QueryDomain, &[&str]); 5] = [
    (
        QueryDomain::Sap,
        &[
            "sap", "fiori", "transaccion", "tcode", "hana", "logon", "sapgui", "abap",
            "orden de venta", "pedido sap",
        ],
    ),
    (
        QueryDomain::Plm,
        &["plm", "teamcenter", "cad", "plano 3d", "nx", "catia", "drawing"],
    ),
    (
        QueryDomain::Edi,
        &["edi", "idoc", "edifact", "as2", "x12", "intercambio electronico"],
    ),
    (
        QueryDomain::Mes,
        &["mes", "scada", "andon", "captura de planta", "terminal de fabrica"],
    ),
    (
        QueryDomain::Network,
        &[
            "red", "network", "wifi", "vpn", "zscaler", "internet", "conexion", "conectar",
            "conecto", "casa", "remoto", "teletrabajo", "proxy", "firewall", "impresora",
            "printer", "ethernet",
        ],
    ),
];

/// Map free text to a coarse system label, defaulting to General.
///
/// Single-word keywords match whole tokens only ("mes" must not fire inside
/// "mensaje"); multi-word keywords match as normalized substrings.
pub fn detect_system(text: &str) -> QueryDomain {
    let normalized = normalize_for_search(text);
    let tokens: HashSet<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    for (domain, keywords) in DOMAIN_BUCKETS {
        let hit = keywords.iter().any(|kw| {
            if kw.contains(' ') {
                normalized.contains(kw)
            } else {
                tokens.contains(kw)
            }
        });
        if hit {
            return domain;
        }
    }

    QueryDomain::General
}
