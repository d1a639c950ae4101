//! Intent and domain classification
//!
//! Rule-based classification over closed enums, with an optional LLM
//! fallback for domain routing. The rule tables are the primary, testable
//! path; the LLM call is a narrow escape hatch with a strict timeout and a
//! default-to-General failure mode.
//!
//! Also owns the ambiguity gate: under-specified queries short-circuit to a
//! clarification prompt before any retrieval or LLM spend, as a hard cost
//! bound.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::providers::DomainClassifier;
use crate::text::{detect_system, normalize_for_search};
use crate::types::{QueryDomain, QueryIntent, SourceKind};

/// SAP transaction codes: two letters followed by two digits (VA01, ME21).
static TCODE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b[a-z]{2}\d{2}\b").expect("tcode regex is valid")
});

/// Terms specific enough that a two-token query mentioning one of them is
/// still answerable ("vpn caida" needs no clarification).
const SPECIFIC_TERMS: &[&str] = &[
    "sap", "fiori", "idoc", "vpn", "zscaler", "wifi", "edi", "plm", "mes", "teamcenter",
    "outlook", "teams", "impresora", "printer", "password", "contrasena", "proxy",
];

/// Intent keyword tables, checked in priority order. Phrases containing a
/// space match as substrings of the normalized query, single words match
/// whole tokens.
const TICKET_PHRASES: &[&str] = &[
    "crear ticket", "abrir ticket", "abrir un ticket", "crear una peticion", "solicitar",
    "solicitud", "dar de alta", "alta de usuario", "necesito acceso", "necesito permiso",
    "request access", "open a ticket", "create a ticket", "new request",
];
const TROUBLESHOOT_PHRASES: &[&str] = &[
    "error", "falla", "fallo", "no funciona", "no puedo", "no me deja", "problema",
    "incidencia", "bloqueado", "bloqueada", "caido", "caida", "not working", "issue",
    "crash", "broken", "fails",
];
const HOWTO_PHRASES: &[&str] = &[
    "como", "how", "pasos", "steps", "tutorial", "manual", "guia", "configurar",
    "instalar", "setup", "install",
];
const LOOKUP_PHRASES: &[&str] = &[
    "que es", "what is", "donde", "where", "quien", "who", "estado", "status", "cuanto",
    "cual es",
];

fn matches_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        if p.contains(' ') {
            normalized.contains(p)
        } else {
            normalized
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == *p)
        }
    })
}

/// Keyword classification of query purpose. Ticket requests outrank
/// troubleshooting, which outranks how-to: "no puedo crear ticket de SAP"
/// is a ticket request, "¿cómo soluciono el error?" is troubleshooting.
pub fn classify_intent(query: &str) -> QueryIntent {
    let normalized = normalize_for_search(query);

    if matches_any(&normalized, TICKET_PHRASES) {
        QueryIntent::TicketRequest
    } else if matches_any(&normalized, TROUBLESHOOT_PHRASES) {
        QueryIntent::Troubleshooting
    } else if matches_any(&normalized, HOWTO_PHRASES) {
        QueryIntent::HowTo
    } else if matches_any(&normalized, LOOKUP_PHRASES) {
        QueryIntent::Lookup
    } else {
        QueryIntent::General
    }
}

/// Fixed positive weight for every (intent, source) pair, applied by the
/// context assembler before merging. Exhaustive by construction: adding an
/// intent or a source without extending this table is a compile error.
pub fn source_weight(intent: QueryIntent, source: SourceKind) -> f64 {
    use QueryIntent::*;
    use SourceKind::*;

    match (intent, source) {
        (General, HarvestedSolutions) => 1.0,
        (General, UserCorrections) => 1.0,
        (General, ContextForms) => 1.0,
        (General, Wiki) => 1.0,
        (General, KnowledgeBase) => 1.0,

        (HowTo, HarvestedSolutions) => 1.2,
        (HowTo, UserCorrections) => 1.1,
        (HowTo, ContextForms) => 0.7,
        (HowTo, Wiki) => 1.5,
        (HowTo, KnowledgeBase) => 1.3,

        // Ticket requests weight the ticket-form source far above
        // documentation sources.
        (TicketRequest, HarvestedSolutions) => 1.2,
        (TicketRequest, UserCorrections) => 1.2,
        (TicketRequest, ContextForms) => 2.5,
        (TicketRequest, Wiki) => 0.6,
        (TicketRequest, KnowledgeBase) => 0.5,

        (Lookup, HarvestedSolutions) => 0.8,
        (Lookup, UserCorrections) => 0.8,
        (Lookup, ContextForms) => 0.9,
        (Lookup, Wiki) => 1.3,
        (Lookup, KnowledgeBase) => 1.4,

        (Troubleshooting, HarvestedSolutions) => 1.8,
        (Troubleshooting, UserCorrections) => 1.5,
        (Troubleshooting, ContextForms) => 0.8,
        (Troubleshooting, Wiki) => 0.9,
        (Troubleshooting, KnowledgeBase) => 1.0,
    }
}

/// Per-domain system prompt handed to the chat completion call.
pub fn system_prompt(domain: QueryDomain) -> &'static str {
    match domain {
        QueryDomain::Sap => {
            "You are the SAP support assistant for internal IT operations. Answer using \
             the provided context. Mention transaction codes when relevant. Reply in the \
             user's language."
        }
        QueryDomain::Network => {
            "You are the network support assistant for internal IT operations. Answer \
             using the provided context, covering VPN, Zscaler, Wi-Fi and printer \
             connectivity. Reply in the user's language."
        }
        QueryDomain::Plm => {
            "You are the PLM/Teamcenter support assistant. Answer using the provided \
             context. Reply in the user's language."
        }
        QueryDomain::Edi => {
            "You are the EDI support assistant. Answer using the provided context, \
             covering IDocs and partner message flows. Reply in the user's language."
        }
        QueryDomain::Mes => {
            "You are the MES/plant-systems support assistant. Answer using the provided \
             context. Reply in the user's language."
        }
        QueryDomain::General => {
            "You are the internal IT support assistant. Answer using the provided \
             context. If the context does not cover the question, say so and suggest \
             opening a ticket. Reply in the user's language."
        }
    }
}

/// State-free rule classification plus the optional LLM domain fallback.
pub struct IntentClassifier {
    min_chars: usize,
    max_vague_tokens: usize,
    fallback_timeout: Duration,
    domain_fallback: Option<Arc<dyn DomainClassifier>>,
}

impl IntentClassifier {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            min_chars: config.ambiguity.min_chars,
            max_vague_tokens: config.ambiguity.max_vague_tokens,
            fallback_timeout: config.timeouts.domain_fallback(),
            domain_fallback: None,
        }
    }

    pub fn with_domain_fallback(mut self, fallback: Arc<dyn DomainClassifier>) -> Self {
        self.domain_fallback = Some(fallback);
        self
    }

    /// Classify a query into (intent, domain). Domain routing tries the
    /// keyword buckets and the transaction-code pattern first; only when no
    /// rule fires is the LLM fallback consulted, and any failure of that
    /// external call degrades to General.
    pub async fn classify(&self, query: &str) -> (QueryIntent, QueryDomain) {
        let intent = classify_intent(query);

        let domain = match detect_system(query) {
            QueryDomain::General if TCODE_RE.is_match(query) => QueryDomain::Sap,
            QueryDomain::General => self.fallback_domain(query).await,
            ruled => ruled,
        };

        tracing::debug!(intent = ?intent, domain = ?domain, "Query classified");
        (intent, domain)
    }

    async fn fallback_domain(&self, query: &str) -> QueryDomain {
        let Some(fallback) = &self.domain_fallback else {
            return QueryDomain::General;
        };

        match tokio::time::timeout(self.fallback_timeout, fallback.classify_domain(query)).await {
            Ok(Ok(domain)) => domain,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Domain fallback failed, defaulting to General");
                QueryDomain::General
            }
            Err(_) => {
                tracing::warn!("Domain fallback timed out, defaulting to General");
                QueryDomain::General
            }
        }
    }

    /// A query is ambiguous when it is too short to carry a problem
    /// description, or has at most `max_vague_tokens` tokens none of which
    /// is specific enough to retrieve on.
    pub fn is_ambiguous(&self, query: &str) -> bool {
        let trimmed = query.trim();
        if trimmed.chars().count() < self.min_chars {
            return true;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.len() <= self.max_vague_tokens {
            let normalized = normalize_for_search(trimmed);
            return !SPECIFIC_TERMS.iter().any(|t| {
                normalized
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|token| token == *t)
            });
        }

        false
    }

    /// Domain-tailored clarification prompt for an ambiguous query, chosen
    /// by scanning for domain hint keywords. Bilingual, mirroring the user
    /// base.
    pub fn clarification(&self, query: &str) -> (QueryDomain, String) {
        let normalized = normalize_for_search(query);
        let hint = |words: &[&str]| words.iter().any(|w| normalized.contains(w));

        if hint(&["sap", "fiori", "transaccion"]) {
            (
                QueryDomain::Sap,
                "¿Podrías dar más detalles? Indica la transacción de SAP y el mensaje de \
                 error exacto. / Please share the SAP transaction code and the exact error \
                 message."
                    .to_string(),
            )
        } else if hint(&["red", "vpn", "wifi", "internet", "conexion", "impresora"]) {
            (
                QueryDomain::Network,
                "¿Podrías dar más detalles? ¿Estás en la oficina o en remoto, y qué equipo \
                 o red falla? / Are you on-site or remote, and which device or network is \
                 failing?"
                    .to_string(),
            )
        } else {
            (
                QueryDomain::General,
                "¿Podrías dar más detalles sobre tu consulta? Indica el sistema (SAP, red, \
                 impresora...) y qué estabas intentando hacer. / Please describe the system \
                 involved and what you were trying to do."
                    .to_string(),
            )
        }
    }
}
