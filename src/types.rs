use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Links pointing into the ticketing system mark a document as an actionable
/// ticket form rather than passive documentation.
static TICKET_LINK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)(servicedesk|/servicios/|jira|/ticket)")
        .expect("ticket link regex is valid")
});

/// A searchable document, uniform across all four sources.
///
/// `embedding` may be empty, in which case the document participates only in
/// keyword search. When present its length must match every other embedding
/// taking part in the same similarity comparison; mismatches score 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub source_link: Option<String>,
    /// Domain tag used for weighting and exclusion rules.
    #[serde(default)]
    pub category: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            keywords: Vec::new(),
            embedding: Vec::new(),
            source_link: None,
            category: None,
        }
    }

    /// True when the source link points into the ticketing system, i.e. the
    /// document describes an actionable ticket-creation form.
    pub fn is_ticket_form(&self) -> bool {
        self.source_link
            .as_deref()
            .is_some_and(|link| TICKET_LINK_RE.is_match(link))
    }
}

/// The four heterogeneous document sources plus user corrections, in fixed
/// priority-tier order.
///
/// Harvested solutions and user corrections come first because the
/// downstream LLM exhibits primacy bias; static documentation comes last.
/// The enum discriminant order IS the merge order; do not reorder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    /// Solutions mined from resolved support tickets. Validated, prefer these.
    HarvestedSolutions,
    /// User-submitted corrections to earlier answers.
    UserCorrections,
    /// Spreadsheet-derived documents describing ticket-creation forms.
    ContextForms,
    /// Confluence wiki pages.
    Wiki,
    /// Static local knowledge-base articles.
    KnowledgeBase,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::HarvestedSolutions,
        SourceKind::UserCorrections,
        SourceKind::ContextForms,
        SourceKind::Wiki,
        SourceKind::KnowledgeBase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::HarvestedSolutions => "harvested_solutions",
            SourceKind::UserCorrections => "user_corrections",
            SourceKind::ContextForms => "context_forms",
            SourceKind::Wiki => "wiki",
            SourceKind::KnowledgeBase => "knowledge_base",
        }
    }

    /// Label prefixed to entries of this tier in the rendered context block.
    pub fn context_label(&self) -> &'static str {
        match self {
            SourceKind::HarvestedSolutions => "Validated solution (prefer these)",
            SourceKind::UserCorrections => "User-submitted correction",
            SourceKind::ContextForms => "Ticket form",
            SourceKind::Wiki => "Wiki page",
            SourceKind::KnowledgeBase => "Knowledge base article",
        }
    }
}

/// Coarse purpose of a user query. Closed set so the weighting table stays
/// exhaustive and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    General,
    HowTo,
    TicketRequest,
    Lookup,
    Troubleshooting,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 5] = [
        QueryIntent::General,
        QueryIntent::HowTo,
        QueryIntent::TicketRequest,
        QueryIntent::Lookup,
        QueryIntent::Troubleshooting,
    ];
}

/// Coarse subject-matter area of a query. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryDomain {
    General,
    Sap,
    Network,
    Plm,
    Edi,
    Mes,
}

impl QueryDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryDomain::General => "General",
            QueryDomain::Sap => "SAP",
            QueryDomain::Network => "Network",
            QueryDomain::Plm => "PLM",
            QueryDomain::Edi => "EDI",
            QueryDomain::Mes => "MES",
        }
    }

    /// Lenient parse for labels coming from document categories or from the
    /// one-word LLM fallback classification. Unknown labels map to `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "general" => Some(QueryDomain::General),
            "sap" => Some(QueryDomain::Sap),
            "network" | "red" => Some(QueryDomain::Network),
            "plm" => Some(QueryDomain::Plm),
            "edi" => Some(QueryDomain::Edi),
            "mes" => Some(QueryDomain::Mes),
            _ => None,
        }
    }
}

/// A document paired with its fused score and 1-based rank within one
/// source's ranking. Created fresh per query, never persisted.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f64,
    pub rank: usize,
}

/// One source's contribution to a query: its ranked results plus the best
/// raw cosine similarity seen during the semantic pass. The low-confidence
/// gate operates on similarity scale, not RRF scale, so the raw value is
/// carried alongside the fused scores.
#[derive(Debug, Clone)]
pub struct SourceResults {
    pub kind: SourceKind,
    pub results: Vec<SearchResult>,
    pub best_similarity: f64,
}

/// One entry of the assembled context block.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub tier: SourceKind,
    pub document: Document,
    pub score: f64,
}

/// Ordered, size-bounded, priority-tagged evidence handed to the LLM.
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    pub entries: Vec<ContextEntry>,
    /// Identifiers of every document backing the answer, in final order.
    /// Required side-channel for the feedback subsystem, not telemetry.
    pub sources_used: Vec<String>,
    /// Best raw similarity across all sources, or `None` when the query ran
    /// keyword-only (embedding unavailable).
    pub best_similarity: Option<f64>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten into the prompt text handed to the chat completion call,
    /// preserving tier order and tier labels.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "[{}] {}\n{}\n\n",
                entry.tier.context_label(),
                entry.document.title,
                entry.document.content,
            ));
        }
        out
    }
}

/// A single prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// The answer to one `ask` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    pub success: bool,
    pub domain: String,
    pub low_confidence: bool,
    pub from_cache: bool,
    pub sources_used: Vec<String>,
}

/// Structured record handed to the feedback sink after each answered query,
/// so the learning subsystem knows exactly which documents backed an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub intent: QueryIntent,
    pub domain: QueryDomain,
    pub best_score: f64,
    pub low_confidence: bool,
    pub sources_used: Vec<String>,
}
