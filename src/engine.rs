//! Query orchestration
//!
//! `AssistantEngine::ask` is the single operation this crate exposes to the
//! chat/UI layer: ambiguity gate, intent/domain classification, two-tier
//! cache probe, expansion, concurrent multi-source retrieval, context
//! assembly, the low-confidence gate, and the chat completion call with
//! bounded retry. The engine is the dependency-injection root: it owns the
//! cache and the collaborator handles, and nothing in here is a global.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::assembler::ContextAssembler;
use crate::cache::QueryCache;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::expand::{decompose, expand_with_synonyms};
use crate::intent::{system_prompt, IntentClassifier};
use crate::providers::{
    ChatClient, DocumentSource, DomainClassifier, EmbeddingClient, FeedbackSink,
};
use crate::retriever::HybridRetriever;
use crate::text::extract_search_terms;
use crate::types::{AgentResponse, ChatTurn, FeedbackRecord, QueryDomain, QueryIntent};

const LOW_CONFIDENCE_ANSWER: &str =
    "No he encontrado información suficientemente fiable para responder con seguridad. \
     Te recomiendo abrir un ticket para que el equipo de soporte lo revise. / I could \
     not find reliable enough information to answer confidently; please consider \
     opening a support ticket.";

const CHAT_FAILURE_ANSWER: &str =
    "El asistente no ha podido generar una respuesta en este momento. Inténtalo de \
     nuevo en unos minutos. / The assistant could not produce an answer right now; \
     please try again in a few minutes.";

pub struct AssistantEngine {
    config: AgentConfig,
    classifier: IntentClassifier,
    retriever: HybridRetriever,
    assembler: ContextAssembler,
    cache: Arc<QueryCache>,
    sources: Vec<Arc<dyn DocumentSource>>,
    chat: Arc<dyn ChatClient>,
    feedback: Option<Arc<dyn FeedbackSink>>,
}

impl AssistantEngine {
    pub fn new(
        config: AgentConfig,
        sources: Vec<Arc<dyn DocumentSource>>,
        embedder: Arc<dyn EmbeddingClient>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        let classifier = IntentClassifier::new(&config);
        let retriever =
            HybridRetriever::new(embedder, config.search.clone(), config.timeouts.clone());
        let assembler = ContextAssembler::new(config.context.clone());
        let cache = Arc::new(QueryCache::new(config.cache.clone()));

        Self { config, classifier, retriever, assembler, cache, sources, chat, feedback: None }
    }

    /// Install the LLM domain-classification fallback (optional).
    pub fn with_domain_fallback(mut self, fallback: Arc<dyn DomainClassifier>) -> Self {
        self.classifier = self.classifier.with_domain_fallback(fallback);
        self
    }

    /// Install the feedback sink (optional).
    pub fn with_feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(sink);
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Answer one user question.
    ///
    /// The only error surfaced is `Cancelled` (the caller is gone). Every
    /// other failure mode folds into the `AgentResponse`: clarification for
    /// ambiguous queries, an escalation suggestion on low confidence,
    /// `success: false` when the chat completion ultimately fails.
    pub async fn ask(
        &self,
        question: &str,
        history: &[ChatTurn],
        cancel: CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        let question = question.trim();
        self.ensure_live(&cancel)?;

        // Ambiguity gate: under-specified queries get a clarification prompt
        // with zero retrieval and zero LLM spend.
        if self.classifier.is_ambiguous(question) {
            let (domain, clarification) = self.classifier.clarification(question);
            tracing::info!(domain = domain.as_str(), "Ambiguous query, asking for details");
            return Ok(AgentResponse {
                answer: clarification,
                success: true,
                domain: domain.as_str().to_string(),
                low_confidence: false,
                from_cache: false,
                sources_used: Vec::new(),
            });
        }

        let (intent, domain) = self.classifier.classify(question).await;
        self.ensure_live(&cancel)?;

        if let Some(hit) = self.cache.get_exact(question) {
            return Ok(cached_response(hit, domain));
        }

        // One embedding per query, reused by the semantic cache tier and
        // every source's semantic pass. Failure degrades to keyword-only.
        let embedding = self.retriever.embed_query(question).await;
        self.ensure_live(&cancel)?;

        if let Some(embedding) = embedding.as_deref() {
            if let Some(hit) = self.cache.get_semantic(embedding) {
                return Ok(cached_response(hit, domain));
            }
        }

        // Expansion widens recall; expanded text is never shown to the user.
        let expanded = expand_with_synonyms(question);
        let mut search_terms = extract_search_terms(&expanded, 2);
        search_terms.push(expanded.clone());
        for sub_query in decompose(question).into_iter().skip(1) {
            search_terms.push(sub_query);
        }

        // Fan-out/fan-in barrier across all sources; abandoning it on
        // cancellation is safe because nothing has been written yet.
        let per_source = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            results = self.retriever.search_all(
                &self.sources,
                question,
                &search_terms,
                embedding.as_deref(),
            ) => results,
        };

        let block = self.assembler.assemble(&per_source, intent, domain);
        let best_score = block.best_similarity.unwrap_or(0.0);
        let low_confidence = if embedding.is_some() {
            best_score < self.config.search.relevance_threshold
        } else {
            block.is_empty()
        };

        tracing::info!(
            intent = ?intent,
            domain = domain.as_str(),
            entries = block.entries.len(),
            best_score,
            low_confidence,
            "Context assembled"
        );

        if low_confidence {
            // Let the caller decide whether to escalate before spending an
            // LLM call on evidence this weak.
            self.emit_feedback(intent, domain, best_score, true, block.sources_used.clone())
                .await;
            return Ok(AgentResponse {
                answer: LOW_CONFIDENCE_ANSWER.to_string(),
                success: true,
                domain: domain.as_str().to_string(),
                low_confidence: true,
                from_cache: false,
                sources_used: block.sources_used,
            });
        }

        self.ensure_live(&cancel)?;
        let context_text = block.render();
        let mut turns = history.to_vec();
        turns.push(ChatTurn::user(question));

        let answer = match self.complete_with_retry(domain, &context_text, &turns, &cancel).await {
            Ok(answer) => answer,
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                tracing::error!(error = %e, "Chat completion failed after retries");
                return Ok(AgentResponse {
                    answer: CHAT_FAILURE_ANSWER.to_string(),
                    success: false,
                    domain: domain.as_str().to_string(),
                    low_confidence: false,
                    from_cache: false,
                    sources_used: block.sources_used,
                });
            }
        };

        // Cache writes happen only here, strictly after fan-in and a
        // successful completion. The caller may have disconnected during the
        // chat call, so liveness is re-checked before touching the cache.
        self.ensure_live(&cancel)?;
        self.cache.put(question, embedding.as_deref(), &answer, &block.sources_used);
        self.emit_feedback(intent, domain, best_score, false, block.sources_used.clone())
            .await;
        Ok(AgentResponse {
            answer,
            success: true,
            domain: domain.as_str().to_string(),
            low_confidence: false,
            from_cache: false,
            sources_used: block.sources_used,
        })
    }

    /// Chat completion with bounded retry and linear backoff, raced against
    /// the caller's cancellation signal. Idempotent given the same assembled
    /// context, which is what makes the retry safe.
    async fn complete_with_retry(
        &self,
        domain: QueryDomain,
        context: &str,
        turns: &[ChatTurn],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let prompt = system_prompt(domain);
        let mut last_error = String::new();

        for attempt in 0..=self.config.timeouts.chat_retries {
            self.ensure_live(cancel)?;
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }

            let call =
                tokio::time::timeout(self.config.timeouts.chat(), self.chat.complete(prompt, context, turns));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                outcome = call => outcome,
            };
            match outcome {
                Ok(Ok(answer)) => return Ok(answer),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = "chat completion timed out".to_string(),
            }
            tracing::warn!(attempt, error = %last_error, "Chat completion attempt failed");
        }

        Err(AgentError::ChatCompletion(last_error))
    }

    async fn emit_feedback(
        &self,
        intent: QueryIntent,
        domain: QueryDomain,
        best_score: f64,
        low_confidence: bool,
        sources_used: Vec<String>,
    ) {
        if let Some(sink) = &self.feedback {
            sink.record(FeedbackRecord { intent, domain, best_score, low_confidence, sources_used })
                .await;
        }
    }

    fn ensure_live(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        if cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn cached_response(hit: crate::cache::CachedResponse, domain: QueryDomain) -> AgentResponse {
    AgentResponse {
        answer: hit.response,
        success: true,
        domain: domain.as_str().to_string(),
        low_confidence: false,
        from_cache: true,
        sources_used: hit.sources_used,
    }
}
