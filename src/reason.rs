//! Answer synthesis over retrieved evidence.
//!
//! Two strategies behind one interface, selected per request by configuration
//! and live availability:
//!
//! - **Extractive** — the answer is the top-scoring evidence snippet verbatim,
//!   cited once. Used when generation is disabled, unavailable, or has failed.
//! - **Generative** — assembles a bounded-context prompt, invokes the LLM
//!   capability under a timeout, and parses the completion into an answer plus
//!   claimed chunk-id citations (a trailing `SOURCES:` line).
//!
//! Generation faults (timeout, malformed output, capability errors) are
//! recoverable by design: the engine logs them and falls back to extractive
//! answering. A query never fails because the generation layer did.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::ReasoningError;
use crate::models::{Citation, Evidence};

/// Fixed answer used when no citation survives grounding validation.
pub const NO_GROUNDED_EVIDENCE: &str =
    "No grounded evidence was found to answer this question.";

/// Which strategy produced a draft. Drives the confidence formula downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningMode {
    Extractive,
    Generative,
}

/// An unvalidated answer: citations are still claims at this point.
#[derive(Debug, Clone)]
pub struct Draft {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub mode: ReasoningMode,
}

/// External text-completion capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError>;
}

/// One way of turning evidence into a draft answer.
#[async_trait]
pub trait ReasoningStrategy: Send + Sync {
    async fn draft(&self, question: &str, evidence: &[Evidence])
        -> Result<Draft, ReasoningError>;
}

/// Strategy: top-scoring snippet verbatim, cited once. Cannot fail.
pub struct Extractive;

#[async_trait]
impl ReasoningStrategy for Extractive {
    async fn draft(
        &self,
        _question: &str,
        evidence: &[Evidence],
    ) -> Result<Draft, ReasoningError> {
        Ok(extractive_answer(evidence))
    }
}

/// Strategy: bounded prompt, timed LLM call, parsed citations.
pub struct Generative {
    client: Box<dyn LlmClient>,
    config: LlmConfig,
}

#[async_trait]
impl ReasoningStrategy for Generative {
    async fn draft(&self, question: &str, evidence: &[Evidence]) -> Result<Draft, ReasoningError> {
        let prompt = build_prompt(question, evidence, self.config.context_budget_chars);

        let completion = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.client.complete(&prompt),
        )
        .await
        .map_err(|_| ReasoningError::Timeout(self.config.timeout_secs))??;

        parse_completion(&completion)
    }
}

/// Create the client named in the configuration. `None` when disabled.
pub fn create_client(config: &LlmConfig) -> Result<Option<Box<dyn LlmClient>>, ReasoningError> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Box::new(OpenAiLlm::new(config)?))),
        other => Err(ReasoningError::CapabilityUnavailable(format!(
            "unknown LLM provider: {}",
            other
        ))),
    }
}

/// Selects between the two strategies per request: generative when asked for
/// and available, extractive otherwise and as the fallback when generation
/// fails.
pub struct ReasoningEngine {
    extractive: Extractive,
    generative: Option<Generative>,
}

impl ReasoningEngine {
    pub fn new(llm: Option<Box<dyn LlmClient>>, config: LlmConfig) -> Self {
        Self {
            extractive: Extractive,
            generative: llm.map(|client| Generative { client, config }),
        }
    }

    /// Produce a draft answer. `use_llm` is the per-request switch; the
    /// generative strategy additionally requires a configured client.
    pub async fn answer(&self, question: &str, evidence: &[Evidence], use_llm: bool) -> Draft {
        if evidence.is_empty() {
            return Draft {
                answer: NO_GROUNDED_EVIDENCE.to_string(),
                citations: Vec::new(),
                mode: ReasoningMode::Extractive,
            };
        }

        if use_llm {
            if let Some(generative) = &self.generative {
                match generative.draft(question, evidence).await {
                    Ok(draft) => return draft,
                    Err(e) => {
                        tracing::warn!(error = %e, "generation failed, falling back to extractive");
                    }
                }
            }
        }

        match self.extractive.draft(question, evidence).await {
            Ok(draft) => draft,
            Err(_) => unreachable!("extractive strategy cannot fail"),
        }
    }
}

/// Build the extractive draft: top-scoring snippet verbatim, cited once.
pub fn extractive_answer(evidence: &[Evidence]) -> Draft {
    let top = &evidence[0];
    Draft {
        answer: top.snippet.clone(),
        citations: vec![Citation {
            chunk_id: top.chunk_id.clone(),
            claim_text: top.snippet.clone(),
        }],
        mode: ReasoningMode::Extractive,
    }
}

/// Assemble the prompt: question plus evidence snippets, cut off at the
/// character budget so the context never grows unboundedly.
pub fn build_prompt(question: &str, evidence: &[Evidence], budget_chars: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Answer the question using only the evidence excerpts below. \
         Cite the excerpts you used by ending your reply with one line:\n\
         SOURCES: <comma-separated excerpt ids>\n\n",
    );
    prompt.push_str(&format!("Question: {}\n\nExcerpts:\n", question));

    let mut used = 0usize;
    for ev in evidence {
        let block = format!(
            "[{}] ({}, page {})\n{}\n\n",
            ev.chunk_id, ev.filename, ev.page_index, ev.snippet
        );
        if used + block.chars().count() > budget_chars {
            break;
        }
        used += block.chars().count();
        prompt.push_str(&block);
    }

    prompt
}

/// Parse a completion into answer text plus claimed citations.
///
/// The contract with the model is a trailing `SOURCES:` line; a completion
/// without one, or with an empty answer, is malformed output.
pub fn parse_completion(completion: &str) -> Result<Draft, ReasoningError> {
    let mut sources_line = None;
    let mut answer_lines = Vec::new();

    for line in completion.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed
            .strip_prefix("SOURCES:")
            .or_else(|| trimmed.strip_prefix("Sources:"))
        {
            sources_line = Some(rest.trim().to_string());
        } else {
            answer_lines.push(line);
        }
    }

    let answer = answer_lines.join("\n").trim().to_string();
    if answer.is_empty() {
        return Err(ReasoningError::MalformedOutput(
            "completion contained no answer text".into(),
        ));
    }

    let sources = sources_line.ok_or_else(|| {
        ReasoningError::MalformedOutput("completion missing SOURCES line".into())
    })?;

    let citations: Vec<Citation> = sources
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim_matches(|c: char| c == '[' || c == ']'))
        .filter(|s| !s.is_empty())
        .map(|chunk_id| Citation {
            chunk_id: chunk_id.to_string(),
            claim_text: answer.clone(),
        })
        .collect();

    if citations.is_empty() {
        return Err(ReasoningError::MalformedOutput(
            "SOURCES line listed no chunk ids".into(),
        ));
    }

    Ok(Draft {
        answer,
        citations,
        mode: ReasoningMode::Generative,
    })
}

// ============ OpenAI client ============

/// Chat-completions client for the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAiLlm {
    model: String,
    timeout_secs: u64,
}

impl OpenAiLlm {
    pub fn new(config: &LlmConfig) -> Result<Self, ReasoningError> {
        let model = config.model.clone().ok_or_else(|| {
            ReasoningError::CapabilityUnavailable("llm.model required for openai provider".into())
        })?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(ReasoningError::CapabilityUnavailable(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }
        Ok(Self {
            model,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiLlm {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ReasoningError::CapabilityUnavailable("OPENAI_API_KEY not set".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ReasoningError::CapabilityUnavailable(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::CapabilityUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::CapabilityUnavailable(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::CapabilityUnavailable(e.to_string()))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ReasoningError::MalformedOutput("completion response missing content".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(chunk_id: &str, snippet: &str, score: f64) -> Evidence {
        Evidence {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            filename: "report.pdf".to_string(),
            page_index: 0,
            snippet: snippet.to_string(),
            score,
        }
    }

    struct ScriptedLlm(Result<String, ReasoningError>);

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, ReasoningError> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(ReasoningError::CapabilityUnavailable("scripted".into())),
            }
        }
    }

    #[test]
    fn extractive_uses_top_snippet_verbatim() {
        let ev = vec![
            evidence("d1:0000", "revenue was nine million", 0.91),
            evidence("d1:0001", "staff count doubled", 0.40),
        ];
        let draft = extractive_answer(&ev);
        assert_eq!(draft.answer, "revenue was nine million");
        assert_eq!(draft.citations.len(), 1);
        assert_eq!(draft.citations[0].chunk_id, "d1:0000");
        assert_eq!(draft.mode, ReasoningMode::Extractive);
    }

    #[test]
    fn parse_completion_extracts_answer_and_citations() {
        let draft = parse_completion(
            "Revenue was nine million dollars.\nSOURCES: d1:0000, d1:0003",
        )
        .unwrap();
        assert_eq!(draft.answer, "Revenue was nine million dollars.");
        let ids: Vec<&str> = draft.citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["d1:0000", "d1:0003"]);
        assert_eq!(draft.mode, ReasoningMode::Generative);
    }

    #[test]
    fn parse_completion_accepts_bracketed_ids() {
        let draft = parse_completion("Answer text.\nSOURCES: [d1:0002]").unwrap();
        assert_eq!(draft.citations[0].chunk_id, "d1:0002");
    }

    #[test]
    fn completion_without_sources_is_malformed() {
        let err = parse_completion("Just an answer, no citation line.").unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedOutput(_)));
    }

    #[test]
    fn completion_without_answer_is_malformed() {
        let err = parse_completion("SOURCES: d1:0000").unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedOutput(_)));
    }

    #[test]
    fn prompt_respects_context_budget() {
        let ev: Vec<Evidence> = (0..20)
            .map(|i| evidence(&format!("d1:{:04}", i), &"word ".repeat(50), 0.5))
            .collect();
        let prompt = build_prompt("q?", &ev, 800);
        // Header plus however many blocks fit, never the full 20
        assert!(prompt.chars().count() < 1200);
        assert!(prompt.contains("d1:0000"));
        assert!(!prompt.contains("d1:0019"));
    }

    #[tokio::test]
    async fn engine_falls_back_on_capability_failure() {
        let engine = ReasoningEngine::new(
            Some(Box::new(ScriptedLlm(Err(ReasoningError::CapabilityUnavailable(
                "down".into(),
            ))))),
            LlmConfig::default(),
        );
        let ev = vec![evidence("d1:0000", "the snippet", 0.8)];
        let draft = engine.answer("question", &ev, true).await;
        assert_eq!(draft.mode, ReasoningMode::Extractive);
        assert_eq!(draft.answer, "the snippet");
    }

    #[tokio::test]
    async fn engine_falls_back_on_malformed_output() {
        let engine = ReasoningEngine::new(
            Some(Box::new(ScriptedLlm(Ok("no sources line here".into())))),
            LlmConfig::default(),
        );
        let ev = vec![evidence("d1:0000", "the snippet", 0.8)];
        let draft = engine.answer("question", &ev, true).await;
        assert_eq!(draft.mode, ReasoningMode::Extractive);
    }

    #[tokio::test]
    async fn engine_respects_use_llm_false() {
        let engine = ReasoningEngine::new(
            Some(Box::new(ScriptedLlm(Ok("Generated.\nSOURCES: d1:0000".into())))),
            LlmConfig::default(),
        );
        let ev = vec![evidence("d1:0000", "the snippet", 0.8)];
        let draft = engine.answer("question", &ev, false).await;
        assert_eq!(draft.mode, ReasoningMode::Extractive);
    }

    #[tokio::test]
    async fn engine_uses_generative_when_available() {
        let engine = ReasoningEngine::new(
            Some(Box::new(ScriptedLlm(Ok(
                "Generated answer.\nSOURCES: d1:0000".into()
            )))),
            LlmConfig::default(),
        );
        let ev = vec![evidence("d1:0000", "the snippet", 0.8)];
        let draft = engine.answer("question", &ev, true).await;
        assert_eq!(draft.mode, ReasoningMode::Generative);
        assert_eq!(draft.answer, "Generated answer.");
    }

    #[tokio::test]
    async fn empty_evidence_yields_no_grounded_answer() {
        let engine = ReasoningEngine::new(None, LlmConfig::default());
        let draft = engine.answer("question", &[], true).await;
        assert_eq!(draft.answer, NO_GROUNDED_EVIDENCE);
        assert!(draft.citations.is_empty());
    }
}
