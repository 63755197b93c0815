//! Grounding validation and confidence scoring.
//!
//! Every draft answer passes through here before it is returned. Claimed
//! citations that do not refer to retrieved evidence are dropped, confidence
//! is computed from what survives, and the final result shape is checked so
//! a malformed result can never leave the query path.

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::models::{Evidence, QueryResult};
use crate::reason::{Draft, ReasoningMode, NO_GROUNDED_EVIDENCE};

/// Turn a draft into a validated [`QueryResult`].
///
/// Citation grounding: a citation survives only if its chunk id appears in
/// the retrieved evidence. Confidence:
///
/// - extractive: the top evidence similarity, clamped to `[0, 1]`
/// - generative: `0.5 * mean(similarity of cited evidence) +
///   0.5 * (surviving / claimed citations)`, clamped to `[0, 1]`
///
/// If every generative citation was fabricated the answer itself is not
/// trustworthy and is replaced wholesale.
pub fn finalize(draft: Draft, evidence: Vec<Evidence>, max_answer_chars: usize) -> QueryResult {
    let scores: HashMap<&str, f64> = evidence
        .iter()
        .map(|ev| (ev.chunk_id.as_str(), ev.score))
        .collect();

    let claimed = draft.citations.len();
    let surviving: Vec<_> = draft
        .citations
        .into_iter()
        .filter(|c| {
            let known = scores.contains_key(c.chunk_id.as_str());
            if !known {
                tracing::warn!(chunk_id = %c.chunk_id, "dropping ungrounded citation");
            }
            known
        })
        .collect();

    let (answer, confidence) = match draft.mode {
        ReasoningMode::Extractive => {
            let confidence = evidence.first().map(|ev| ev.score).unwrap_or(0.0);
            (draft.answer, confidence)
        }
        ReasoningMode::Generative => {
            if surviving.is_empty() {
                (NO_GROUNDED_EVIDENCE.to_string(), 0.0)
            } else {
                let mean_score = surviving
                    .iter()
                    .map(|c| scores[c.chunk_id.as_str()])
                    .sum::<f64>()
                    / surviving.len() as f64;
                let survival = surviving.len() as f64 / claimed as f64;
                (draft.answer, 0.5 * mean_score + 0.5 * survival)
            }
        }
    };

    let result = QueryResult {
        answer: truncate_chars(&answer, max_answer_chars),
        confidence: confidence.clamp(0.0, 1.0),
        citations: surviving,
        evidence,
    };

    match check_shape(&result) {
        Ok(()) => result,
        Err(e) => {
            tracing::error!(error = %e, "query result failed shape validation");
            safe_fallback(result.evidence)
        }
    }
}

/// Structural checks on an outgoing result. These should never fire; when
/// one does it indicates a bug upstream and the caller substitutes a
/// fallback rather than returning the broken result.
pub fn check_shape(result: &QueryResult) -> Result<(), ValidationError> {
    if result.answer.is_empty() {
        return Err(ValidationError::SchemaMismatch("empty answer".into()));
    }
    if !(0.0..=1.0).contains(&result.confidence) || result.confidence.is_nan() {
        return Err(ValidationError::SchemaMismatch(format!(
            "confidence out of range: {}",
            result.confidence
        )));
    }
    for pair in result.evidence.windows(2) {
        if pair[0].score < pair[1].score {
            return Err(ValidationError::SchemaMismatch(
                "evidence not sorted by score".into(),
            ));
        }
    }
    for citation in &result.citations {
        if !result
            .evidence
            .iter()
            .any(|ev| ev.chunk_id == citation.chunk_id)
        {
            return Err(ValidationError::SchemaMismatch(format!(
                "citation {} not backed by evidence",
                citation.chunk_id
            )));
        }
    }
    Ok(())
}

/// Minimal result that always satisfies the shape checks.
pub fn safe_fallback(evidence: Vec<Evidence>) -> QueryResult {
    QueryResult {
        answer: NO_GROUNDED_EVIDENCE.to_string(),
        confidence: 0.0,
        citations: Vec::new(),
        evidence,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Citation;

    fn evidence(chunk_id: &str, score: f64) -> Evidence {
        Evidence {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            filename: "report.pdf".to_string(),
            page_index: 0,
            snippet: format!("snippet for {}", chunk_id),
            score,
        }
    }

    fn citation(chunk_id: &str) -> Citation {
        Citation {
            chunk_id: chunk_id.to_string(),
            claim_text: "the claim".to_string(),
        }
    }

    #[test]
    fn extractive_confidence_is_top_score() {
        let ev = vec![evidence("d1:0000", 0.82), evidence("d1:0001", 0.4)];
        let draft = Draft {
            answer: "snippet for d1:0000".into(),
            citations: vec![citation("d1:0000")],
            mode: ReasoningMode::Extractive,
        };
        let result = finalize(draft, ev, 2000);
        assert!((result.confidence - 0.82).abs() < 1e-9);
        assert_eq!(result.citations.len(), 1);
    }

    #[test]
    fn generative_confidence_blends_score_and_survival() {
        let ev = vec![evidence("d1:0000", 0.8), evidence("d1:0001", 0.6)];
        // Two claimed, one fabricated: mean cited score 0.8, survival 1/2
        let draft = Draft {
            answer: "generated".into(),
            citations: vec![citation("d1:0000"), citation("d9:0007")],
            mode: ReasoningMode::Generative,
        };
        let result = finalize(draft, ev, 2000);
        assert!((result.confidence - (0.5 * 0.8 + 0.5 * 0.5)).abs() < 1e-9);
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].chunk_id, "d1:0000");
        assert_eq!(result.answer, "generated");
    }

    #[test]
    fn all_citations_fabricated_zeroes_confidence_and_replaces_answer() {
        let ev = vec![evidence("d1:0000", 0.9)];
        let draft = Draft {
            answer: "hallucinated".into(),
            citations: vec![citation("dX:0000"), citation("dY:0001")],
            mode: ReasoningMode::Generative,
        };
        let result = finalize(draft, ev, 2000);
        assert_eq!(result.answer, NO_GROUNDED_EVIDENCE);
        assert_eq!(result.confidence, 0.0);
        assert!(result.citations.is_empty());
    }

    #[test]
    fn answer_is_capped_at_max_chars() {
        let ev = vec![evidence("d1:0000", 0.7)];
        let draft = Draft {
            answer: "x".repeat(5000),
            citations: vec![citation("d1:0000")],
            mode: ReasoningMode::Generative,
        };
        let result = finalize(draft, ev, 2000);
        assert_eq!(result.answer.chars().count(), 2000);
    }

    #[test]
    fn empty_evidence_extractive_draft_yields_zero_confidence() {
        let draft = Draft {
            answer: NO_GROUNDED_EVIDENCE.into(),
            citations: Vec::new(),
            mode: ReasoningMode::Extractive,
        };
        let result = finalize(draft, Vec::new(), 2000);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.answer, NO_GROUNDED_EVIDENCE);
    }

    #[test]
    fn shape_check_rejects_unsorted_evidence() {
        let result = QueryResult {
            answer: "a".into(),
            confidence: 0.5,
            citations: Vec::new(),
            evidence: vec![evidence("d1:0000", 0.2), evidence("d1:0001", 0.9)],
        };
        assert!(check_shape(&result).is_err());
    }

    #[test]
    fn shape_check_rejects_unbacked_citation() {
        let result = QueryResult {
            answer: "a".into(),
            confidence: 0.5,
            citations: vec![citation("d2:0000")],
            evidence: vec![evidence("d1:0000", 0.9)],
        };
        assert!(check_shape(&result).is_err());
    }

    #[test]
    fn safe_fallback_passes_shape_check() {
        let fallback = safe_fallback(vec![evidence("d1:0000", 0.9)]);
        assert!(check_shape(&fallback).is_ok());
    }
}
