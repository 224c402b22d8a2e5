//! Ranker: engagement heuristic with a language-model re-ranking step.
//!
//! Selection is two-stage. The primary stage asks a model to choose among the
//! top candidates and returns a `Result`; any failure there resolves to the
//! pure [`fallback`] pick. Errors from the model never reach the caller.

use crate::error::UpstreamError;
use crate::types::CandidatePost;
use serde::Deserialize;
use std::fmt::Write as _;
use thiserror::Error;

/// Number of top-engagement candidates shown to the model.
pub const PROMPT_SET_SIZE: usize = 6;

/// Selection reason attached when the model's answer is not used.
pub const FALLBACK_REASON: &str = "Fallback: highest engagement";

const PROMPT_HEADER: &str = "\
You are a meme expert. Pick ONE meme that is:
- trending right now (high engagement)
- has 1-2 clear, front-facing faces (ideal for face-swap)
- SFW, not text-only, not a crowd

Return ONLY JSON: {\"index\": 0, \"reason\": \"short reason\"}

Memes:
";

/// A text-completion backend used for re-ranking.
pub trait SelectionModel {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}

#[derive(Error, Debug)]
pub enum RankError {
    #[error("model call failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("malformed model response: {0}")]
    Malformed(String),
    #[error("model chose index {index}, only {considered} candidates were offered")]
    IndexOutOfRange { index: i64, considered: usize },
}

/// The model's choice, validated against the prompt set.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub reason: String,
}

#[derive(Deserialize)]
struct RawSelection {
    index: i64,
    reason: String,
}

pub struct Ranker<M> {
    model: M,
}

impl<M: SelectionModel> Ranker<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Pick one candidate, annotated with why it was chosen.
    ///
    /// Returns `None` only for an empty list.
    pub fn pick_best(&self, candidates: &[CandidatePost]) -> Option<CandidatePost> {
        if candidates.is_empty() {
            return None;
        }

        let prompt_set = top_by_engagement(candidates, PROMPT_SET_SIZE);
        match self.primary(&prompt_set) {
            Ok(selection) => {
                tracing::info!(index = selection.index, reason = %selection.reason, "model selected meme");
                Some(prompt_set[selection.index].with_reason(selection.reason))
            }
            Err(e) => {
                tracing::warn!(error = %e, "model selection failed, using fallback");
                fallback(candidates)
            }
        }
    }

    fn primary(&self, prompt_set: &[&CandidatePost]) -> Result<Selection, RankError> {
        let prompt = build_prompt(prompt_set);
        let response = self.model.complete(&prompt)?;
        parse_selection(&response, prompt_set.len())
    }
}

/// Highest-engagement candidate with [`FALLBACK_REASON`]. Ties go to the
/// first candidate in input order.
pub fn fallback(candidates: &[CandidatePost]) -> Option<CandidatePost> {
    top_by_engagement(candidates, 1)
        .first()
        .map(|c| c.with_reason(FALLBACK_REASON))
}

/// The `n` highest-engagement candidates; stable, so ties keep input order.
pub fn top_by_engagement(candidates: &[CandidatePost], n: usize) -> Vec<&CandidatePost> {
    let mut sorted: Vec<&CandidatePost> = candidates.iter().collect();
    sorted.sort_by(|a, b| b.engagement().total_cmp(&a.engagement()));
    sorted.truncate(n);
    sorted
}

/// Enumerate the prompt set with rounded engagement.
pub fn build_prompt(prompt_set: &[&CandidatePost]) -> String {
    let mut prompt = String::from(PROMPT_HEADER);
    for (i, c) in prompt_set.iter().enumerate() {
        let _ = writeln!(prompt, "{i}: \"{}\" (engagement≈{:.0})", c.title, c.engagement());
    }
    prompt
}

/// Parse `{"index": int, "reason": string}` and check the index is in
/// `[0, considered)`. Tolerates surrounding whitespace and a Markdown code fence.
pub fn parse_selection(response: &str, considered: usize) -> Result<Selection, RankError> {
    let body = strip_code_fence(response.trim());
    let raw: RawSelection =
        serde_json::from_str(body).map_err(|e| RankError::Malformed(e.to_string()))?;

    match usize::try_from(raw.index) {
        Ok(index) if index < considered => Ok(Selection { index, reason: raw.reason }),
        _ => Err(RankError::IndexOutOfRange { index: raw.index, considered }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::cell::RefCell;

    fn post(title: &str, score: i64, comments: i64) -> CandidatePost {
        CandidatePost {
            source: "Reddit".into(),
            title: title.into(),
            url: format!("https://i.redd.it/{title}.jpg"),
            score,
            comments,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            selection_reason: None,
        }
    }

    /// Model returning a canned response and recording prompts.
    struct CannedModel {
        response: Result<String, ()>,
        prompts: RefCell<Vec<String>>,
    }

    impl CannedModel {
        fn ok(text: &str) -> Self {
            Self { response: Ok(text.into()), prompts: RefCell::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { response: Err(()), prompts: RefCell::new(Vec::new()) }
        }
    }

    impl SelectionModel for CannedModel {
        fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.response
                .clone()
                .map_err(|_| UpstreamError::Timeout { service: "xai" })
        }
    }

    #[test]
    fn test_empty_candidates_returns_none_without_calling_model() {
        let ranker = Ranker::new(CannedModel::ok(r#"{"index":0,"reason":"x"}"#));
        assert!(ranker.pick_best(&[]).is_none());
        assert!(ranker.model.prompts.borrow().is_empty());
    }

    #[test]
    fn test_fallback_scenario_engagement() {
        // 300 + 15 = 315 beats 250 + 60 = 310
        let candidates = vec![post("A", 300, 10), post("B", 250, 40)];
        let best = fallback(&candidates).unwrap();
        assert_eq!(best.title, "A");
        assert_eq!(best.selection_reason.as_deref(), Some(FALLBACK_REASON));
    }

    #[test]
    fn test_fallback_tie_goes_to_first() {
        let candidates = vec![post("low", 10, 0), post("first", 100, 0), post("second", 100, 0)];
        assert_eq!(fallback(&candidates).unwrap().title, "first");
    }

    #[test]
    fn test_model_selection_used_when_valid() {
        let ranker = Ranker::new(CannedModel::ok(r#"{"index": 1, "reason": "clear face"}"#));
        let candidates = vec![post("A", 300, 10), post("B", 250, 40)];
        let best = ranker.pick_best(&candidates).unwrap();
        assert_eq!(best.title, "B");
        assert_eq!(best.selection_reason.as_deref(), Some("clear face"));
    }

    #[test]
    fn test_model_index_refers_to_engagement_order() {
        // Input order differs from engagement order; index 0 is the top one.
        let ranker = Ranker::new(CannedModel::ok(r#"{"index": 0, "reason": "top"}"#));
        let candidates = vec![post("small", 201, 0), post("big", 5000, 0)];
        assert_eq!(ranker.pick_best(&candidates).unwrap().title, "big");
    }

    #[test]
    fn test_out_of_range_index_falls_back() {
        let ranker = Ranker::new(CannedModel::ok(r#"{"index": 9, "reason": "x"}"#));
        let candidates = vec![post("A", 300, 10), post("B", 250, 40)];
        let best = ranker.pick_best(&candidates).unwrap();
        assert_eq!(best.title, "A");
        assert_eq!(best.selection_reason.as_deref(), Some(FALLBACK_REASON));
    }

    #[test]
    fn test_negative_index_falls_back() {
        let ranker = Ranker::new(CannedModel::ok(r#"{"index": -1, "reason": "x"}"#));
        let best = ranker.pick_best(&[post("A", 300, 0)]).unwrap();
        assert_eq!(best.selection_reason.as_deref(), Some(FALLBACK_REASON));
    }

    #[test]
    fn test_non_json_falls_back() {
        let ranker = Ranker::new(CannedModel::ok("I think the second one is funniest."));
        let best = ranker.pick_best(&[post("A", 300, 10), post("B", 250, 40)]).unwrap();
        assert_eq!(best.title, "A");
        assert_eq!(best.selection_reason.as_deref(), Some(FALLBACK_REASON));
    }

    #[test]
    fn test_model_timeout_falls_back() {
        let ranker = Ranker::new(CannedModel::failing());
        let best = ranker.pick_best(&[post("A", 300, 10), post("B", 250, 40)]).unwrap();
        assert_eq!(best.title, "A");
        assert_eq!(best.selection_reason.as_deref(), Some(FALLBACK_REASON));
    }

    #[test]
    fn test_prompt_limited_to_top_six() {
        let ranker = Ranker::new(CannedModel::ok(r#"{"index": 5, "reason": "ok"}"#));
        let candidates: Vec<_> = (0..9).map(|i| post(&format!("m{i}"), 300 + i, 0)).collect();
        let best = ranker.pick_best(&candidates).unwrap();
        // Top six by engagement are m8..m3; index 5 is m3.
        assert_eq!(best.title, "m3");

        let prompts = ranker.model.prompts.borrow();
        assert!(prompts[0].contains("5: \"m3\" (engagement≈303)"));
        assert!(!prompts[0].contains("\"m2\""));
        assert!(!prompts[0].contains("6: "));
    }

    #[test]
    fn test_index_beyond_prompt_set_rejected() {
        // 9 candidates but only 6 considered: index 7 must not be accepted.
        let ranker = Ranker::new(CannedModel::ok(r#"{"index": 7, "reason": "x"}"#));
        let candidates: Vec<_> = (0..9).map(|i| post(&format!("m{i}"), 300 + i, 0)).collect();
        let best = ranker.pick_best(&candidates).unwrap();
        assert_eq!(best.title, "m8");
        assert_eq!(best.selection_reason.as_deref(), Some(FALLBACK_REASON));
    }

    #[test]
    fn test_parse_selection_variants() {
        let sel = parse_selection("```json\n{\"index\": 2, \"reason\": \"r\"}\n```", 3).unwrap();
        assert_eq!(sel, Selection { index: 2, reason: "r".into() });

        assert!(matches!(
            parse_selection(r#"{"index": 1}"#, 3),
            Err(RankError::Malformed(_))
        ));
        assert!(matches!(
            parse_selection(r#"{"index": "1", "reason": "r"}"#, 3),
            Err(RankError::Malformed(_))
        ));
        assert!(matches!(
            parse_selection(r#"{"index": 3, "reason": "r"}"#, 3),
            Err(RankError::IndexOutOfRange { index: 3, considered: 3 })
        ));
    }
}
