use crate::analyzer::{analyze, ScoreSet};
use crate::llm::{extract_json_like, CompletionRequest, LlmBackend, LlmError};
use std::sync::Arc;
use tracing::{debug, warn};

const SCORING_SYSTEM_PROMPT: &str =
    "You are an expert debate analyst. Respond only with a JSON object.";

/// Scores arguments with the model when one is configured, otherwise (or on
/// any failure) with the deterministic analyzer.
pub struct ArgumentScorer {
    backend: Option<Arc<dyn LlmBackend>>,
    model: Option<String>,
}

impl ArgumentScorer {
    pub fn new(backend: Option<Arc<dyn LlmBackend>>, model: Option<String>) -> Self {
        Self { backend, model }
    }

    /// Heuristic-only scorer.
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub async fn score(&self, argument: &str) -> ScoreSet {
        let Some(backend) = self.backend.as_ref() else {
            debug!("no analysis backend configured, using heuristic scores");
            return analyze(argument);
        };

        match self.score_with(backend.as_ref(), argument).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(error = %e, backend = backend.name(), "model scoring failed, falling back to heuristic scores");
                analyze(argument)
            }
        }
    }

    async fn score_with(&self, backend: &dyn LlmBackend, argument: &str) -> Result<ScoreSet, LlmError> {
        let request = CompletionRequest::prompt(SCORING_SYSTEM_PROMPT, &scoring_prompt(argument))
            .with_sampling(0.2, 300)
            .with_model(self.model.clone());
        let text = backend.complete(request).await?;
        parse_scores(&text)
    }
}

/// Pull the four sub-scores out of a model reply. The reply's own `overall`,
/// if any, is ignored.
fn parse_scores(text: &str) -> Result<ScoreSet, LlmError> {
    let json_str = extract_json_like(text.trim())
        .ok_or_else(|| LlmError::InvalidResponse("no JSON object in reply".to_string()))?;
    serde_json::from_str::<ScoreSet>(json_str).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

fn scoring_prompt(argument: &str) -> String {
    format!(
        r#"Analyze this debate argument and provide scores from 0-100 for each criterion.

Argument to analyze: "{argument}"

Scoring criteria:
1. Clarity (0-100): How clear, well-structured, and easy to understand is the argument?
2. Evidence (0-100): How well-supported is it with facts, data, examples, or credible sources?
3. Logic (0-100): How logically sound and consistent is the reasoning?
4. Persuasiveness (0-100): How compelling and convincing is the overall argument?

Consider the depth of the argument, use of specific examples or data, logical flow, counterarguments addressed and language effectiveness.

Respond ONLY with a JSON object in this exact format (no additional text):
{{"clarity": <score>, "evidence": <score>, "logic": <score>, "persuasiveness": <score>}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;

    const SAMPLE: &str = "We should invest in renewables because the data shows a 40% cost drop.";

    #[tokio::test]
    async fn unit_offline_scorer_matches_analyzer() {
        let scorer = ArgumentScorer::offline();
        assert_eq!(scorer.score(SAMPLE).await, analyze(SAMPLE));
        assert_eq!(scorer.score("").await, ScoreSet::baseline());
    }

    #[tokio::test]
    async fn unit_model_scores_are_clamped_and_overall_derived() {
        let backend = Arc::new(ScriptedBackend::replying(
            "Here you go:\n```json\n{\"clarity\": 85.6, \"evidence\": 70, \"logic\": 120, \"persuasiveness\": -5, \"overall\": 99}\n```",
        ));
        let scorer = ArgumentScorer::new(Some(backend.clone()), Some("analyst/model".to_string()));

        let scores = scorer.score(SAMPLE).await;
        assert_eq!(scores, ScoreSet::from_parts(86, 70, 100, 0));
        assert_eq!(scores.overall(), 64);

        let requests = backend.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.2);
        assert_eq!(requests[0].max_tokens, 300);
        assert_eq!(requests[0].model.as_deref(), Some("analyst/model"));
        assert!(requests[0].messages[0].content.contains(SAMPLE));
    }

    #[tokio::test]
    async fn unit_falls_back_to_heuristics_on_any_failure() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(LlmError::Api { status: 401, message: "bad key".to_string() }),
            Ok("I'd rate it highly overall.".to_string()),
            Ok("{\"clarity\": 80, \"evidence\": \"lots\", \"logic\": 70, \"persuasiveness\": 60}".to_string()),
            Ok("{\"clarity\": 80, \"logic\": 70, \"persuasiveness\": 60}".to_string()),
        ]));
        let scorer = ArgumentScorer::new(Some(backend), None);

        for _ in 0..4 {
            assert_eq!(scorer.score(SAMPLE).await, analyze(SAMPLE));
        }
    }
}
