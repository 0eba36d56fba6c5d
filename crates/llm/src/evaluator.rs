//! Priority evaluation of content against the user's context document.

use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, warn};

use prismis_core::{Priority, Result};

use crate::client::LlmClient;

/// Result of evaluating one item against the user's interests. The model
/// output is revalidated here: the prompt asks for the rules but they are
/// enforced client-side.
#[derive(Debug, Clone, Default)]
pub struct ContentEvaluation {
    pub priority: Option<Priority>,
    pub matched_interests: Vec<String>,
    pub reasoning: Option<String>,
}

pub struct Evaluator {
    client: LlmClient,
}

impl Evaluator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Evaluate content relevance. `learned_preferences` is the optional
    /// flagged-item digest appended once the feedback threshold is met.
    /// Parse failures yield the safe default (unprioritized) rather than
    /// an error.
    pub async fn evaluate_content(
        &self,
        content: &str,
        title: &str,
        url: &str,
        context: &str,
        learned_preferences: Option<&str>,
    ) -> Result<ContentEvaluation> {
        debug!(title, "evaluating content against user context");

        let user_prompt = build_user_prompt(content, title, url, context, learned_preferences);

        let started = Instant::now();
        let result = self.client.chat_json(EVALUATION_SYSTEM_PROMPT, &user_prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                prismis_observability::log(
                    "llm.call",
                    json!({
                        "action": "evaluate",
                        "model": self.client.model(),
                        "duration_ms": duration_ms,
                        "status": "success",
                    }),
                );
                Ok(parse_evaluation(&reply))
            }
            Err(prismis_core::Error::Validation(message)) => {
                // Unparseable output: unprioritized, never a hard failure.
                prismis_observability::log(
                    "llm.call",
                    json!({
                        "action": "evaluate",
                        "model": self.client.model(),
                        "duration_ms": duration_ms,
                        "status": "error",
                        "error": message,
                    }),
                );
                warn!(error = %message, "evaluation output unusable, storing unprioritized");
                Ok(ContentEvaluation::default())
            }
            Err(e) => {
                prismis_observability::log(
                    "llm.call",
                    json!({
                        "action": "evaluate",
                        "model": self.client.model(),
                        "duration_ms": duration_ms,
                        "status": "error",
                        "error": e.to_string(),
                    }),
                );
                Err(e)
            }
        }
    }
}

/// Enforce the evaluation rules on raw model output:
/// - empty `matched_interests` (except an explicit "low") forces null priority
/// - an invalid priority string with matches downgrades to medium
/// - an invalid priority string without matches is null
pub fn parse_evaluation(reply: &Value) -> ContentEvaluation {
    let matched_interests: Vec<String> = reply
        .get("matched_interests")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let priority_str = reply.get("priority").and_then(Value::as_str);

    let priority = match priority_str {
        None => None,
        Some(raw) => {
            let raw = raw.to_lowercase();
            if matched_interests.is_empty() && raw != "low" {
                None
            } else {
                match Priority::parse(&raw) {
                    Some(priority) => Some(priority),
                    None if !matched_interests.is_empty() => {
                        warn!(priority = %raw, "invalid priority from LLM, using medium");
                        Some(Priority::Medium)
                    }
                    None => None,
                }
            }
        }
    };

    ContentEvaluation {
        priority,
        matched_interests,
        reasoning: reply
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn build_user_prompt(
    content: &str,
    title: &str,
    url: &str,
    context: &str,
    learned_preferences: Option<&str>,
) -> String {
    let preferences_block = learned_preferences
        .map(|digest| format!("\nRecent feedback from the user:\n{digest}\n"))
        .unwrap_or_default();

    format!(
        "User's Personal Context:\n{context}\n{preferences_block}\n\
         Content to Evaluate:\n\
         Title: {title}\n\
         URL: {url}\n\n\
         Content Text:\n{content}\n\n\
         Evaluate this content and respond with the JSON format specified."
    )
}

const EVALUATION_SYSTEM_PROMPT: &str = r#"You are an expert content analyst who evaluates articles for personalized relevance to a specific user.

Respond with ONLY valid JSON in this exact format:

{
  "priority": "high" | "medium" | "low" | null,
  "matched_interests": ["specific user interest 1", ...],
  "reasoning": "One sentence describing the content and which interest it relates to (10-15 words)"
}

CRITICAL EVALUATION RULES:
1. If matched_interests is empty, you MUST return priority: null
2. If content matches "Not Interested" topics, you MUST return priority: null
3. Only assign a priority if content ACTUALLY matches something in the user's context

Priority Assignment Logic:
- high: ONLY if it matches topics in "High Priority Topics"
- medium: ONLY if it matches topics in "Medium Priority Topics"
- low: ONLY if it matches topics in "Low Priority Topics"
- null: if NO interests match OR it matches "Not Interested" topics

IMPORTANT: Most content should be null. Be selective."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_force_null_priority() {
        let reply = json!({"priority": "high", "matched_interests": [], "reasoning": "x"});
        let eval = parse_evaluation(&reply);
        assert_eq!(eval.priority, None);
    }

    #[test]
    fn explicit_low_survives_empty_matches() {
        let reply = json!({"priority": "low", "matched_interests": []});
        let eval = parse_evaluation(&reply);
        assert_eq!(eval.priority, Some(Priority::Low));
    }

    #[test]
    fn invalid_priority_with_matches_becomes_medium() {
        let reply = json!({"priority": "urgent", "matched_interests": ["rust"]});
        let eval = parse_evaluation(&reply);
        assert_eq!(eval.priority, Some(Priority::Medium));
        assert_eq!(eval.matched_interests, vec!["rust"]);
    }

    #[test]
    fn invalid_priority_without_matches_is_null() {
        let reply = json!({"priority": "urgent", "matched_interests": []});
        let eval = parse_evaluation(&reply);
        assert_eq!(eval.priority, None);
    }

    #[test]
    fn null_priority_passes_through() {
        let reply = json!({"priority": null, "matched_interests": ["x"], "reasoning": "r"});
        let eval = parse_evaluation(&reply);
        assert_eq!(eval.priority, None);
        assert_eq!(eval.reasoning.as_deref(), Some("r"));
    }

    #[test]
    fn valid_priority_with_matches_kept() {
        let reply = json!({"priority": "High", "matched_interests": ["LLM security tools"]});
        let eval = parse_evaluation(&reply);
        assert_eq!(eval.priority, Some(Priority::High));
    }

    #[test]
    fn missing_fields_produce_safe_default() {
        let eval = parse_evaluation(&json!({}));
        assert_eq!(eval.priority, None);
        assert!(eval.matched_interests.is_empty());
        assert!(eval.reasoning.is_none());
    }
}
