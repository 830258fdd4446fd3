//! Text generation capability
//!
//! The pipeline treats text generation as an opaque `prompt -> text`
//! function. Output may be slow or malformed; callers must parse defensively.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Pull the JSON payload out of generated text.
///
/// Accepts bare JSON, a ```json fenced block, or prose around a single
/// `{ ... }` object.
pub fn extract_json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_tag = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_tag.find("```") {
            return after_tag[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Mock generator for development & testing.
/// Keeps the pipeline functional without an LLM dependency.
///
/// Queued responses are returned first, in order. Once the queue is empty,
/// plan prompts get a canned plan and everything else canned insights.
#[derive(Default)]
pub struct MockTextGenerator {
    queued: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::new();
        for response in responses {
            generator.push_response(response);
        }
        generator
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.queued.lock() {
            queue.push_back(Ok(response.into()));
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut queue) = self.queued.lock() {
            queue.push_back(Err(OrchestrationError::Llm(message.into())));
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn canned_response(prompt: &str) -> String {
        if prompt.contains("short_term_goals") {
            r#"{
  "short_term_goals": [
    "Build a 6-month emergency fund",
    "Cut discretionary dining spend by 20%",
    {"description": "Pay off credit card balance", "target": 5000, "years": 1, "priority": 1}
  ],
  "long_term_goals": [
    {"description": "Down payment on a home", "target": 60000, "years": 5, "priority": 1},
    {"description": "Retirement corpus", "target": 1000000, "years": 25, "priority": 2}
  ],
  "allocation": {"equity": 0.6, "debt": 0.3, "hybrid": 0.1}
}"#
            .to_string()
        } else {
            r#"{
  "strengths": ["Consistent monthly investing", "Diversified allocation"],
  "improvements": ["Dining spend regularly exceeds budget"],
  "adjustments": ["Raise the monthly SIP once the credit card is cleared"]
}"#
            .to_string()
        }
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let queued = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(response) => response,
            None => Ok(Self::canned_response(prompt)),
        }
    }
}
