//! Reflection over execution results
//!
//! Summarizes tool outputs for the text generator, parses the qualitative
//! insights it returns and records the episode in semantic memory.

use crate::error::OrchestrationError;
use crate::generator::{extract_json_payload, TextGenerator};
use crate::memory::{MemoryHit, Metadata, SemanticStore};
use crate::models::{Insights, InsightsOutcome, Profile, Results, ToolOutput};
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const INSIGHT_KEYS: [&str; 3] = ["strengths", "improvements", "adjustments"];

pub const EPISODE_KIND: &str = "episode";

fn fmt_money(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0}", v))
        .unwrap_or_else(|| "n/a".into())
}

fn summarize_output(key: &str, output: &ToolOutput) -> String {
    if !output.success {
        return format!(
            "- {}: FAILED ({})",
            key,
            output.error.as_deref().unwrap_or("unknown error")
        );
    }

    let data = &output.data;
    let tool = key.split('[').next().unwrap_or(key);

    match tool {
        "sip_calculator" => format!(
            "- {}: invested {} grows to {} (xirr {:.2}%)",
            key,
            fmt_money(data.get("total_invested").and_then(Value::as_f64)),
            fmt_money(data.get("future_value").and_then(Value::as_f64)),
            data.get("xirr").and_then(Value::as_f64).unwrap_or(0.0) * 100.0
        ),
        "goal_simulator" => {
            let median = data
                .get("percentiles")
                .and_then(Value::as_array)
                .and_then(|p| p.get(1))
                .and_then(Value::as_f64);
            format!(
                "- {}: '{}' target {} has {:.1}% success probability (median outcome {})",
                key,
                data.get("goal").and_then(Value::as_str).unwrap_or("goal"),
                fmt_money(data.get("target").and_then(Value::as_f64)),
                data.get("success_rate").and_then(Value::as_f64).unwrap_or(0.0) * 100.0,
                fmt_money(median)
            )
        }
        "risk_assessor" => format!(
            "- {}: score {:.1} ({})",
            key,
            data.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            data.get("classification").and_then(Value::as_str).unwrap_or("unknown")
        ),
        "portfolio_risk" => format!(
            "- {}: HHI {:.2}, {} concentration",
            key,
            data.get("hhi_index").and_then(Value::as_f64).unwrap_or(0.0),
            data.get("concentration_risk").and_then(Value::as_str).unwrap_or("unknown")
        ),
        "budget_analyzer" => {
            let mut overspent = Vec::new();
            if let Some(months) = data.as_object() {
                for (month, categories) in months {
                    let Some(categories) = categories.as_object() else {
                        continue;
                    };
                    for (category, row) in categories {
                        let deviation = row.get("deviation").and_then(Value::as_f64).unwrap_or(0.0);
                        if deviation > 0.0 {
                            overspent.push(format!("{} {} +{:.0}", month, category, deviation));
                        }
                    }
                }
            }
            if overspent.is_empty() {
                format!("- {}: all categories within budget", key)
            } else {
                format!("- {}: over budget in {}", key, overspent.join(", "))
            }
        }
        _ => format!("- {}: completed", key),
    }
}

/// Human-readable digest of every tool output, in key order
pub fn summarize_results(results: &Results) -> String {
    if results.is_empty() {
        return "No tools were run.".to_string();
    }

    results
        .outputs
        .iter()
        .map(|(key, output)| summarize_output(key, output))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse insights response text into `Insights`
pub fn parse_insights_response(response: &str) -> Result<Insights> {
    let payload = extract_json_payload(response);

    let json: Value = serde_json::from_str(payload).map_err(|e| {
        OrchestrationError::Parse(format!("insights response is not valid JSON: {}", e))
    })?;

    let object = json.as_object().ok_or_else(|| {
        OrchestrationError::Parse("insights response is not a JSON object".to_string())
    })?;

    let mut lists = Vec::with_capacity(INSIGHT_KEYS.len());
    for key in INSIGHT_KEYS {
        let items = object
            .get(key)
            .ok_or_else(|| OrchestrationError::Parse(format!("missing key '{}'", key)))?
            .as_array()
            .ok_or_else(|| OrchestrationError::Parse(format!("'{}' is not an array", key)))?;

        let strings = items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    OrchestrationError::Parse(format!("'{}' contains a non-string item", key))
                })
            })
            .collect::<Result<Vec<String>>>()?;
        lists.push(strings);
    }

    let mut lists = lists.into_iter();
    Ok(Insights {
        strengths: lists.next().unwrap_or_default(),
        improvements: lists.next().unwrap_or_default(),
        adjustments: lists.next().unwrap_or_default(),
    })
}

pub struct Reflector {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn SemanticStore>,
}

impl Reflector {
    pub fn new(generator: Arc<dyn TextGenerator>, store: Arc<dyn SemanticStore>) -> Self {
        Self { generator, store }
    }

    pub fn build_prompt(results: &Results, profile: &Profile) -> String {
        let results_json =
            serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string());

        format!(
            r#"You are reviewing the outcome of a personal-finance plan.

PROFILE: age {}, annual income {:.2}, risk tolerance {}

TOOL SUMMARY:
{}

RAW RESULTS (JSON):
{}

Analyze these results and provide:
1. Strengths of the current plan
2. Areas for improvement
3. Recommended adjustments

Rules:
- Return ONLY valid JSON
- No explanation text
- JSON format:

{{
  "strengths": ["..."],
  "improvements": ["..."],
  "adjustments": ["..."]
}}
"#,
            profile.age,
            profile.annual_income,
            profile.risk_tolerance,
            summarize_results(results),
            results_json,
        )
    }

    pub async fn reflect(&self, results: &Results, profile: &Profile) -> InsightsOutcome {
        let prompt = Self::build_prompt(results, profile);

        debug!(tool_count = results.len(), "Requesting reflection");

        let response = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Reflection call failed");
                return InsightsOutcome::Error(format!("reflection failed: {}", e));
            }
        };

        let insights = match parse_insights_response(&response) {
            Ok(insights) => insights,
            Err(e) => {
                warn!(error = %e, "Failed to parse insights response");
                return InsightsOutcome::Error(e.to_string());
            }
        };

        self.remember(results, &insights, profile).await;

        info!(
            strengths = insights.strengths.len(),
            improvements = insights.improvements.len(),
            adjustments = insights.adjustments.len(),
            "Insights parsed"
        );

        InsightsOutcome::Ok(insights)
    }

    /// Best-effort episode persistence; failures never reach the caller
    async fn remember(&self, results: &Results, insights: &Insights, profile: &Profile) {
        let episode = json!({
            "results": results,
            "insights": insights,
        });

        let mut metadata = Metadata::new();
        metadata.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        metadata.insert("profile_id".into(), json!(profile.profile_id));
        metadata.insert("kind".into(), json!(EPISODE_KIND));

        match self.store.store(&episode.to_string(), metadata).await {
            Ok(id) => debug!(record_id = %id, "Episode stored"),
            Err(e) => warn!(error = %e, "Failed to store episode in semantic memory"),
        }
    }

    /// Past episodes most similar to `query`
    pub async fn recall(&self, query: &str, k: usize) -> Result<Vec<MemoryHit>> {
        self.store.query(query, k).await
    }
}
