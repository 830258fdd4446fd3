//! Parsing and validation of generated plans

use crate::error::OrchestrationError;
use crate::generator::extract_json_payload;
use crate::models::{GoalItem, Plan, MAX_LONG_TERM_GOALS, MAX_SHORT_TERM_GOALS};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;

/// Allowed distance of the allocation sum from 1.0
pub const ALLOCATION_TOLERANCE: f64 = 0.05;

/// Absorbs float error in the weight sum so the range endpoints stay valid
const SUM_EPSILON: f64 = 1e-9;

pub const PLAN_KEYS: [&str; 3] = ["short_term_goals", "long_term_goals", "allocation"];

/// Parse plan response text into a validated `Plan`
pub fn parse_plan_response(response: &str) -> Result<Plan> {
    let payload = extract_json_payload(response);

    let json: Value = serde_json::from_str(payload).map_err(|e| {
        OrchestrationError::Parse(format!("plan response is not valid JSON: {}", e))
    })?;

    let object = json
        .as_object()
        .ok_or_else(|| OrchestrationError::Parse("plan response is not a JSON object".to_string()))?;

    if let Some(missing) = PLAN_KEYS.iter().find(|k| !object.contains_key(**k)) {
        return Err(OrchestrationError::Parse(format!("missing key '{}'", missing)));
    }

    let mut short_term_goals = parse_goals(&object["short_term_goals"], "short_term_goals")?;
    let mut long_term_goals = parse_goals(&object["long_term_goals"], "long_term_goals")?;
    short_term_goals.truncate(MAX_SHORT_TERM_GOALS);
    long_term_goals.truncate(MAX_LONG_TERM_GOALS);

    let allocation = parse_allocation(&object["allocation"])?;
    validate_allocation(&allocation)?;

    Ok(Plan {
        short_term_goals,
        long_term_goals,
        allocation,
    })
}

fn parse_goals(value: &Value, key: &str) -> Result<Vec<GoalItem>> {
    if !value.is_array() {
        return Err(OrchestrationError::Parse(format!("'{}' is not an array", key)));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| OrchestrationError::Parse(format!("'{}' has malformed goals: {}", key, e)))
}

fn parse_allocation(value: &Value) -> Result<BTreeMap<String, f64>> {
    let object = value
        .as_object()
        .ok_or_else(|| OrchestrationError::Parse("'allocation' is not an object".to_string()))?;

    let mut allocation = BTreeMap::new();
    for (asset, weight) in object {
        let weight = weight.as_f64().ok_or_else(|| {
            OrchestrationError::Parse(format!("allocation weight for '{}' is not a number", asset))
        })?;
        *allocation.entry(asset.trim().to_lowercase()).or_insert(0.0) += weight;
    }
    Ok(allocation)
}

/// Non-empty, every weight in [0, 1], sum within 1.0 ± tolerance
pub fn validate_allocation(allocation: &BTreeMap<String, f64>) -> Result<()> {
    if allocation.is_empty() {
        return Err(OrchestrationError::Parse("allocation is empty".to_string()));
    }

    if let Some((asset, weight)) = allocation
        .iter()
        .find(|(_, w)| !(0.0..=1.0).contains(*w))
    {
        return Err(OrchestrationError::Parse(format!(
            "allocation weight for '{}' is outside [0, 1]: {}",
            asset, weight
        )));
    }

    let total: f64 = allocation.values().sum();
    let slack = ALLOCATION_TOLERANCE + SUM_EPSILON;
    let bounds = (1.0 - slack)..=(1.0 + slack);
    if !bounds.contains(&total) {
        return Err(OrchestrationError::Parse(format!(
            "allocation weights sum to {:.4}, expected 1.0 ± {}",
            total, ALLOCATION_TOLERANCE
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "short_term_goals": ["a", "b", "c", "d"],
        "long_term_goals": [{"description": "Retire", "target": 900000, "years": 20}, "x", "y"],
        "allocation": {"Equity": 0.5, "debt": 0.3, "hybrid": 0.2}
    }"#;

    #[test]
    fn test_parse_valid_plan_truncates_and_normalizes() {
        let plan = parse_plan_response(VALID).unwrap();
        assert_eq!(plan.short_term_goals.len(), 3);
        assert_eq!(plan.long_term_goals.len(), 2);
        assert_eq!(plan.allocation["equity"], 0.5);
        assert_eq!(plan.horizon_years(), Some(20));
    }

    #[test]
    fn test_allocation_sum_endpoints_are_accepted() {
        assert!(validate_allocation(&BTreeMap::from([("equity".to_string(), 0.95)])).is_ok());
        assert!(validate_allocation(&BTreeMap::from([
            ("equity".to_string(), 0.55),
            ("debt".to_string(), 0.5),
        ]))
        .is_ok());

        let plan = parse_plan_response(
            r#"{"short_term_goals": [], "long_term_goals": [], "allocation": {"equity": 0.6, "debt": 0.35}}"#,
        )
        .unwrap();
        assert_eq!(plan.allocation.len(), 2);
    }

    #[test]
    fn test_parse_fenced_plan() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_plan_response(&fenced).is_ok());
    }

    #[test]
    fn test_missing_key_is_reported() {
        let err = parse_plan_response(r#"{"short_term_goals": [], "allocation": {"equity": 1.0}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("long_term_goals"));
    }

    #[test]
    fn test_malformed_text_is_parse_error() {
        let err = parse_plan_response("I think you should invest more.").unwrap_err();
        assert!(matches!(err, OrchestrationError::Parse(_)));
    }

    #[test]
    fn test_allocation_sum_tolerance() {
        let within = BTreeMap::from([("equity".to_string(), 0.6), ("debt".to_string(), 0.36)]);
        assert!(validate_allocation(&within).is_ok());

        let over = BTreeMap::from([("equity".to_string(), 0.7), ("debt".to_string(), 0.4)]);
        assert!(validate_allocation(&over).is_err());

        let under = BTreeMap::from([("equity".to_string(), 0.5), ("debt".to_string(), 0.4)]);
        assert!(validate_allocation(&under).is_err());
    }

    #[test]
    fn test_allocation_weight_bounds() {
        let percent_style = BTreeMap::from([("equity".to_string(), 60.0), ("debt".to_string(), 40.0)]);
        assert!(validate_allocation(&percent_style)
            .unwrap_err()
            .to_string()
            .contains("outside [0, 1]"));

        let negative = BTreeMap::from([("equity".to_string(), 1.2), ("debt".to_string(), -0.2)]);
        assert!(validate_allocation(&negative).is_err());

        assert!(validate_allocation(&BTreeMap::new()).is_err());
    }
}
