//! Result interpreter
//!
//! Turns raw runner stdout into normalized result fields. Input is expected to
//! be a single JSON object but may be arbitrary bytes. Missing or mistyped
//! fields fall back to defaults (diagnosis "Unknown", confidence 0, abnormal
//! segments 0).

use serde_json::{json, Map, Value};

use crate::models::{AnalysisVariant, RiskTier};

pub const UNKNOWN_DIAGNOSIS: &str = "Unknown";

/// Risk tier of a confidence score (0-100): ≥90 High, ≥70 Medium, else Low
pub fn risk_tier(confidence: f64) -> RiskTier {
    if confidence >= 90.0 {
        RiskTier::High
    } else if confidence >= 70.0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Normalized fields of a usable payload
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub diagnosis: String,
    pub confidence: f64,
    pub abnormal_segments: i64,
    pub risk_level: RiskTier,
    /// Serialized `spectral_data` from the payload, if provided
    pub spectral_data: Option<String>,
    /// Serialized `temporal_data` from the payload, if provided
    pub temporal_data: Option<String>,
}

impl Interpretation {
    /// Fallback for unstructured classifier output
    pub fn degraded() -> Self {
        Self {
            diagnosis: UNKNOWN_DIAGNOSIS.to_string(),
            confidence: 0.0,
            abnormal_segments: 0,
            risk_level: risk_tier(0.0),
            spectral_data: None,
            temporal_data: None,
        }
    }
}

/// What the job manager should do with a run's output
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Structured result; persist and complete the job
    Usable(Interpretation),
    /// Payload reported failure; fail the job with this message
    Failed(String),
    /// Output is not a JSON object; carries the parse error text
    Unparseable(String),
}

/// Interpret runner stdout for `variant`
pub fn interpret(stdout: &[u8], variant: AnalysisVariant) -> Outcome {
    let payload = match parse_object(stdout) {
        Ok(map) => map,
        Err(e) => return Outcome::Unparseable(e),
    };

    let success = payload.get("success").and_then(Value::as_bool);
    let reported_failure = match variant {
        AnalysisVariant::Classification => success == Some(false),
        AnalysisVariant::Prediction => success != Some(true),
    };
    if reported_failure {
        let message = string_field(&payload, "error").unwrap_or_else(|| "Unknown error".to_string());
        return Outcome::Failed(message);
    }

    let diagnosis = match variant {
        AnalysisVariant::Classification => string_field(&payload, "diagnosis"),
        AnalysisVariant::Prediction => string_field(&payload, "primary_diagnosis")
            .or_else(|| string_field(&payload, "diagnosis")),
    }
    .unwrap_or_else(|| UNKNOWN_DIAGNOSIS.to_string());

    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 100.0))
        .unwrap_or(0.0);

    let abnormal_segments = payload
        .get("abnormal_segments")
        .and_then(Value::as_f64)
        .map(|n| n.max(0.0) as i64)
        .unwrap_or(0);

    let reported_tier = match variant {
        AnalysisVariant::Prediction => {
            string_field(&payload, "risk_level").and_then(|s| s.parse::<RiskTier>().ok())
        }
        AnalysisVariant::Classification => None,
    };

    Outcome::Usable(Interpretation {
        diagnosis,
        confidence,
        abnormal_segments,
        risk_level: reported_tier.unwrap_or_else(|| risk_tier(confidence)),
        spectral_data: payload.get("spectral_data").map(serialize_field),
        temporal_data: payload.get("temporal_data").map(serialize_field),
    })
}

fn parse_object(stdout: &[u8]) -> Result<Map<String, Value>, String> {
    match serde_json::from_slice::<Value>(stdout) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", type_name(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn serialize_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Placeholder spectral series: 20 frequency bins
pub fn placeholder_spectral() -> String {
    let bins: Vec<Value> = (0..20)
        .map(|i| json!({ "frequency": i + 1, "power": (i * 10 + 50) as f64 }))
        .collect();
    Value::Array(bins).to_string()
}

/// Placeholder temporal series: 100 samples at 0.1 s
pub fn placeholder_temporal() -> String {
    let samples: Vec<Value> = (0..100)
        .map(|i| {
            let t = i as f64;
            json!({ "time": t * 0.1, "channel1": t * 1.5, "channel2": t * 1.2 })
        })
        .collect();
    Value::Array(samples).to_string()
}
