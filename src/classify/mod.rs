//! Relevance classifier: provider abstraction + strict response validation.
//!
//! The pipeline depends only on [`Classifier`]. Any implementation (model
//! call, rule engine, human review queue) works as long as it returns a
//! [`Classification`] that passes [`parse_judgment`]'s checks or a
//! [`ClassifyError`].

pub mod gate;
pub mod openai;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::article::Classification;
use crate::config::ClassifierConfig;
use crate::indicator::Indicator;

pub use gate::{CallBudget, ClassifierGate};
pub use openai::OpenAiClassifier;

pub const MAX_STRENGTH: u8 = 4;
pub const MAX_CONFIDENCE: u8 = 100;
const MAX_REASON_CHARS: usize = 400;
const MAX_SIGNALS: usize = 12;

/// Input to one classification call. `summary` is already truncated.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    pub indicator: Indicator,
    pub title: &'a str,
    pub summary: &'a str,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier disabled")]
    Disabled,
    #[error("missing API key")]
    MissingApiKey,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("response violates schema: {0}")]
    Schema(String),
}

impl ClassifyError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifyError::Disabled | ClassifyError::MissingApiKey => false,
            ClassifyError::Timeout | ClassifyError::Transport(_) | ClassifyError::Schema(_) => {
                true
            }
            ClassifyError::Http { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, req: &ClassifyRequest<'_>) -> Result<Classification, ClassifyError>;
    /// Identity recorded on classified articles and evidence (e.g. model name).
    fn identity(&self) -> &str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// JSON schema sent with structured-output requests.
pub fn judgment_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "relevant": {"type": "boolean"},
            "strength": {"type": "integer", "minimum": 0, "maximum": MAX_STRENGTH},
            "confidence": {"type": "integer", "minimum": 0, "maximum": MAX_CONFIDENCE},
            "reason": {"type": "string"},
            "signals": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["relevant", "strength", "confidence", "reason", "signals"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJudgment {
    relevant: bool,
    strength: i64,
    confidence: i64,
    reason: String,
    signals: Vec<String>,
}

/// Parse and validate a classifier response body. Anything outside the
/// schema (missing/extra fields, wrong types, out-of-range ints) is a
/// [`ClassifyError::Schema`].
pub fn parse_judgment(raw: &str) -> Result<Classification, ClassifyError> {
    let j: RawJudgment =
        serde_json::from_str(raw.trim()).map_err(|e| ClassifyError::Schema(e.to_string()))?;
    let strength = u8::try_from(j.strength)
        .ok()
        .filter(|s| *s <= MAX_STRENGTH)
        .ok_or_else(|| ClassifyError::Schema(format!("strength {} outside 0..=4", j.strength)))?;
    let confidence = u8::try_from(j.confidence)
        .ok()
        .filter(|c| *c <= MAX_CONFIDENCE)
        .ok_or_else(|| {
            ClassifyError::Schema(format!("confidence {} outside 0..=100", j.confidence))
        })?;
    let signals = j
        .signals
        .iter()
        .map(|s| sanitize_reason(s))
        .filter(|s| !s.is_empty())
        .take(MAX_SIGNALS)
        .collect();
    Ok(Classification {
        relevant: j.relevant,
        strength,
        confidence,
        reason: sanitize_reason(&j.reason),
        signals,
    })
}

/// Single line, collapsed whitespace, capped length.
pub fn sanitize_reason(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_REASON_CHARS));
    let mut prev_space = false;
    for (n, ch) in input.chars().enumerate() {
        if n >= MAX_REASON_CHARS {
            break;
        }
        if ch.is_whitespace() || ch.is_control() {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Returns `Disabled` always; used when classification is switched off.
pub struct DisabledClassifier;

#[async_trait::async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _req: &ClassifyRequest<'_>) -> Result<Classification, ClassifyError> {
        Err(ClassifyError::Disabled)
    }
    fn identity(&self) -> &str {
        "disabled"
    }
}

/// Deterministic classifier for local runs and tests.
#[derive(Clone)]
pub struct FixedClassifier {
    pub fixed: Classification,
}

impl FixedClassifier {
    pub fn neutral() -> Self {
        Self {
            fixed: Classification {
                relevant: true,
                strength: 2,
                confidence: 70,
                reason: "Fixed judgment (mock)".to_string(),
                signals: vec!["mock".to_string()],
            },
        }
    }
}

#[async_trait::async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _req: &ClassifyRequest<'_>) -> Result<Classification, ClassifyError> {
        Ok(self.fixed.clone())
    }
    fn identity(&self) -> &str {
        "mock"
    }
}

/// Factory: build a classifier from config and environment.
///
/// * `CLASSIFIER_TEST_MODE=mock` → [`FixedClassifier`].
/// * disabled, unknown provider, or no API key → [`DisabledClassifier`].
/// * otherwise the OpenAI structured-output classifier.
///
/// The flag is `false` when classification is unavailable; the caller then
/// runs with a zero call budget.
pub fn build_classifier(cfg: &ClassifierConfig) -> (DynClassifier, bool) {
    if std::env::var("CLASSIFIER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return (Arc::new(FixedClassifier::neutral()), true);
    }
    if !cfg.enabled {
        tracing::warn!("classifier disabled in config");
        return (Arc::new(DisabledClassifier), false);
    }
    if !cfg.provider.eq_ignore_ascii_case("openai") {
        tracing::warn!(provider = %cfg.provider, "unsupported classifier provider");
        return (Arc::new(DisabledClassifier), false);
    }
    let Some(key) = cfg.resolve_api_key() else {
        tracing::warn!("no classifier API key; classification disabled for this run");
        return (Arc::new(DisabledClassifier), false);
    };
    match OpenAiClassifier::new(cfg, key) {
        Ok(c) => (Arc::new(c), true),
        Err(e) => {
            tracing::warn!(error = ?e, "classifier client build failed");
            (Arc::new(DisabledClassifier), false)
        }
    }
}
