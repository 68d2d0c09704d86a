//! OpenAI chat-completions classifier with a strict JSON-schema response format.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{judgment_schema, parse_judgment, Classifier, ClassifyError, ClassifyRequest};
use crate::article::Classification;
use crate::config::ClassifierConfig;

const SYSTEM_PROMPT: &str =
    "You are a strict classifier for AI infrastructure and hyperscaler risk signals.";

pub struct OpenAiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClassifier {
    pub fn new(cfg: &ClassifierConfig, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("bubble-watch/0.1")
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(
                cfg.connect_timeout_secs + cfg.read_timeout_secs,
            ))
            .build()
            .context("building classifier http client")?;
        Ok(Self {
            http,
            api_key,
            model: cfg.model.clone(),
            endpoint: cfg.endpoint.clone(),
        })
    }
}

/// User prompt for one article.
pub fn build_prompt(req: &ClassifyRequest<'_>) -> String {
    format!(
        "ITEM_KEY: {}\nTITLE: {}\nSUMMARY: {}\n\n\
         Rules:\n\
         - Be conservative: if only tangential, relevant=false.\n\
         - strength 0..4 reflects how strong/clear the risk signal is.\n\
         - Do not infer beyond the text.\n\
         - Return ONLY JSON.\n",
        req.indicator.key(),
        req.title,
        req.summary
    )
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: serde_json::Value,
    strict: bool,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn map_reqwest(e: reqwest::Error) -> ClassifyError {
    if e.is_timeout() {
        ClassifyError::Timeout
    } else {
        ClassifyError::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, req: &ClassifyRequest<'_>) -> Result<Classification, ClassifyError> {
        if self.api_key.is_empty() {
            return Err(ClassifyError::MissingApiKey);
        }

        let prompt = build_prompt(req);
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "risk_signal_classification",
                    schema: judgment_schema(),
                    strict: true,
                },
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ClassifyError::Http {
                status: status.as_u16(),
                body: super::sanitize_reason(&text),
            });
        }

        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| ClassifyError::Schema(format!("response envelope: {e}")))?;
        let msg = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ClassifyError::Schema("no choices".to_string()))?;
        if let Some(refusal) = msg.refusal.filter(|r| !r.is_empty()) {
            return Err(ClassifyError::Schema(format!("refused: {refusal}")));
        }
        let content = msg
            .content
            .ok_or_else(|| ClassifyError::Schema("empty content".to_string()))?;
        parse_judgment(&content)
    }

    fn identity(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;

    #[test]
    fn prompt_carries_indicator_title_and_summary() {
        let p = build_prompt(&ClassifyRequest {
            indicator: Indicator::PowerPermitDelays,
            title: "Grid queue grows",
            summary: "Interconnection backlog",
        });
        assert!(p.starts_with("ITEM_KEY: power_permit_delays\nTITLE: Grid queue grows\n"));
        assert!(p.contains("SUMMARY: Interconnection backlog"));
        assert!(p.contains("Return ONLY JSON"));
    }

    #[test]
    fn request_body_uses_strict_schema() {
        let body = Req {
            model: "m",
            messages: vec![],
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "risk_signal_classification",
                    schema: judgment_schema(),
                    strict: true,
                },
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["response_format"]["type"], "json_schema");
        assert_eq!(v["response_format"]["json_schema"]["strict"], true);
    }
}
