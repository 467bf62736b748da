// sentinel-scan/src/explainer.rs
// Remote explanation service (OpenAI-compatible chat completions)

use crate::config::ExplainerConfig;
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use sentinel_core::{ClassifiedFinding, Explainer, Explanation, Result, SentinelError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub struct RemoteExplainer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExplanationPayload {
    explanation: String,
    recommendation: String,
}

impl RemoteExplainer {
    pub fn new(config: &ExplainerConfig, api_key: String) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn prompt(finding: &ClassifiedFinding) -> String {
        let path = &finding.finding().path;
        format!(
            "You are a Windows security assistant.\n\
             A monitoring tool just found this issue:\n\
             - Module: {}\n\
             - Name:   {}\n\
             - Status: {}\n\
             - Path:   {}\n\n\
             Write a JSON object with two fields:\n\
             1. \"explanation\": one concise sentence explaining why this is a problem.\n\
             2. \"recommendation\": one concise sentence advising the user how to fix it.",
            finding.module(),
            finding.name(),
            finding.status(),
            if path.is_empty() { "<none>" } else { path.as_str() }
        )
    }
}

/// Extracts `{explanation, recommendation}` from a chat-completions body.
fn parse_response(body: &str) -> Result<Explanation> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| SentinelError::RemoteExplanation(format!("unexpected response shape: {}", e)))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| SentinelError::RemoteExplanation("response has no message content".to_string()))?;

    let payload: ExplanationPayload = serde_json::from_str(content.trim())
        .map_err(|e| SentinelError::RemoteExplanation(format!("content is not the expected JSON object: {}", e)))?;
    if payload.explanation.trim().is_empty() || payload.recommendation.trim().is_empty() {
        return Err(SentinelError::RemoteExplanation("empty explanation or recommendation".to_string()));
    }

    Ok(Explanation {
        explanation: payload.explanation.trim().to_string(),
        recommendation: payload.recommendation.trim().to_string(),
    })
}

#[async_trait]
impl Explainer for RemoteExplainer {
    async fn explain(&self, finding: &ClassifiedFinding) -> Result<Explanation> {
        let request = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": Self::prompt(finding)}],
            "max_tokens": 150,
            "temperature": 0.3,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SentinelError::RemoteExplanation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SentinelError::RemoteExplanation(format!("server returned {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SentinelError::RemoteExplanation(e.to_string()))?;
        debug!("Remote explanation received for {}", finding.name());
        parse_response(&body)
    }
}
