use crate::config::IdentifyConfig;
use crate::identify::data_uri::parse_data_uri;
use crate::identify::interface::{
    parse_result_json, ErrorReason, IdentificationResult, IdentifyError, IdentifyRequest,
    MedicineIdentifier,
};
use crate::identify::prompt::identify_prompt;
use crate::utils::http::{request_with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlDetail },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlDetail {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisionMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisionCompletionRequest {
    pub model: String,
    pub messages: Vec<VisionMessage>,
    pub stream: bool,
    pub temperature: Option<f32>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Identification through any OpenAI-compatible `/chat/completions` server
/// that accepts `image_url` parts (OpenAI, Ollama, vLLM, ...).
pub struct OpenAIIdentifier {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAIIdentifier {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            retry,
        }
    }

    /// Local servers often need no key, so a missing one is not an error here.
    pub fn from_config(config: &IdentifyConfig) -> Self {
        Self::new(
            config.resolve_api_key(),
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
            RetryPolicy::new(config.max_retries),
        )
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn build_request(
        &self,
        request: &IdentifyRequest,
    ) -> Result<VisionCompletionRequest, IdentifyError> {
        // Validates the URI shape; the URI itself is sent as-is.
        parse_data_uri(&request.photo_data_uri)?;

        Ok(VisionCompletionRequest {
            model: self.model.clone(),
            messages: vec![VisionMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: identify_prompt(&request.language),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlDetail {
                            url: request.photo_data_uri.clone(),
                        },
                    },
                ],
            }],
            stream: false,
            temperature: Some(0.2),
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        })
    }
}

fn error_from_body(status: reqwest::StatusCode, body: &str) -> IdentifyError {
    // OpenAI style: { "error": { "message": "...", "type": "...", "code": "..." } }
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("API error ({}): {}", status, body));
    IdentifyError::new(ErrorReason::from_http_status(status), message)
}

#[async_trait]
impl MedicineIdentifier for OpenAIIdentifier {
    fn id(&self) -> String {
        "openai".to_string()
    }

    async fn identify(
        &self,
        request: IdentifyRequest,
    ) -> Result<IdentificationResult, IdentifyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(&request)?;

        tracing::info!(
            "[Identify] Chat-completions request: model={}, language={}",
            self.model,
            request.language
        );

        let res = request_with_retry(
            || {
                let mut builder = self.client.post(&url).json(&body);
                if let Some(ref key) = self.api_key {
                    builder = builder.bearer_auth(key);
                }
                builder.send()
            },
            self.retry,
        )
        .await?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            let err = error_from_body(status, &error_text);
            tracing::error!("[Identify] Chat-completions error: {}", err);
            return Err(err);
        }

        let completion: CompletionResponse = res.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| IdentifyError::malformed("Completion has no message content"))?;

        let result = parse_result_json(&content)?;
        tracing::info!("[Identify] Identified '{}'", result.medicine_name);
        Ok(result)
    }
}
