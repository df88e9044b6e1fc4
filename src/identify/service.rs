use super::data_uri::parse_data_uri;
use super::gemini::GeminiIdentifier;
use super::interface::{IdentificationResult, IdentifyError, IdentifyRequest, MedicineIdentifier};
use super::openai::OpenAIIdentifier;
use crate::config::IdentifyConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Front door for identification: validates the request, enforces the
/// deadline and forwards to the configured provider.
#[derive(Clone)]
pub struct IdentifyService {
    provider: Arc<dyn MedicineIdentifier>,
    deadline: Duration,
}

impl IdentifyService {
    pub fn new(provider: Arc<dyn MedicineIdentifier>, deadline: Duration) -> Self {
        Self { provider, deadline }
    }

    pub fn from_config(config: &IdentifyConfig) -> Result<Self, String> {
        let provider = Self::build_provider(config)?;
        tracing::info!("[Identify] Using provider: {}", provider.id());
        // Headroom over the per-request client timeout so retries can finish.
        let deadline = Duration::from_secs(config.timeout_secs.saturating_mul(2).max(1));
        Ok(Self::new(provider, deadline))
    }

    fn build_provider(config: &IdentifyConfig) -> Result<Arc<dyn MedicineIdentifier>, String> {
        match config.provider_type.as_str() {
            "gemini" | "google" => {
                Ok(Arc::new(GeminiIdentifier::from_config(config)?) as Arc<dyn MedicineIdentifier>)
            }
            "openai" | "ollama" => {
                Ok(Arc::new(OpenAIIdentifier::from_config(config)) as Arc<dyn MedicineIdentifier>)
            }
            other => Err(format!("Unknown identification provider type: {}", other)),
        }
    }

    pub fn provider_id(&self) -> String {
        self.provider.id()
    }

    pub async fn identify_photo(
        &self,
        photo_data_uri: &str,
        language: &str,
    ) -> Result<IdentificationResult, IdentifyError> {
        self.identify(IdentifyRequest {
            photo_data_uri: photo_data_uri.to_string(),
            language: language.to_string(),
        })
        .await
    }
}

#[async_trait]
impl MedicineIdentifier for IdentifyService {
    fn id(&self) -> String {
        self.provider.id()
    }

    async fn identify(
        &self,
        request: IdentifyRequest,
    ) -> Result<IdentificationResult, IdentifyError> {
        if request.language.trim().is_empty() {
            return Err(IdentifyError::invalid("No language selected"));
        }
        parse_data_uri(&request.photo_data_uri)?;

        match tokio::time::timeout(self.deadline, self.provider.identify(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "[Identify] Provider '{}' exceeded deadline of {:?}",
                    self.provider.id(),
                    self.deadline
                );
                Err(IdentifyError::deadline(format!(
                    "No answer within {:?}",
                    self.deadline
                )))
            }
        }
    }
}
