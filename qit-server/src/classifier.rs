//! Defect image classifiers
//!
//! A classifier turns a photo (a `data:` URI or an http(s) URL) into one of
//! the fixed symptom labels. The vision classifier asks an
//! OpenAI-compatible chat-completions endpoint to describe the damage and
//! keyword-matches the answer; the fixed classifier always answers with a
//! configured label.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qit_common::config::{ClassifierConfig, ClassifierKind};
use qit_common::defect::match_symptom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

const USER_AGENT: &str = concat!("qit-server/", env!("CARGO_PKG_VERSION"));
const MAX_TOKENS: u32 = 300;

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Classifier API error {0}: {1}")]
    Api(u16, String),

    #[error("Unexpected classifier response: {0}")]
    Parse(String),

    #[error("Classifier not configured: {0}")]
    Config(String),
}

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// A symptom label, or "No Visible Defect"
    pub label: String,
    /// Free text the label was matched from
    pub raw_text: String,
}

#[async_trait]
pub trait DefectClassifier: Send + Sync {
    /// Classifier identifier for logs
    fn name(&self) -> &'static str;

    async fn classify(&self, image: &str) -> Result<Classification, ClassifierError>;
}

/// Always answers with the same label
pub struct FixedClassifier {
    label: String,
}

impl FixedClassifier {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl DefectClassifier for FixedClassifier {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn classify(&self, _image: &str) -> Result<Classification, ClassifierError> {
        Ok(Classification {
            label: self.label.clone(),
            raw_text: format!("Fixed classification: {}", self.label),
        })
    }
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
    content: Option<String>,
}

/// Vision-language model behind a chat-completions API
pub struct VisionClassifier {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    instruction: String,
}

impl VisionClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ClassifierError::Config("classifier.endpoint is not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            instruction: config.instruction.clone(),
        })
    }
}

#[async_trait]
impl DefectClassifier for VisionClassifier {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn classify(&self, image: &str) -> Result<Classification, ClassifierError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.instruction },
                    { "type": "image_url", "image_url": { "url": image } }
                ]
            }]
        });

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "Requesting image analysis");

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        let raw_text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Parse("response has no message text".to_string()))?;

        let label = match_symptom(&raw_text).to_string();
        tracing::debug!(label = %label, "Image analysis matched");
        Ok(Classification { label, raw_text })
    }
}

/// Build the configured classifier
pub fn build_classifier(
    config: &ClassifierConfig,
) -> Result<Arc<dyn DefectClassifier>, ClassifierError> {
    let classifier: Arc<dyn DefectClassifier> = match config.kind {
        ClassifierKind::Fixed => Arc::new(FixedClassifier::new(config.fixed_label.clone())),
        ClassifierKind::Vision => Arc::new(VisionClassifier::new(config)?),
    };
    info!("Defect classifier: {}", classifier.name());
    Ok(classifier)
}
