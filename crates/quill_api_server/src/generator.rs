//! HTTP client for the external content generation API.

use crate::config::GeneratorConfig;
use async_trait::async_trait;
use quill_server::{ContentGenerator, GeneratedContent, GenerationError, GenerationRequest};
use std::time::Duration;
use tracing::debug;

/// Posts `{account_id, prompt}` as JSON and expects `{content}` back.
#[derive(Clone)]
pub struct HttpContentGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpContentGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, GenerationError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GenerationError::Unavailable(format!(
                "generator returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Rejected(format!("{}: {}", status, body)));
        }

        let content = response
            .json::<GeneratedContent>()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("malformed response: {}", e)))?;
        debug!(
            "Generator produced {} bytes for {}",
            content.content.len(),
            request.account_id
        );
        Ok(content)
    }
}
