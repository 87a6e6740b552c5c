use anyhow::bail;
use crowdcompass_logic::{PromptModel, PromptRequest, prelude::*};
use log::debug;
use serde_json::Value;

use crate::{
    endpoint::generate_url,
    wire::{ApiError, GenerateRequest, GenerateResponse},
};

/// Read the provider API key, `GEMINI_API_KEY` takes precedence over `GOOGLE_API_KEY`
pub fn api_key_from_env() -> Result<String> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .context("Set GEMINI_API_KEY or GOOGLE_API_KEY to use the AI features")
}

/// [PromptModel] backed by the Gemini `generateContent` API in JSON mode
pub struct GeminiModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: generate_url(base_url, model),
            api_key: api_key.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PromptModel for GeminiModel {
    async fn generate(&self, request: PromptRequest) -> Result<Value> {
        debug!("Sending prompt {} to {}", request.name, self.url);

        let body = GenerateRequest::from(request);
        let resp = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Could not send request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.describe())
                .unwrap_or(text);
            bail!("Provider returned {status}: {reason}");
        }

        resp.json::<GenerateResponse>()
            .await
            .context("Failed to read provider response")?
            .into_json()
    }
}
