use anyhow::{anyhow, bail};
use crowdcompass_logic::{PromptRequest, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// Body of a `generateContent` call
pub struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl From<PromptRequest> for GenerateRequest {
    fn from(req: PromptRequest) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(req.prompt),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: req.output_schema,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Result<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            bail!("Prompt was blocked: {reason}");
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Model returned no candidates"))?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            bail!("Model returned an empty answer (finish reason: {reason})");
        }

        Ok(text)
    }

    /// The JSON object the model answered with
    pub fn into_json(self) -> Result<Value> {
        let text = self.text()?;
        serde_json::from_str(&text).context("Model answer is not valid JSON")
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorDetails {
    code: Option<u16>,
    message: String,
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Error body returned with non-2xx statuses
pub struct ApiError {
    error: ApiErrorDetails,
}

impl ApiError {
    pub fn describe(&self) -> String {
        let details = &self.error;
        match (&details.status, details.code) {
            (Some(status), Some(code)) => format!("{status} ({code}): {}", details.message),
            (Some(status), None) => format!("{status}: {}", details.message),
            (None, Some(code)) => format!("{code}: {}", details.message),
            (None, None) => details.message.clone(),
        }
    }
}
