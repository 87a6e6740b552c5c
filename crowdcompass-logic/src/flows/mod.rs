//! Prompt flows run against a large language model.
//!
//! Every flow validates its input, renders a prompt, asks a [PromptModel] for a JSON object
//! matching the flow's output schema and validates what comes back. Failures of the model call
//! are logged once here and handed to the caller as a single generic error.

mod mesh;
mod routes;
mod sos;

use anyhow::{anyhow, bail};
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

pub use mesh::{MeshAlertFlow, MeshAlertRequest, MeshAlertResult, ReceivedAlert};
pub use routes::{RouteRequest, RouteSuggestion, SuggestRoutesFlow};
pub use sos::{SosAlertFlow, SosAlertRequest, SosAlertResult};

#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    /// Name of the prompt, for logging
    pub name: &'static str,
    /// Fully rendered prompt text
    pub prompt: String,
    /// Schema of the JSON object the model must answer with
    pub output_schema: Value,
}

/// A large language model provider
pub trait PromptModel: Send + Sync {
    /// Run the prompt and return the JSON object the model answered with
    fn generate(&self, request: PromptRequest) -> impl Future<Output = Result<Value>> + Send;
}

/// A single request/response exchange with the model
pub trait Flow {
    const NAME: &'static str;
    /// Shown to the user when anything goes wrong talking to the model
    const FAILURE_MESSAGE: &'static str;

    type Input: Sync;
    type Output: DeserializeOwned + Send;

    fn validate_input(input: &Self::Input) -> Result;
    fn render_prompt(input: &Self::Input) -> String;
    fn output_schema() -> Value;
    fn validate_output(_output: &Self::Output) -> Result {
        Ok(())
    }
}

pub(crate) fn require(field: &str, message: &str) -> Result {
    if field.trim().is_empty() {
        bail!("{message}");
    }
    Ok(())
}

pub(crate) const LOCATION_REQUIRED: &str = "Current location is required.";

/// Runs [Flow]s against a [PromptModel]
pub struct Assistant<M: PromptModel> {
    model: M,
}

impl<M: PromptModel> Assistant<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    async fn call<F: Flow>(&self, request: PromptRequest) -> Result<F::Output> {
        let raw = self.model.generate(request).await?;
        let output =
            serde_json::from_value::<F::Output>(raw).context("Model answered with the wrong shape")?;
        F::validate_output(&output).context("Model answered with invalid output")?;
        Ok(output)
    }

    /// Run a flow. Invalid input is reported as-is, any other failure becomes
    /// [Flow::FAILURE_MESSAGE].
    pub async fn run<F: Flow>(&self, input: &F::Input) -> Result<F::Output> {
        F::validate_input(input)?;

        let request = PromptRequest {
            name: F::NAME,
            prompt: F::render_prompt(input),
            output_schema: F::output_schema(),
        };

        debug!("Running prompt {}", F::NAME);

        self.call::<F>(request).await.map_err(|why| {
            error!("Error running {}: {why:?}", F::NAME);
            anyhow!(F::FAILURE_MESSAGE)
        })
    }

    /// Like [Assistant::run], but gives up with `None` as soon as `cancel` fires so a view that has
    /// gone away never receives a stale result.
    pub async fn run_cancellable<F: Flow>(
        &self,
        input: &F::Input,
        cancel: &CancellationToken,
    ) -> Result<Option<F::Output>> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Prompt {} cancelled", F::NAME);
                Ok(None)
            }

            res = self.run::<F>(input) => res.map(Some),
        }
    }

    pub async fn suggest_evacuation_routes(&self, input: &RouteRequest) -> Result<RouteSuggestion> {
        self.run::<SuggestRoutesFlow>(input).await
    }

    pub async fn send_sos_alert(&self, input: &SosAlertRequest) -> Result<SosAlertResult> {
        self.run::<SosAlertFlow>(input).await
    }

    pub async fn broadcast_mesh_alert(&self, input: &MeshAlertRequest) -> Result<MeshAlertResult> {
        self.run::<MeshAlertFlow>(input).await
    }
}
