use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Flow, LOCATION_REQUIRED, require};
use crate::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshAlertRequest {
    /// GPS coordinates of the user broadcasting the alert
    pub current_location: String,
    /// Short reason for the alert
    pub alert_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// The alert as another user nearby would receive it
pub struct ReceivedAlert {
    pub title: String,
    pub description: String,
    /// Approximate location, e.g. "Near City Park"
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshAlertResult {
    pub confirmation_message: String,
    pub received_alert: ReceivedAlert,
}

/// Simulated offline mesh broadcast, the "network" is narrated by the model
pub struct MeshAlertFlow;

impl Flow for MeshAlertFlow {
    const NAME: &'static str = "broadcastMeshAlertPrompt";
    const FAILURE_MESSAGE: &'static str = "Failed to broadcast mesh alert.";

    type Input = MeshAlertRequest;
    type Output = MeshAlertResult;

    fn validate_input(input: &MeshAlertRequest) -> Result {
        require(&input.current_location, LOCATION_REQUIRED)?;
        require(&input.alert_message, "Alert message is required.")
    }

    fn render_prompt(input: &MeshAlertRequest) -> String {
        format!(
            "You are an AI assistant simulating an emergency mesh network. A user has activated an offline mesh alert.

User's Location: {location}
User's Message: \"{message}\"

Your tasks:
1.  Generate a confirmation message for the broadcasting user, confirming their alert has been sent over the mesh network.
2.  Generate an alert notification as it would be received by another user nearby. The received alert should have a title, a descriptive message based on the user's input, and an approximate location (e.g., \"Near City Park\").

Example Confirmation: \"Your mesh alert has been broadcast to nearby CrowdCompass users.\"
Example Received Alert Title: \"High-Priority Mesh Alert\"
Example Received Alert Description: \"Emergency alert from a nearby user: '{message}'. Please be cautious.\"
Example Received Alert Location: \"Near user's location\"

Generate the full output object.
",
            location = input.current_location,
            message = input.alert_message,
        )
    }

    fn output_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "confirmationMessage": {
                    "type": "STRING",
                    "description": "A confirmation message for the user who initiated the broadcast."
                },
                "receivedAlert": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "location": { "type": "STRING" }
                    },
                    "required": ["title", "description", "location"]
                }
            },
            "required": ["confirmationMessage", "receivedAlert"]
        })
    }

    fn validate_output(output: &MeshAlertResult) -> Result {
        if output.confirmation_message.trim().is_empty() {
            bail!("Empty confirmation message");
        }
        if output.received_alert.title.trim().is_empty() {
            bail!("Received alert has no title");
        }
        Ok(())
    }
}
