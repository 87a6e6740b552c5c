use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Flow, LOCATION_REQUIRED, require};
use crate::{contacts::EmergencyContact, prelude::*};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SosAlertRequest {
    /// GPS coordinates of the user, e.g. `34.0522,-118.2437`
    pub current_location: String,
    /// Contacts to notify
    pub emergency_contacts: Vec<EmergencyContact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SosAlertResult {
    /// Summary of the actions taken, shown to the user
    pub confirmation_message: String,
}

pub struct SosAlertFlow;

impl Flow for SosAlertFlow {
    const NAME: &'static str = "sendSosAlertPrompt";
    const FAILURE_MESSAGE: &'static str = "Failed to send SOS alert.";

    type Input = SosAlertRequest;
    type Output = SosAlertResult;

    fn validate_input(input: &SosAlertRequest) -> Result {
        require(&input.current_location, LOCATION_REQUIRED)?;
        for contact in input.emergency_contacts.iter() {
            contact.validate()?;
        }
        Ok(())
    }

    fn render_prompt(input: &SosAlertRequest) -> String {
        let contacts = input
            .emergency_contacts
            .iter()
            .map(|c| {
                format!(
                    "- Name: {}, Relation: {}, Phone: {}\n",
                    c.name, c.relation, c.phone
                )
            })
            .collect::<String>();

        format!(
            "You are an AI emergency dispatcher. An SOS alert has been triggered.

User's Current Location: {location}
User's Emergency Contacts:
{contacts}
Your tasks are:
1.  Formulate a message to send to the nearest police station, providing the user's location and requesting immediate assistance.
2.  Formulate a message to send to each of the user's emergency contacts, informing them of the situation and the user's location.
3.  Generate a confirmation message for the user that summarizes the actions you have taken. The message should be reassuring and clear.

Example Confirmation Message: \"SOS alert sent. Emergency services at the nearest police station have been notified of your location. Your emergency contacts [Contact Name 1], [Contact Name 2] have also been alerted.\"

Generate the user-facing confirmation message.
",
            location = input.current_location,
        )
    }

    fn output_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "confirmationMessage": {
                    "type": "STRING",
                    "description": "A confirmation message to be shown to the user, including actions taken."
                }
            },
            "required": ["confirmationMessage"]
        })
    }

    fn validate_output(output: &SosAlertResult) -> Result {
        if output.confirmation_message.trim().is_empty() {
            bail!("Empty confirmation message");
        }
        Ok(())
    }
}
