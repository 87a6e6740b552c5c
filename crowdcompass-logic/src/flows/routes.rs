use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Flow, LOCATION_REQUIRED, require};
use crate::{crowd::CrowdPoint, prelude::*};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    /// GPS coordinates of the user, e.g. `34.0522,-118.2437`
    pub current_location: String,
    /// Where the user wants to go, routes lead away from danger if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// JSON array of [CrowdPoint]s around the user
    pub crowd_density_data: String,
    pub incident_description: String,
}

impl RouteRequest {
    pub fn new(
        current_location: impl Into<String>,
        destination: Option<String>,
        incident_description: impl Into<String>,
        crowd: &[CrowdPoint],
    ) -> Result<Self> {
        Ok(Self {
            current_location: current_location.into(),
            destination: destination.filter(|d| !d.trim().is_empty()),
            crowd_density_data: serde_json::to_string(crowd)
                .context("Failed to serialize crowd density data")?,
            incident_description: incident_description.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteSuggestion {
    /// Routes in natural language, safest first
    pub safe_routes: Vec<String>,
    /// Data URI of a crowd density map, if the model made one
    #[serde(default)]
    pub crowd_density_map_image_url: Option<String>,
}

pub struct SuggestRoutesFlow;

impl Flow for SuggestRoutesFlow {
    const NAME: &'static str = "suggestEvacuationRoutesPrompt";
    const FAILURE_MESSAGE: &'static str = "Failed to get evacuation routes from AI.";

    type Input = RouteRequest;
    type Output = RouteSuggestion;

    fn validate_input(input: &RouteRequest) -> Result {
        require(&input.current_location, LOCATION_REQUIRED)?;
        require(
            &input.incident_description,
            "Incident description is required.",
        )?;
        if serde_json::from_str::<Vec<CrowdPoint>>(&input.crowd_density_data).is_err() {
            bail!("Crowd density data must be a JSON array of locations and densities.");
        }
        Ok(())
    }

    fn render_prompt(input: &RouteRequest) -> String {
        let destination = input.destination.as_deref().unwrap_or_default();
        format!(
            "You are an AI assistant designed to provide safe evacuation routes to users during emergencies.

You will be given the user's current location, incident description, and real-time crowd density data. Your goal is to suggest the safest evacuation routes to the user.

Current Location: {current}
Destination (if provided): {destination}
Incident Description: {incident}
Crowd Density Data: {crowd}

Consider the following factors when suggesting routes:

- Crowd density: Suggest routes that avoid areas with high crowd density.
- Distance: Suggest routes that are as short as possible.
- Safety: Suggest routes that are generally considered safe (e.g., well-lit areas, main roads).

Output the routes in natural language, ordered from safest to least safe. Each route should include estimated time and distance. Do not include routes that would lead the user into greater danger.

If possible, generate a crowd density map image highlighting safer routes. Otherwise, return null for the crowdDensityMapImageUrl field.
",
            current = input.current_location,
            incident = input.incident_description,
            crowd = input.crowd_density_data,
        )
    }

    fn output_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "safeRoutes": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "Suggested evacuation routes in natural language, ordered from safest to least safe, each with estimated time and distance."
                },
                "crowdDensityMapImageUrl": {
                    "type": "STRING",
                    "nullable": true,
                    "description": "A data URI of an image visualizing the crowd density in the area, highlighting safer routes."
                }
            },
            "required": ["safeRoutes"]
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::test;

    use super::*;
    use crate::{Assistant, Coordinate, crowd::incident_crowd_points, tests::MockModel};

    fn request(incident: &str) -> RouteRequest {
        let crowd = incident_crowd_points(incident, Coordinate::FALLBACK);
        RouteRequest::new("34.0522, -118.2437", None, incident, &crowd).unwrap()
    }

    #[test]
    async fn test_routes_parsed() {
        let model = MockModel::answering(json!({
            "safeRoutes": ["Head north on Main St (5 min, 400m)", "Take 2nd Ave west (8 min, 650m)"],
            "crowdDensityMapImageUrl": null
        }));
        let assistant = Assistant::new(model);

        let out = assistant
            .suggest_evacuation_routes(&request("Fire outbreak in a nearby building"))
            .await
            .unwrap();

        assert_eq!(out.safe_routes.len(), 2);
        assert!(out.crowd_density_map_image_url.is_none());

        let requests = assistant.model().requests();
        let prompt = &requests[0].prompt;
        assert!(prompt.contains("Current Location: 34.0522, -118.2437"));
        assert!(prompt.contains("Incident Description: Fire outbreak in a nearby building"));
        assert!(prompt.contains("Destination (if provided): \n"));
        assert!(prompt.contains("\"density\":"));
    }

    #[test]
    async fn test_missing_fields_rejected() {
        let assistant = Assistant::new(MockModel::broken());

        let mut req = request("Flooding");
        req.current_location.clear();
        let err = assistant.suggest_evacuation_routes(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "Current location is required.");

        let mut req = request("Flooding");
        req.incident_description = "   ".to_string();
        let err = assistant.suggest_evacuation_routes(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "Incident description is required.");

        let mut req = request("Flooding");
        req.crowd_density_data = "not json".to_string();
        assert!(assistant.suggest_evacuation_routes(&req).await.is_err());

        assert!(assistant.model().requests().is_empty());
    }

    #[test]
    async fn test_provider_error_is_generic() {
        let assistant = Assistant::new(MockModel::broken());
        let err = assistant
            .suggest_evacuation_routes(&request("Flooding"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to get evacuation routes from AI.");
    }

    #[test]
    async fn test_blank_destination_dropped() {
        let req = RouteRequest::new("1,1", Some("  ".to_string()), "x", &[]).unwrap();
        assert!(req.destination.is_none());
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("destination").is_none());
        assert_eq!(value["crowdDensityData"], "[]");
    }
}
