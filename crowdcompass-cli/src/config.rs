use std::path::Path;

use crowdcompass_genai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crowdcompass_logic::{ContactBook, EmergencyContact, ProviderSettings, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Runtime configuration, every field is optional in the file
pub struct DashboardConfig {
    /// Location provider settings (watch options, fallback coordinate and policy)
    pub location: ProviderSettings,
    /// Model name to use instead of the built-in default
    pub model: Option<String>,
    /// Provider API root to use instead of the built-in default
    pub base_url: Option<String>,
    /// Seed for the crowd density chart, random if unset
    pub crowd_seed: Option<u64>,
    /// Incident used when none is given on the command line
    pub incident: String,
    /// Emergency contacts, the demo contacts are used if unset
    pub contacts: Option<Vec<EmergencyContact>>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            location: ProviderSettings::default(),
            model: None,
            base_url: None,
            crowd_seed: None,
            incident: "Fire outbreak in a nearby building".to_string(),
            contacts: None,
        }
    }
}

impl DashboardConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse config")
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Contacts from the config, checked the same way contacts added by hand are
    pub fn contact_book(&self) -> Result<ContactBook> {
        match &self.contacts {
            None => Ok(ContactBook::default()),
            Some(contacts) => {
                let mut book = ContactBook::empty();
                for (i, contact) in contacts.iter().enumerate() {
                    book.add(contact.clone())
                        .with_context(|| format!("Invalid contact #{}", i + 1))?;
                }
                Ok(book)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crowdcompass_logic::{Coordinate, FallbackPolicy};

    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = DashboardConfig::parse("{}").unwrap();
        assert_eq!(config.location.fallback, Coordinate::FALLBACK);
        assert_eq!(config.location.policy, FallbackPolicy::Overwrite);
        assert_eq!(config.location.options.timeout, 10000);
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.contact_book().unwrap(), ContactBook::default());
    }

    #[test]
    fn test_partial_config() {
        let config = DashboardConfig::parse(
            r#"{
                "location": { "policy": "keep_last_fix", "fallback": { "lat": 51.5, "lng": -0.12 } },
                "model": "gemini-1.5-pro",
                "crowd_seed": 3,
                "contacts": [{ "name": "Ana", "relation": "Sister", "phone": "+1 555 010 2030" }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.location.policy, FallbackPolicy::KeepLastFix);
        assert_eq!(config.location.fallback.lat(), 51.5);
        assert!(config.location.options.enable_high_accuracy);
        assert_eq!(config.model(), "gemini-1.5-pro");
        assert_eq!(config.crowd_seed, Some(3));
        assert_eq!(config.contact_book().unwrap().contacts()[0].name, "Ana");
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(DashboardConfig::parse(r#"{ "location": { "fallback": { "lat": 91, "lng": 0 } } }"#).is_err());

        let config = DashboardConfig::parse(
            r#"{ "contacts": [{ "name": "Ana", "relation": "Sister", "phone": "123" }] }"#,
        )
        .unwrap();
        assert!(config.contact_book().is_err());
    }
}
