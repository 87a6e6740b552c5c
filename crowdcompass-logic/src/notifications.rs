//! Public safety notifications shown on the dashboard. The feed starts with a few canned alerts
//! and grows as mesh alerts are received.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::flows::ReceivedAlert;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub location: String,
    /// Relative time label, e.g. `2m ago`
    pub time: String,
    pub description: String,
    /// Came in over the mesh network
    #[serde(default)]
    pub is_mesh: bool,
}

impl Notification {
    fn canned(title: &str, location: &str, time: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            location: location.to_string(),
            time: time.to_string(),
            description: description.to_string(),
            is_mesh: false,
        }
    }
}

impl From<&ReceivedAlert> for Notification {
    fn from(alert: &ReceivedAlert) -> Self {
        Self {
            title: alert.title.clone(),
            location: alert.location.clone(),
            time: "Just now".to_string(),
            description: alert.description.clone(),
            is_mesh: true,
        }
    }
}

/// Newest-first list of notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFeed {
    items: VecDeque<Notification>,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self {
            items: VecDeque::from([
                Notification::canned(
                    "High Crowd Density Alert",
                    "Central Plaza",
                    "2m ago",
                    "Avoid Central Plaza due to unexpected gathering. Alternate routes are advised.",
                ),
                Notification::canned(
                    "Area Secure",
                    "Market Street",
                    "15m ago",
                    "The incident on Market Street has been resolved. The area is now safe.",
                ),
                Notification::canned(
                    "Public Transport Update",
                    "City-wide",
                    "1h ago",
                    "Subway lines A and C are experiencing delays. Please consider alternative transport.",
                ),
            ]),
        }
    }
}

impl NotificationFeed {
    pub fn empty() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Put a received mesh alert at the top of the feed
    pub fn push_mesh_alert(&mut self, alert: &ReceivedAlert) -> &Notification {
        self.items.push_front(Notification::from(alert));
        &self.items[0]
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
