//! Dashboard panels. Each panel only reads the shared location through a [LocationHandle].

use std::sync::Arc;

use chrono::Utc;
use crowdcompass_logic::{
    Assistant, ContactBook, Coordinate, CrowdPoint, LocationEvents, LocationHandle, LocationState,
    MeshAlertFlow, MeshAlertRequest, MeshAlertResult, Notice, NotificationFeed, PositionSource,
    PromptModel, RouteRequest, RouteSuggestion, SosAlertRequest, SuggestRoutesFlow, UtcDT,
    WATCH_OPTIONS, current_position, incident_crowd_points, prelude::*,
};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

/// Logs location updates and shows notices on the terminal
pub struct TerminalEvents;

impl LocationEvents for TerminalEvents {
    fn state_updated(&self, state: &LocationState) {
        if let Some(coordinate) = state.coordinate {
            info!("Location is now {}", coordinate.to_form_string());
        }
    }

    fn notice(&self, notice: &Notice) {
        warn!("{}: {}", notice.title, notice.description);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapView {
    Loading,
    /// Acquisition failed, the map is hidden even though a fallback exists
    Unavailable(String),
    Ready {
        center: Coordinate,
        url: String,
        crowd: Vec<CrowdPoint>,
    },
}

/// Map centered on the user
pub struct MapPanel {
    location: LocationHandle,
    overlay: Option<String>,
}

impl MapPanel {
    pub fn new(location: LocationHandle) -> Self {
        Self {
            location,
            overlay: None,
        }
    }

    /// Also show simulated crowds for `incident` around the map center
    pub fn with_overlay(mut self, incident: impl Into<String>) -> Self {
        self.overlay = Some(incident.into());
        self
    }

    pub fn view(&self) -> MapView {
        let state = self.location.get_location_state();
        match (state.is_acquiring, state.error_message, state.coordinate) {
            (true, _, _) | (false, None, None) => MapView::Loading,
            (false, Some(error), _) => MapView::Unavailable(error),
            (false, None, Some(center)) => MapView::Ready {
                url: center.maps_url(),
                crowd: self
                    .overlay
                    .as_deref()
                    .map(|incident| incident_crowd_points(incident, center))
                    .unwrap_or_default(),
                center,
            },
        }
    }

    pub fn render(&self) -> String {
        match self.view() {
            MapView::Loading => "Map: locating...".to_string(),
            MapView::Unavailable(error) => format!("Map: unavailable ({error})"),
            MapView::Ready { center, url, crowd } => {
                let mut out = format!("Map: centered on {}\n  {url}", center.to_form_string());
                for point in crowd.iter() {
                    out.push_str(&format!("\n  {:>4} people near {}", point.density, point.location));
                }
                out
            }
        }
    }
}

/// Evacuation route suggestions
pub struct RoutePanel {
    location: LocationHandle,
}

impl RoutePanel {
    pub fn new(location: LocationHandle) -> Self {
        Self { location }
    }

    /// Value for the current location field, filled from the shared location
    pub fn prefill(&self) -> Option<String> {
        self.location
            .get_location_state()
            .coordinate
            .map(|c| c.to_form_string())
    }

    /// Ask for routes. `current_location` overrides the shared location when set. Gives `None`
    /// if `cancel` fires before the model answers.
    pub async fn suggest<M: PromptModel>(
        &self,
        assistant: &Assistant<M>,
        current_location: Option<String>,
        destination: Option<String>,
        incident: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<(Vec<CrowdPoint>, RouteSuggestion)>> {
        let current = current_location.or_else(|| self.prefill()).unwrap_or_default();

        let crowd = match current.parse::<Coordinate>() {
            Ok(base) => incident_crowd_points(incident, base),
            Err(why) => {
                warn!("Not generating crowd data for {current:?}: {why}");
                vec![]
            }
        };

        let request = RouteRequest::new(current, destination, incident, &crowd)?;
        let suggestion = assistant
            .run_cancellable::<SuggestRoutesFlow>(&request, cancel)
            .await?;
        Ok(suggestion.map(|s| (crowd, s)))
    }
}

#[derive(Debug, Clone)]
pub struct SosAlert {
    pub sent_at: UtcDT,
    pub coordinate: Coordinate,
    pub confirmation: String,
}

/// Emergency SOS, takes its own position reading instead of using the shared location
pub struct SosPanel<P: PositionSource> {
    source: Arc<P>,
    fallback: Coordinate,
    contacts: ContactBook,
}

impl<P: PositionSource> SosPanel<P> {
    pub fn new(source: Arc<P>, fallback: Coordinate, contacts: ContactBook) -> Self {
        Self {
            source,
            fallback,
            contacts,
        }
    }

    pub async fn trigger<M: PromptModel>(&self, assistant: &Assistant<M>) -> Result<SosAlert> {
        let sent_at = Utc::now();
        let coordinate = match current_position(&self.source, WATCH_OPTIONS).await {
            Ok(coordinate) => coordinate,
            Err(why) => {
                warn!("Couldn't get a position for the SOS alert ({why}), using the fallback");
                self.fallback
            }
        };

        let request = SosAlertRequest {
            current_location: coordinate.to_string(),
            emergency_contacts: self.contacts.contacts().to_vec(),
        };
        let result = assistant.send_sos_alert(&request).await?;

        Ok(SosAlert {
            sent_at,
            coordinate,
            confirmation: result.confirmation_message,
        })
    }
}

/// Simulated offline mesh broadcast, received alerts land in the notification feed
pub struct MeshPanel {
    location: LocationHandle,
    feed: NotificationFeed,
}

impl MeshPanel {
    pub fn new(location: LocationHandle, feed: NotificationFeed) -> Self {
        Self { location, feed }
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    pub async fn broadcast<M: PromptModel>(
        &mut self,
        assistant: &Assistant<M>,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<MeshAlertResult>> {
        let current_location = self
            .location
            .get_location_state()
            .coordinate
            .map(|c| c.to_string())
            .unwrap_or_default();

        let request = MeshAlertRequest {
            current_location,
            alert_message: message.to_string(),
        };
        let result = assistant
            .run_cancellable::<MeshAlertFlow>(&request, cancel)
            .await?;
        if let Some(result) = &result {
            self.feed.push_mesh_alert(&result.received_alert);
        }
        Ok(result)
    }
}
