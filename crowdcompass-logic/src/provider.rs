use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    location::{Coordinate, PositionSource, Reading, WatchGuard},
    settings::{FallbackPolicy, ProviderSettings},
};

pub const UNSUPPORTED_MESSAGE: &str = "Geolocation is not supported by your browser.";
pub const FAILURE_MESSAGE: &str =
    "Could not retrieve your location. Please enable location services.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Snapshot of the shared location, as seen by consumers
pub struct LocationState {
    /// Best known coordinate, `None` only while the first reading is pending
    pub coordinate: Option<Coordinate>,
    /// Description of the most recent acquisition failure
    pub error_message: Option<String>,
    /// True until the first reading (or fallback) resolves, never true again after that
    pub is_acquiring: bool,
}

impl Default for LocationState {
    fn default() -> Self {
        Self {
            coordinate: None,
            error_message: None,
            is_acquiring: true,
        }
    }
}

impl LocationState {
    fn apply_reading(&mut self, coordinate: Coordinate) {
        self.coordinate = Some(coordinate);
        self.error_message = None;
        self.is_acquiring = false;
    }

    fn apply_failure(&mut self, message: &str, fallback: Coordinate, policy: FallbackPolicy) {
        self.error_message = Some(message.to_string());
        self.coordinate = match (policy, self.coordinate) {
            (FallbackPolicy::KeepLastFix, Some(last)) => Some(last),
            _ => Some(fallback),
        };
        self.is_acquiring = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Out-of-band notice for the user, shown in addition to the state
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    fn location_error(message: &str) -> Self {
        Self {
            title: "Location Error".to_string(),
            description: format!("{message} Showing default location."),
        }
    }
}

/// Receives everything the provider does, in order
pub trait LocationEvents: Send + Sync + 'static {
    fn state_updated(&self, _state: &LocationState) {}
    fn notice(&self, _notice: &Notice) {}
}

impl LocationEvents for () {}

/// Owns the single position watch for the app and publishes the resulting [LocationState] to any
/// number of [LocationHandle]s. The watch is released when the provider is stopped or dropped.
pub struct LocationProvider {
    state: watch::Receiver<LocationState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LocationProvider {
    /// Start providing locations from `source`. Must be called from within a tokio runtime.
    pub fn start<P: PositionSource, E: LocationEvents>(
        source: Arc<P>,
        settings: ProviderSettings,
        events: E,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(LocationState::default());
        let cancel = CancellationToken::new();
        let mut publisher = Publisher {
            state: state_tx,
            events,
            settings,
        };

        if !source.is_supported() {
            warn!("Position source is unsupported, using the fallback location");
            let fallback = publisher.settings.fallback;
            publisher.publish(|s| {
                s.apply_failure(UNSUPPORTED_MESSAGE, fallback, FallbackPolicy::Overwrite)
            });
            return Self {
                state: state_rx,
                cancel,
                task: None,
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let guard = match source.watch_position(publisher.settings.options, tx) {
            Ok(id) => WatchGuard::new(source, id),
            Err(why) => {
                error!("Failed to open position watch: {why:?}");
                publisher.failure();
                return Self {
                    state: state_rx,
                    cancel,
                    task: None,
                };
            }
        };

        info!("Watching position (watch {})", guard.id());

        let task = tokio::spawn(publisher.main_loop(rx, guard, cancel.clone()));

        Self {
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn get_location_state(&self) -> LocationState {
        self.state.borrow().clone()
    }

    /// Get a read-only handle to pass to consumers
    pub fn handle(&self) -> LocationHandle {
        LocationHandle {
            state: self.state.clone(),
        }
    }

    /// Release the watch and wait for the watcher to finish, no state updates happen after this
    /// returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(why) = task.await {
                error!("Location watcher failed: {why:?}");
            }
        }
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sole writer of the location state
struct Publisher<E: LocationEvents> {
    state: watch::Sender<LocationState>,
    events: E,
    settings: ProviderSettings,
}

impl<E: LocationEvents> Publisher<E> {
    fn publish(&mut self, f: impl FnOnce(&mut LocationState)) {
        self.state.send_modify(f);
        self.events.state_updated(&self.state.borrow());
    }

    fn failure(&mut self) {
        let fallback = self.settings.fallback;
        let policy = self.settings.policy;
        self.publish(|s| s.apply_failure(FAILURE_MESSAGE, fallback, policy));
        self.events.notice(&Notice::location_error(FAILURE_MESSAGE));
    }

    fn consume_reading(&mut self, reading: Reading) {
        match reading {
            Ok(coordinate) => self.publish(|s| s.apply_reading(coordinate)),
            Err(why) => {
                warn!("Geolocation error: {why}");
                self.failure();
            }
        }
    }

    async fn main_loop<P: PositionSource>(
        mut self,
        mut readings: mpsc::UnboundedReceiver<Reading>,
        guard: WatchGuard<P>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break;
                }

                reading = readings.recv() => {
                    if let Some(reading) = reading {
                        self.consume_reading(reading);
                    } else {
                        info!("Position source closed watch {}", guard.id());
                        // Make sure consumers aren't left without a location
                        if self.state.borrow().is_acquiring {
                            self.failure();
                        }
                        break;
                    }
                }
            }
        }

        drop(guard);
    }
}

#[derive(Clone)]
/// Read-only view of a [LocationProvider]'s state
pub struct LocationHandle {
    state: watch::Receiver<LocationState>,
}

impl LocationHandle {
    pub fn get_location_state(&self) -> LocationState {
        self.state.borrow().clone()
    }

    /// Wait for the next state update, returns `false` if the provider is gone and no more updates
    /// will come.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Wait for the first resolved state (a reading or the fallback)
    pub async fn wait_until_ready(&mut self) -> LocationState {
        let ready = self
            .state
            .wait_for(|s| !s.is_acquiring)
            .await
            .map(|s| s.clone());
        ready.unwrap_or_else(|_| self.state.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        location::PositionError,
        tests::{MockPositionSource, RecordingEvents},
    };
    use tokio::{task::yield_now, test};

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    async fn settle() {
        for _ in 0..5 {
            yield_now().await;
        }
    }

    fn start(source: &Arc<MockPositionSource>, events: RecordingEvents) -> LocationProvider {
        LocationProvider::start(source.clone(), ProviderSettings::default(), events)
    }

    #[test]
    async fn test_starts_acquiring() {
        let source = Arc::new(MockPositionSource::default());
        let provider = start(&source, RecordingEvents::default());

        let state = provider.get_location_state();
        assert!(state.is_acquiring);
        assert!(state.coordinate.is_none());
        assert!(state.error_message.is_none());
        assert_eq!(source.watch_calls(), 1);
        assert_eq!(source.last_options(), Some(crate::WATCH_OPTIONS));
    }

    #[test]
    async fn test_unsupported_uses_fallback() {
        let source = Arc::new(MockPositionSource::unsupported());
        let events = RecordingEvents::default();
        let provider = start(&source, events.clone());

        let state = provider.get_location_state();
        assert_eq!(state.coordinate, Some(Coordinate::FALLBACK));
        assert_eq!(state.error_message.as_deref(), Some(UNSUPPORTED_MESSAGE));
        assert!(!state.is_acquiring);
        assert_eq!(source.watch_calls(), 0);
        assert!(events.notices().is_empty(), "Unsupported shouldn't notify");

        provider.stop().await;
        assert_eq!(source.clear_calls(), 0);
    }

    #[test]
    async fn test_readings_replace_coordinate() {
        let source = Arc::new(MockPositionSource::default());
        let events = RecordingEvents::default();
        let provider = start(&source, events.clone());

        let readings = [coord(40.0, -70.0), coord(40.1, -70.1), coord(40.2, -70.2)];
        for c in readings {
            source.push(Ok(c));
        }
        settle().await;

        let state = provider.get_location_state();
        assert_eq!(state.coordinate, Some(readings[2]));
        assert!(!state.is_acquiring);
        assert!(state.error_message.is_none());

        let seen = events
            .states()
            .into_iter()
            .map(|s| s.coordinate.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(seen, readings, "Readings not applied in delivery order");
        assert!(events.states().iter().all(|s| !s.is_acquiring));
    }

    #[test]
    async fn test_failure_after_fix_overwrites() {
        let source = Arc::new(MockPositionSource::default());
        let events = RecordingEvents::default();
        let provider = start(&source, events.clone());

        source.push(Ok(coord(40.0, -70.0)));
        source.push(Err(PositionError::PermissionDenied));
        settle().await;

        let state = provider.get_location_state();
        assert_eq!(state.coordinate, Some(coord(34.0522, -118.2437)));
        assert_eq!(state.error_message.as_deref(), Some(FAILURE_MESSAGE));
        assert!(!state.is_acquiring);

        let notices = events.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].title, "Location Error");
        assert_eq!(
            notices[0].description,
            "Could not retrieve your location. Please enable location services. Showing default location."
        );
        assert_eq!(source.clear_calls(), 0, "Failure shouldn't close the watch");
    }

    #[test]
    async fn test_keep_last_fix_policy() {
        let source = Arc::new(MockPositionSource::default());
        let settings = ProviderSettings {
            policy: FallbackPolicy::KeepLastFix,
            ..Default::default()
        };
        let provider = LocationProvider::start(source.clone(), settings, ());

        source.push(Err(PositionError::Timeout));
        settle().await;
        assert_eq!(
            provider.get_location_state().coordinate,
            Some(Coordinate::FALLBACK),
            "No fix yet, should fall back"
        );

        source.push(Ok(coord(40.0, -70.0)));
        source.push(Err(PositionError::Timeout));
        settle().await;

        let state = provider.get_location_state();
        assert_eq!(state.coordinate, Some(coord(40.0, -70.0)));
        assert_eq!(state.error_message.as_deref(), Some(FAILURE_MESSAGE));
    }

    #[test]
    async fn test_recovers_after_failure() {
        let source = Arc::new(MockPositionSource::default());
        let provider = start(&source, RecordingEvents::default());

        source.push(Err(PositionError::PositionUnavailable));
        source.push(Ok(coord(-12.5, 130.0)));
        settle().await;

        let state = provider.get_location_state();
        assert_eq!(state.coordinate, Some(coord(-12.5, 130.0)));
        assert!(state.error_message.is_none());
        assert!(!state.is_acquiring);
    }

    #[test]
    async fn test_stop_clears_watch_once() {
        let source = Arc::new(MockPositionSource::default());
        let events = RecordingEvents::default();
        let provider = start(&source, events.clone());

        source.push(Ok(coord(1.0, 1.0)));
        settle().await;

        let handle = provider.handle();
        provider.stop().await;

        assert_eq!(source.clear_calls(), 1);
        assert!(!source.push(Ok(coord(2.0, 2.0))), "Watch still open after stop");
        settle().await;

        assert_eq!(handle.get_location_state().coordinate, Some(coord(1.0, 1.0)));
        assert_eq!(events.states().len(), 1);
    }

    #[test]
    async fn test_drop_clears_watch() {
        let source = Arc::new(MockPositionSource::default());
        let provider = start(&source, RecordingEvents::default());
        let mut handle = provider.handle();

        drop(provider);
        settle().await;

        assert_eq!(source.clear_calls(), 1);
        assert!(!handle.changed().await);
    }

    #[test]
    async fn test_watch_setup_failure() {
        let source = Arc::new(MockPositionSource::failing());
        let events = RecordingEvents::default();
        let provider = start(&source, events.clone());

        let state = provider.get_location_state();
        assert_eq!(state.coordinate, Some(Coordinate::FALLBACK));
        assert_eq!(state.error_message.as_deref(), Some(FAILURE_MESSAGE));
        assert!(!state.is_acquiring);
        assert_eq!(events.notices().len(), 1);

        provider.stop().await;
        assert_eq!(source.clear_calls(), 0);
    }

    #[test]
    async fn test_source_closing_resolves_state() {
        let source = Arc::new(MockPositionSource::default());
        let provider = start(&source, RecordingEvents::default());
        let mut handle = provider.handle();

        source.close();
        let state = handle.wait_until_ready().await;
        assert_eq!(state.coordinate, Some(Coordinate::FALLBACK));
        assert!(!state.is_acquiring);

        settle().await;
        assert_eq!(source.clear_calls(), 1);
    }

    #[test]
    async fn test_handles_see_updates() {
        let source = Arc::new(MockPositionSource::default());
        let provider = start(&source, RecordingEvents::default());
        let mut route_panel = provider.handle();
        let map_panel = provider.handle();

        source.push(Ok(coord(10.0, 20.0)));

        tokio::time::timeout(Duration::from_secs(1), route_panel.changed())
            .await
            .expect("Handle never saw an update");

        assert_eq!(
            route_panel.get_location_state(),
            map_panel.get_location_state()
        );
        assert_eq!(
            map_panel.get_location_state().coordinate,
            Some(coord(10.0, 20.0))
        );
    }
}
