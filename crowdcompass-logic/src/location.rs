use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prelude::*;

/// A "part" of a coordinate
pub type CoordinateComponent = f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
/// A validated latitude/longitude pair as gotten from a position source
pub struct Coordinate {
    lat: CoordinateComponent,
    lng: CoordinateComponent,
}

#[derive(Serialize, Deserialize)]
struct RawCoordinate {
    lat: CoordinateComponent,
    lng: CoordinateComponent,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = anyhow::Error;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Self::new(raw.lat, raw.lng)
    }
}

impl From<Coordinate> for RawCoordinate {
    fn from(c: Coordinate) -> Self {
        Self {
            lat: c.lat,
            lng: c.lng,
        }
    }
}

impl Coordinate {
    /// Substitute position used whenever a real reading isn't available (Los Angeles)
    pub const FALLBACK: Self = Self {
        lat: 34.0522,
        lng: -118.2437,
    };

    pub fn new(lat: CoordinateComponent, lng: CoordinateComponent) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            bail!("Latitude {lat} is outside of [-90, 90]");
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            bail!("Longitude {lng} is outside of [-180, 180]");
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> CoordinateComponent {
        self.lat
    }

    pub fn lng(&self) -> CoordinateComponent {
        self.lng
    }

    /// Format used to pre-fill location fields, e.g. `34.0522, -118.2437`
    pub fn to_form_string(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lng)
    }

    /// Link to this coordinate on Google Maps
    pub fn maps_url(&self) -> String {
        format!(
            "https://www.google.com/maps/search/?api=1&query={},{}",
            self.lat, self.lng
        )
    }
}

/// `lat,lng`, the format model prompts expect
impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl FromStr for Coordinate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| anyhow!("Expected a location in the form \"lat, lng\""))?;
        let lat = lat.trim().parse::<f64>().context("Invalid latitude")?;
        let lng = lng.trim().parse::<f64>().context("Invalid longitude")?;
        Self::new(lat, lng)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Why a position source failed to produce a reading
pub enum PositionError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    /// The source can't produce positions at all
    Unsupported,
    Other(String),
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::PositionUnavailable => write!(f, "position unavailable"),
            Self::Timeout => write!(f, "timed out"),
            Self::Unsupported => write!(f, "geolocation unsupported"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PositionError {}

/// One update delivered by a position watch
pub type Reading = Result<Coordinate, PositionError>;

pub type ReadingSender = mpsc::UnboundedSender<Reading>;

pub type WatchId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionOptions {
    /// Prefer a GPS-grade fix
    pub enable_high_accuracy: bool,
    /// Max milliseconds to wait for each update
    pub timeout: u32,
    /// Reject cached fixes older than this many milliseconds
    pub maximum_age: u32,
}

impl PositionOptions {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout as u64)
    }
}

/// Options used for the long-lived location watch
pub const WATCH_OPTIONS: PositionOptions = PositionOptions {
    enable_high_accuracy: true,
    timeout: 10000,
    maximum_age: 0,
};

impl Default for PositionOptions {
    fn default() -> Self {
        WATCH_OPTIONS
    }
}

/// A platform's continuous position capability.
pub trait PositionSource: Send + Sync + 'static {
    /// Whether this platform can produce positions at all
    fn is_supported(&self) -> bool {
        true
    }
    /// Open a watch. Readings must be pushed to `readings` in the order the platform produces
    /// them until [PositionSource::clear_watch] is called with the returned id.
    fn watch_position(&self, options: PositionOptions, readings: ReadingSender) -> Result<WatchId>;
    /// Close a watch opened with [PositionSource::watch_position]
    fn clear_watch(&self, id: WatchId);
}

/// Owns an open watch, clears it when dropped
pub struct WatchGuard<P: PositionSource> {
    source: Arc<P>,
    id: WatchId,
}

impl<P: PositionSource> WatchGuard<P> {
    pub fn new(source: Arc<P>, id: WatchId) -> Self {
        Self { source, id }
    }

    pub fn id(&self) -> WatchId {
        self.id
    }
}

impl<P: PositionSource> Drop for WatchGuard<P> {
    fn drop(&mut self) {
        debug!("Clearing position watch {}", self.id);
        self.source.clear_watch(self.id);
    }
}

/// Take a single reading from `source`, waiting at most `options.timeout`. The watch used to get
/// the reading is always cleared before returning.
pub async fn current_position<P: PositionSource>(
    source: &Arc<P>,
    options: PositionOptions,
) -> Reading {
    if !source.is_supported() {
        return Err(PositionError::Unsupported);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = source
        .watch_position(options, tx)
        .map_err(|why| PositionError::Other(why.to_string()))?;
    let _guard = WatchGuard::new(source.clone(), id);

    match tokio::time::timeout(options.timeout_duration(), rx.recv()).await {
        Ok(Some(reading)) => reading,
        Ok(None) => Err(PositionError::PositionUnavailable),
        Err(_) => Err(PositionError::Timeout),
    }
}
