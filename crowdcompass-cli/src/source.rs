use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use anyhow::{anyhow, bail};
use crowdcompass_logic::{
    Coordinate, PositionError, PositionOptions, PositionSource, Reading, ReadingSender, WatchId,
    prelude::*,
};
use log::{debug, info};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
/// One line of a position script
struct RawStep {
    #[serde(default)]
    after_ms: u64,
    lat: Option<f64>,
    lng: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// Delay since the previous step
    pub after: Duration,
    pub reading: Reading,
}

fn parse_error(error: &str) -> PositionError {
    match error {
        "permission_denied" => PositionError::PermissionDenied,
        "position_unavailable" => PositionError::PositionUnavailable,
        "timeout" => PositionError::Timeout,
        other => PositionError::Other(other.to_string()),
    }
}

impl TryFrom<RawStep> for ScriptStep {
    type Error = anyhow::Error;

    fn try_from(raw: RawStep) -> Result<Self> {
        let reading = match (raw.error, raw.lat, raw.lng) {
            (Some(error), None, None) => Err(parse_error(&error)),
            (None, Some(lat), Some(lng)) => Ok(Coordinate::new(lat, lng)?),
            _ => bail!("Each step needs either \"lat\" and \"lng\", or \"error\""),
        };
        Ok(Self {
            after: Duration::from_millis(raw.after_ms),
            reading,
        })
    }
}

/// Parse a position script, one JSON object per line. Blank lines and lines starting with `#` are
/// skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            serde_json::from_str::<RawStep>(line)
                .map_err(anyhow::Error::from)
                .and_then(ScriptStep::try_from)
                .with_context(|| format!("Invalid script step on line {n}"))
        })
        .collect()
}

/// Position source that replays a script, standing in for a device GPS. Without a script it
/// behaves like a platform with no geolocation at all.
pub struct ReplaySource {
    steps: Option<Vec<ScriptStep>>,
    next_id: AtomicU32,
    watches: Mutex<HashMap<WatchId, CancellationToken>>,
}

impl ReplaySource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Some(steps),
            next_id: AtomicU32::new(1),
            watches: Mutex::default(),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            steps: None,
            next_id: AtomicU32::new(1),
            watches: Mutex::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read position script {}", path.display()))?;
        let steps = parse_script(&text)?;
        info!("Loaded {} position steps from {}", steps.len(), path.display());
        Ok(Self::new(steps))
    }

    pub fn open_watches(&self) -> usize {
        self.watches.lock().map(|w| w.len()).unwrap_or_default()
    }

    async fn replay(
        steps: Vec<ScriptStep>,
        options: PositionOptions,
        readings: ReadingSender,
        cancel: CancellationToken,
    ) {
        let timeout = options.timeout_duration();

        for step in steps {
            let mut remaining = step.after;

            // A platform reports a timeout each time it can't get a fix in time
            while !timeout.is_zero() && remaining > timeout {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(timeout) => {}
                }
                if readings.send(Err(PositionError::Timeout)).is_err() {
                    return;
                }
                remaining -= timeout;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(remaining) => {}
            }
            if readings.send(step.reading).is_err() {
                return;
            }
        }

        // Out of steps, keep the watch open until it's cleared
        cancel.cancelled().await;
    }
}

impl PositionSource for ReplaySource {
    fn is_supported(&self) -> bool {
        self.steps.is_some()
    }

    fn watch_position(&self, options: PositionOptions, readings: ReadingSender) -> Result<WatchId> {
        let steps = self
            .steps
            .clone()
            .ok_or_else(|| anyhow!("Geolocation is not available"))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        self.watches
            .lock()
            .map_err(|_| anyhow!("Watch table poisoned"))?
            .insert(id, cancel.clone());

        debug!("Opened watch {id} with {options:?}");
        tokio::spawn(Self::replay(steps, options, readings, cancel));

        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        let token = self.watches.lock().ok().and_then(|mut w| w.remove(&id));
        if let Some(token) = token {
            debug!("Cleared watch {id}");
            token.cancel();
        }
    }
}

pub type SharedSource = Arc<ReplaySource>;
