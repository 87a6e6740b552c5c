mod contacts;
mod crowd;
mod flows;
mod location;
mod login;
mod notifications;
mod provider;
mod settings;

pub use contacts::{ContactBook, EmergencyContact};
pub use crowd::{
    CrowdPoint, DensitySample, DensitySeries, DensityStatus, SAMPLE_INTERVAL, incident_crowd_points,
};
pub use flows::{
    Assistant, Flow, MeshAlertFlow, MeshAlertRequest, MeshAlertResult, PromptModel,
    PromptRequest, ReceivedAlert, RouteRequest, RouteSuggestion, SosAlertFlow, SosAlertRequest,
    SosAlertResult, SuggestRoutesFlow,
};
pub use location::{
    Coordinate, PositionError, PositionOptions, PositionSource, Reading, ReadingSender,
    WATCH_OPTIONS, WatchGuard, WatchId, current_position,
};
pub use login::{INCORRECT_CAPTCHA, LoginChallenge, LoginForm, NOT_A_NUMBER};
pub use notifications::{Notification, NotificationFeed};
pub use provider::{
    FAILURE_MESSAGE, LocationEvents, LocationHandle, LocationProvider, LocationState, Notice,
    UNSUPPORTED_MESSAGE,
};
pub use settings::{FallbackPolicy, ProviderSettings};

use chrono::{DateTime, Utc};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
