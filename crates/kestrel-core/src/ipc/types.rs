//! Wire types for the lifecycle control protocol.
//!
//! Serialized as JSON over the Unix domain socket transport. Both the control
//! service (daemon) and the client (CLI, config processes) use these types.
//! Marker messages carry no fields and encode as `{}`; unknown fields are
//! ignored when decoding.

use serde::{Deserialize, Serialize};

/// Ask the compositor to quit. Fire-and-forget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuitRequest {}

/// Ask the compositor to reload its configuration in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadConfigRequest {}

/// Empty acknowledgement returned by the state-changing calls.
///
/// An `Ack` only means the request was accepted and dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

/// Application-level liveness probe.
///
/// The payload is opaque; the service echoes it back untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

/// Echo of a [`PingRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl PingResponse {
    /// The echoed payload, or an empty slice when none was sent.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// Subscribe to the one-shot shutdown notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownWatchRequest {}

/// The single "compositor is shutting down" notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownWatchResponse {}

/// Daemon health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
    pub uptime_secs: u64,
    pub pid: u32,
    pub shutting_down: bool,
}

/// A resolved rectangle in compositor coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A partial rectangle. Absent fields mean "unset", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
}

impl Geometry {
    /// Whether every field is unset.
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.width.is_none() && self.height.is_none()
    }

    /// Overlay the set fields onto `current`, keeping its values for the rest.
    pub fn resolve(&self, current: Rect) -> Rect {
        Rect {
            x: self.x.unwrap_or(current.x),
            y: self.y.unwrap_or(current.y),
            width: self.width.unwrap_or(current.width),
            height: self.height.unwrap_or(current.height),
        }
    }
}

impl From<Rect> for Geometry {
    fn from(rect: Rect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            width: Some(rect.width),
            height: Some(rect.height),
        }
    }
}

/// Imperative intent for a boolean-like setting.
///
/// The discriminants are part of the wire contract: bindings in other
/// languages match on the raw integers, so they must never be renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum SetOrToggle {
    #[default]
    Unspecified = 0,
    Set = 1,
    Unset = 2,
    Toggle = 3,
}

/// Decoding error for an integer outside the [`SetOrToggle`] range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid SetOrToggle discriminant: {0}")]
pub struct InvalidSetOrToggle(pub i32);

impl SetOrToggle {
    /// Apply the intent to the current value.
    ///
    /// Returns `None` for [`SetOrToggle::Unspecified`], which callers must
    /// reject as an invalid argument.
    pub fn apply(self, current: bool) -> Option<bool> {
        match self {
            SetOrToggle::Unspecified => None,
            SetOrToggle::Set => Some(true),
            SetOrToggle::Unset => Some(false),
            SetOrToggle::Toggle => Some(!current),
        }
    }
}

impl From<SetOrToggle> for i32 {
    fn from(value: SetOrToggle) -> Self {
        value as i32
    }
}

impl TryFrom<i32> for SetOrToggle {
    type Error = InvalidSetOrToggle;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SetOrToggle::Unspecified),
            1 => Ok(SetOrToggle::Set),
            2 => Ok(SetOrToggle::Unset),
            3 => Ok(SetOrToggle::Toggle),
            other => Err(InvalidSetOrToggle(other)),
        }
    }
}
