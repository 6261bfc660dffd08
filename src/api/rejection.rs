//! Classification of server-side mark-attendance rejections.

use std::fmt::{Display, Formatter};

use crate::AppError;

const PROXY_DETECTED: &str = "proxy_detected";
const OUTSIDE_RADIUS_PREFIX: &str = "outside_radius:";
const GEOLOCATION_REQUIRED: &str = "geolocation required for this session";
const GENERIC: &str = "Already marked or invalid.";

/// Recognized `error` values of `POST /api/attendance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkRejection {
    /// Request came through a proxy or VPN.
    ProxyDetected,
    /// Position outside the session fence; meters as reported by the server.
    OutsideRadius {
        /// Reported distance, when the suffix parsed as a number.
        meters: Option<u64>,
    },
    /// Session is fenced and no position was sent.
    GeolocationRequired,
    /// Anything else, verbatim. Empty when the server gave no reason.
    Other(String),
}

impl MarkRejection {
    /// Classify a raw `error` string.
    #[must_use]
    pub fn parse(error: &str) -> Self {
        let error = error.trim();
        if error == PROXY_DETECTED {
            Self::ProxyDetected
        } else if let Some(rest) = error.strip_prefix(OUTSIDE_RADIUS_PREFIX) {
            Self::OutsideRadius {
                meters: rest.trim().parse().ok(),
            }
        } else if error == GEOLOCATION_REQUIRED {
            Self::GeolocationRequired
        } else {
            Self::Other(error.to_owned())
        }
    }

    /// Classify an error returned by the mark call, if it came from the API.
    #[must_use]
    pub fn from_error(err: &AppError) -> Option<Self> {
        match err {
            AppError::Api { message, .. } => Some(Self::parse(message)),
            _ => None,
        }
    }

    /// Message shown to the student.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProxyDetected => "Proxy/VPN detected. Disable it to mark attendance.".into(),
            Self::OutsideRadius { meters: Some(m) } => {
                format!("You're too far: ~{m}m (limit may apply).")
            }
            Self::OutsideRadius { meters: None } => {
                "You're too far from class (limit may apply).".into()
            }
            Self::GeolocationRequired => {
                "Location is required for this session. Share your location first.".into()
            }
            Self::Other(msg) if msg.is_empty() => GENERIC.into(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

impl Display for MarkRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message())
    }
}
