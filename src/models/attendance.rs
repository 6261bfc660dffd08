//! Attendance records and the mark-attendance request body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::verification::{Coordinates, VerificationState};

/// Row returned by `GET /api/attendance`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceRecord {
    /// Server row identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Session the mark belongs to.
    pub session_id: i64,
    /// Internal student user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    /// When the mark was recorded; older rows may lack it.
    #[serde(default)]
    pub marked_at: Option<DateTime<Utc>>,
    /// Speech proof reported at mark time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_ok: Option<bool>,
    /// Face proof reported at mark time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_ok: Option<bool>,
    /// Geolocation proof reported at mark time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_ok: Option<bool>,
}

/// Body for `POST /api/attendance`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkRequest {
    /// Target session.
    pub session_id: i64,
    /// Registration number of the student.
    pub student_id: String,
    /// Speech proof.
    pub speech_ok: bool,
    /// Face proof.
    pub face_ok: bool,
    /// Geolocation proof.
    pub geo_ok: bool,
    /// Latitude, when a position is held.
    pub lat: Option<f64>,
    /// Longitude, when a position is held.
    pub lng: Option<f64>,
}

impl MarkRequest {
    /// Build a request from the current verification state.
    #[must_use]
    pub fn from_state(session_id: i64, student_id: &str, state: &VerificationState) -> Self {
        let position = state.position;
        Self {
            session_id,
            student_id: student_id.to_owned(),
            speech_ok: state.speech_verified,
            face_ok: state.face_verified,
            geo_ok: position.is_some(),
            lat: position.map(|p: Coordinates| p.lat),
            lng: position.map(|p: Coordinates| p.lng),
        }
    }
}

/// Success body of `POST /api/attendance`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkReceipt {
    /// Always `true` on success.
    #[serde(default)]
    pub ok: bool,
    /// New attendance row id.
    #[serde(default)]
    pub id: Option<i64>,
    /// Human-readable server message.
    #[serde(default)]
    pub message: Option<String>,
}
