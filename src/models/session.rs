//! Class session model, geofence invariant, and patch application.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

use super::verification::Coordinates;
use crate::{AppError, Result};

/// Circular region a student must be inside to mark attendance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    /// Center of the fence.
    pub center: Coordinates,
    /// Radius in meters.
    pub radius_m: f64,
}

impl Geofence {
    /// Build a fence from the three optional wire fields.
    ///
    /// Returns `Ok(None)` when all three are absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when only some fields are present or a
    /// present field is not a finite number.
    pub fn from_parts(
        lat: Option<f64>,
        lng: Option<f64>,
        radius_m: Option<f64>,
    ) -> Result<Option<Self>> {
        match (lat, lng, radius_m) {
            (None, None, None) => Ok(None),
            (Some(lat), Some(lng), Some(radius_m)) => {
                let center = Coordinates::new(lat, lng);
                if !center.is_valid() {
                    return Err(AppError::Validation(format!(
                        "geofence center out of range: {lat}, {lng}"
                    )));
                }
                if !radius_m.is_finite() || radius_m < 0.0 {
                    return Err(AppError::Validation(format!(
                        "geofence radius must be a non-negative number, got {radius_m}"
                    )));
                }
                Ok(Some(Self { center, radius_m }))
            }
            _ => Err(AppError::Validation(
                "geofence requires lat, lng and radius_m together".into(),
            )),
        }
    }

    /// Split into the `(lat, lng, radius_m)` wire triple.
    #[must_use]
    pub fn into_parts(fence: Option<Self>) -> (Option<f64>, Option<f64>, Option<f64>) {
        fence.map_or((None, None, None), |f| {
            (Some(f.center.lat), Some(f.center.lng), Some(f.radius_m))
        })
    }
}

/// Where a session sits relative to a given instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// `start <= now <= end`.
    Active,
    /// `start > now`.
    Upcoming,
    /// `end < now`.
    Past,
}

impl SessionPhase {
    /// Classify the interval `[start, end]` against `now`.
    ///
    /// Bounds are inclusive on both ends, so a session is active at the exact
    /// instant it starts and at the exact instant it ends.
    #[must_use]
    pub fn of(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if start > now {
            Self::Upcoming
        } else if end < now {
            Self::Past
        } else {
            Self::Active
        }
    }
}

/// Session as returned by `GET /api/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    /// Server identifier.
    pub id: i64,
    /// Owning teacher, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<i64>,
    /// Display name of the class.
    pub class_name: String,
    /// Start instant (ISO 8601, UTC).
    pub start_ts: DateTime<Utc>,
    /// End instant (ISO 8601, UTC).
    pub end_ts: DateTime<Utc>,
    /// Fence center latitude.
    #[serde(default)]
    pub lat: Option<f64>,
    /// Fence center longitude.
    #[serde(default)]
    pub lng: Option<f64>,
    /// Fence radius in meters.
    #[serde(default)]
    pub radius_m: Option<f64>,
}

/// Validated class session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Server identifier; never changes after creation.
    pub id: i64,
    /// Owning teacher, when known.
    pub teacher_id: Option<i64>,
    /// Display name of the class.
    pub class_name: String,
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant.
    pub end: DateTime<Utc>,
    /// Optional geofence.
    pub geofence: Option<Geofence>,
}

impl TryFrom<SessionRecord> for Session {
    type Error = AppError;

    /// A partially specified fence is read as no fence, matching how the
    /// service itself decides whether a session is fenced. Present values
    /// must still be finite.
    fn try_from(record: SessionRecord) -> Result<Self> {
        let geofence = match (record.lat, record.lng, record.radius_m) {
            (Some(_), Some(_), Some(_)) | (None, None, None) => {
                Geofence::from_parts(record.lat, record.lng, record.radius_m)
                    .map_err(|err| AppError::Validation(format!("session {}: {err}", record.id)))?
            }
            (lat, lng, radius_m) => {
                if [lat, lng, radius_m]
                    .into_iter()
                    .flatten()
                    .any(|v| !v.is_finite())
                {
                    return Err(AppError::Validation(format!(
                        "session {}: geofence fields must be finite numbers",
                        record.id
                    )));
                }
                warn!(
                    session_id = record.id,
                    ?lat,
                    ?lng,
                    ?radius_m,
                    "partial geofence on session; treating as unfenced"
                );
                None
            }
        };
        Ok(Self {
            id: record.id,
            teacher_id: record.teacher_id,
            class_name: record.class_name,
            start: record.start_ts,
            end: record.end_ts,
            geofence,
        })
    }
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        let (lat, lng, radius_m) = Geofence::into_parts(session.geofence);
        Self {
            id: session.id,
            teacher_id: session.teacher_id,
            class_name: session.class_name.clone(),
            start_ts: session.start,
            end_ts: session.end,
            lat,
            lng,
            radius_m,
        }
    }
}

impl Session {
    /// Phase of this session at `now`.
    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        SessionPhase::of(self.start, self.end, now)
    }

    /// Overwrite only the fields present in `patch`.
    ///
    /// The identifier is never touched. The session is left unchanged when
    /// the patched window would end at or before its start.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank class name or an inverted
    /// time window.
    pub fn apply_patch(&mut self, patch: &SessionPatch) -> Result<()> {
        let start = patch.start.unwrap_or(self.start);
        let end = patch.end.unwrap_or(self.end);
        if end <= start {
            return Err(AppError::Validation("end must be after start".into()));
        }
        if let Some(ref name) = patch.class_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("class_name cannot be blank".into()));
            }
            self.class_name = name.to_owned();
        }
        if let Some(teacher_id) = patch.teacher_id {
            self.teacher_id = Some(teacher_id);
        }
        if let Some(geofence) = patch.geofence {
            self.geofence = geofence;
        }
        self.start = start;
        self.end = end;
        Ok(())
    }
}

/// Body for `POST /api/sessions`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewSession {
    /// Owning teacher.
    pub teacher_id: i64,
    /// Display name of the class.
    pub class_name: String,
    /// Start instant.
    #[serde(serialize_with = "serialize_utc")]
    pub start_ts: DateTime<Utc>,
    /// End instant.
    #[serde(serialize_with = "serialize_utc")]
    pub end_ts: DateTime<Utc>,
    /// Fence center latitude.
    pub lat: Option<f64>,
    /// Fence center longitude.
    pub lng: Option<f64>,
    /// Fence radius in meters.
    pub radius_m: Option<f64>,
}

/// Partial update for `PUT /api/sessions/:id`.
///
/// Only fields set to `Some` are sent. `geofence: Some(None)` clears the
/// fence by sending explicit nulls for all three wire fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    /// New class name.
    pub class_name: Option<String>,
    /// New owning teacher.
    pub teacher_id: Option<i64>,
    /// New start instant.
    pub start: Option<DateTime<Utc>>,
    /// New end instant.
    pub end: Option<DateTime<Utc>>,
    /// New fence, or `Some(None)` to remove it.
    pub geofence: Option<Option<Geofence>>,
}

impl SessionPatch {
    /// Whether no field is supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.class_name.is_none()
            && self.teacher_id.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.geofence.is_none()
    }
}

impl Serialize for SessionPatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(ref name) = self.class_name {
            map.serialize_entry("class_name", name)?;
        }
        if let Some(teacher_id) = self.teacher_id {
            map.serialize_entry("teacher_id", &teacher_id)?;
        }
        if let Some(start) = self.start {
            map.serialize_entry("start_ts", &utc_string(start))?;
        }
        if let Some(end) = self.end {
            map.serialize_entry("end_ts", &utc_string(end))?;
        }
        if let Some(geofence) = self.geofence {
            let (lat, lng, radius_m) = Geofence::into_parts(geofence);
            map.serialize_entry("lat", &lat)?;
            map.serialize_entry("lng", &lng)?;
            map.serialize_entry("radius_m", &radius_m)?;
        }
        map.end()
    }
}

/// Format an instant the way the API emits it: whole seconds with `Z`.
#[must_use]
pub fn utc_string(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn serialize_utc<S: Serializer>(
    at: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&utc_string(*at))
}
