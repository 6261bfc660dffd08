//! Teacher-side session forms.
//!
//! Teachers enter wall-clock times in the configured display offset; these
//! builders convert them to UTC instants and enforce the session rules
//! before anything is sent to the server.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::models::session::{Geofence, NewSession, Session, SessionPatch};
use crate::models::verification::Coordinates;
use crate::{AppError, Result};

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns `AppError::Validation` on malformed input.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| AppError::Validation(format!("bad date {raw:?} (use YYYY-MM-DD): {err}")))
}

/// Parse an `HH:MM` time.
///
/// # Errors
///
/// Returns `AppError::Validation` on malformed input.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|err| AppError::Validation(format!("bad time {raw:?} (use HH:MM): {err}")))
}

fn local_instant(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Result<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| AppError::Validation(format!("unrepresentable local time {date} {time}")))
}

fn positive_minutes(minutes: u32) -> Result<Duration> {
    if minutes == 0 {
        return Err(AppError::Validation("duration must be positive".into()));
    }
    Ok(Duration::minutes(i64::from(minutes)))
}

fn check_radius(fence: Option<Geofence>) -> Result<Option<Geofence>> {
    match fence {
        Some(f) if f.radius_m <= 0.0 => Err(AppError::Validation(
            "radius must be greater than zero".into(),
        )),
        other => Ok(other),
    }
}

/// Round to the six decimals a browser form would show.
fn six_decimals(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// The create-session form.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    /// Class name; required, trimmed.
    pub class_name: String,
    /// Local calendar date.
    pub date: NaiveDate,
    /// Local start time.
    pub start: NaiveTime,
    /// Local end time on the same date.
    pub end: Option<NaiveTime>,
    /// Length in minutes, used when `end` is absent.
    pub duration_minutes: Option<u32>,
    /// Fence center latitude.
    pub lat: Option<f64>,
    /// Fence center longitude.
    pub lng: Option<f64>,
    /// Fence radius in meters.
    pub radius_m: Option<f64>,
}

impl SessionDraft {
    /// Fill the fence center from a position fix, defaulting the radius.
    pub fn use_location(&mut self, position: Coordinates, default_radius_m: f64) {
        self.lat = Some(six_decimals(position.lat));
        self.lng = Some(six_decimals(position.lng));
        if self.radius_m.is_none() {
            self.radius_m = Some(default_radius_m);
        }
    }

    /// UTC window described by the form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when neither end nor a positive
    /// duration is given, or the window is empty or inverted.
    pub fn window(&self, offset: FixedOffset) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = local_instant(self.date, self.start, offset)?;
        let end = match (self.end, self.duration_minutes) {
            (Some(end), _) => local_instant(self.date, end, offset)?,
            (None, Some(minutes)) => start + positive_minutes(minutes)?,
            (None, None) => {
                return Err(AppError::Validation(
                    "provide end time or duration".into(),
                ))
            }
        };
        if end <= start {
            return Err(AppError::Validation("end must be after start".into()));
        }
        Ok((start, end))
    }

    /// Fence described by the form. A center without a radius gets
    /// `default_radius_m`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a partial fence or a
    /// non-positive radius.
    pub fn geofence(&self, default_radius_m: f64) -> Result<Option<Geofence>> {
        let radius = match (self.lat, self.lng, self.radius_m) {
            (Some(_), Some(_), None) => Some(default_radius_m),
            (_, _, radius) => radius,
        };
        check_radius(Geofence::from_parts(self.lat, self.lng, radius)?)
    }

    /// Validate and convert into a create request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when any form rule fails.
    pub fn into_new_session(
        self,
        teacher_id: i64,
        offset: FixedOffset,
        default_radius_m: f64,
    ) -> Result<NewSession> {
        let class_name = self.class_name.trim().to_owned();
        if class_name.is_empty() {
            return Err(AppError::Validation("class name is required".into()));
        }
        let (start_ts, end_ts) = self.window(offset)?;
        let (lat, lng, radius_m) = Geofence::into_parts(self.geofence(default_radius_m)?);
        Ok(NewSession {
            teacher_id,
            class_name,
            start_ts,
            end_ts,
            lat,
            lng,
            radius_m,
        })
    }
}

/// The edit-session form: every field optional, absent means unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionEdit {
    /// New class name.
    pub class_name: Option<String>,
    /// Move to this local date, keeping times unless also given.
    pub date: Option<NaiveDate>,
    /// New local start time.
    pub start: Option<NaiveTime>,
    /// New local end time.
    pub end: Option<NaiveTime>,
    /// New length in minutes from the (possibly new) start.
    pub duration_minutes: Option<u32>,
    /// New fence center latitude.
    pub lat: Option<f64>,
    /// New fence center longitude.
    pub lng: Option<f64>,
    /// New fence radius.
    pub radius_m: Option<f64>,
    /// Remove the fence entirely.
    pub clear_geofence: bool,
}

impl SessionEdit {
    /// Build the minimal patch that applies this edit to `current`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank name, an inverted window,
    /// a partial fence, or conflicting fence flags.
    pub fn into_patch(
        self,
        current: &Session,
        offset: FixedOffset,
        default_radius_m: f64,
    ) -> Result<SessionPatch> {
        let mut patch = SessionPatch::default();

        if let Some(name) = self.class_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("class_name cannot be blank".into()));
            }
            patch.class_name = Some(name.to_owned());
        }

        let local_start = current.start.with_timezone(&offset);
        let local_end = current.end.with_timezone(&offset);
        let date = self.date.unwrap_or_else(|| local_start.date_naive());

        if self.date.is_some() || self.start.is_some() {
            let start_time = self.start.unwrap_or_else(|| local_start.time());
            patch.start = Some(local_instant(date, start_time, offset)?);
        }
        let effective_start = patch.start.unwrap_or(current.start);

        if let Some(end) = self.end {
            patch.end = Some(local_instant(date, end, offset)?);
        } else if let Some(minutes) = self.duration_minutes {
            patch.end = Some(effective_start + positive_minutes(minutes)?);
        } else if self.date.is_some() {
            patch.end = Some(local_instant(date, local_end.time(), offset)?);
        }
        let effective_end = patch.end.unwrap_or(current.end);
        if effective_end <= effective_start {
            return Err(AppError::Validation("end must be after start".into()));
        }

        let touches_fence = self.lat.is_some() || self.lng.is_some() || self.radius_m.is_some();
        if self.clear_geofence {
            if touches_fence {
                return Err(AppError::Validation(
                    "cannot both clear and set the geofence".into(),
                ));
            }
            patch.geofence = Some(None);
        } else if touches_fence {
            let (cur_lat, cur_lng, cur_radius) = Geofence::into_parts(current.geofence);
            let lat = self.lat.or(cur_lat);
            let lng = self.lng.or(cur_lng);
            let radius = match self.radius_m.or(cur_radius) {
                None if lat.is_some() && lng.is_some() => Some(default_radius_m),
                other => other,
            };
            patch.geofence = Some(check_radius(Geofence::from_parts(lat, lng, radius)?)?);
        }

        Ok(patch)
    }
}
