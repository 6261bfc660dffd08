//! Plain-text builders for session cards, badges, and history rows.

use chrono::{DateTime, FixedOffset, Utc};

use crate::gate::Readiness;
use crate::geofence::FenceStatus;
use crate::models::attendance::AttendanceRecord;
use crate::models::session::{Session, SessionPhase};

const PIN: &str = "\u{1f4cd}";
const PUSHPIN: &str = "\u{1f4cc}";
const CHECK: &str = "\u{2705}";
const ARROW: &str = "\u{2192}";
const PEOPLE: &str = "\u{1f465}";

/// Distance rounded to whole meters, never below 1.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn whole_meters(distance_m: f64) -> u64 {
    if distance_m.is_finite() {
        distance_m.round().max(1.0) as u64
    } else {
        u64::MAX
    }
}

/// `d/m/yyyy, hh:mm am` in `offset`.
#[must_use]
pub fn date_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%-d/%-m/%Y, %I:%M %P")
        .to_string()
}

/// `hh:mm am` in `offset`.
#[must_use]
pub fn time_of_day(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%I:%M %P").to_string()
}

/// `start -> end` window label.
#[must_use]
pub fn window(session: &Session, offset: FixedOffset) -> String {
    format!(
        "{} {ARROW} {}",
        date_time(session.start, offset),
        time_of_day(session.end, offset)
    )
}

/// `n/3 verified`.
#[must_use]
pub fn verify_badge(count: usize) -> String {
    format!("{count}/3 verified")
}

/// Badge describing the held position against a session fence.
#[must_use]
pub fn fence_badge(status: FenceStatus, location_held: bool) -> Option<String> {
    match status {
        FenceStatus::Inside { distance_m, .. } => {
            Some(format!("{PIN} within ~{}m", whole_meters(distance_m)))
        }
        FenceStatus::Outside {
            distance_m,
            radius_m,
        } => Some(format!(
            "{PIN} too far (~{}m, limit {radius_m}m)",
            whole_meters(distance_m)
        )),
        FenceStatus::Unknown { .. } | FenceStatus::Unfenced if !location_held => {
            Some(format!("{PIN} enable location"))
        }
        FenceStatus::Unknown { .. } | FenceStatus::Unfenced => None,
    }
}

/// Student-facing card for one session.
#[must_use]
pub fn student_card(
    session: &Session,
    readiness: &Readiness,
    location_held: bool,
    offset: FixedOffset,
) -> String {
    let mut lines = vec![
        format!("#{} {}", session.id, session.class_name),
        format!("  {}", window(session, offset)),
    ];
    if let Some(fence) = session.geofence {
        lines.push(format!("  {PUSHPIN} {}m radius", fence.radius_m));
    }
    if let Some(badge) = fence_badge(readiness.fence, location_held) {
        lines.push(format!("  {badge}"));
    }
    if readiness.phase == SessionPhase::Active {
        if readiness.can_mark() {
            lines.push("  [Mark Attendance] ready".into());
        } else {
            let reasons: Vec<String> = readiness.blockers.iter().map(ToString::to_string).collect();
            lines.push(format!("  [Mark Attendance] blocked: {}", reasons.join("; ")));
        }
    }
    lines.join("\n")
}

/// Status label used on teacher cards.
#[must_use]
pub fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Active => "\u{1f7e2} Active",
        SessionPhase::Upcoming => "\u{1f552} Upcoming",
        SessionPhase::Past => "\u{23f9} Ended",
    }
}

/// Teacher-facing card for one session with its attendance count.
#[must_use]
pub fn teacher_card(
    session: &Session,
    count: Option<u64>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let mut lines = vec![
        format!("#{} {}", session.id, session.class_name),
        format!("  {}", phase_label(session.phase(now))),
        format!("  {}", window(session, offset)),
    ];
    match count {
        Some(count) => lines.push(format!("  {PEOPLE} {count} marked")),
        None => lines.push(format!("  {PEOPLE} ? marked")),
    }
    if let Some(fence) = session.geofence {
        lines.push(format!("  {PIN} {}m radius", fence.radius_m));
    }
    lines.join("\n")
}

/// One row of the student's attendance history.
///
/// Falls back to `Session #id` for sessions no longer in the feed, and to
/// `now` for records without a timestamp.
#[must_use]
pub fn history_entry(
    record: &AttendanceRecord,
    sessions: &[Session],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let title = sessions
        .iter()
        .find(|s| s.id == record.session_id)
        .map_or_else(
            || format!("Session #{}", record.session_id),
            |s| s.class_name.clone(),
        );
    let when = date_time(record.marked_at.unwrap_or(now), offset);
    format!("{title}\n  {CHECK} Marked\n  {when}")
}

/// Join cards, or show `empty` when there are none.
#[must_use]
pub fn section(heading: &str, cards: &[String], empty: &str) -> String {
    if cards.is_empty() {
        format!("== {heading} ==\n{empty}")
    } else {
        format!("== {heading} ==\n{}", cards.join("\n\n"))
    }
}
