//! Verification gate deciding whether attendance can be marked.
//!
//! The gate owns the three independent proofs a student collects (face,
//! speech, location). Each verification action only ever touches its own
//! proof; a failed location fetch clears the position but leaves face and
//! speech intact.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::LocationPolicy;
use crate::geofence::{self, FenceStatus};
use crate::models::session::{Session, SessionPhase};
use crate::models::verification::{Coordinates, Proof, VerificationState};
use crate::{AppError, Result};

/// Reason attendance cannot currently be marked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Blocker {
    /// Session window does not include now.
    NotActive(SessionPhase),
    /// Face check not passed.
    FaceMissing,
    /// Speech check not passed.
    SpeechMissing,
    /// No position held but one is required.
    LocationMissing,
    /// Position held but outside the session geofence.
    OutsideFence {
        /// Distance to the fence center.
        distance_m: f64,
        /// Fence radius in meters.
        radius_m: f64,
    },
}

impl Display for Blocker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotActive(SessionPhase::Upcoming) => write!(f, "session has not started yet"),
            Self::NotActive(_) => write!(f, "session has ended"),
            Self::FaceMissing => write!(f, "complete facial verification first"),
            Self::SpeechMissing => write!(f, "complete speech verification first"),
            Self::LocationMissing => write!(f, "share your location first"),
            Self::OutsideFence {
                distance_m,
                radius_m,
            } => write!(
                f,
                "too far from class: ~{}m (limit {radius_m}m)",
                crate::render::whole_meters(*distance_m)
            ),
        }
    }
}

/// Result of assessing one session against the current proofs.
#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    /// Session phase at assessment time.
    pub phase: SessionPhase,
    /// Geofence evaluation for the held position.
    pub fence: FenceStatus,
    /// Everything standing in the way; empty means markable.
    pub blockers: Vec<Blocker>,
}

impl Readiness {
    /// Whether attendance can be marked right now.
    #[must_use]
    pub fn can_mark(&self) -> bool {
        self.blockers.is_empty()
    }
}

/// Tracks proofs and evaluates the markable predicate.
#[derive(Debug, Clone, Default)]
pub struct VerificationGate {
    state: VerificationState,
    policy: LocationPolicy,
}

impl VerificationGate {
    /// Fresh gate with every proof unset.
    #[must_use]
    pub fn new(policy: LocationPolicy) -> Self {
        Self {
            state: VerificationState::default(),
            policy,
        }
    }

    /// Snapshot of the current proofs.
    #[must_use]
    pub fn state(&self) -> &VerificationState {
        &self.state
    }

    /// Record the outcome of a face check.
    pub fn set_face(&mut self, ok: bool) {
        debug!(ok, "face proof recorded");
        self.state.face_verified = ok;
    }

    /// Record the outcome of a speech check.
    pub fn set_speech(&mut self, ok: bool) {
        debug!(ok, "speech proof recorded");
        self.state.speech_verified = ok;
    }

    /// Record a position fix.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Geolocation` and clears the location proof when the
    /// coordinates are out of range.
    pub fn set_location(&mut self, position: Coordinates) -> Result<()> {
        if !position.is_valid() {
            self.state.position = None;
            return Err(AppError::Geolocation(format!(
                "position out of range: {}, {}",
                position.lat, position.lng
            )));
        }
        info!(lat = position.lat, lng = position.lng, "location acquired");
        self.state.position = Some(position);
        Ok(())
    }

    /// Apply the result of a location fetch.
    ///
    /// On failure the location proof reverts to unset and the error is handed
    /// back for display; face and speech proofs are untouched.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error, or a range error from [`Self::set_location`].
    pub fn apply_location(&mut self, fetched: Result<Coordinates>) -> Result<Coordinates> {
        match fetched {
            Ok(position) => {
                self.set_location(position)?;
                Ok(position)
            }
            Err(err) => {
                info!(%err, "location fetch failed");
                self.state.position = None;
                Err(err)
            }
        }
    }

    /// Number of proofs currently held, out of three.
    #[must_use]
    pub fn verified_count(&self) -> usize {
        Proof::ALL
            .iter()
            .filter(|proof| self.state.holds(**proof))
            .count()
    }

    /// Whether `session` requires a held position under the current policy.
    #[must_use]
    pub fn location_required(&self, session: &Session) -> bool {
        match self.policy {
            LocationPolicy::Always => true,
            LocationPolicy::FencedOnly => session.geofence.is_some(),
        }
    }

    /// List every blocker for marking `session` at `now`.
    #[must_use]
    pub fn assess(&self, session: &Session, now: DateTime<Utc>) -> Readiness {
        let phase = session.phase(now);
        let fence = geofence::evaluate(session.geofence.as_ref(), self.state.position);
        let mut blockers = Vec::new();

        if phase != SessionPhase::Active {
            blockers.push(Blocker::NotActive(phase));
        }
        if !self.state.face_verified {
            blockers.push(Blocker::FaceMissing);
        }
        if !self.state.speech_verified {
            blockers.push(Blocker::SpeechMissing);
        }
        if !self.state.location_acquired() && self.location_required(session) {
            blockers.push(Blocker::LocationMissing);
        }
        if let FenceStatus::Outside {
            distance_m,
            radius_m,
        } = fence
        {
            blockers.push(Blocker::OutsideFence {
                distance_m,
                radius_m,
            });
        }

        Readiness {
            phase,
            fence,
            blockers,
        }
    }

    /// Whether attendance for `session` can be marked at `now`.
    #[must_use]
    pub fn can_mark(&self, session: &Session, now: DateTime<Utc>) -> bool {
        self.assess(session, now).can_mark()
    }
}
