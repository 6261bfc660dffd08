//! Transient verification state held for the lifetime of one desk.

use serde::{Deserialize, Serialize};

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lng: f64,
}

impl Coordinates {
    /// Construct a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and within the valid degree range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// One of the three independent proofs a student collects before marking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Proof {
    /// Facial recognition with liveness check.
    Face,
    /// Spoken passphrase check.
    Speech,
    /// Device position acquired.
    Location,
}

impl Proof {
    /// All proofs in display order.
    pub const ALL: [Self; 3] = [Self::Face, Self::Speech, Self::Location];
}

/// Per-process verification flags. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VerificationState {
    /// Face check succeeded.
    pub face_verified: bool,
    /// Speech check succeeded.
    pub speech_verified: bool,
    /// Last known position; `Some` iff location is acquired.
    pub position: Option<Coordinates>,
}

impl VerificationState {
    /// Whether a position is currently held.
    #[must_use]
    pub fn location_acquired(&self) -> bool {
        self.position.is_some()
    }

    /// Current value of a single proof.
    #[must_use]
    pub fn holds(&self, proof: Proof) -> bool {
        match proof {
            Proof::Face => self.face_verified,
            Proof::Speech => self.speech_verified,
            Proof::Location => self.location_acquired(),
        }
    }
}
