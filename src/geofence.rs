//! Great-circle distance and geofence membership.

use crate::models::session::Geofence;
use crate::models::verification::Coordinates;

/// Mean Earth radius used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points, in meters.
#[must_use]
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

impl Geofence {
    /// Distance from the fence center to `point`, in meters.
    #[must_use]
    pub fn distance_to(&self, point: Coordinates) -> f64 {
        haversine_m(point, self.center)
    }

    /// Whether `point` lies within the radius (boundary inclusive).
    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        self.distance_to(point) <= self.radius_m
    }
}

/// Outcome of checking a position against an optional fence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FenceStatus {
    /// Session has no fence; membership is trivially true.
    Unfenced,
    /// Session has a fence but no position is held.
    Unknown {
        /// Fence radius in meters.
        radius_m: f64,
    },
    /// Position is within the radius.
    Inside {
        /// Distance to the fence center.
        distance_m: f64,
        /// Fence radius in meters.
        radius_m: f64,
    },
    /// Position is beyond the radius.
    Outside {
        /// Distance to the fence center.
        distance_m: f64,
        /// Fence radius in meters.
        radius_m: f64,
    },
}

impl FenceStatus {
    /// Whether this status permits marking attendance.
    #[must_use]
    pub fn is_member(&self) -> bool {
        matches!(self, Self::Unfenced | Self::Inside { .. })
    }
}

/// Evaluate `position` against `fence`.
#[must_use]
pub fn evaluate(fence: Option<&Geofence>, position: Option<Coordinates>) -> FenceStatus {
    match (fence, position) {
        (None, _) => FenceStatus::Unfenced,
        (Some(fence), None) => FenceStatus::Unknown {
            radius_m: fence.radius_m,
        },
        (Some(fence), Some(point)) => {
            let distance_m = fence.distance_to(point);
            if distance_m <= fence.radius_m {
                FenceStatus::Inside {
                    distance_m,
                    radius_m: fence.radius_m,
                }
            } else {
                FenceStatus::Outside {
                    distance_m,
                    radius_m: fence.radius_m,
                }
            }
        }
    }
}
