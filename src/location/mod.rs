//! Sources of the student's current position.
//!
//! The [`LocationProvider`] trait stands in for the browser geolocation
//! call: one attempt, one answer, no caching. Failures are reported as
//! [`AppError::Geolocation`](crate::AppError::Geolocation) with a message
//! fit to show the user.

pub mod ip_lookup;

use std::future::Future;
use std::pin::Pin;

use crate::models::verification::Coordinates;
use crate::{AppError, Result};

pub use ip_lookup::IpLocator;

/// Boxed future returned by [`LocationProvider::locate`].
pub type LocateFuture<'a> = Pin<Box<dyn Future<Output = Result<Coordinates>> + Send + 'a>>;

/// One-shot position source.
pub trait LocationProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Acquire the current position.
    fn locate(&self) -> LocateFuture<'_>;
}

/// Position supplied up front (config file or command line).
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    position: Coordinates,
}

impl FixedLocation {
    /// Provider that always answers `position`.
    #[must_use]
    pub fn new(position: Coordinates) -> Self {
        Self { position }
    }
}

impl LocationProvider for FixedLocation {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn locate(&self) -> LocateFuture<'_> {
        let position = self.position;
        Box::pin(async move { Ok(position) })
    }
}

/// Provider used when no position source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn name(&self) -> &'static str {
        "none"
    }

    fn locate(&self) -> LocateFuture<'_> {
        Box::pin(async {
            Err(AppError::Geolocation(
                "Geolocation not supported: pass --lat/--lng, --ip-locate, or set [location]"
                    .into(),
            ))
        })
    }
}
