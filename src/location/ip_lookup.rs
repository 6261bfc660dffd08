//! IP-based position lookup with proxy detection.

use serde::Deserialize;
use tracing::{info, warn};

use super::{LocateFuture, LocationProvider};
use crate::models::verification::Coordinates;
use crate::{AppError, Result};

#[derive(Debug, Default, Deserialize)]
struct LookupBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    hosting: bool,
}

/// Resolves the public IP's approximate position via an `ip-api.com`
/// compatible JSON endpoint. Proxy and hosting addresses are refused.
#[derive(Debug, Clone)]
pub struct IpLocator {
    http: reqwest::Client,
    url: String,
}

impl IpLocator {
    /// Locator querying `url`.
    #[must_use]
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    async fn lookup(&self) -> Result<Coordinates> {
        let body: LookupBody = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AppError::Geolocation(format!("lookup failed: {err}")))?
            .error_for_status()
            .map_err(|err| AppError::Geolocation(format!("lookup failed: {err}")))?
            .json()
            .await
            .map_err(|err| AppError::Geolocation(format!("lookup returned bad json: {err}")))?;
        interpret(body)
    }
}

fn interpret(body: LookupBody) -> Result<Coordinates> {
    if body.status.as_deref() != Some("success") {
        let reason = body.message.unwrap_or_else(|| "lookup_failed".into());
        warn!(%reason, "ip lookup unsuccessful");
        return Err(AppError::Geolocation(reason));
    }
    if body.proxy || body.hosting {
        warn!(proxy = body.proxy, hosting = body.hosting, "proxy address refused");
        return Err(AppError::Geolocation("proxy detected".into()));
    }
    match (body.lat, body.lon) {
        (Some(lat), Some(lng)) => {
            info!(lat, lng, "ip lookup resolved");
            Ok(Coordinates::new(lat, lng))
        }
        _ => Err(AppError::Geolocation("lookup returned no coordinates".into())),
    }
}

impl LocationProvider for IpLocator {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn locate(&self) -> LocateFuture<'_> {
        Box::pin(self.lookup())
    }
}
