//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::verification::Coordinates;
use crate::{AppError, Result};

/// Keychain service name used for stored credentials.
pub const KEYRING_SERVICE: &str = "rollcall";

/// When a student must hold a position before marking attendance.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationPolicy {
    /// Every session requires a position.
    #[default]
    Always,
    /// Only sessions with a geofence require a position.
    FencedOnly,
}

/// Student identity settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StudentConfig {
    /// Registration number sent as `student_id`.
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Teacher identity settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TeacherConfig {
    /// Numeric teacher user id sent as `teacher_id`.
    #[serde(default)]
    pub teacher_id: Option<i64>,
}

/// Fixed device position used when no live locator is selected.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FixedLocationConfig {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl FixedLocationConfig {
    /// Coordinates of this position.
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Session credentials (populated at runtime, never read from TOML).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Raw `Cookie` header value of a logged-in browser session.
    pub session_cookie: Option<String>,
    /// CSRF token sent as `X-CSRFToken` on teacher mutations.
    pub csrf_token: Option<String>,
}

fn default_poll_interval_seconds() -> u64 {
    15
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_display_utc_offset_minutes() -> i32 {
    // Asia/Kolkata
    330
}

fn default_radius_m() -> f64 {
    150.0
}

fn default_ip_lookup_url() -> String {
    "http://ip-api.com/json/?fields=status,message,lat,lon,proxy,hosting".into()
}

/// Global configuration parsed from `rollcall.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root URL of the attendance service, e.g. `http://127.0.0.1:5000`.
    pub base_url: String,
    /// Seconds between session feed refreshes.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Offset from UTC, in minutes, used to read and display local times.
    #[serde(default = "default_display_utc_offset_minutes")]
    pub display_utc_offset_minutes: i32,
    /// Whether unfenced sessions still require a position.
    #[serde(default)]
    pub location_policy: LocationPolicy,
    /// Radius applied when a teacher sets a center without a radius.
    #[serde(default = "default_radius_m")]
    pub default_radius_m: f64,
    /// Endpoint for IP-based position lookup.
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,
    /// Student identity.
    #[serde(default)]
    pub student: StudentConfig,
    /// Teacher identity.
    #[serde(default)]
    pub teacher: TeacherConfig,
    /// Optional fixed device position.
    #[serde(default)]
    pub location: Option<FixedLocationConfig>,
    /// Session credentials (populated at runtime).
    #[serde(skip)]
    pub credentials: Credentials,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration pointing at `base_url` with all defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `base_url` is not an http(s) URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let mut config = Self {
            base_url: base_url.into(),
            poll_interval_seconds: default_poll_interval_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            display_utc_offset_minutes: default_display_utc_offset_minutes(),
            location_policy: LocationPolicy::default(),
            default_radius_m: default_radius_m(),
            ip_lookup_url: default_ip_lookup_url(),
            student: StudentConfig::default(),
            teacher: TeacherConfig::default(),
            location: None,
            credentials: Credentials::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load session credentials from OS keychain with env-var fallback.
    ///
    /// Missing credentials are not an error: the service may run without
    /// login enforcement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain worker task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.credentials.session_cookie =
            load_credential("session_cookie", "ROLLCALL_SESSION_COOKIE").await?;
        self.credentials.csrf_token = load_credential("csrf_token", "ROLLCALL_CSRF_TOKEN").await?;
        Ok(())
    }

    /// Interval between feed refreshes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Offset used to interpret and display wall-clock times.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the offset is outside +/- 24 hours.
    pub fn display_offset(&self) -> Result<FixedOffset> {
        self.display_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "display_utc_offset_minutes out of range: {}",
                    self.display_utc_offset_minutes
                ))
            })
    }

    fn validate(&mut self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|err| AppError::Config(format!("base_url invalid: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        self.base_url = self.base_url.trim_end_matches('/').to_owned();

        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        self.display_offset()?;

        if !self.default_radius_m.is_finite() || self.default_radius_m <= 0.0 {
            return Err(AppError::Config(
                "default_radius_m must be a positive number".into(),
            ));
        }

        if let Some(location) = self.location {
            if !location.coordinates().is_valid() {
                return Err(AppError::Config(format!(
                    "location out of range: {}, {}",
                    location.latitude, location.longitude
                )));
            }
        }

        if matches!(self.student.student_id.as_deref(), Some(id) if id.trim().is_empty()) {
            self.student.student_id = None;
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            debug!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            debug!(key = keyring_key, ?err, "keychain lookup failed, trying env var");
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        _ => {
            warn!(
                key = keyring_key,
                env = env_key,
                "credential not found in keychain or environment"
            );
            Ok(None)
        }
    }
}
