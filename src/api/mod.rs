//! HTTP client for the attendance service's JSON endpoints.
//!
//! Every call is a single request with no retry. Non-success statuses become
//! [`AppError::Api`] carrying the server's `error` field when one is present,
//! or a short `context (status)` summary when the body is not JSON.

pub mod rejection;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GlobalConfig;
use crate::models::attendance::{AttendanceRecord, MarkReceipt, MarkRequest};
use crate::models::session::{NewSession, Session, SessionPatch, SessionRecord};
use crate::{AppError, Result};

/// Header carrying the CSRF token on teacher mutations.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Body of the face and speech check endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Whether the check passed.
    #[serde(default)]
    pub ok: bool,
    /// Optional explanation from the verifier.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhraseBody {
    phrase: String,
}

#[derive(Debug, Deserialize)]
struct CreatedBody {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CountBody {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Filter for `GET /api/attendance`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceQuery<'a> {
    /// Restrict to one student's records.
    pub student_id: Option<&'a str>,
    /// Restrict to one session's records.
    pub session_id: Option<i64>,
}

/// Typed client for the attendance API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl ApiClient {
    /// Build a client from configuration, attaching any loaded credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a credential is not a valid header
    /// value, or `AppError::Http` when the TLS backend fails to initialize.
    pub fn new(config: &GlobalConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ref cookie) = config.credentials.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| AppError::Config(format!("invalid session cookie: {err}")))?;
            headers.insert(COOKIE, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            csrf_token: config.credentials.csrf_token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|err| AppError::Config(format!("bad request url {path}: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "api request");
        self.http.request(method, url)
    }

    fn mutation(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        match self.csrf_token {
            Some(ref token) => builder.header(CSRF_HEADER, token),
            None => builder,
        }
    }

    /// `GET /api/sessions`.
    ///
    /// A record with a partial geofence is listed as unfenced; one with an
    /// out-of-range fence is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let url = self.url("/api/sessions")?;
        let records: Vec<SessionRecord> =
            json(self.request(Method::GET, url), "Failed to load sessions").await?;
        let sessions = records
            .into_iter()
            .filter_map(|record| match Session::try_from(record) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(%err, "skipping malformed session record");
                    None
                }
            })
            .collect();
        Ok(sessions)
    }

    /// `GET /api/attendance` with optional filters.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn list_attendance(
        &self,
        query: AttendanceQuery<'_>,
    ) -> Result<Vec<AttendanceRecord>> {
        let mut url = self.url("/api/attendance")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(student_id) = query.student_id {
                pairs.append_pair("student_id", student_id);
            }
            if let Some(session_id) = query.session_id {
                pairs.append_pair("session_id", &session_id.to_string());
            }
        }
        json(self.request(Method::GET, url), "Failed to load attendance").await
    }

    /// `POST /api/attendance`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Api` whose message is the server's `error` string
    /// (see [`rejection::MarkRejection`]), or `AppError::Http`.
    pub async fn mark_attendance(&self, request: &MarkRequest) -> Result<MarkReceipt> {
        let url = self.url("/api/attendance")?;
        json(
            self.mutation(Method::POST, url).json(request),
            "Mark failed",
        )
        .await
    }

    /// `GET /face_verif`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn face_verify(&self) -> Result<CheckOutcome> {
        let url = self.url("/face_verif")?;
        json(self.request(Method::GET, url), "Face verification failed").await
    }

    /// `GET /speech_verif_phrase`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn speech_phrase(&self) -> Result<String> {
        let url = self.url("/speech_verif_phrase")?;
        let body: PhraseBody =
            json(self.request(Method::GET, url), "Failed to fetch phrase").await?;
        Ok(body.phrase)
    }

    /// `POST /speech_verif?id=&phrase=`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn speech_verify(&self, student_id: &str, phrase: &str) -> Result<CheckOutcome> {
        let mut url = self.url("/speech_verif")?;
        url.query_pairs_mut()
            .append_pair("id", student_id)
            .append_pair("phrase", phrase);
        json(self.request(Method::POST, url), "Speech verification failed").await
    }

    /// `POST /api/sessions`; returns the new session id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn create_session(&self, session: &NewSession) -> Result<i64> {
        let url = self.url("/api/sessions")?;
        let body: CreatedBody = json(
            self.mutation(Method::POST, url).json(session),
            "Failed to create session",
        )
        .await?;
        Ok(body.id)
    }

    /// `PUT /api/sessions/:id` with only the supplied fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty patch, otherwise
    /// `AppError::Http` or `AppError::Api` on request failure.
    pub async fn update_session(&self, id: i64, patch: &SessionPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(AppError::Validation("nothing to update".into()));
        }
        let url = self.url(&format!("/api/sessions/{id}"))?;
        send(
            self.mutation(Method::PUT, url).json(patch),
            "Failed to update session",
        )
        .await?;
        Ok(())
    }

    /// `DELETE /api/sessions/:id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn delete_session(&self, id: i64) -> Result<()> {
        let url = self.url(&format!("/api/sessions/{id}"))?;
        send(self.mutation(Method::DELETE, url), "Failed to delete session").await?;
        Ok(())
    }

    /// `GET /api/sessions/:id/attendance_count`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn attendance_count(&self, id: i64) -> Result<u64> {
        let url = self.url(&format!("/api/sessions/{id}/attendance_count"))?;
        let body: CountBody = json(self.request(Method::GET, url), "Failed to fetch count").await?;
        Ok(body.count)
    }

    /// `GET /api/export_attendance`; returns the spreadsheet bytes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the server has no export yet,
    /// otherwise `AppError::Http` or `AppError::Api`.
    pub async fn export_attendance(&self) -> Result<Vec<u8>> {
        let url = self.url("/api/export_attendance")?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("no attendance export on server".into()));
        }
        let response = check(response, "Failed to export attendance").await?;
        Ok(response.bytes().await?.to_vec())
    }
}

async fn send(builder: RequestBuilder, context: &str) -> Result<Response> {
    let response = builder.send().await?;
    check(response, context).await
}

async fn json<T: DeserializeOwned>(builder: RequestBuilder, context: &str) -> Result<T> {
    let response = send(builder, context).await?;
    response
        .json()
        .await
        .map_err(|err| AppError::Http(format!("{context}: undecodable body: {err}")))
}

/// Turn a non-success response into `AppError::Api`.
async fn check(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    // Non-JSON bodies (HTML error pages) never reach the user.
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error.or(body.message))
        .unwrap_or_else(|| format!("{context} ({})", status.as_u16()));
    debug!(status = status.as_u16(), body = %text.trim(), "api error body");
    warn!(status = status.as_u16(), %message, "api request rejected");
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}
