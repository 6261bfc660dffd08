//! Student desk: verification proofs, session cards, and the mark flow.

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, info_span, warn, Instrument};

use crate::api::rejection::MarkRejection;
use crate::api::{ApiClient, AttendanceQuery, CheckOutcome};
use crate::config::GlobalConfig;
use crate::feed::SessionFeed;
use crate::gate::{Blocker, Readiness, VerificationGate};
use crate::location::LocationProvider;
use crate::models::attendance::{AttendanceRecord, MarkReceipt, MarkRequest};
use crate::models::session::Session;
use crate::models::verification::Coordinates;
use crate::render;
use crate::{AppError, Result};

/// Result of a mark attempt that reached a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    /// Server accepted the mark.
    Marked(MarkReceipt),
    /// Gate refused before any request was sent.
    Blocked(Vec<Blocker>),
    /// Server refused the mark.
    Rejected(MarkRejection),
}

impl MarkOutcome {
    /// Message shown to the student.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Marked(receipt) => receipt
                .message
                .clone()
                .unwrap_or_else(|| "Attendance marked".into()),
            Self::Blocked(blockers) => {
                let reasons: Vec<String> = blockers.iter().map(ToString::to_string).collect();
                format!("Cannot mark yet: {}", reasons.join("; "))
            }
            Self::Rejected(rejection) => rejection.user_message(),
        }
    }
}

/// Snapshot rendered after a refresh.
#[derive(Debug, Clone)]
pub struct StudentView {
    /// Partitioned sessions.
    pub feed: SessionFeed,
    /// Readiness for each active and upcoming session, in feed order.
    pub readiness: Vec<(i64, Readiness)>,
    /// Own attendance rows; `None` when no student id is configured.
    pub history: Option<Vec<AttendanceRecord>>,
    /// Proofs held, out of three.
    pub verified: usize,
    /// Whether a position is held.
    pub location_held: bool,
}

/// Per-process student front end.
#[derive(Debug)]
pub struct StudentDesk {
    client: ApiClient,
    gate: VerificationGate,
    student_id: Option<String>,
    offset: FixedOffset,
    sessions: Vec<Session>,
}

impl StudentDesk {
    /// Desk with every proof unset and an empty session cache.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an out-of-range display offset.
    pub fn new(client: ApiClient, config: &GlobalConfig) -> Result<Self> {
        Ok(Self {
            client,
            gate: VerificationGate::new(config.location_policy),
            student_id: config.student.student_id.clone(),
            offset: config.display_offset()?,
            sessions: Vec::new(),
        })
    }

    /// Current verification gate.
    #[must_use]
    pub fn gate(&self) -> &VerificationGate {
        &self.gate
    }

    /// Sessions from the most recent refresh.
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Registration number this desk marks attendance for.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `[student] student_id` is unset.
    pub fn student_id(&self) -> Result<&str> {
        self.student_id
            .as_deref()
            .ok_or_else(|| AppError::Config("Please log in first: set student.student_id".into()))
    }

    /// Run the face check and record its outcome.
    ///
    /// A transport failure leaves the face proof unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn verify_face(&mut self) -> Result<CheckOutcome> {
        let outcome = self.client.face_verify().await?;
        self.gate.set_face(outcome.ok);
        info!(ok = outcome.ok, "face verification finished");
        Ok(outcome)
    }

    /// Fetch a phrase, run the speech check, and record its outcome.
    ///
    /// Returns the phrase the student was asked to read with the outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` without a student id, otherwise
    /// `AppError::Http` or `AppError::Api`.
    pub async fn verify_speech(&mut self) -> Result<(String, CheckOutcome)> {
        let student_id = self.student_id()?.to_owned();
        let phrase = self.client.speech_phrase().await?;
        let outcome = self.client.speech_verify(&student_id, &phrase).await?;
        self.gate.set_speech(outcome.ok);
        info!(ok = outcome.ok, "speech verification finished");
        Ok((phrase, outcome))
    }

    /// Ask `provider` for a position and record it.
    ///
    /// On failure the location proof reverts to unset; face and speech
    /// proofs are kept.
    ///
    /// # Errors
    ///
    /// Returns the provider's `AppError::Geolocation`.
    pub async fn acquire_location(
        &mut self,
        provider: &dyn LocationProvider,
    ) -> Result<Coordinates> {
        let fetched = provider
            .locate()
            .instrument(info_span!("locate", provider = provider.name()))
            .await;
        self.gate.apply_location(fetched)
    }

    /// Re-fetch sessions (and history, when logged in) and assess each one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` on request failure.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Result<StudentView> {
        let sessions = self.client.list_sessions().await?;
        self.absorb(sessions, now).await
    }

    /// Replace the session cache with `sessions` (e.g. from the feed poller),
    /// fetch history when logged in, and assess each session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` if the history call fails.
    pub async fn absorb(
        &mut self,
        sessions: Vec<Session>,
        now: DateTime<Utc>,
    ) -> Result<StudentView> {
        self.sessions = sessions;
        let feed = SessionFeed::partition(self.sessions.clone(), now);
        let readiness = feed
            .active
            .iter()
            .chain(feed.upcoming.iter())
            .map(|s| (s.id, self.gate.assess(s, now)))
            .collect();
        let history = match self.student_id {
            Some(ref id) => Some(
                self.client
                    .list_attendance(AttendanceQuery {
                        student_id: Some(id),
                        session_id: None,
                    })
                    .await?,
            ),
            None => None,
        };
        Ok(StudentView {
            feed,
            readiness,
            history,
            verified: self.gate.verified_count(),
            location_held: self.gate.state().location_acquired(),
        })
    }

    /// Attempt to mark attendance for `session_id`.
    ///
    /// The gate is consulted first; nothing is sent while any blocker
    /// remains. Server rejections are classified, not returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` without a student id, `AppError::NotFound`
    /// for an unknown session, or `AppError::Http` / `AppError::Api` for
    /// transport failures other than a classified rejection.
    pub async fn mark(&mut self, session_id: i64, now: DateTime<Utc>) -> Result<MarkOutcome> {
        let student_id = self.student_id()?.to_owned();
        if !self.sessions.iter().any(|s| s.id == session_id) {
            self.sessions = self.client.list_sessions().await?;
        }
        let session = self
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

        let readiness = self.gate.assess(session, now);
        if !readiness.can_mark() {
            info!(session_id, blockers = readiness.blockers.len(), "mark blocked by gate");
            return Ok(MarkOutcome::Blocked(readiness.blockers));
        }

        let request = MarkRequest::from_state(session_id, &student_id, self.gate.state());
        match self.client.mark_attendance(&request).await {
            Ok(receipt) => {
                info!(session_id, "attendance marked");
                Ok(MarkOutcome::Marked(receipt))
            }
            Err(err @ AppError::Api { status, .. }) if status < 500 => {
                let rejection = MarkRejection::from_error(&err)
                    .unwrap_or_else(|| MarkRejection::Other(String::new()));
                warn!(session_id, ?rejection, "attendance rejected");
                Ok(MarkOutcome::Rejected(rejection))
            }
            Err(err) => Err(err),
        }
    }

    /// Render `view` as text.
    #[must_use]
    pub fn render(&self, view: &StudentView, now: DateTime<Utc>) -> String {
        let card = |session: &Session| {
            view.readiness
                .iter()
                .find(|(id, _)| *id == session.id)
                .map(|(_, readiness)| {
                    render::student_card(session, readiness, view.location_held, self.offset)
                })
        };
        let active: Vec<String> = view.feed.active.iter().filter_map(card).collect();
        let upcoming: Vec<String> = view.feed.upcoming.iter().filter_map(card).collect();

        let history = match view.history {
            None => vec![],
            Some(ref records) => records
                .iter()
                .map(|r| render::history_entry(r, &self.sessions, now, self.offset))
                .collect(),
        };
        let history_empty = if view.history.is_some() {
            "No records yet."
        } else {
            "Log in to see your attendance."
        };

        [
            render::verify_badge(view.verified),
            render::section("Active sessions", &active, "No active sessions."),
            render::section("Upcoming sessions", &upcoming, "No upcoming sessions."),
            render::section("My attendance", &history, history_empty),
        ]
        .join("\n\n")
    }
}
