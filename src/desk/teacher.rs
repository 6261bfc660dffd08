//! Teacher desk: session overview with counts, create, edit, delete, export.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::GlobalConfig;
use crate::editor::{SessionDraft, SessionEdit};
use crate::feed::SessionFeed;
use crate::models::session::Session;
use crate::render;
use crate::{AppError, Result};

/// Snapshot rendered after a refresh.
#[derive(Debug, Clone)]
pub struct TeacherView {
    /// Partitioned sessions.
    pub feed: SessionFeed,
    /// Attendance count per session id; missing when the count call failed.
    pub counts: HashMap<i64, u64>,
}

/// Per-process teacher front end.
#[derive(Debug)]
pub struct TeacherDesk {
    client: ApiClient,
    teacher_id: Option<i64>,
    offset: FixedOffset,
    default_radius_m: f64,
}

impl TeacherDesk {
    /// Build a desk from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an out-of-range display offset.
    pub fn new(client: ApiClient, config: &GlobalConfig) -> Result<Self> {
        Ok(Self {
            client,
            teacher_id: config.teacher.teacher_id,
            offset: config.display_offset()?,
            default_radius_m: config.default_radius_m,
        })
    }

    fn require_teacher_id(&self) -> Result<i64> {
        self.teacher_id.ok_or_else(|| {
            AppError::Config("Please sign in as a teacher first: set teacher.teacher_id".into())
        })
    }

    /// Radius applied to drafts that set a center without one.
    #[must_use]
    pub fn default_radius_m(&self) -> f64 {
        self.default_radius_m
    }

    /// Fetch all sessions and their attendance counts.
    ///
    /// A failed count is logged and shown as unknown rather than failing
    /// the whole overview.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Api` if the session list fails.
    pub async fn overview(&self, now: DateTime<Utc>) -> Result<TeacherView> {
        let sessions = self.client.list_sessions().await?;
        let feed = SessionFeed::partition(sessions, now);
        let mut counts = HashMap::with_capacity(feed.len());
        for session in feed.iter() {
            match self.client.attendance_count(session.id).await {
                Ok(count) => {
                    counts.insert(session.id, count);
                }
                Err(err) => warn!(session_id = session.id, %err, "attendance count failed"),
            }
        }
        Ok(TeacherView { feed, counts })
    }

    /// Look up one session by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the server does not list it.
    pub async fn session(&self, id: i64) -> Result<Session> {
        self.client
            .list_sessions()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("session {id}")))
    }

    /// Validate `draft` and create it; returns the new id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` without a teacher id,
    /// `AppError::Validation` for a bad form, or the API error.
    pub async fn create(&self, draft: SessionDraft) -> Result<i64> {
        let teacher_id = self.require_teacher_id()?;
        let new_session = draft.into_new_session(teacher_id, self.offset, self.default_radius_m)?;
        let id = self.client.create_session(&new_session).await?;
        info!(id, class_name = %new_session.class_name, "session created");
        Ok(id)
    }

    /// Apply `edit` to session `id`, sending only the changed fields.
    ///
    /// Returns the session as it stands after the edit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, `AppError::Validation`, or the API error.
    pub async fn edit(&self, id: i64, edit: SessionEdit) -> Result<Session> {
        let mut session = self.session(id).await?;
        let patch = edit.into_patch(&session, self.offset, self.default_radius_m)?;
        self.client.update_session(id, &patch).await?;
        session.apply_patch(&patch)?;
        info!(id, "session updated");
        Ok(session)
    }

    /// Delete session `id`.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client.delete_session(id).await?;
        info!(id, "session deleted");
        Ok(())
    }

    /// Attendance count for session `id`.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn count(&self, id: i64) -> Result<u64> {
        self.client.attendance_count(id).await
    }

    /// Download the attendance spreadsheet to `path`; returns bytes written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the server has no export, the API
    /// error, or `AppError::Io` if the file cannot be written.
    pub async fn export(&self, path: &Path) -> Result<usize> {
        let bytes = self.client.export_attendance().await?;
        tokio::fs::write(path, &bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "attendance exported");
        Ok(bytes.len())
    }

    /// Render `view` as text: current and upcoming first, then past.
    #[must_use]
    pub fn render(&self, view: &TeacherView, now: DateTime<Utc>) -> String {
        let card = |s: &Session| {
            render::teacher_card(s, view.counts.get(&s.id).copied(), now, self.offset)
        };
        let current: Vec<String> = view
            .feed
            .active
            .iter()
            .chain(view.feed.upcoming.iter())
            .map(card)
            .collect();
        let past: Vec<String> = view.feed.past.iter().map(card).collect();
        [
            render::section("Sessions", &current, "No sessions yet."),
            render::section("Past sessions", &past, "No past sessions."),
        ]
        .join("\n\n")
    }
}
