//! Session feed: time partitioning plus the background poller.

pub mod poller;

use chrono::{DateTime, Utc};

use crate::models::session::{Session, SessionPhase};

pub use poller::spawn_feed_task;

/// Sessions split by phase at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFeed {
    /// Instant the partition was computed for.
    pub as_of: DateTime<Utc>,
    /// Sessions whose window includes `as_of`.
    pub active: Vec<Session>,
    /// Sessions starting after `as_of`.
    pub upcoming: Vec<Session>,
    /// Sessions that ended before `as_of`.
    pub past: Vec<Session>,
}

impl SessionFeed {
    /// Partition `sessions` at `now`, preserving server order within each group.
    #[must_use]
    pub fn partition(sessions: Vec<Session>, now: DateTime<Utc>) -> Self {
        let mut feed = Self {
            as_of: now,
            active: Vec::new(),
            upcoming: Vec::new(),
            past: Vec::new(),
        };
        for session in sessions {
            match session.phase(now) {
                SessionPhase::Active => feed.active.push(session),
                SessionPhase::Upcoming => feed.upcoming.push(session),
                SessionPhase::Past => feed.past.push(session),
            }
        }
        feed
    }

    /// Total number of sessions across all phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len() + self.upcoming.len() + self.past.len()
    }

    /// Whether the feed holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every session, active first, then upcoming, then past.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.active
            .iter()
            .chain(self.upcoming.iter())
            .chain(self.past.iter())
    }

    /// Look a session up by id.
    #[must_use]
    pub fn find(&self, id: i64) -> Option<&Session> {
        self.iter().find(|s| s.id == id)
    }
}
