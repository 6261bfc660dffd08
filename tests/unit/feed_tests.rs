//! Partitioning a session list at an instant.

use chrono::{DateTime, Duration, Utc};
use rollcall::feed::SessionFeed;
use rollcall::models::session::Session;

fn session(id: i64, now: DateTime<Utc>, start_min: i64, end_min: i64) -> Session {
    Session {
        id,
        teacher_id: None,
        class_name: format!("Class {id}"),
        start: now + Duration::minutes(start_min),
        end: now + Duration::minutes(end_min),
        geofence: None,
    }
}

#[test]
fn partition_is_exclusive_and_exhaustive() {
    let now = Utc::now();
    let sessions = vec![
        session(1, now, -30, 30),
        session(2, now, 60, 120),
        session(3, now, -120, -60),
        session(4, now, 0, 45),
        session(5, now, -45, 0),
    ];
    let feed = SessionFeed::partition(sessions, now);

    let ids = |list: &[Session]| list.iter().map(|s| s.id).collect::<Vec<_>>();
    assert_eq!(ids(&feed.active), vec![1, 4, 5]);
    assert_eq!(ids(&feed.upcoming), vec![2]);
    assert_eq!(ids(&feed.past), vec![3]);
    assert_eq!(feed.len(), 5);
    assert_eq!(feed.as_of, now);
}

#[test]
fn empty_list_gives_empty_feed() {
    let feed = SessionFeed::partition(Vec::new(), Utc::now());
    assert!(feed.is_empty());
    assert!(feed.find(1).is_none());
}

#[test]
fn find_searches_every_phase() {
    let now = Utc::now();
    let feed = SessionFeed::partition(
        vec![session(1, now, -30, 30), session(2, now, 60, 120), session(3, now, -120, -60)],
        now,
    );
    for id in 1..=3 {
        assert_eq!(feed.find(id).map(|s| s.id), Some(id));
    }
    assert!(feed.find(9).is_none());
}

#[test]
fn iter_orders_active_upcoming_past() {
    let now = Utc::now();
    let feed = SessionFeed::partition(
        vec![session(3, now, -120, -60), session(2, now, 60, 120), session(1, now, -30, 30)],
        now,
    );
    let order: Vec<i64> = feed.iter().map(|s| s.id).collect();
    assert_eq!(order, vec![1, 2, 3]);
}
