//! Verification gate transitions and the markable predicate.

use chrono::{Duration, Utc};
use rollcall::config::LocationPolicy;
use rollcall::gate::{Blocker, VerificationGate};
use rollcall::geofence::EARTH_RADIUS_M;
use rollcall::models::session::{Geofence, Session, SessionPhase};
use rollcall::models::verification::{Coordinates, Proof};
use rollcall::AppError;

const CAMPUS: Coordinates = Coordinates::new(12.97, 77.59);

fn north_of(meters: f64) -> Coordinates {
    Coordinates::new(CAMPUS.lat + (meters / EARTH_RADIUS_M).to_degrees(), CAMPUS.lng)
}

fn active_session(fenced: bool) -> Session {
    let now = Utc::now();
    Session {
        id: 1,
        teacher_id: None,
        class_name: "Databases".into(),
        start: now - Duration::minutes(10),
        end: now + Duration::minutes(50),
        geofence: fenced.then_some(Geofence {
            center: CAMPUS,
            radius_m: 100.0,
        }),
    }
}

fn gate_with(face: bool, speech: bool, position: Option<Coordinates>) -> VerificationGate {
    let mut gate = VerificationGate::new(LocationPolicy::Always);
    gate.set_face(face);
    gate.set_speech(speech);
    if let Some(position) = position {
        gate.set_location(position).expect("valid position");
    }
    gate
}

#[test]
fn fresh_gate_holds_nothing() {
    let gate = VerificationGate::new(LocationPolicy::Always);
    assert_eq!(gate.verified_count(), 0);
    for proof in Proof::ALL {
        assert!(!gate.state().holds(proof));
    }
    assert!(!gate.can_mark(&active_session(false), Utc::now()));
}

#[test]
fn markable_is_false_when_any_proof_is_missing() {
    for fenced in [false, true] {
        let session = active_session(fenced);
        for face in [false, true] {
            for speech in [false, true] {
                for located in [false, true] {
                    let position = located.then_some(north_of(10.0));
                    let gate = gate_with(face, speech, position);
                    let expected = face && speech && located;
                    assert_eq!(
                        gate.can_mark(&session, Utc::now()),
                        expected,
                        "fenced={fenced} face={face} speech={speech} located={located}"
                    );
                }
            }
        }
    }
}

#[test]
fn all_proofs_inside_fence_is_markable() {
    let gate = gate_with(true, true, Some(north_of(50.0)));
    let readiness = gate.assess(&active_session(true), Utc::now());
    assert!(readiness.can_mark());
    assert!(readiness.fence.is_member());
    assert_eq!(gate.verified_count(), 3);
}

#[test]
fn outside_fence_blocks_even_with_all_proofs() {
    let gate = gate_with(true, true, Some(north_of(150.0)));
    let readiness = gate.assess(&active_session(true), Utc::now());
    assert!(!readiness.can_mark());
    assert_eq!(readiness.blockers.len(), 1);
    assert!(matches!(
        readiness.blockers[0],
        Blocker::OutsideFence { radius_m, .. } if (radius_m - 100.0).abs() < f64::EPSILON
    ));
}

#[test]
fn inactive_session_is_never_markable() {
    let gate = gate_with(true, true, Some(CAMPUS));
    let mut session = active_session(false);
    let now = Utc::now();

    session.start = now + Duration::minutes(5);
    session.end = now + Duration::minutes(65);
    let readiness = gate.assess(&session, now);
    assert_eq!(readiness.blockers, vec![Blocker::NotActive(SessionPhase::Upcoming)]);

    session.start = now - Duration::minutes(65);
    session.end = now - Duration::minutes(5);
    let readiness = gate.assess(&session, now);
    assert_eq!(readiness.blockers, vec![Blocker::NotActive(SessionPhase::Past)]);
}

#[test]
fn proofs_are_independent() {
    let mut gate = gate_with(true, true, Some(CAMPUS));
    gate.set_face(false);
    assert!(!gate.state().face_verified);
    assert!(gate.state().speech_verified);
    assert!(gate.state().location_acquired());

    gate.set_speech(false);
    assert!(gate.state().location_acquired());
    assert_eq!(gate.verified_count(), 1);
}

#[test]
fn location_failure_clears_only_location() {
    let mut gate = gate_with(true, true, Some(CAMPUS));
    let err = gate
        .apply_location(Err(AppError::Geolocation("User denied Geolocation".into())))
        .unwrap_err();

    assert_eq!(err.to_string(), "geolocation: User denied Geolocation");
    assert!(!gate.state().location_acquired());
    assert!(gate.state().face_verified);
    assert!(gate.state().speech_verified);
    assert_eq!(gate.verified_count(), 2);
}

#[test]
fn out_of_range_position_is_rejected() {
    let mut gate = gate_with(false, false, Some(CAMPUS));
    assert!(gate.set_location(Coordinates::new(120.0, 0.0)).is_err());
    assert!(!gate.state().location_acquired());
}

#[test]
fn fenced_only_policy_skips_location_for_unfenced_sessions() {
    let mut gate = VerificationGate::new(LocationPolicy::FencedOnly);
    gate.set_face(true);
    gate.set_speech(true);

    assert!(gate.can_mark(&active_session(false), Utc::now()));

    let readiness = gate.assess(&active_session(true), Utc::now());
    assert_eq!(readiness.blockers, vec![Blocker::LocationMissing]);
}

#[test]
fn always_policy_requires_location_for_unfenced_sessions() {
    let gate = gate_with(true, true, None);
    let readiness = gate.assess(&active_session(false), Utc::now());
    assert_eq!(readiness.blockers, vec![Blocker::LocationMissing]);
    assert!(gate.location_required(&active_session(false)));
}

#[test]
fn blockers_list_every_missing_proof() {
    let gate = VerificationGate::new(LocationPolicy::Always);
    let readiness = gate.assess(&active_session(true), Utc::now());
    assert_eq!(
        readiness.blockers,
        vec![Blocker::FaceMissing, Blocker::SpeechMissing, Blocker::LocationMissing]
    );
}

#[test]
fn blocker_messages_are_readable() {
    assert_eq!(Blocker::FaceMissing.to_string(), "complete facial verification first");
    assert_eq!(
        Blocker::OutsideFence {
            distance_m: 149.6,
            radius_m: 100.0
        }
        .to_string(),
        "too far from class: ~150m (limit 100m)"
    );
}
