//! The booking engine: converts `(availability, time slice)` into a
//! committed session, consuming one-off availability windows as it goes.
//!
//! Every booking runs inside one IMMEDIATE SQLite transaction, so the
//! read-then-decide overlap guard and the window consumption commit (or roll
//! back) together. SQLite admits a single writer, which makes two racing
//! bookings serialize; the loser re-reads committed state and is rejected
//! with a conflict. The `UNIQUE (tutor_id, start_time, end_time)` constraint
//! backs that up at the storage layer.

use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use tracing::info;

use crate::db::{self, Database};
use crate::error::{Error, Result};
use crate::interval::{self, Window};
use crate::models::{Availability, Session, SessionStatus, User};

/// What happened to the availability window during a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Recurring windows are never mutated by booking.
    Untouched,
    /// The window shrank to a single remainder.
    Shrunk,
    /// The window split: the original row keeps the left remainder, a new
    /// row holds the right one.
    Split { right_id: i64 },
    /// The booked slice covered the whole window; the row is gone.
    Deleted,
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub session: Session,
    pub consumption: Consumption,
}

impl Database {
    /// Books a slice of an availability window for the calling student.
    pub fn book_from_availability(
        &mut self,
        caller: &User,
        availability_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        course: Option<&str>,
    ) -> Result<BookingOutcome> {
        if !caller.is_student() {
            return Err(Error::forbidden("only students can book sessions"));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let availability = db::fetch_availability(&tx, availability_id)?
            .ok_or_else(|| Error::not_found("availability", availability_id))?;

        if end_time <= start_time {
            return Err(Error::validation("end_time must be after start_time"));
        }

        let contained = if availability.recurring {
            interval::within_recurring_window(
                availability.start_time.time(),
                availability.end_time.time(),
                start_time.time(),
                end_time.time(),
            )
        } else {
            interval::within_fixed_window(
                availability.start_time,
                availability.end_time,
                start_time,
                end_time,
            )
        };
        if !contained {
            return Err(Error::conflict(
                "requested time is outside the availability window",
            ));
        }

        // Resolve the owning tutor user through the profile link.
        let profile = db::fetch_tutor_profile(&tx, availability.tutor_id)?.ok_or_else(|| {
            Error::misconfigured(format!(
                "availability #{} references missing tutor profile #{}",
                availability.id, availability.tutor_id
            ))
        })?;
        let tutor = db::fetch_user(&tx, profile.user_id)?.ok_or_else(|| {
            Error::misconfigured(format!(
                "tutor profile #{} references missing user #{}",
                profile.id, profile.user_id
            ))
        })?;

        if let Some(conflicting) = db::find_holding_session(&tx, tutor.id, start_time, end_time, None)? {
            return Err(Error::Overlap {
                session_id: conflicting,
            });
        }

        let session_id = db::insert_session(
            &tx,
            tutor.id,
            Some(caller.id),
            course,
            availability.medium,
            start_time,
            end_time,
            SessionStatus::Booked,
        )?;

        let consumption = if availability.recurring {
            Consumption::Untouched
        } else {
            consume_window(&tx, &availability, start_time, end_time)?
        };

        let session = db::fetch_session(&tx, session_id)?.ok_or_else(|| {
            Error::misconfigured(format!("session #{} vanished after insert", session_id))
        })?;

        tx.commit()?;

        info!(
            session_id = session.id,
            availability_id,
            tutor_id = tutor.id,
            student_id = caller.id,
            "session booked"
        );

        Ok(BookingOutcome {
            session,
            consumption,
        })
    }

    /// Direct booking of an explicit open slot: the session flips from
    /// `available` to `booked` with the student attached.
    pub fn book_open_session(
        &mut self,
        caller: &User,
        session_id: i64,
        course: Option<&str>,
    ) -> Result<Session> {
        if !caller.is_student() {
            return Err(Error::forbidden("only students can book sessions"));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = db::fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;

        if session.status != SessionStatus::Available || session.student_id.is_some() {
            return Err(Error::conflict(format!(
                "session #{} is already booked",
                session_id
            )));
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE sessions SET status = 'booked', student_id = ?1,
                course = COALESCE(?2, course), updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![caller.id, course, now, session_id],
        )?;
        let updated = db::fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        tx.commit()?;

        info!(session_id, student_id = caller.id, "open slot booked");
        Ok(updated)
    }
}

/// Applies the one-off consumption rules: split, shrink left/right, or
/// delete when the slice covers the whole window.
fn consume_window(
    conn: &rusqlite::Connection,
    availability: &Availability,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<Consumption> {
    let remainders = interval::split(
        Window::new(availability.start_time, availability.end_time),
        Window::new(start_time, end_time),
    );

    match (remainders.left, remainders.right) {
        (Some(left), Some(right)) => {
            db::update_availability_window(conn, availability.id, left.start, left.end)?;
            let right_id = db::insert_availability(
                conn,
                availability.tutor_id,
                availability.day_of_week,
                right.start,
                right.end,
                availability.medium,
                false,
            )?;
            Ok(Consumption::Split { right_id })
        }
        (Some(left), None) => {
            db::update_availability_window(conn, availability.id, left.start, left.end)?;
            Ok(Consumption::Shrunk)
        }
        (None, Some(right)) => {
            db::update_availability_window(conn, availability.id, right.start, right.end)?;
            Ok(Consumption::Shrunk)
        }
        (None, None) => {
            db::delete_availability_row(conn, availability.id)?;
            Ok(Consumption::Deleted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::models::Medium;
    use proptest::prelude::*;

    fn recurring_availability(db: &Database, profile_id: i64) -> Availability {
        // Mondays 09:00-12:00.
        db.create_availability(
            profile_id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 12, 0),
            Medium::Online,
            true,
        )
        .unwrap()
    }

    fn one_off_availability(db: &Database, profile_id: i64) -> Availability {
        db.create_availability(
            profile_id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 17, 0),
            Medium::InPerson,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_book_requires_student_role() {
        let (mut db, _dir) = setup_test_db();
        let (tutor, profile) = make_tutor(&db, "ext-tutor");
        let av = recurring_availability(&db, profile.id);

        let result = db.book_from_availability(
            &tutor,
            av.id,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 10, 0),
            None,
        );
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_book_missing_availability() {
        let (mut db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");

        let result = db.book_from_availability(
            &student,
            99999,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 10, 0),
            None,
        );
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_book_inverted_slice_rejected_before_overlap_check() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = one_off_availability(&db, profile.id);

        let result = db.book_from_availability(
            &student,
            av.id,
            utc(2025, 1, 6, 11, 0),
            utc(2025, 1, 6, 10, 0),
            None,
        );
        assert!(matches!(result, Err(Error::Validation(_))));

        // Availability store untouched.
        let kept = db.get_availability(av.id).unwrap().unwrap();
        assert_eq!(kept.start_time, av.start_time);
        assert_eq!(kept.end_time, av.end_time);
        assert!(db.list_sessions(None, None, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_book_recurring_checks_time_of_day_only() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = recurring_availability(&db, profile.id);

        // A different Monday, but 10:00-11:00 falls inside 09:00-12:00.
        let outcome = db
            .book_from_availability(
                &student,
                av.id,
                utc(2025, 1, 13, 10, 0),
                utc(2025, 1, 13, 11, 0),
                Some("Chinese 101"),
            )
            .unwrap();

        assert_eq!(outcome.session.status, SessionStatus::Booked);
        assert_eq!(outcome.session.student_id, Some(student.id));
        assert_eq!(outcome.session.medium, Medium::Online);
        assert_eq!(outcome.consumption, Consumption::Untouched);
    }

    #[test]
    fn test_book_outside_recurring_window_conflicts() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = recurring_availability(&db, profile.id);

        let result = db.book_from_availability(
            &student,
            av.id,
            utc(2025, 1, 6, 8, 0),
            utc(2025, 1, 6, 10, 0),
            None,
        );
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_book_recurring_never_mutates_availability() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = recurring_availability(&db, profile.id);

        db.book_from_availability(
            &student,
            av.id,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 12, 0),
            None,
        )
        .unwrap();

        let kept = db.get_availability(av.id).unwrap().unwrap();
        assert_eq!(kept.start_time, av.start_time);
        assert_eq!(kept.end_time, av.end_time);
        assert_eq!(db.list_availabilities(Some(profile.id)).unwrap().len(), 1);
    }

    #[test]
    fn test_book_whole_one_off_window_deletes_it() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = one_off_availability(&db, profile.id);

        let outcome = db
            .book_from_availability(
                &student,
                av.id,
                utc(2025, 1, 6, 9, 0),
                utc(2025, 1, 6, 17, 0),
                None,
            )
            .unwrap();

        assert_eq!(outcome.consumption, Consumption::Deleted);
        assert!(db.get_availability(av.id).unwrap().is_none());
    }

    #[test]
    fn test_book_middle_slice_splits_one_off_window() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = one_off_availability(&db, profile.id);

        let outcome = db
            .book_from_availability(
                &student,
                av.id,
                utc(2025, 1, 6, 12, 0),
                utc(2025, 1, 6, 13, 0),
                None,
            )
            .unwrap();

        let right_id = match outcome.consumption {
            Consumption::Split { right_id } => right_id,
            other => panic!("expected split, got {:?}", other),
        };

        let left = db.get_availability(av.id).unwrap().unwrap();
        assert_eq!(left.start_time, utc(2025, 1, 6, 9, 0));
        assert_eq!(left.end_time, utc(2025, 1, 6, 12, 0));

        let right = db.get_availability(right_id).unwrap().unwrap();
        assert_eq!(right.start_time, utc(2025, 1, 6, 13, 0));
        assert_eq!(right.end_time, utc(2025, 1, 6, 17, 0));
        assert!(!right.recurring);
        assert_eq!(right.medium, av.medium);
    }

    #[test]
    fn test_book_prefix_slice_shrinks_start() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = one_off_availability(&db, profile.id);

        let outcome = db
            .book_from_availability(
                &student,
                av.id,
                utc(2025, 1, 6, 9, 0),
                utc(2025, 1, 6, 10, 0),
                None,
            )
            .unwrap();
        assert_eq!(outcome.consumption, Consumption::Shrunk);

        let kept = db.get_availability(av.id).unwrap().unwrap();
        assert_eq!(kept.start_time, utc(2025, 1, 6, 10, 0));
        assert_eq!(kept.end_time, utc(2025, 1, 6, 17, 0));
    }

    #[test]
    fn test_book_suffix_slice_shrinks_end() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = one_off_availability(&db, profile.id);

        let outcome = db
            .book_from_availability(
                &student,
                av.id,
                utc(2025, 1, 6, 16, 0),
                utc(2025, 1, 6, 17, 0),
                None,
            )
            .unwrap();
        assert_eq!(outcome.consumption, Consumption::Shrunk);

        let kept = db.get_availability(av.id).unwrap().unwrap();
        assert_eq!(kept.start_time, utc(2025, 1, 6, 9, 0));
        assert_eq!(kept.end_time, utc(2025, 1, 6, 16, 0));
    }

    #[test]
    fn test_second_overlapping_booking_conflicts() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let alice = make_student(&db, "ext-alice");
        let bob = make_student(&db, "ext-bob");
        let av = recurring_availability(&db, profile.id);

        db.book_from_availability(
            &alice,
            av.id,
            utc(2025, 1, 6, 10, 0),
            utc(2025, 1, 6, 11, 0),
            None,
        )
        .unwrap();

        let result = db.book_from_availability(
            &bob,
            av.id,
            utc(2025, 1, 6, 10, 30),
            utc(2025, 1, 6, 11, 30),
            None,
        );
        assert!(matches!(result, Err(Error::Overlap { .. })));

        // Exactly one booked session survives.
        let booked = db
            .list_sessions(None, None, Some(SessionStatus::Booked), None)
            .unwrap();
        assert_eq!(booked.len(), 1);
        assert_eq!(booked[0].student_id, Some(alice.id));
    }

    #[test]
    fn test_broken_profile_link_is_misconfiguration() {
        let (mut db, _dir) = setup_test_db();
        let (_, profile) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");
        let av = one_off_availability(&db, profile.id);

        // Sever the link behind the availability's back.
        db.conn
            .execute("PRAGMA foreign_keys = OFF", [])
            .unwrap();
        db.conn
            .execute("DELETE FROM tutors WHERE id = ?1", [profile.id])
            .unwrap();

        let result = db.book_from_availability(
            &student,
            av.id,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 10, 0),
            None,
        );
        assert!(matches!(result, Err(Error::Misconfigured(_))));
    }

    #[test]
    fn test_book_open_session() {
        let (mut db, _dir) = setup_test_db();
        let (tutor, _) = make_tutor(&db, "ext-tutor");
        let student = make_student(&db, "ext-student");

        let slot = db
            .create_session(
                tutor.id,
                None,
                None,
                Medium::Online,
                utc(2025, 1, 6, 10, 0),
                utc(2025, 1, 6, 11, 0),
                SessionStatus::Available,
            )
            .unwrap();

        let booked = db
            .book_open_session(&student, slot.id, Some("Chinese 101"))
            .unwrap();
        assert_eq!(booked.status, SessionStatus::Booked);
        assert_eq!(booked.student_id, Some(student.id));
        assert_eq!(booked.course.as_deref(), Some("Chinese 101"));
    }

    #[test]
    fn test_book_open_session_already_booked() {
        let (mut db, _dir) = setup_test_db();
        let (tutor, _) = make_tutor(&db, "ext-tutor");
        let alice = make_student(&db, "ext-alice");
        let bob = make_student(&db, "ext-bob");

        let slot = db
            .create_session(
                tutor.id,
                None,
                None,
                Medium::Online,
                utc(2025, 1, 6, 10, 0),
                utc(2025, 1, 6, 11, 0),
                SessionStatus::Available,
            )
            .unwrap();

        db.book_open_session(&alice, slot.id, None).unwrap();
        let result = db.book_open_session(&bob, slot.id, None);
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    proptest! {
        // Booking any strict sub-slice of a one-off window leaves remainders
        // that tile the original window around the booked slice.
        #[test]
        fn prop_one_off_consumption_roundtrip(off in 0i64..480, len in 1i64..480) {
            let (mut db, _dir) = setup_test_db();
            let (_, profile) = make_tutor(&db, "ext-tutor");
            let student = make_student(&db, "ext-student");
            let av = one_off_availability(&db, profile.id); // 09:00-17:00

            let win_start = utc(2025, 1, 6, 9, 0);
            let win_end = utc(2025, 1, 6, 17, 0);
            let s = win_start + chrono::Duration::minutes(off.min(479));
            let e = (s + chrono::Duration::minutes(len)).min(win_end);

            let outcome = db.book_from_availability(&student, av.id, s, e, None).unwrap();

            let mut pieces: Vec<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)> = db
                .list_availabilities(Some(profile.id))
                .unwrap()
                .into_iter()
                .map(|a| (a.start_time, a.end_time))
                .collect();
            pieces.push((outcome.session.start_time, outcome.session.end_time));
            pieces.sort();

            // The pieces tile the original window with no gap or overlap.
            let mut cursor = win_start;
            for (piece_start, piece_end) in pieces {
                prop_assert_eq!(piece_start, cursor);
                prop_assert!(piece_end > piece_start);
                cursor = piece_end;
            }
            prop_assert_eq!(cursor, win_end);
        }
    }
}
