use anyhow::{bail, Result};

use crate::db::Database;
use crate::models::User;

/// Only the booked student rates a session. Submitting again replaces the
/// earlier rating rather than stacking a second one.
pub fn submit(
    db: &Database,
    caller: &User,
    session_id: i64,
    rating: i64,
    comment: Option<&str>,
) -> Result<()> {
    let session = match db.get_session(session_id)? {
        Some(s) => s,
        None => bail!("Session #{} not found", session_id),
    };
    if session.student_id != Some(caller.id) {
        bail!("Only the booked student can rate session #{}", session_id);
    }

    let feedback = db.upsert_feedback(session_id, caller.id, rating, comment)?;
    println!(
        "Recorded {}/5 feedback for session #{}",
        feedback.rating, session_id
    );
    Ok(())
}

pub fn show(db: &Database, session_id: i64) -> Result<()> {
    let feedback = match db.get_feedback(session_id)? {
        Some(f) => f,
        None => bail!("Session #{} has no feedback", session_id),
    };

    println!("Feedback for session #{}", feedback.session_id);
    println!("  rating:  {}/5", feedback.rating);
    println!("  comment: {}", feedback.comment.as_deref().unwrap_or("-"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::models::{Medium, SessionStatus};

    fn seed_session(db: &mut Database) -> (User, i64) {
        let (tutor, _) = make_tutor(db, "ext-t");
        let student = make_student(db, "ext-s");
        let session = db
            .create_session(
                tutor.id,
                Some(student.id),
                None,
                Medium::Online,
                utc(2025, 1, 6, 9, 0),
                utc(2025, 1, 6, 10, 0),
                SessionStatus::Completed,
            )
            .unwrap();
        (student, session.id)
    }

    #[test]
    fn test_submit_replaces_earlier_rating() {
        let (mut db, _dir) = setup_test_db();
        let (student, session_id) = seed_session(&mut db);

        submit(&db, &student, session_id, 3, Some("ok")).unwrap();
        submit(&db, &student, session_id, 5, Some("much better")).unwrap();

        let fb = db.get_feedback(session_id).unwrap().unwrap();
        assert_eq!(fb.rating, 5);
        assert_eq!(fb.comment.as_deref(), Some("much better"));
    }

    #[test]
    fn test_submit_by_other_student_forbidden() {
        let (mut db, _dir) = setup_test_db();
        let (_, session_id) = seed_session(&mut db);
        let other = make_student(&db, "ext-other");

        let result = submit(&db, &other, session_id, 4, None);
        assert!(result.is_err());
        assert!(db.get_feedback(session_id).unwrap().is_none());
    }

    #[test]
    fn test_submit_out_of_range_rating() {
        let (mut db, _dir) = setup_test_db();
        let (student, session_id) = seed_session(&mut db);

        assert!(submit(&db, &student, session_id, 0, None).is_err());
        assert!(submit(&db, &student, session_id, 6, None).is_err());
    }
}
