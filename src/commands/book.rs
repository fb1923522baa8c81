use anyhow::{bail, Result};
use chrono_tz::Tz;

use crate::booking::Consumption;
use crate::config::{format_local, parse_client_datetime};
use crate::db::Database;
use crate::models::User;
use crate::notify::{notify_booking, Notifier};

/// Books a slice of an availability window and reports what became of the
/// remainder. Confirmation goes out after the booking has committed.
#[allow(clippy::too_many_arguments)]
pub fn run(
    db: &mut Database,
    caller: &User,
    availability_id: i64,
    start: &str,
    end: &str,
    course: Option<&str>,
    notifier: &dyn Notifier,
    tz: Tz,
) -> Result<()> {
    let start_time = parse_client_datetime(start, tz)?;
    let end_time = parse_client_datetime(end, tz)?;

    let outcome =
        match db.book_from_availability(caller, availability_id, start_time, end_time, course) {
            Ok(outcome) => outcome,
            Err(err) if err.is_conflict() => bail!("{}. Pick another time.", err),
            Err(err) => return Err(err.into()),
        };
    let session = &outcome.session;

    println!(
        "Booked session #{} ({} - {})",
        session.id,
        format_local(session.start_time, tz),
        format_local(session.end_time, tz),
    );
    match outcome.consumption {
        Consumption::Untouched => {}
        Consumption::Shrunk => println!("Availability #{} shrank to the remainder", availability_id),
        Consumption::Split { right_id } => println!(
            "Availability #{} split; remainder after the slice is #{}",
            availability_id, right_id
        ),
        Consumption::Deleted => println!("Availability #{} was fully consumed", availability_id),
    }

    send_confirmation(db, notifier, session.id);
    Ok(())
}

/// Claims an open session slot published directly by a tutor.
pub fn claim(
    db: &mut Database,
    caller: &User,
    session_id: i64,
    course: Option<&str>,
    notifier: &dyn Notifier,
    tz: Tz,
) -> Result<()> {
    let session = match db.book_open_session(caller, session_id, course) {
        Ok(session) => session,
        Err(err) if err.is_conflict() => bail!("{}. Pick another time.", err),
        Err(err) => return Err(err.into()),
    };

    println!(
        "Booked session #{} ({} - {})",
        session.id,
        format_local(session.start_time, tz),
        format_local(session.end_time, tz),
    );

    send_confirmation(db, notifier, session.id);
    Ok(())
}

fn send_confirmation(db: &Database, notifier: &dyn Notifier, session_id: i64) {
    // Best-effort lookups; the booking already stands.
    let session = match db.get_session(session_id) {
        Ok(Some(s)) => s,
        _ => return,
    };
    let tutor = db.get_user(session.tutor_id).ok().flatten();
    let student = session
        .student_id
        .and_then(|id| db.get_user(id).ok().flatten());
    if let (Some(tutor), Some(student)) = (tutor, student) {
        notify_booking(notifier, &session, &tutor, &student);
    }
}
