use anyhow::{bail, Result};
use chrono_tz::Tz;

use crate::config::{format_local, parse_client_datetime};
use crate::db::{Database, SessionPatch};
use crate::models::{Medium, SessionStatus, User};

/// Publishes an open one-off slot directly, without an availability window.
pub fn create(
    db: &mut Database,
    caller: &User,
    start: &str,
    end: &str,
    medium: &str,
    course: Option<&str>,
    tz: Tz,
) -> Result<()> {
    if !caller.is_tutor() {
        bail!("Only tutors can publish sessions");
    }

    let medium: Medium = match medium.parse() {
        Ok(m) => m,
        Err(_) => bail!("Invalid medium '{}'. Must be one of: online, in-person", medium),
    };
    let start_time = parse_client_datetime(start, tz)?;
    let end_time = parse_client_datetime(end, tz)?;

    let session = db.create_session(
        caller.id,
        None,
        course,
        medium,
        start_time,
        end_time,
        SessionStatus::Available,
    )?;

    println!(
        "Published open session #{} ({} - {})",
        session.id,
        format_local(session.start_time, tz),
        format_local(session.end_time, tz),
    );
    Ok(())
}

pub fn list(
    db: &Database,
    tutor_user_id: Option<i64>,
    student_id: Option<i64>,
    status: Option<&str>,
    upcoming: bool,
    tz: Tz,
) -> Result<()> {
    let status = match status {
        Some(s) => Some(
            s.parse::<SessionStatus>()
                .map_err(|_| anyhow::anyhow!("Invalid status '{}'", s))?,
        ),
        None => None,
    };
    let starting_from = if upcoming {
        Some(chrono::Utc::now())
    } else {
        None
    };

    let sessions = db.list_sessions(tutor_user_id, student_id, status, starting_from)?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    for s in sessions {
        let student = match s.student_id {
            Some(id) => format!("student #{}", id),
            None => "open".to_string(),
        };
        println!(
            "#{:<4} {:9} tutor #{:<4} {:12} {:9} {} - {}  {}",
            s.id,
            s.status,
            s.tutor_id,
            student,
            s.medium,
            format_local(s.start_time, tz),
            format_local(s.end_time, tz),
            s.course.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub fn show(db: &Database, id: i64, tz: Tz) -> Result<()> {
    let session = match db.get_session(id)? {
        Some(s) => s,
        None => bail!("Session #{} not found", id),
    };

    println!("Session #{}", session.id);
    println!("  status:  {}", session.status);
    println!("  tutor:   #{}", session.tutor_id);
    match session.student_id {
        Some(sid) => println!("  student: #{}", sid),
        None => println!("  student: (open)"),
    }
    println!("  medium:  {}", session.medium);
    println!("  course:  {}", session.course.as_deref().unwrap_or("-"));
    println!("  start:   {}", format_local(session.start_time, tz));
    println!("  end:     {}", format_local(session.end_time, tz));

    if let Some(note) = db.get_session_note(session.id)? {
        println!(
            "  note:    [{}] {}",
            note.attendance_status.as_deref().unwrap_or("-"),
            note.notes.as_deref().unwrap_or(""),
        );
    }
    if let Some(fb) = db.get_feedback(session.id)? {
        println!(
            "  rating:  {}/5 {}",
            fb.rating,
            fb.comment.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

/// Patches a session the caller owns. Moving the times re-runs the overlap
/// guard against the tutor's other held slots.
#[allow(clippy::too_many_arguments)]
pub fn update(
    db: &mut Database,
    caller: &User,
    id: i64,
    student: Option<i64>,
    course: Option<&str>,
    medium: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
    status: Option<&str>,
    tz: Tz,
) -> Result<()> {
    let medium = match medium {
        Some(m) => Some(
            m.parse::<Medium>()
                .map_err(|_| anyhow::anyhow!("Invalid medium '{}'", m))?,
        ),
        None => None,
    };
    let status = match status {
        Some(s) => Some(
            s.parse::<SessionStatus>()
                .map_err(|_| anyhow::anyhow!("Invalid status '{}'", s))?,
        ),
        None => None,
    };
    let patch = SessionPatch {
        student_id: student,
        course: course.map(str::to_string),
        medium,
        start_time: start.map(|s| parse_client_datetime(s, tz)).transpose()?,
        end_time: end.map(|s| parse_client_datetime(s, tz)).transpose()?,
        status,
    };

    let updated = db.update_session(caller, id, &patch)?;
    println!(
        "Updated session #{} ({} - {})",
        updated.id,
        format_local(updated.start_time, tz),
        format_local(updated.end_time, tz),
    );
    Ok(())
}

/// Cancelling is the only mutation a student may perform on a session, and
/// only on their own booking. Tutors may cancel anything they own.
pub fn cancel(db: &Database, caller: &User, id: i64) -> Result<()> {
    let session = match db.get_session(id)? {
        Some(s) => s,
        None => bail!("Session #{} not found", id),
    };

    let is_owner = session.tutor_id == caller.id;
    let is_booked_student = session.student_id == Some(caller.id);
    if !is_owner && !is_booked_student {
        bail!("Only the tutor or the booked student can cancel session #{}", id);
    }
    if session.status == SessionStatus::Canceled {
        bail!("Session #{} is already canceled", id);
    }

    db.set_session_status(id, SessionStatus::Canceled)?;
    println!("Canceled session #{}", id);
    Ok(())
}

pub fn complete(db: &Database, caller: &User, id: i64) -> Result<()> {
    let session = match db.get_session(id)? {
        Some(s) => s,
        None => bail!("Session #{} not found", id),
    };
    if session.tutor_id != caller.id {
        bail!("Only the tutor can mark session #{} completed", id);
    }
    if session.status != SessionStatus::Booked {
        bail!(
            "Session #{} is {}, only booked sessions can be completed",
            id,
            session.status
        );
    }

    db.set_session_status(id, SessionStatus::Completed)?;
    println!("Completed session #{}", id);
    Ok(())
}

pub fn delete(db: &Database, caller: &User, id: i64) -> Result<()> {
    let session = match db.get_session(id)? {
        Some(s) => s,
        None => bail!("Session #{} not found", id),
    };
    if session.tutor_id != caller.id {
        bail!("Only the tutor can delete session #{}", id);
    }

    db.delete_session(id)?;
    println!("Deleted session #{}", id);
    Ok(())
}
