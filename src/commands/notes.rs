use anyhow::{bail, Result};

use crate::db::Database;
use crate::models::User;

const ATTENDANCE_VALUES: [&str; 3] = ["present", "absent", "late"];

fn check_attendance(value: Option<&str>) -> Result<()> {
    if let Some(v) = value {
        if !ATTENDANCE_VALUES.contains(&v) {
            bail!(
                "Invalid attendance '{}'. Must be one of: {}",
                v,
                ATTENDANCE_VALUES.join(", ")
            );
        }
    }
    Ok(())
}

/// Only the session's tutor records a note, and each session carries at
/// most one.
pub fn add(
    db: &Database,
    caller: &User,
    session_id: i64,
    attendance: Option<&str>,
    text: Option<&str>,
) -> Result<()> {
    check_attendance(attendance)?;

    let session = match db.get_session(session_id)? {
        Some(s) => s,
        None => bail!("Session #{} not found", session_id),
    };
    if session.tutor_id != caller.id {
        bail!("Only the session's tutor can add a note");
    }

    let note = db.create_session_note(session_id, caller.id, attendance, text)?;
    println!("Added note #{} to session #{}", note.id, session_id);
    Ok(())
}

pub fn update(
    db: &Database,
    caller: &User,
    session_id: i64,
    attendance: Option<&str>,
    text: Option<&str>,
) -> Result<()> {
    check_attendance(attendance)?;

    let note = match db.get_session_note(session_id)? {
        Some(n) => n,
        None => bail!("Session #{} has no note", session_id),
    };
    if note.tutor_id != caller.id {
        bail!("Only the note's author can update it");
    }

    db.update_session_note(note.id, attendance, text)?;
    println!("Updated note for session #{}", session_id);
    Ok(())
}

pub fn show(db: &Database, session_id: i64) -> Result<()> {
    let note = match db.get_session_note(session_id)? {
        Some(n) => n,
        None => bail!("Session #{} has no note", session_id),
    };

    println!("Note #{} (session #{})", note.id, note.session_id);
    println!(
        "  attendance: {}",
        note.attendance_status.as_deref().unwrap_or("-")
    );
    println!("  notes:      {}", note.notes.as_deref().unwrap_or("-"));
    Ok(())
}
