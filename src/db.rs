use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::interval;
use crate::models::{
    Availability, Feedback, Medium, Role, Session, SessionNote, SessionStatus, TutorProfile, User,
};

const SCHEMA_VERSION: i32 = 1;

pub struct Database {
    pub(crate) conn: Connection,
}

/// Partial update for a session. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub student_id: Option<i64>,
    pub course: Option<String>,
    pub medium: Option<Medium>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<SessionStatus>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.student_id.is_none()
            && self.course.is_none()
            && self.medium.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.status.is_none()
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM pragma_user_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                -- Local mirror of identity-provider users
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    role TEXT,
                    created_at TEXT NOT NULL
                );

                -- 1:1 tutor profile; availabilities hang off this
                CREATE TABLE IF NOT EXISTS tutors (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE,
                    specialization TEXT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS availabilities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tutor_id INTEGER NOT NULL,
                    day_of_week INTEGER NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    medium TEXT NOT NULL,
                    recurring INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (tutor_id) REFERENCES tutors(id) ON DELETE CASCADE
                );

                -- Sessions reference users directly on both sides.
                -- The unique constraint turns a lost booking race into a
                -- definite rejection instead of a silent double-booking.
                CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tutor_id INTEGER NOT NULL,
                    student_id INTEGER,
                    course TEXT,
                    medium TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'available',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (tutor_id, start_time, end_time),
                    FOREIGN KEY (tutor_id) REFERENCES users(id) ON DELETE CASCADE,
                    FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS session_notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id INTEGER NOT NULL,
                    tutor_id INTEGER NOT NULL,
                    attendance_status TEXT,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (session_id, tutor_id),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE,
                    FOREIGN KEY (tutor_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS feedback (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id INTEGER NOT NULL,
                    student_id INTEGER NOT NULL,
                    rating INTEGER NOT NULL,
                    comment TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (session_id, student_id),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE,
                    FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
                );

                -- Indexes
                CREATE INDEX IF NOT EXISTS idx_sessions_tutor ON sessions(tutor_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_student ON sessions(student_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
                CREATE INDEX IF NOT EXISTS idx_availabilities_tutor ON availabilities(tutor_id);
                CREATE INDEX IF NOT EXISTS idx_feedback_session ON feedback(session_id);
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    // Users

    /// Upsert keyed by the identity provider's user id. On repeat sign-ins
    /// the display name and email are refreshed.
    pub fn upsert_user_from_identity(
        &self,
        external_id: &str,
        name: &str,
        email: &str,
    ) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (external_id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(external_id) DO UPDATE SET name = ?2, email = ?3",
            params![external_id, name, email, now],
        )?;
        self.get_user_by_external_id(external_id)?
            .ok_or_else(|| Error::UnknownIdentity(external_id.to_string()))
    }

    pub fn set_user_role(&self, user_id: i64, role: Role) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        fetch_user(&self.conn, id)
    }

    pub fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, name, email, role, created_at FROM users WHERE external_id = ?1",
        )?;
        let user = stmt.query_row([external_id], map_user).ok();
        Ok(user)
    }

    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let mut sql = String::from(
            "SELECT id, external_id, name, email, role, created_at FROM users",
        );
        if role.is_some() {
            sql.push_str(" WHERE role = ?1");
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let users = match role {
            Some(r) => stmt
                .query_map([r.as_str()], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(users)
    }

    // Tutor profiles

    /// Returns the existing profile for this user or creates one.
    pub fn ensure_tutor_profile(
        &self,
        user_id: i64,
        specialization: Option<&str>,
    ) -> Result<TutorProfile> {
        if let Some(profile) = self.get_tutor_profile_for_user(user_id)? {
            return Ok(profile);
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tutors (user_id, specialization, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, specialization, now],
        )?;
        let id = self.conn.last_insert_rowid();
        fetch_tutor_profile(&self.conn, id)?
            .ok_or_else(|| Error::misconfigured(format!("tutor profile #{} vanished after insert", id)))
    }

    pub fn get_tutor_profile_for_user(&self, user_id: i64) -> Result<Option<TutorProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, specialization, created_at FROM tutors WHERE user_id = ?1",
        )?;
        let profile = stmt.query_row([user_id], map_tutor_profile).ok();
        Ok(profile)
    }

    // Availabilities

    pub fn create_availability(
        &self,
        tutor_profile_id: i64,
        day_of_week: u8,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        medium: Medium,
        recurring: bool,
    ) -> Result<Availability> {
        if day_of_week > 6 {
            return Err(Error::validation(format!(
                "day_of_week must be 0..=6 (0 = Monday), got {}",
                day_of_week
            )));
        }
        if end_time <= start_time {
            return Err(Error::validation("end_time must be after start_time"));
        }
        if fetch_tutor_profile(&self.conn, tutor_profile_id)?.is_none() {
            return Err(Error::not_found("tutor profile", tutor_profile_id));
        }

        let id = insert_availability(
            &self.conn,
            tutor_profile_id,
            day_of_week,
            start_time,
            end_time,
            medium,
            recurring,
        )?;
        fetch_availability(&self.conn, id)?
            .ok_or_else(|| Error::misconfigured(format!("availability #{} vanished after insert", id)))
    }

    pub fn get_availability(&self, id: i64) -> Result<Option<Availability>> {
        fetch_availability(&self.conn, id)
    }

    pub fn list_availabilities(&self, tutor_profile_id: Option<i64>) -> Result<Vec<Availability>> {
        let mut sql = String::from(
            "SELECT id, tutor_id, day_of_week, start_time, end_time, medium, recurring, created_at
             FROM availabilities",
        );
        if tutor_profile_id.is_some() {
            sql.push_str(" WHERE tutor_id = ?1");
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let availabilities = match tutor_profile_id {
            Some(id) => stmt
                .query_map([id], map_availability)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map_availability)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(availabilities)
    }

    // Sessions

    /// Creates a session row directly (a tutor publishing an explicit open
    /// slot, or seeding a booked one). Enforces the per-tutor non-overlap
    /// invariant inside an exclusive transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn create_session(
        &mut self,
        tutor_user_id: i64,
        student_id: Option<i64>,
        course: Option<&str>,
        medium: Medium,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        status: SessionStatus,
    ) -> Result<Session> {
        if end_time <= start_time {
            return Err(Error::validation("end_time must be after start_time"));
        }

        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        if fetch_user(&tx, tutor_user_id)?.is_none() {
            return Err(Error::not_found("tutor", tutor_user_id));
        }
        if let Some(sid) = student_id {
            if fetch_user(&tx, sid)?.is_none() {
                return Err(Error::not_found("student", sid));
            }
        }
        if let Some(conflicting) = find_holding_session(&tx, tutor_user_id, start_time, end_time, None)? {
            return Err(Error::Overlap {
                session_id: conflicting,
            });
        }

        let id = insert_session(
            &tx,
            tutor_user_id,
            student_id,
            course,
            medium,
            start_time,
            end_time,
            status,
        )?;
        let session = fetch_session(&tx, id)?
            .ok_or_else(|| Error::misconfigured(format!("session #{} vanished after insert", id)))?;
        tx.commit()?;
        Ok(session)
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        fetch_session(&self.conn, id)
    }

    pub fn list_sessions(
        &self,
        tutor_user_id: Option<i64>,
        student_id: Option<i64>,
        status: Option<SessionStatus>,
        starting_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>> {
        let mut sql = String::from(
            "SELECT id, tutor_id, student_id, course, medium, start_time, end_time, status, created_at, updated_at
             FROM sessions",
        );
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(t) = tutor_user_id {
            conditions.push(format!("tutor_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(t));
        }
        if let Some(s) = student_id {
            conditions.push(format!("student_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(s));
        }
        if let Some(st) = status {
            conditions.push(format!("status = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(st.as_str().to_string()));
        }
        if let Some(from) = starting_from {
            conditions.push(format!("start_time >= ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(from.to_rfc3339()));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY start_time");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let sessions = stmt
            .query_map(params_refs.as_slice(), map_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Applies a patch to a session the caller owns. Moving the window
    /// re-runs the overlap guard against the tutor's other slot-holding
    /// sessions, skipping the row being edited.
    pub fn update_session(
        &mut self,
        caller: &User,
        session_id: i64,
        patch: &SessionPatch,
    ) -> Result<Session> {
        if patch.is_empty() {
            return Err(Error::validation("nothing to update"));
        }

        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let old = fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        if old.tutor_id != caller.id {
            return Err(Error::forbidden("only the owning tutor can edit this session"));
        }

        let new_start = patch.start_time.unwrap_or(old.start_time);
        let new_end = patch.end_time.unwrap_or(old.end_time);
        if new_end <= new_start {
            return Err(Error::validation("end_time must be after start_time"));
        }
        if let Some(sid) = patch.student_id {
            if fetch_user(&tx, sid)?.is_none() {
                return Err(Error::not_found("student", sid));
            }
        }

        if (new_start, new_end) != (old.start_time, old.end_time) {
            if let Some(conflicting) =
                find_holding_session(&tx, old.tutor_id, new_start, new_end, Some(session_id))?
            {
                return Err(Error::Overlap {
                    session_id: conflicting,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE sessions SET
                student_id = ?1, course = ?2, medium = ?3,
                start_time = ?4, end_time = ?5, status = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                patch.student_id.or(old.student_id),
                patch.course.as_deref().or(old.course.as_deref()),
                patch.medium.unwrap_or(old.medium).as_str(),
                new_start.to_rfc3339(),
                new_end.to_rfc3339(),
                patch.status.unwrap_or(old.status).as_str(),
                now,
                session_id
            ],
        )?;
        let updated = fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn set_session_status(&self, id: i64, status: SessionStatus) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_session(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // Session notes

    /// At most one note per (session, tutor); a second create is a conflict,
    /// unlike feedback which upserts.
    pub fn create_session_note(
        &self,
        session_id: i64,
        tutor_id: i64,
        attendance_status: Option<&str>,
        notes: Option<&str>,
    ) -> Result<SessionNote> {
        if self.get_session_note(session_id)?.is_some() {
            return Err(Error::conflict(format!(
                "session #{} already has a note",
                session_id
            )));
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO session_notes (session_id, tutor_id, attendance_status, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![session_id, tutor_id, attendance_status, notes, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.fetch_note_by_id(id)
    }

    pub fn update_session_note(
        &self,
        note_id: i64,
        attendance_status: Option<&str>,
        notes: Option<&str>,
    ) -> Result<SessionNote> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE session_notes SET
                attendance_status = COALESCE(?1, attendance_status),
                notes = COALESCE(?2, notes),
                updated_at = ?3
             WHERE id = ?4",
            params![attendance_status, notes, now, note_id],
        )?;
        if rows == 0 {
            return Err(Error::not_found("session note", note_id));
        }
        self.fetch_note_by_id(note_id)
    }

    pub fn get_session_note(&self, session_id: i64) -> Result<Option<SessionNote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, tutor_id, attendance_status, notes, created_at, updated_at
             FROM session_notes WHERE session_id = ?1",
        )?;
        let note = stmt.query_row([session_id], map_session_note).ok();
        Ok(note)
    }

    fn fetch_note_by_id(&self, id: i64) -> Result<SessionNote> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, tutor_id, attendance_status, notes, created_at, updated_at
             FROM session_notes WHERE id = ?1",
        )?;
        stmt.query_row([id], map_session_note)
            .map_err(Error::from)
    }

    // Feedback

    /// One rating per (session, student); resubmitting replaces it.
    pub fn upsert_feedback(
        &self,
        session_id: i64,
        student_id: i64,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<Feedback> {
        if !(1..=5).contains(&rating) {
            return Err(Error::validation(format!(
                "rating must be 1..=5, got {}",
                rating
            )));
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO feedback (session_id, student_id, rating, comment, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(session_id, student_id) DO UPDATE SET
                rating = ?3, comment = ?4, updated_at = ?5",
            params![session_id, student_id, rating, comment, now],
        )?;
        self.get_feedback(session_id)?
            .ok_or_else(|| Error::misconfigured("feedback vanished after upsert".to_string()))
    }

    pub fn get_feedback(&self, session_id: i64) -> Result<Option<Feedback>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, student_id, rating, comment, created_at, updated_at
             FROM feedback WHERE session_id = ?1",
        )?;
        let feedback = stmt.query_row([session_id], map_feedback).ok();
        Ok(feedback)
    }
}

// Row-level helpers shared with the transactional engines in booking.rs and
// cascade.rs. They take a plain &Connection so they work both on the live
// connection and inside a Transaction.

pub(crate) fn fetch_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, external_id, name, email, role, created_at FROM users WHERE id = ?1",
    )?;
    Ok(stmt.query_row([id], map_user).ok())
}

pub(crate) fn fetch_tutor_profile(conn: &Connection, id: i64) -> Result<Option<TutorProfile>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, specialization, created_at FROM tutors WHERE id = ?1",
    )?;
    Ok(stmt.query_row([id], map_tutor_profile).ok())
}

pub(crate) fn fetch_availability(conn: &Connection, id: i64) -> Result<Option<Availability>> {
    let mut stmt = conn.prepare(
        "SELECT id, tutor_id, day_of_week, start_time, end_time, medium, recurring, created_at
         FROM availabilities WHERE id = ?1",
    )?;
    Ok(stmt.query_row([id], map_availability).ok())
}

pub(crate) fn insert_availability(
    conn: &Connection,
    tutor_profile_id: i64,
    day_of_week: u8,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    medium: Medium,
    recurring: bool,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO availabilities (tutor_id, day_of_week, start_time, end_time, medium, recurring, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            tutor_profile_id,
            day_of_week,
            start_time.to_rfc3339(),
            end_time.to_rfc3339(),
            medium.as_str(),
            recurring,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_availability_window(
    conn: &Connection,
    id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE availabilities SET start_time = ?1, end_time = ?2 WHERE id = ?3",
        params![start_time.to_rfc3339(), end_time.to_rfc3339(), id],
    )?;
    Ok(rows > 0)
}

pub(crate) fn delete_availability_row(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM availabilities WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

/// The booking overlap guard: any session of this tutor in a slot-holding
/// status whose `[start,end)` overlaps the requested slice. `exclude_session`
/// lets an edit skip the row being moved.
pub(crate) fn find_holding_session(
    conn: &Connection,
    tutor_user_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    exclude_session: Option<i64>,
) -> Result<Option<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM sessions
         WHERE tutor_id = ?1
           AND status IN ('available', 'booked')
           AND start_time < ?2
           AND end_time > ?3
           AND (?4 IS NULL OR id != ?4)
         LIMIT 1",
    )?;
    let id = stmt
        .query_row(
            params![
                tutor_user_id,
                end_time.to_rfc3339(),
                start_time.to_rfc3339(),
                exclude_session
            ],
            |row| row.get(0),
        )
        .ok();
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_session(
    conn: &Connection,
    tutor_user_id: i64,
    student_id: Option<i64>,
    course: Option<&str>,
    medium: Medium,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: SessionStatus,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sessions (tutor_id, student_id, course, medium, start_time, end_time, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            tutor_user_id,
            student_id,
            course,
            medium.as_str(),
            start_time.to_rfc3339(),
            end_time.to_rfc3339(),
            status.as_str(),
            now
        ],
    )
    .map_err(|e| match e {
        // The (tutor, start, end) uniqueness backstop surfaces as a conflict.
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::conflict("tutor already has a session at this exact time")
        }
        other => Error::from(other),
    })?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn fetch_session(conn: &Connection, id: i64) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, tutor_id, student_id, course, medium, start_time, end_time, status, created_at, updated_at
         FROM sessions WHERE id = ?1",
    )?;
    Ok(stmt.query_row([id], map_session).ok())
}

pub(crate) fn list_open_sessions_for_tutor(
    conn: &Connection,
    tutor_user_id: i64,
) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, tutor_id, student_id, course, medium, start_time, end_time, status, created_at, updated_at
         FROM sessions WHERE tutor_id = ?1 AND status = 'available' ORDER BY start_time",
    )?;
    let sessions = stmt
        .query_map([tutor_user_id], map_session)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(sessions)
}

pub(crate) fn delete_sessions(conn: &Connection, ids: &[i64]) -> Result<usize> {
    let mut deleted = 0;
    for id in ids {
        deleted += conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    }
    Ok(deleted)
}

// Row mappers

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role: Option<String> = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        role: match role {
            Some(r) => Some(parse_enum(4, &r)?),
            None => None,
        },
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn map_tutor_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<TutorProfile> {
    Ok(TutorProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        specialization: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

fn map_availability(row: &rusqlite::Row<'_>) -> rusqlite::Result<Availability> {
    Ok(Availability {
        id: row.get(0)?,
        tutor_id: row.get(1)?,
        day_of_week: row.get::<_, i64>(2)? as u8,
        start_time: parse_datetime(row.get::<_, String>(3)?),
        end_time: parse_datetime(row.get::<_, String>(4)?),
        medium: parse_enum(5, &row.get::<_, String>(5)?)?,
        recurring: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        tutor_id: row.get(1)?,
        student_id: row.get(2)?,
        course: row.get(3)?,
        medium: parse_enum(4, &row.get::<_, String>(4)?)?,
        start_time: parse_datetime(row.get::<_, String>(5)?),
        end_time: parse_datetime(row.get::<_, String>(6)?),
        status: parse_enum(7, &row.get::<_, String>(7)?)?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn map_session_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionNote> {
    Ok(SessionNote {
        id: row.get(0)?,
        session_id: row.get(1)?,
        tutor_id: row.get(2)?,
        attendance_status: row.get(3)?,
        notes: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn map_feedback(row: &rusqlite::Row<'_>) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: row.get(0)?,
        session_id: row.get(1)?,
        student_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn parse_enum<T: FromStr<Err = String>>(col: usize, s: &str) -> rusqlite::Result<T> {
    s.parse().map_err(|msg: String| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, msg.into())
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Day-of-week index of an absolute instant, for cascade matching.
pub(crate) fn session_day_index(dt: DateTime<Utc>) -> u8 {
    interval::day_of_week_index(dt.date_naive())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    pub fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    pub fn make_student(db: &Database, ext: &str) -> User {
        let user = db
            .upsert_user_from_identity(ext, "Test Student", "student@test.com")
            .unwrap();
        db.set_user_role(user.id, Role::Student).unwrap();
        db.get_user(user.id).unwrap().unwrap()
    }

    pub fn make_tutor(db: &Database, ext: &str) -> (User, TutorProfile) {
        let user = db
            .upsert_user_from_identity(ext, "Test Tutor", "tutor@test.com")
            .unwrap();
        db.set_user_role(user.id, Role::Tutor).unwrap();
        let profile = db.ensure_tutor_profile(user.id, Some("Chinese")).unwrap();
        (db.get_user(user.id).unwrap().unwrap(), profile)
    }
}
