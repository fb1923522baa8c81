//! Availability edits and deletes, with retraction of derived open slots.
//!
//! Sessions carry no foreign key back to the availability that spawned them,
//! so membership is reconstructed by value: same tutor, still `available`,
//! start time-of-day equal to the window's old start, and calendar alignment
//! (day-of-week for recurring windows, exact date for one-off ones). Booked
//! and completed sessions are never retracted. The retraction commits in the
//! same transaction as the availability mutation itself.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::db::{self, Database};
use crate::error::{Error, Result};
use crate::models::{Availability, Medium, User};

/// Partial update for an availability window. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityPatch {
    pub day_of_week: Option<u8>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub medium: Option<Medium>,
    pub recurring: Option<bool>,
}

impl AvailabilityPatch {
    pub fn is_empty(&self) -> bool {
        self.day_of_week.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.medium.is_none()
            && self.recurring.is_none()
    }
}

impl Database {
    /// Applies a patch to an availability the caller owns. When the start
    /// time moves, open sessions derived from the old window are retracted
    /// in the same transaction. Returns the updated row and the number of
    /// retracted sessions.
    pub fn update_availability(
        &mut self,
        caller: &User,
        availability_id: i64,
        patch: &AvailabilityPatch,
    ) -> Result<(Availability, usize)> {
        if patch.is_empty() {
            return Err(Error::validation("nothing to update"));
        }
        if let Some(d) = patch.day_of_week {
            if d > 6 {
                return Err(Error::validation(format!(
                    "day_of_week must be 0..=6 (0 = Monday), got {}",
                    d
                )));
            }
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let old = db::fetch_availability(&tx, availability_id)?
            .ok_or_else(|| Error::not_found("availability", availability_id))?;
        let tutor_user_id = owning_tutor_user(&tx, &old)?;
        if tutor_user_id != caller.id {
            return Err(Error::forbidden(
                "only the owning tutor can edit this availability",
            ));
        }

        let new_start = patch.start_time.unwrap_or(old.start_time);
        let new_end = patch.end_time.unwrap_or(old.end_time);
        if new_end <= new_start {
            return Err(Error::validation("end_time must be after start_time"));
        }

        tx.execute(
            "UPDATE availabilities SET
                day_of_week = ?1, start_time = ?2, end_time = ?3, medium = ?4, recurring = ?5
             WHERE id = ?6",
            rusqlite::params![
                patch.day_of_week.unwrap_or(old.day_of_week),
                new_start.to_rfc3339(),
                new_end.to_rfc3339(),
                patch.medium.unwrap_or(old.medium).as_str(),
                patch.recurring.unwrap_or(old.recurring),
                availability_id
            ],
        )?;

        // Moving the start orphans the open slots generated from the old
        // window; retract them against the OLD time identity.
        let retracted = match patch.start_time {
            Some(new) if new != old.start_time => {
                retract_open_sessions(&tx, &old, tutor_user_id)?
            }
            _ => 0,
        };

        let updated = db::fetch_availability(&tx, availability_id)?
            .ok_or_else(|| Error::not_found("availability", availability_id))?;
        tx.commit()?;

        if retracted > 0 {
            info!(availability_id, retracted, "retracted open sessions after edit");
        }
        Ok((updated, retracted))
    }

    /// Deletes an availability the caller owns, retracting its derived open
    /// sessions in the same transaction. Returns the retraction count.
    pub fn delete_availability(&mut self, caller: &User, availability_id: i64) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let availability = db::fetch_availability(&tx, availability_id)?
            .ok_or_else(|| Error::not_found("availability", availability_id))?;
        let tutor_user_id = owning_tutor_user(&tx, &availability)?;
        if tutor_user_id != caller.id {
            return Err(Error::forbidden(
                "only the owning tutor can delete this availability",
            ));
        }

        let retracted = retract_open_sessions(&tx, &availability, tutor_user_id)?;
        db::delete_availability_row(&tx, availability_id)?;
        tx.commit()?;

        info!(availability_id, retracted, "availability deleted");
        Ok(retracted)
    }
}

fn owning_tutor_user(conn: &Connection, availability: &Availability) -> Result<i64> {
    let profile = db::fetch_tutor_profile(conn, availability.tutor_id)?.ok_or_else(|| {
        Error::misconfigured(format!(
            "availability #{} references missing tutor profile #{}",
            availability.id, availability.tutor_id
        ))
    })?;
    Ok(profile.user_id)
}

/// Deletes the `available` sessions that belong to this window's old time
/// identity. Booked, completed, and canceled sessions are left alone.
fn retract_open_sessions(
    conn: &Connection,
    availability: &Availability,
    tutor_user_id: i64,
) -> Result<usize> {
    let old_time_of_day = availability.start_time.time();
    let candidates = db::list_open_sessions_for_tutor(conn, tutor_user_id)?;

    let doomed: Vec<i64> = candidates
        .into_iter()
        .filter(|s| s.start_time.time() == old_time_of_day)
        .filter(|s| {
            if availability.recurring {
                db::session_day_index(s.start_time) == availability.day_of_week
            } else {
                s.start_time.date_naive() == availability.start_time.date_naive()
            }
        })
        .map(|s| s.id)
        .collect();

    db::delete_sessions(conn, &doomed)
}
