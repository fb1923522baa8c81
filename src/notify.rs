//! Notification collaborator seam. Delivery is external; the core only
//! hands a committed booking across this trait, and a failed hand-off is
//! logged and swallowed, never rolled back into the booking.

use anyhow::Result;
use tracing::{info, warn};

use crate::models::{Session, User};

pub trait Notifier {
    fn booking_confirmed(&self, session: &Session, tutor: &User, student: &User) -> Result<()>;
}

/// Default collaborator: records the hand-off in the log and nothing else.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn booking_confirmed(&self, session: &Session, tutor: &User, student: &User) -> Result<()> {
        info!(
            session_id = session.id,
            tutor = %tutor.name,
            student = %student.name,
            start = %session.start_time,
            "booking confirmation queued"
        );
        Ok(())
    }
}

/// Fires the hand-off for a committed booking. The booking has already
/// committed; any delivery error is logged and dropped here.
pub fn notify_booking(
    notifier: &dyn Notifier,
    session: &Session,
    tutor: &User,
    student: &User,
) {
    if let Err(err) = notifier.booking_confirmed(session, tutor, student) {
        warn!(
            session_id = session.id,
            error = %err,
            "booking confirmation failed; booking stands"
        );
    }
}
