use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
    Professor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Professor => "professor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "tutor" => Ok(Role::Tutor),
            "professor" => Ok(Role::Professor),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// How a session is held. Stored as `online` / `in-person`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Medium {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "in-person")]
    InPerson,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Online => "online",
            Medium::InPerson => "in-person",
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Medium {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Medium::Online),
            "in-person" => Ok(Medium::InPerson),
            other => Err(format!("unknown medium '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Available,
    Booked,
    Completed,
    Canceled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Available => "available",
            SessionStatus::Booked => "booked",
            SessionStatus::Completed => "completed",
            SessionStatus::Canceled => "canceled",
        }
    }

    /// Statuses that hold the tutor's time exclusively. Only these
    /// participate in the overlap invariant.
    pub fn holds_slot(&self) -> bool {
        matches!(self, SessionStatus::Available | SessionStatus::Booked)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SessionStatus::Available),
            "booked" => Ok(SessionStatus::Booked),
            "completed" => Ok(SessionStatus::Completed),
            "canceled" => Ok(SessionStatus::Canceled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// A local user record mirrored from the identity provider, keyed by
/// `external_id`. This is also the explicit authenticated-caller value
/// threaded into every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_student(&self) -> bool {
        self.role == Some(Role::Student)
    }

    pub fn is_tutor(&self) -> bool {
        self.role == Some(Role::Tutor)
    }
}

/// 1:1 tutor profile. Availabilities reference the profile; sessions
/// reference the user. Booking crosses this link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorProfile {
    pub id: i64,
    pub user_id: i64,
    pub specialization: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A tutor-declared bookable time window, either a standing weekly pattern
/// (`recurring`) or a one-off window. Times are stored as absolute UTC
/// instants; recurring windows are compared by time-of-day only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub id: i64,
    pub tutor_id: i64,
    /// 0 = Monday .. 6 = Sunday. Meaningful only when `recurring`.
    pub day_of_week: u8,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub medium: Medium,
    pub recurring: bool,
    pub created_at: DateTime<Utc>,
}

/// One concrete appointment, open (`student_id` is None) or booked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub tutor_id: i64,
    pub student_id: Option<i64>,
    pub course: Option<String>,
    pub medium: Medium,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNote {
    pub id: i64,
    pub session_id: i64,
    pub tutor_id: i64,
    pub attendance_status: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub session_id: i64,
    pub student_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
