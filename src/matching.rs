//! Tutor ranking for a student, from three weighted signals (shared history,
//! rating, schedule fit) plus an optional medium-match signal.
//!
//! The engine is read-only and advisory: it tolerates slightly stale reads
//! and only fails when the student itself is missing. Weights live in a
//! named, versioned [`ScoringPolicy`] instead of inline constants, so the
//! scoring variant can be swapped without touching the algorithm.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Medium, Role};

/// Which schedule-fit signal a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Reward tutors for simply publishing windows.
    AvailabilityCount,
    /// Reward windows matching the student's stated preferences.
    PreferenceMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub version: u32,
    pub schedule_policy: SchedulePolicy,
    /// Weight of the shared-history signal.
    pub history_weight: f64,
    /// Bookings at which the history signal saturates.
    pub history_cap: u32,
    pub rating_weight: f64,
    pub schedule_weight: f64,
    /// Windows at which the availability-count signal saturates.
    pub availability_cap: u32,
    /// Only consulted under `PreferenceMatch`.
    pub medium_weight: f64,
}

impl ScoringPolicy {
    /// The plain availability-count variant.
    pub fn availability_count() -> Self {
        ScoringPolicy {
            version: 1,
            schedule_policy: SchedulePolicy::AvailabilityCount,
            history_weight: 50.0,
            history_cap: 5,
            rating_weight: 35.0,
            schedule_weight: 15.0,
            availability_cap: 5,
            medium_weight: 0.0,
        }
    }

    /// The preference-aware variant with the medium-match component.
    pub fn preference_match() -> Self {
        ScoringPolicy {
            version: 2,
            schedule_policy: SchedulePolicy::PreferenceMatch,
            history_weight: 40.0,
            history_cap: 5,
            rating_weight: 25.0,
            schedule_weight: 20.0,
            availability_cap: 5,
            medium_weight: 15.0,
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy::availability_count()
    }
}

/// The student's stated preferences. All optional.
#[derive(Debug, Clone, Default)]
pub struct MatchPreferences {
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: Option<u8>,
    pub time_of_day: Option<NaiveTime>,
    pub medium: Option<Medium>,
}

impl MatchPreferences {
    fn is_empty_schedule(&self) -> bool {
        self.day_of_week.is_none() && self.time_of_day.is_none()
    }
}

/// Per-signal components, returned alongside the total so a ranking is
/// auditable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreBreakdown {
    pub previous_sessions: f64,
    pub rating: f64,
    pub schedule: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TutorMatch {
    pub tutor_id: i64,
    pub tutor_name: String,
    pub tutor_email: String,
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
}

impl Database {
    /// Scores every tutor that has a profile for the given student. Sorted
    /// descending by total score; ties keep enumeration order.
    pub fn calculate_tutor_match_scores(
        &self,
        student_id: i64,
        prefs: &MatchPreferences,
        policy: &ScoringPolicy,
    ) -> Result<Vec<TutorMatch>> {
        if self.get_user(student_id)?.is_none() {
            return Err(Error::not_found("student", student_id));
        }

        let mut matches = Vec::new();
        for tutor in self.list_users(Some(Role::Tutor))? {
            // Tutors without a profile are excluded, not scored as zero.
            let Some(profile) = self.get_tutor_profile_for_user(tutor.id)? else {
                continue;
            };

            let previous_sessions = self.previous_session_score(student_id, tutor.id, policy)?;
            let rating = self.rating_score(tutor.id, policy)?;

            let availabilities = self.list_availabilities(Some(profile.id))?;
            let (schedule, medium) = match policy.schedule_policy {
                SchedulePolicy::AvailabilityCount => {
                    (availability_count_score(availabilities.len(), policy), None)
                }
                SchedulePolicy::PreferenceMatch => {
                    let schedule = preference_schedule_score(&availabilities, prefs, policy);
                    let medium = medium_score(&availabilities, prefs, policy);
                    (schedule, Some(medium))
                }
            };

            let total = previous_sessions + rating + schedule + medium.unwrap_or(0.0);
            matches.push(TutorMatch {
                tutor_id: tutor.id,
                tutor_name: tutor.name,
                tutor_email: tutor.email,
                total_score: round2(total),
                breakdown: ScoreBreakdown {
                    previous_sessions,
                    rating,
                    schedule,
                    medium,
                },
            });
        }

        // Stable sort keeps enumeration order on ties.
        matches.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }

    /// Ranked matches truncated to `limit`.
    pub fn recommend_tutors(
        &self,
        student_id: i64,
        prefs: &MatchPreferences,
        policy: &ScoringPolicy,
        limit: Option<usize>,
    ) -> Result<Vec<TutorMatch>> {
        let mut matches = self.calculate_tutor_match_scores(student_id, prefs, policy)?;
        if let Some(n) = limit {
            matches.truncate(n);
        }
        Ok(matches)
    }

    /// `W1 * min(shared booked sessions / cap, 1.0)`; zero without history.
    fn previous_session_score(
        &self,
        student_id: i64,
        tutor_user_id: i64,
        policy: &ScoringPolicy,
    ) -> Result<f64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions
             WHERE student_id = ?1 AND tutor_id = ?2 AND status = 'booked'",
            rusqlite::params![student_id, tutor_user_id],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Ok(0.0);
        }
        let factor = (count as f64 / policy.history_cap as f64).min(1.0);
        Ok(policy.history_weight * factor)
    }

    /// Mean feedback rating normalized to [0,1]; a tutor with no sessions or
    /// no feedback gets the 0.5 neutral prior.
    fn rating_score(&self, tutor_user_id: i64, policy: &ScoringPolicy) -> Result<f64> {
        let session_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE tutor_id = ?1",
            [tutor_user_id],
            |row| row.get(0),
        )?;
        if session_count == 0 {
            return Ok(policy.rating_weight * 0.5);
        }

        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(f.rating) FROM feedback f
             JOIN sessions s ON f.session_id = s.id
             WHERE s.tutor_id = ?1",
            [tutor_user_id],
            |row| row.get(0),
        )?;
        match avg {
            Some(avg) => Ok(policy.rating_weight * (avg / 5.0)),
            None => Ok(policy.rating_weight * 0.5),
        }
    }
}

fn availability_count_score(count: usize, policy: &ScoringPolicy) -> f64 {
    if count == 0 {
        return 0.0;
    }
    policy.schedule_weight * (count as f64 / policy.availability_cap as f64).min(1.0)
}

/// Best-matching window: half credit for the day-of-week, half for the
/// requested time falling inside the window (boundaries included).
fn preference_schedule_score(
    availabilities: &[crate::models::Availability],
    prefs: &MatchPreferences,
    policy: &ScoringPolicy,
) -> f64 {
    if availabilities.is_empty() {
        return 0.0;
    }
    if prefs.is_empty_schedule() {
        return policy.schedule_weight * 0.5;
    }

    let mut best = 0.0f64;
    for av in availabilities {
        let mut m = 0.0;
        if let Some(day) = prefs.day_of_week {
            if av.day_of_week == day {
                m += 0.5;
            }
        }
        if let Some(t) = prefs.time_of_day {
            if av.start_time.time() <= t && t <= av.end_time.time() {
                m += 0.5;
            }
        }
        best = best.max(m);
    }
    policy.schedule_weight * best
}

fn medium_score(
    availabilities: &[crate::models::Availability],
    prefs: &MatchPreferences,
    policy: &ScoringPolicy,
) -> f64 {
    match prefs.medium {
        None => policy.medium_weight * 0.5,
        Some(wanted) => {
            if availabilities.iter().any(|av| av.medium == wanted) {
                policy.medium_weight
            } else {
                0.0
            }
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::models::SessionStatus;

    fn policy_a() -> ScoringPolicy {
        ScoringPolicy::availability_count()
    }

    fn policy_b() -> ScoringPolicy {
        ScoringPolicy::preference_match()
    }

    fn book_pair(db: &mut Database, tutor_id: i64, student_id: i64, day: u32) {
        db.create_session(
            tutor_id,
            Some(student_id),
            Some("Chinese 101"),
            Medium::Online,
            utc(2025, 1, day, 10, 0),
            utc(2025, 1, day, 11, 0),
            SessionStatus::Booked,
        )
        .unwrap();
    }

    #[test]
    fn test_missing_student_is_not_found() {
        let (db, _dir) = setup_test_db();
        let result =
            db.calculate_tutor_match_scores(99999, &MatchPreferences::default(), &policy_a());
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_tutor_without_profile_excluded() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");

        // A user with role tutor but no profile row.
        let bare = db
            .upsert_user_from_identity("ext-bare", "Bare Tutor", "bare@test.com")
            .unwrap();
        db.set_user_role(bare.id, Role::Tutor).unwrap();

        let scores = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn test_fresh_tutor_gets_neutral_rating_only() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (tutor, _) = make_tutor(&db, "ext-tutor");

        let scores = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].tutor_id, tutor.id);
        assert_eq!(scores[0].breakdown.previous_sessions, 0.0);
        assert_eq!(scores[0].breakdown.rating, 35.0 * 0.5);
        assert_eq!(scores[0].breakdown.schedule, 0.0);
        assert_eq!(scores[0].total_score, 17.5);
    }

    #[test]
    fn test_history_component_saturates_at_cap() {
        let (mut db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (tutor, _) = make_tutor(&db, "ext-tutor");

        book_pair(&mut db, tutor.id, student.id, 6);
        let one = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        assert_eq!(one[0].breakdown.previous_sessions, 50.0 * (1.0 / 5.0));

        for day in 7..=13 {
            book_pair(&mut db, tutor.id, student.id, day);
        }
        let many = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        assert_eq!(many[0].breakdown.previous_sessions, 50.0);
    }

    #[test]
    fn test_rating_component_uses_mean_feedback() {
        let (mut db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (tutor, _) = make_tutor(&db, "ext-tutor");

        book_pair(&mut db, tutor.id, student.id, 6);
        book_pair(&mut db, tutor.id, student.id, 7);
        let sessions = db
            .list_sessions(Some(tutor.id), None, None, None)
            .unwrap();
        db.upsert_feedback(sessions[0].id, student.id, 5, None).unwrap();
        db.upsert_feedback(sessions[1].id, student.id, 3, None).unwrap();

        let scores = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        // mean 4.0 -> 35 * 4/5
        assert_eq!(scores[0].breakdown.rating, 35.0 * (4.0 / 5.0));
    }

    #[test]
    fn test_sessions_without_feedback_keep_neutral_rating() {
        let (mut db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (tutor, _) = make_tutor(&db, "ext-tutor");
        book_pair(&mut db, tutor.id, student.id, 6);

        let scores = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        assert_eq!(scores[0].breakdown.rating, 35.0 * 0.5);
    }

    #[test]
    fn test_availability_count_component() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (_, profile) = make_tutor(&db, "ext-tutor");

        db.create_availability(
            profile.id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 17, 0),
            Medium::Online,
            true,
        )
        .unwrap();

        let scores = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        assert_eq!(scores[0].breakdown.schedule, 15.0 * (1.0 / 5.0));
    }

    #[test]
    fn test_preference_match_day_and_time() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (_, profile) = make_tutor(&db, "ext-tutor");

        // Mondays 09:00-17:00.
        db.create_availability(
            profile.id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 17, 0),
            Medium::Online,
            true,
        )
        .unwrap();

        let prefs = MatchPreferences {
            day_of_week: Some(0),
            time_of_day: NaiveTime::from_hms_opt(10, 0, 0),
            medium: None,
        };
        let scores = db
            .calculate_tutor_match_scores(student.id, &prefs, &policy_b())
            .unwrap();
        assert_eq!(scores[0].breakdown.schedule, 20.0);
        // No medium preference: half credit.
        assert_eq!(scores[0].breakdown.medium, Some(15.0 * 0.5));
    }

    #[test]
    fn test_preference_match_partial_credit() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (_, profile) = make_tutor(&db, "ext-tutor");

        db.create_availability(
            profile.id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 17, 0),
            Medium::Online,
            true,
        )
        .unwrap();

        // Wrong day, matching time.
        let prefs = MatchPreferences {
            day_of_week: Some(2),
            time_of_day: NaiveTime::from_hms_opt(10, 0, 0),
            medium: Some(Medium::InPerson),
        };
        let scores = db
            .calculate_tutor_match_scores(student.id, &prefs, &policy_b())
            .unwrap();
        assert_eq!(scores[0].breakdown.schedule, 20.0 * 0.5);
        // No in-person window published.
        assert_eq!(scores[0].breakdown.medium, Some(0.0));
    }

    #[test]
    fn test_medium_match_full_weight() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (_, profile) = make_tutor(&db, "ext-tutor");

        db.create_availability(
            profile.id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 17, 0),
            Medium::InPerson,
            true,
        )
        .unwrap();

        let prefs = MatchPreferences {
            medium: Some(Medium::InPerson),
            ..Default::default()
        };
        let scores = db
            .calculate_tutor_match_scores(student.id, &prefs, &policy_b())
            .unwrap();
        assert_eq!(scores[0].breakdown.medium, Some(15.0));
    }

    #[test]
    fn test_ranking_sorted_descending_with_limit() {
        let (mut db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        let (tutor_a, _) = make_tutor(&db, "ext-a");
        let (_tutor_b, _) = make_tutor(&db, "ext-b");

        // Shared history lifts tutor A above tutor B.
        book_pair(&mut db, tutor_a.id, student.id, 6);

        let scores = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0].total_score >= scores[1].total_score);
        assert_eq!(scores[0].tutor_id, tutor_a.id);

        let top = db
            .recommend_tutors(student.id, &MatchPreferences::default(), &policy_a(), Some(1))
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].tutor_id, tutor_a.id);
    }

    #[test]
    fn test_feedback_irrelevant_until_it_exists() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");
        make_tutor(&db, "ext-tutor");

        let before = db
            .calculate_tutor_match_scores(student.id, &MatchPreferences::default(), &policy_a())
            .unwrap();
        // With zero sessions ever, the score is exactly the neutral prior.
        assert_eq!(before[0].total_score, 35.0 * 0.5);
    }
}
