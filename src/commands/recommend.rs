use anyhow::{bail, Result};
use chrono::NaiveTime;

use crate::db::Database;
use crate::matching::{MatchPreferences, ScoringPolicy};
use crate::models::{Medium, User};

#[allow(clippy::too_many_arguments)]
pub fn run(
    db: &Database,
    caller: &User,
    day_of_week: Option<u8>,
    time_of_day: Option<&str>,
    medium: Option<&str>,
    limit: Option<usize>,
    policy: &ScoringPolicy,
    json: bool,
) -> Result<()> {
    if !caller.is_student() {
        bail!("Only students can request tutor recommendations");
    }
    if let Some(day) = day_of_week {
        if day > 6 {
            bail!("Invalid day {}. Must be 0 (Monday) through 6 (Sunday)", day);
        }
    }

    let time_of_day = match time_of_day {
        Some(t) => Some(
            NaiveTime::parse_from_str(t, "%H:%M")
                .map_err(|_| anyhow::anyhow!("Invalid time '{}'. Use HH:MM", t))?,
        ),
        None => None,
    };
    let medium = match medium {
        Some(m) => Some(
            m.parse::<Medium>()
                .map_err(|_| anyhow::anyhow!("Invalid medium '{}'", m))?,
        ),
        None => None,
    };

    let prefs = MatchPreferences {
        day_of_week,
        time_of_day,
        medium,
    };
    let matches = db.recommend_tutors(caller.id, &prefs, policy, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No tutors to recommend.");
        return Ok(());
    }

    for (rank, m) in matches.iter().enumerate() {
        println!(
            "{:>2}. #{:<4} {:<25} {:>6.2}  (history {:.1}, rating {:.1}, schedule {:.1}{})",
            rank + 1,
            m.tutor_id,
            m.tutor_name,
            m.total_score,
            m.breakdown.previous_sessions,
            m.breakdown.rating,
            m.breakdown.schedule,
            match m.breakdown.medium {
                Some(score) => format!(", medium {:.1}", score),
                None => String::new(),
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::models::Medium;

    #[test]
    fn test_requires_student_caller() {
        let (db, _dir) = setup_test_db();
        let (tutor, _) = make_tutor(&db, "ext-t");

        let result = run(
            &db,
            &tutor,
            None,
            None,
            None,
            None,
            &ScoringPolicy::default(),
            false,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Only students"));
    }

    #[test]
    fn test_rejects_bad_time() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-s");

        let result = run(
            &db,
            &student,
            None,
            Some("9am"),
            None,
            None,
            &ScoringPolicy::default(),
            false,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid time"));
    }

    #[test]
    fn test_rejects_day_out_of_range() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-s");

        let result = run(
            &db,
            &student,
            Some(7),
            None,
            None,
            None,
            &ScoringPolicy::default(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ranked_output_runs() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-s");
        let (_, profile) = make_tutor(&db, "ext-t");
        db.create_availability(
            profile.id,
            0,
            utc(2025, 1, 6, 9, 0),
            utc(2025, 1, 6, 12, 0),
            Medium::Online,
            true,
        )
        .unwrap();

        run(
            &db,
            &student,
            Some(0),
            Some("10:00"),
            Some("online"),
            Some(5),
            &ScoringPolicy::preference_match(),
            true,
        )
        .unwrap();
    }
}
