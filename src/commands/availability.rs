use anyhow::{bail, Result};
use chrono_tz::Tz;

use crate::cascade::AvailabilityPatch;
use crate::config::{format_local, parse_client_datetime};
use crate::db::Database;
use crate::models::{Medium, User};

pub fn add(
    db: &Database,
    caller: &User,
    day_of_week: u8,
    start: &str,
    end: &str,
    medium: &str,
    one_off: bool,
    tz: Tz,
) -> Result<()> {
    if !caller.is_tutor() {
        bail!("Only tutors can publish availability");
    }

    let medium: Medium = match medium.parse() {
        Ok(m) => m,
        Err(_) => bail!("Invalid medium '{}'. Must be one of: online, in-person", medium),
    };
    let start_time = parse_client_datetime(start, tz)?;
    let end_time = parse_client_datetime(end, tz)?;

    // Profile is created on demand, like the rest of the tutor onboarding.
    let profile = db.ensure_tutor_profile(caller.id, None)?;
    let availability = db.create_availability(
        profile.id,
        day_of_week,
        start_time,
        end_time,
        medium,
        !one_off,
    )?;

    println!(
        "Published availability #{} ({}, {} - {})",
        availability.id,
        if availability.recurring { "weekly" } else { "one-off" },
        format_local(availability.start_time, tz),
        format_local(availability.end_time, tz),
    );
    Ok(())
}

pub fn list(db: &Database, tutor_user_id: Option<i64>, tz: Tz) -> Result<()> {
    let profile_id = match tutor_user_id {
        Some(user_id) => match db.get_tutor_profile_for_user(user_id)? {
            Some(profile) => Some(profile.id),
            None => bail!("Tutor #{} not found", user_id),
        },
        None => None,
    };

    let availabilities = db.list_availabilities(profile_id)?;
    if availabilities.is_empty() {
        println!("No availability found.");
        return Ok(());
    }

    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for av in availabilities {
        let cadence = if av.recurring {
            format!("every {}", DAYS[av.day_of_week.min(6) as usize])
        } else {
            "one-off".to_string()
        };
        println!(
            "#{:<4} {:10} {:9} {} - {}",
            av.id,
            cadence,
            av.medium,
            format_local(av.start_time, tz),
            format_local(av.end_time, tz),
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    db: &mut Database,
    caller: &User,
    id: i64,
    day_of_week: Option<u8>,
    start: Option<&str>,
    end: Option<&str>,
    medium: Option<&str>,
    recurring: Option<bool>,
    tz: Tz,
) -> Result<()> {
    let medium = match medium {
        Some(m) => Some(
            m.parse::<Medium>()
                .map_err(|_| anyhow::anyhow!("Invalid medium '{}'", m))?,
        ),
        None => None,
    };
    let patch = AvailabilityPatch {
        day_of_week,
        start_time: start.map(|s| parse_client_datetime(s, tz)).transpose()?,
        end_time: end.map(|s| parse_client_datetime(s, tz)).transpose()?,
        medium,
        recurring,
    };

    let (updated, retracted) = db.update_availability(caller, id, &patch)?;
    println!("Updated availability #{}", updated.id);
    if retracted > 0 {
        println!("Retracted {} open session(s) from the old window", retracted);
    }
    Ok(())
}

pub fn delete(db: &mut Database, caller: &User, id: i64) -> Result<()> {
    let retracted = db.delete_availability(caller, id)?;
    println!("Deleted availability #{}", id);
    if retracted > 0 {
        println!("Retracted {} open session(s)", retracted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    #[test]
    fn test_add_requires_tutor_role() {
        let (db, _dir) = setup_test_db();
        let student = make_student(&db, "ext-student");

        let result = add(
            &db,
            &student,
            0,
            "2025-01-06T09:00:00",
            "2025-01-06T12:00:00",
            "online",
            false,
            chrono_tz::UTC,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Only tutors"));
    }

    #[test]
    fn test_add_rejects_bad_medium() {
        let (db, _dir) = setup_test_db();
        let (tutor, _) = make_tutor(&db, "ext-tutor");

        let result = add(
            &db,
            &tutor,
            0,
            "2025-01-06T09:00:00",
            "2025-01-06T12:00:00",
            "telepathy",
            false,
            chrono_tz::UTC,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid medium"));
    }

    #[test]
    fn test_add_rejects_bad_datetime() {
        let (db, _dir) = setup_test_db();
        let (tutor, _) = make_tutor(&db, "ext-tutor");

        let result = add(
            &db,
            &tutor,
            0,
            "not-a-date",
            "2025-01-06T12:00:00",
            "online",
            false,
            chrono_tz::UTC,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_add_and_update_window() {
        let (mut db, _dir) = setup_test_db();
        let (tutor, profile) = make_tutor(&db, "ext-tutor");

        add(
            &db,
            &tutor,
            3,
            "2025-01-09T09:00:00",
            "2025-01-09T12:00:00",
            "online",
            false,
            chrono_tz::UTC,
        )
        .unwrap();

        let avs = db.list_availabilities(Some(profile.id)).unwrap();
        assert_eq!(avs.len(), 1);
        assert!(avs[0].recurring);

        update(
            &mut db,
            &tutor,
            avs[0].id,
            None,
            Some("2025-01-09T10:00:00"),
            None,
            None,
            None,
            chrono_tz::UTC,
        )
        .unwrap();

        let updated = db.get_availability(avs[0].id).unwrap().unwrap();
        assert_eq!(updated.start_time, utc(2025, 1, 9, 10, 0));
    }
}
