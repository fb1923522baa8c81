use anyhow::{bail, Result};

use crate::db::Database;
use crate::models::Role;

/// Mirrors an identity-provider verified `(external_id, name, email)` triple
/// into the local user store. Repeat registrations refresh name and email.
pub fn register(
    db: &Database,
    external_id: &str,
    name: &str,
    email: &str,
    role: Option<&str>,
) -> Result<()> {
    let user = db.upsert_user_from_identity(external_id, name, email)?;

    if let Some(r) = role {
        let role: Role = match r.parse() {
            Ok(role) => role,
            Err(_) => bail!("Invalid role '{}'. Must be one of: student, tutor, professor", r),
        };
        db.set_user_role(user.id, role)?;
        if role == Role::Tutor {
            db.ensure_tutor_profile(user.id, None)?;
        }
    }

    println!("Registered user #{} ({})", user.id, user.external_id);
    Ok(())
}

pub fn list(db: &Database, role: Option<&str>) -> Result<()> {
    let role = match role {
        Some(r) => Some(
            r.parse::<Role>()
                .map_err(|_| anyhow::anyhow!("Invalid role '{}'", r))?,
        ),
        None => None,
    };

    let users = db.list_users(role)?;
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    for user in users {
        let role_display = user
            .role
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<4} {:10} {:<25} {}",
            user.id, role_display, user.name, user.email
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_db;

    #[test]
    fn test_register_with_role_creates_tutor_profile() {
        let (db, _dir) = setup_test_db();
        register(&db, "ext-1", "Test Tutor", "tutor@test.com", Some("tutor")).unwrap();

        let user = db.get_user_by_external_id("ext-1").unwrap().unwrap();
        assert_eq!(user.role, Some(Role::Tutor));
        assert!(db.get_tutor_profile_for_user(user.id).unwrap().is_some());
    }

    #[test]
    fn test_register_invalid_role_fails() {
        let (db, _dir) = setup_test_db();
        let result = register(&db, "ext-1", "Someone", "x@test.com", Some("admin"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid role"));
    }

    #[test]
    fn test_register_again_refreshes_identity() {
        let (db, _dir) = setup_test_db();
        register(&db, "ext-1", "Old Name", "old@test.com", Some("student")).unwrap();
        register(&db, "ext-1", "New Name", "new@test.com", None).unwrap();

        let user = db.get_user_by_external_id("ext-1").unwrap().unwrap();
        assert_eq!(user.name, "New Name");
        // Role assignment survives a refresh.
        assert_eq!(user.role, Some(Role::Student));
    }
}
