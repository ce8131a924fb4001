//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the first admin (prints a generated password)
//! snd-cli user create -e admin@example.com -n "Admin Name" -r admin
//!
//! # Change an existing account's role
//! snd-cli user promote -e vendor@example.com -r vendor
//! ```

use argon2::password_hash::{SaltString, rand_core::OsRng};

use shop_next_door_core::UserRole;
use shop_next_door_marketplace::db;
use shop_next_door_marketplace::services::auth::{AuthService, Registration};

use super::{CommandError, database_url};

fn parse_role(role: &str) -> Result<UserRole, CommandError> {
    role.parse()
        .map_err(|_| CommandError::InvalidRole(role.to_owned()))
}

/// A random password for accounts created without one.
fn generate_password() -> String {
    SaltString::generate(&mut OsRng).as_str().to_owned()
}

/// Create a user of any role.
///
/// Returns the new user's ID.
///
/// # Errors
///
/// Returns an error for an unknown role, invalid input, a taken email or a
/// database failure.
pub async fn create(
    email: &str,
    name: &str,
    role: &str,
    password: Option<String>,
) -> Result<i32, CommandError> {
    let role = parse_role(role)?;
    let generated = password.is_none();
    let password = password.unwrap_or_else(generate_password);

    let database_url = database_url()?;
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Creating user: {} ({})", email, role);
    let user = AuthService::new(&pool)
        .create_user(&Registration {
            email,
            password: &password,
            name,
            phone: None,
            role,
        })
        .await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Created {} user {} (id {})", user.role, user.email, user.id);
        if generated {
            println!("Generated password: {password}");
            println!("Share it securely; it is not shown again.");
        }
    }

    Ok(user.id.as_i32())
}

/// Change the role of an existing account.
///
/// # Errors
///
/// Returns an error for an unknown role or email, or a database failure.
pub async fn promote(email: &str, role: &str) -> Result<(), CommandError> {
    let role = parse_role(role)?;

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;

    let user = AuthService::new(&pool).set_role_by_email(email, role).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{} is now {}", user.email, user.role);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("admin").unwrap(), UserRole::Admin);
        assert!(matches!(
            parse_role("superuser"),
            Err(CommandError::InvalidRole(_))
        ));
    }

    #[test]
    fn test_generated_passwords_are_long_and_distinct() {
        let a = generate_password();
        let b = generate_password();
        assert!(a.len() >= 16);
        assert_ne!(a, b);
    }
}
