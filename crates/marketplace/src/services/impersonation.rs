//! Admin impersonation.
//!
//! While impersonating, the session's current user is the target and the
//! admin is kept under a separate key until impersonation stops.

use sqlx::PgPool;
use thiserror::Error;
use tower_sessions::Session;
use tracing::warn;

use shop_next_door_core::{UserId, UserRole};

use crate::db::{RepositoryError, UserRepository};
use crate::middleware::{current_impersonator, set_current_user};
use crate::models::{CurrentUser, session_keys};

/// Errors from starting or stopping impersonation.
#[derive(Debug, Error)]
pub enum ImpersonationError {
    #[error("only admins can impersonate users")]
    NotAdmin,

    #[error("admins cannot be impersonated")]
    TargetIsAdmin,

    #[error("you cannot impersonate yourself")]
    SelfTarget,

    /// Impersonation does not nest.
    #[error("stop the current impersonation first")]
    AlreadyImpersonating,

    #[error("not impersonating anyone")]
    NotImpersonating,

    #[error("user not found")]
    UserNotFound,

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Whether `admin` may start impersonating a user with this ID and role.
///
/// # Errors
///
/// Returns the rule that forbids it.
pub fn check_target(
    admin: &CurrentUser,
    already_impersonating: bool,
    target_id: UserId,
    target_role: UserRole,
) -> Result<(), ImpersonationError> {
    if already_impersonating {
        return Err(ImpersonationError::AlreadyImpersonating);
    }
    if !admin.is_admin() {
        return Err(ImpersonationError::NotAdmin);
    }
    if target_id == admin.id {
        return Err(ImpersonationError::SelfTarget);
    }
    if target_role == UserRole::Admin {
        return Err(ImpersonationError::TargetIsAdmin);
    }
    Ok(())
}

/// Make `target_id` the session's current user, remembering `admin`.
///
/// # Errors
///
/// Returns the rule that forbids it, `ImpersonationError::UserNotFound`,
/// or a session error.
pub async fn start(
    pool: &PgPool,
    session: &Session,
    admin: &CurrentUser,
    target_id: UserId,
) -> Result<CurrentUser, ImpersonationError> {
    let already = current_impersonator(session).await.is_some();
    let target = UserRepository::new(pool)
        .get_by_id(target_id)
        .await?
        .ok_or(ImpersonationError::UserNotFound)?;

    check_target(admin, already, target.id, target.role)?;

    let target = CurrentUser::from(&target);
    session.cycle_id().await?;
    session.insert(session_keys::IMPERSONATOR, admin).await?;
    set_current_user(session, &target).await?;

    warn!(
        admin_id = %admin.id,
        target_user_id = %target.id,
        target_role = %target.role,
        "Impersonation started"
    );

    Ok(target)
}

/// Restore the admin identity.
///
/// # Errors
///
/// Returns `ImpersonationError::NotImpersonating` if the session holds no
/// admin, or a session error.
pub async fn stop(session: &Session) -> Result<CurrentUser, ImpersonationError> {
    let admin = session
        .remove::<CurrentUser>(session_keys::IMPERSONATOR)
        .await?
        .ok_or(ImpersonationError::NotImpersonating)?;
    let target = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;

    session.cycle_id().await?;
    set_current_user(session, &admin).await?;

    warn!(
        admin_id = %admin.id,
        target_user_id = target.map(|t| t.id.to_string()).unwrap_or_default(),
        "Impersonation stopped"
    );

    Ok(admin)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use shop_next_door_core::Email;
    use tower_sessions::MemoryStore;

    use super::*;

    fn user(id: i32, role: UserRole) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse(&format!("u{id}@example.com")).unwrap(),
            name: format!("User {id}"),
            role,
        }
    }

    #[test]
    fn test_check_target_rules() {
        let admin = user(1, UserRole::Admin);

        assert!(check_target(&admin, false, UserId::new(2), UserRole::Customer).is_ok());
        assert!(check_target(&admin, false, UserId::new(3), UserRole::Vendor).is_ok());
        assert!(matches!(
            check_target(&admin, false, UserId::new(4), UserRole::Admin),
            Err(ImpersonationError::TargetIsAdmin)
        ));
        assert!(matches!(
            check_target(&admin, false, UserId::new(1), UserRole::Admin),
            Err(ImpersonationError::SelfTarget)
        ));
        assert!(matches!(
            check_target(&admin, true, UserId::new(2), UserRole::Customer),
            Err(ImpersonationError::AlreadyImpersonating)
        ));
        assert!(matches!(
            check_target(&user(5, UserRole::Vendor), false, UserId::new(2), UserRole::Customer),
            Err(ImpersonationError::NotAdmin)
        ));
    }

    #[tokio::test]
    async fn test_stop_restores_admin() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let admin = user(1, UserRole::Admin);
        let target = user(2, UserRole::Customer);

        session.insert(session_keys::IMPERSONATOR, &admin).await.unwrap();
        set_current_user(&session, &target).await.unwrap();

        let restored = stop(&session).await.unwrap();
        assert_eq!(restored, admin);
        assert_eq!(
            session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .unwrap(),
            Some(admin)
        );
        assert!(current_impersonator(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_stop_without_impersonation() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        assert!(matches!(
            stop(&session).await,
            Err(ImpersonationError::NotImpersonating)
        ));
    }
}
