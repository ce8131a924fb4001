//! Authentication middleware and extractors.
//!
//! Role extractors read the [`CurrentUser`] stored in the session. Missing
//! sessions redirect HTML requests to the login page and answer `/api/`
//! requests with 401; a signed-in user with the wrong role gets 403.
//!
//! The vendor and admin extractors re-read the role from the database, so a
//! demotion applies to sessions that are already open.

use axum::{
    extract::{FromRef, FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::db::UserRepository;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Error returned when a route's role requirement is not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Signed in, but the role may not use this route.
    Forbidden,
    /// The role could not be checked.
    Unavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have access to this page",
            )
                .into_response(),
            Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// The signed-in user, or the rejection for an anonymous request.
async fn signed_in_user(parts: &Parts) -> Result<CurrentUser, AuthRejection> {
    let session = parts
        .extensions
        .get::<Session>()
        .ok_or(AuthRejection::Unauthorized)?;

    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
        .ok_or_else(|| anonymous_rejection(parts))
}

fn anonymous_rejection(parts: &Parts) -> AuthRejection {
    // Nested routers see a stripped URI; the original keeps `/api`.
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |uri| uri.0.path());
    if path.starts_with("/api/") {
        AuthRejection::Unauthorized
    } else {
        AuthRejection::RedirectToLogin
    }
}

/// The session user with the role currently stored for them.
///
/// A changed role is written back to the session; a deleted account signs
/// the session out.
async fn with_current_role(
    parts: &Parts,
    app: &AppState,
    user: CurrentUser,
) -> Result<CurrentUser, AuthRejection> {
    let stored = UserRepository::new(app.pool())
        .get_by_id(user.id)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Failed to load user role");
            AuthRejection::Unavailable
        })?;
    let session = parts.extensions.get::<Session>();

    let Some(stored) = stored else {
        if let Some(session) = session {
            if let Err(e) = session.remove::<CurrentUser>(session_keys::CURRENT_USER).await {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to sign out deleted user");
            }
        }
        return Err(anonymous_rejection(parts));
    };

    if stored.role == user.role {
        return Ok(user);
    }

    tracing::info!(
        user_id = %user.id,
        from = %user.role,
        to = %stored.role,
        "Session role refreshed"
    );
    let refreshed = CurrentUser {
        role: stored.role,
        ..user
    };
    if let Some(session) = session {
        if let Err(e) = set_current_user(session, &refreshed).await {
            tracing::warn!(user_id = %refreshed.id, error = %e, "Failed to store refreshed role");
        }
    }
    Ok(refreshed)
}

/// Extractor that requires any signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn orders(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Orders for {}", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        signed_in_user(parts).await.map(Self)
    }
}

/// Extractor that requires a vendor (admins qualify too).
pub struct RequireVendor(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireVendor
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = signed_in_user(parts).await?;
        if !user.is_vendor() {
            return Err(AuthRejection::Forbidden);
        }
        let user = with_current_role(parts, &AppState::from_ref(state), user).await?;
        if !user.is_vendor() {
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that requires an admin.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = signed_in_user(parts).await?;
        if !user.is_admin() {
            return Err(AuthRejection::Forbidden);
        }
        let user = with_current_role(parts, &AppState::from_ref(state), user).await?;
        if !user.is_admin() {
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Never rejects; anonymous requests get `None`.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user))
    }
}

/// Helper to set the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// The admin behind an impersonated session, if any.
pub async fn current_impersonator(session: &Session) -> Option<CurrentUser> {
    session
        .get::<CurrentUser>(session_keys::IMPERSONATOR)
        .await
        .ok()
        .flatten()
}
