//! Authentication route handlers.
//!
//! Email and password sign-in. Sessions get a fresh ID on sign-in and are
//! destroyed on sign-out.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use shop_next_door_core::UserRole;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::set_current_user;
use crate::models::CurrentUser;
use crate::routes::page::{FlashKind, Page, flash};
use crate::services::auth::{AuthError, AuthService, Registration};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub password_confirm: String,
    pub role: UserRole,
}

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: Page,
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub page: Page,
    pub roles: [UserRole; 2],
}

/// Text for a login page message code.
fn login_message(code: &str) -> Option<&'static str> {
    match code {
        "credentials" => Some("Invalid email or password"),
        "session" => Some("Could not start your session, please try again"),
        "registered" => Some("Account created, you can sign in now"),
        "signed_out" => Some("You have been signed out"),
        _ => None,
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(page: Page, Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        page,
        error: query.error.as_deref().and_then(login_message),
        success: query.success.as_deref().and_then(login_message),
    }
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            tracing::info!("Login failed: invalid credentials");
            return Redirect::to("/auth/login?error=credentials").into_response();
        }
        Err(e) => return crate::error::AppError::from(e).into_response(),
    };

    let current = CurrentUser::from(&user);
    if let Err(e) = start_session(&session, &current).await {
        tracing::error!("Failed to set session: {}", e);
        return Redirect::to("/auth/login?error=session").into_response();
    }

    set_sentry_user(&current.id, Some(current.email.as_str()));
    tracing::info!(user_id = %current.id, role = %current.role, "User signed in");

    Redirect::to(current.role.dashboard_path()).into_response()
}

async fn start_session(
    session: &Session,
    user: &CurrentUser,
) -> std::result::Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    set_current_user(session, user).await
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(page: Page) -> impl IntoResponse {
    RegisterTemplate {
        page,
        roles: [UserRole::Customer, UserRole::Vendor],
    }
}

/// Handle registration form submission.
///
/// Validation failures return to the form with the reason.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect> {
    if form.password != form.password_confirm {
        flash(&session, FlashKind::Error, "Passwords do not match").await?;
        return Ok(Redirect::to("/auth/register"));
    }

    let registration = Registration {
        email: &form.email,
        password: &form.password,
        name: &form.name,
        phone: form.phone.as_deref(),
        role: form.role,
    };

    match AuthService::new(state.pool()).register(&registration).await {
        Ok(_) => Ok(Redirect::to("/auth/login?success=registered")),
        Err(AuthError::Repository(e)) => Err(AuthError::Repository(e).into()),
        Err(AuthError::PasswordHash) => Err(AuthError::PasswordHash.into()),
        Err(e) => {
            tracing::info!(error = %e, "Registration rejected");
            flash(&session, FlashKind::Error, public_reason(&e)).await?;
            Ok(Redirect::to("/auth/register"))
        }
    }
}

fn public_reason(err: &AuthError) -> String {
    match err {
        AuthError::UserAlreadyExists => "An account with this email already exists".to_owned(),
        other => other.to_string(),
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout.
pub async fn logout(session: Session) -> Result<Redirect> {
    session.flush().await?;
    clear_sentry_user();
    Ok(Redirect::to("/auth/login?success=signed_out"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_message_codes() {
        assert_eq!(login_message("credentials"), Some("Invalid email or password"));
        assert!(login_message("registered").is_some());
        assert_eq!(login_message("<script>"), None);
    }

    #[test]
    fn test_public_reason_for_taken_email() {
        assert_eq!(
            public_reason(&AuthError::UserAlreadyExists),
            "An account with this email already exists"
        );
        assert_eq!(
            public_reason(&AuthError::WeakPassword("too short".into())),
            "password validation failed: too short"
        );
    }
}
