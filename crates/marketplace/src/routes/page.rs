//! Per-page context shared by every HTML template.
//!
//! Form handlers report their outcome as a one-shot flash message stored in
//! the session; the next rendered page takes it out and shows it.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts, response::Redirect};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::{self, AppError};
use crate::middleware::{OptionalAuth, current_impersonator};
use crate::models::CurrentUser;

const FLASH_KEY: &str = "flash";

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashKind {
    Success,
    Error,
}

/// One-shot message shown on the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    /// CSS class for the message box.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self.kind {
            FlashKind::Success => "flash flash-success",
            FlashKind::Error => "flash flash-error",
        }
    }
}

/// Signed-in user, impersonating admin and pending flash for the layout.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub user: Option<CurrentUser>,
    pub impersonator: Option<CurrentUser>,
    pub flash: Option<Flash>,
}

impl Page {
    /// Whether the signed-in user is a vendor or admin.
    #[must_use]
    pub fn is_vendor(&self) -> bool {
        self.user.as_ref().is_some_and(CurrentUser::is_vendor)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(CurrentUser::is_admin)
    }
}

impl<S> FromRequestParts<S> for Page
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(OptionalAuth(user)) = OptionalAuth::from_request_parts(parts, state).await;
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self::default());
        };

        let impersonator = current_impersonator(session).await;
        let flash = session.remove::<Flash>(FLASH_KEY).await.ok().flatten();

        Ok(Self {
            user,
            impersonator,
            flash,
        })
    }
}

/// One choice in a filter bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Filter bar choices for every variant in `all`.
#[must_use]
pub fn filter_options<T: Copy + PartialEq>(
    all: &[T],
    selected: Option<T>,
    value: impl Fn(&T) -> &'static str,
    label: impl Fn(&T) -> &'static str,
) -> Vec<FilterOption> {
    all.iter()
        .map(|item| FilterOption {
            value: value(item),
            label: label(item),
            selected: selected == Some(*item),
        })
        .collect()
}

/// Store a flash message for the next page.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn flash(
    session: &Session,
    kind: FlashKind,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(
            FLASH_KEY,
            Flash {
                kind,
                message: message.into(),
            },
        )
        .await
}

/// Redirect to `to`, flashing `success` or the client-facing error.
///
/// Client errors become a flash message on the page the user returns to.
/// Server errors are not swallowed: they render the error page.
///
/// # Errors
///
/// Returns the error itself when it is a server error, or a session error.
pub async fn finish<T, E>(
    session: &Session,
    to: &str,
    outcome: Result<T, E>,
    success: &str,
) -> error::Result<Redirect>
where
    E: Into<AppError>,
{
    match outcome {
        Ok(_) => flash(session, FlashKind::Success, success).await?,
        Err(err) => {
            let err = err.into();
            if err.status().is_server_error() {
                return Err(err);
            }
            flash(session, FlashKind::Error, err.public_message()).await?;
        }
    }
    Ok(Redirect::to(to))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;
    use crate::services::orders::OrderError;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[test]
    fn test_filter_options_marks_selection() {
        use shop_next_door_core::ShopType;

        let options = filter_options(
            ShopType::ALL,
            Some(ShopType::GroceryShop),
            ShopType::as_str,
            ShopType::label,
        );
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].value, "grocery_shop");
        assert_eq!(options[1].label, "Grocery shop");
        assert!(options[1].selected);
        assert!(!options[0].selected);
    }

    #[tokio::test]
    async fn test_finish_flashes_client_errors() {
        let session = session();
        let outcome: Result<(), OrderError> = Err(OrderError::EmptyOrder);

        finish(&session, "/shops/1", outcome, "Order placed")
            .await
            .unwrap();

        let flash = session.get::<Flash>(FLASH_KEY).await.unwrap().unwrap();
        assert_eq!(flash.kind, FlashKind::Error);
        assert_eq!(flash.message, OrderError::EmptyOrder.to_string());
    }

    #[tokio::test]
    async fn test_finish_flashes_success() {
        let session = session();
        finish(&session, "/vendor", Ok::<_, AppError>(()), "Shop created")
            .await
            .unwrap();

        let flash = session.get::<Flash>(FLASH_KEY).await.unwrap().unwrap();
        assert_eq!(flash.kind, FlashKind::Success);
        assert_eq!(flash.message, "Shop created");
    }

    #[tokio::test]
    async fn test_finish_keeps_server_errors() {
        let session = session();
        let outcome: Result<(), AppError> = Err(AppError::Internal("db".into()));

        let result = finish(&session, "/vendor", outcome, "done").await;

        assert!(result.is_err());
        assert!(session.get::<Flash>(FLASH_KEY).await.unwrap().is_none());
    }
}
