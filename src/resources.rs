//! Typed helpers for the endpoints the client renders directly.
//!
//! These sit on top of [`ApiClient`] and give callers concrete decode targets
//! instead of untyped JSON. Everything else goes through the generic verbs.

#[cfg(test)]
#[path = "resources_test.rs"]
mod resources_test;

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, watch};

use crate::api::ApiClient;
use crate::cancel::RequestSlot;
use crate::error::ApiError;
use crate::session::{Session, SessionController};

pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/users/me";
pub const NOTIFICATIONS_PATH: &str = "/notifications/me";
pub const READ_ALL_NOTIFICATIONS_PATH: &str = "/notifications/me/read-all";

// =============================================================================
// TYPES
// =============================================================================

/// Account as returned by `/users/me` and `/auth/register`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub dog_name: Option<String>,
    #[serde(default)]
    pub dog_photo_url: Option<String>,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_lng: Option<f64>,
    pub created_at: String,
}

/// Registration payload. Optional profile fields are omitted when unset.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dog_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dog_photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_lng: Option<f64>,
}

/// Partial profile update for `PUT /users/me`; unset fields are left alone.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dog_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dog_photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_lng: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

/// One page of a paginated listing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationQuery {
    pub page: u32,
    pub page_size: u32,
    pub unread_only: bool,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self { page: 1, page_size: 10, unread_only: false }
    }
}

impl NotificationQuery {
    /// Request path including the query string.
    #[must_use]
    pub fn path(&self) -> String {
        match serde_urlencoded::to_string(self) {
            Ok(query) => format!("{NOTIFICATIONS_PATH}?{query}"),
            Err(_) => NOTIFICATIONS_PATH.to_owned(),
        }
    }
}

// =============================================================================
// ENDPOINTS
// =============================================================================

/// Create an account. Sent without a credential.
///
/// # Errors
///
/// Server rejections (e.g. duplicate email) come back verbatim as
/// [`ApiError::RequestRejected`].
pub async fn register(api: &ApiClient, account: &NewAccount) -> Result<User, ApiError> {
    api.post(REGISTER_PATH, account, None).await
}

/// Fetch the signed-in user.
///
/// # Errors
///
/// See [`ApiClient::get`].
pub async fn current_user(api: &ApiClient, credential: &str) -> Result<User, ApiError> {
    api.get(ME_PATH, Some(credential)).await
}

/// Apply a partial profile update.
///
/// # Errors
///
/// See [`ApiClient::put`].
pub async fn update_profile(api: &ApiClient, credential: &str, update: &ProfileUpdate) -> Result<User, ApiError> {
    api.put(ME_PATH, update, Some(credential)).await
}

/// # Errors
///
/// See [`ApiClient::get`].
pub async fn notifications(
    api: &ApiClient,
    credential: &str,
    query: &NotificationQuery,
) -> Result<Page<Notification>, ApiError> {
    api.get(&query.path(), Some(credential)).await
}

/// # Errors
///
/// See [`ApiClient::put_void`].
pub async fn mark_notification_read(api: &ApiClient, credential: &str, id: i64) -> Result<(), ApiError> {
    api.put_void(&format!("/notifications/{id}/read"), Some(credential)).await
}

/// # Errors
///
/// See [`ApiClient::post_void`].
pub async fn mark_all_notifications_read(api: &ApiClient, credential: &str) -> Result<(), ApiError> {
    api.post_void(READ_ALL_NOTIFICATIONS_PATH, Some(credential)).await
}

// =============================================================================
// USER BADGE
// =============================================================================

/// Signed-in email shown next to the logout control.
///
/// Refreshes are "latest only": a refresh started after another one
/// supersedes it, and a response for a credential that is no longer current
/// is dropped. The email is tied to the credential it was fetched for, so
/// it disappears the moment that credential does.
pub struct UserBadge {
    controller: SessionController,
    session: AsyncMutex<SessionWatch>,
    slot: RequestSlot,
    shown: Mutex<Option<Shown>>,
}

struct SessionWatch {
    rx: watch::Receiver<Session>,
    seen: Option<String>,
}

struct Shown {
    credential: String,
    email: String,
}

impl UserBadge {
    #[must_use]
    pub fn new(controller: SessionController) -> Self {
        let mut rx = controller.subscribe();
        let seen = rx.borrow_and_update().credential.clone();
        Self {
            controller,
            session: AsyncMutex::new(SessionWatch { rx, seen }),
            slot: RequestSlot::new(),
            shown: Mutex::default(),
        }
    }

    /// Email for the current credential, if one has been fetched.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        let current = self.controller.credential();
        let shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        shown.as_ref().filter(|s| current.as_deref() == Some(s.credential.as_str())).map(|s| s.email.clone())
    }

    /// Re-fetch the email for the current credential; clears it when logged out.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error when the refresh is still current. A
    /// superseded refresh resolves `Ok(())` without touching the badge.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let token = self.slot.begin();
        let Some(credential) = self.controller.credential() else {
            token.apply(|| self.set(None));
            return Ok(());
        };
        let result = token.run(current_user(self.controller.api(), &credential)).await;
        if self.controller.credential().as_deref() != Some(credential.as_str()) {
            token.cancel();
            tracing::debug!("discarding user badge response for a replaced credential");
            return Ok(());
        }
        match result {
            Some(Ok(user)) => {
                token.apply(|| self.set(Some(Shown { credential, email: user.email })));
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for the next session change. When the credential changed, the
    /// outstanding refresh is cancelled, the badge cleared, and a new refresh
    /// started for the new credential.
    ///
    /// Returns `Ok(true)` if the credential changed and `Ok(false)` for other
    /// transitions (such as the pending flag) or once the controller is gone.
    ///
    /// # Errors
    ///
    /// Propagates the follow-up refresh error.
    pub async fn changed(&self) -> Result<bool, ApiError> {
        let mut session = self.session.lock().await;
        if session.rx.changed().await.is_err() {
            return Ok(false);
        }
        let credential = session.rx.borrow_and_update().credential.clone();
        if credential == session.seen {
            return Ok(false);
        }
        session.seen = credential;
        drop(session);

        self.slot.cancel();
        self.set(None);
        self.refresh().await.map(|()| true)
    }

    fn set(&self, shown: Option<Shown>) {
        *self.shown.lock().unwrap_or_else(PoisonError::into_inner) = shown;
    }
}

impl std::fmt::Debug for UserBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserBadge").field("email", &self.email()).finish_non_exhaustive()
    }
}
