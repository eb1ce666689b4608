//! Auth-session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The controller is owned by the application root and passed by handle to
//! route guards and request-issuing views. It is the only writer of
//! [`Session`]; everyone else reads a snapshot or subscribes for changes.
//!
//! CONCURRENCY
//! ===========
//! Each write replaces `(credential, pending)` in one `send_modify`, so a
//! subscriber never sees a credential without its matching pending flag.
//! Concurrent `login` calls are not deduplicated: whichever response resolves
//! last decides the final credential.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::store::SessionStore;

/// Authentication state: the current credential and login-in-flight flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    /// Present iff the user is authenticated.
    pub credential: Option<String>,
    /// True while a login is in flight. Never gates access.
    pub pending: bool,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }
}

struct Inner {
    api: ApiClient,
    store: Arc<dyn SessionStore>,
    state: watch::Sender<Session>,
}

/// Owner of the application-wide [`Session`].
///
/// Clones share the same state; hand a clone to each collaborator.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("base_url", &self.inner.api.base_url())
            .field("authenticated", &self.inner.state.borrow().is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Bootstrap session state from `store`.
    ///
    /// An unreadable store starts the session logged out rather than failing
    /// application startup.
    pub fn new(api: ApiClient, store: Arc<dyn SessionStore>) -> Self {
        let credential = match store.load() {
            Ok(credential) => credential.filter(|c| !c.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "session store unreadable; starting logged out");
                None
            }
        };
        let state = watch::Sender::new(Session { credential, pending: false });
        Self { inner: Arc::new(Inner { api, store, state }) }
    }

    /// Snapshot of the current session. Never blocks, never hits the network.
    #[must_use]
    pub fn current_session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn credential(&self) -> Option<String> {
        self.inner.state.borrow().credential.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Receiver notified on every session transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Authenticate and, on success, persist and publish the new credential.
    ///
    /// A failed attempt leaves any existing credential in place.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidCredentials`] for any rejection or transport
    /// failure; [`ApiError::Decode`] if a 2xx body carries no usable token.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<(), ApiError> {
        self.inner.state.send_modify(|s| s.pending = true);

        match self.inner.api.authenticate(identifier, secret).await {
            Ok(token) => {
                self.persist(Some(&token));
                self.inner.state.send_modify(|s| {
                    s.credential = Some(token);
                    s.pending = false;
                });
                tracing::debug!("login succeeded");
                Ok(())
            }
            Err(e) => {
                self.inner.state.send_modify(|s| s.pending = false);
                Err(e)
            }
        }
    }

    /// Drop the credential locally. No server round-trip; always succeeds.
    pub fn logout(&self) {
        self.inner.state.send_modify(|s| s.credential = None);
        self.persist(None);
        tracing::debug!("logged out");
    }

    fn persist(&self, credential: Option<&str>) {
        let result = match credential {
            Some(token) => self.inner.store.save(token),
            None => self.inner.store.clear(),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "session store write failed; in-memory session still updated");
        }
    }
}
