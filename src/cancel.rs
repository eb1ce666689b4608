//! Client-side cancellation for in-flight requests.
//!
//! ARCHITECTURE
//! ============
//! Nothing is aborted on the wire. A view holds a [`Scope`] (or a
//! [`RequestSlot`] for "latest only" fetches) and hands each request a
//! [`CancelToken`]. When the response arrives the token is checked, and a
//! result from a torn-down or superseded context is dropped instead of being
//! written into view state.

#[cfg(test)]
#[path = "cancel_test.rs"]
mod cancel_test;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Liveness flag shared between a context and the requests it issued.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Await `fut`, then yield its output only if the token is still live.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        let output = fut.await;
        if self.is_cancelled() {
            tracing::debug!("discarding result for cancelled context");
            return None;
        }
        Some(output)
    }

    /// Run `apply` only if the token is still live. Returns whether it ran.
    pub fn apply<F: FnOnce()>(&self, apply: F) -> bool {
        if self.is_cancelled() {
            return false;
        }
        apply();
        true
    }
}

/// Owns a token for the lifetime of a mounted view; dropping it cancels.
#[derive(Debug, Default)]
pub struct Scope {
    token: CancelToken,
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to a request issued from this scope.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Tracks the single outstanding request for one piece of view state.
///
/// Beginning a new request cancels the previous one, so only the latest
/// response is ever applied.
#[derive(Debug, Default)]
pub struct RequestSlot {
    current: Mutex<Option<CancelToken>>,
}

impl RequestSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede any outstanding request and return a token for the next one.
    pub fn begin(&self) -> CancelToken {
        let next = CancelToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(next.clone()) {
            previous.cancel();
        }
        next
    }

    /// Cancel the outstanding request, if any.
    pub fn cancel(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.cancel();
        }
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
