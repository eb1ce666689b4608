//! Session and authorized-request core for the Miguafi client.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views never hold session logic of their own. They borrow a
//! [`SessionController`] for the current credential, issue calls through the
//! shared [`ApiClient`], and let the [`guard`] decide whether a protected
//! location may render at all.
//!
//! `store` persists the credential, `session` owns the in-memory state,
//! `api` is the wire layer, `guard` gates navigation, `cancel` discards late
//! results, and `resources` holds typed helpers for the endpoints the client
//! actually renders.

pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod guard;
pub mod resources;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use cancel::{CancelToken, RequestSlot, Scope};
pub use config::ClientConfig;
pub use error::{ApiError, StoreError};
pub use guard::{GuardDecision, Location, Navigator, RouteGuard, RouteTable, Screen};
pub use reqwest::multipart;
pub use session::{Session, SessionController};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
