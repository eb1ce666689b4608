//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const API_BASE_VAR: &str = "MIGUAFI_API_BASE";
pub const SESSION_FILE_VAR: &str = "MIGUAFI_SESSION_FILE";

const SESSION_DIR: &str = ".miguafi";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base URL without a trailing slash.
    pub base_url: String,
    /// Location of the durable session record.
    pub session_file: PathBuf,
}

impl ClientConfig {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `MIGUAFI_API_BASE`: default `http://localhost:8000`
    /// - `MIGUAFI_SESSION_FILE`: default `$HOME/.miguafi/session.json`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url =
            non_empty(lookup(API_BASE_VAR)).map_or_else(|| DEFAULT_API_BASE.to_owned(), |raw| normalize_base_url(&raw));
        let session_file = non_empty(lookup(SESSION_FILE_VAR))
            .map_or_else(|| default_session_file(non_empty(lookup("HOME"))), PathBuf::from);
        Self { base_url, session_file }
    }

    /// Same config pointed at a different server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_session_file(home: Option<String>) -> PathBuf {
    let root = home.map_or_else(|| PathBuf::from("."), PathBuf::from);
    root.join(SESSION_DIR).join(SESSION_FILE)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
