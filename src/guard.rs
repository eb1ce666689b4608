//! Route guarding for protected views.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every navigation and every session change goes through [`evaluate`], so
//! protected locations render only while a credential exists. An
//! unauthenticated visit is redirected to the login route with the requested
//! location remembered for the post-login return. The guard never calls the
//! network.
//!
//! [`Navigator`] is the stateful side: it owns the [`Scope`] of the mounted
//! protected view and drops it the moment the view stops rendering, which
//! cancels every request that view still has in flight.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::cancel::{CancelToken, Scope};
use crate::session::{Session, SessionController};

pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
pub const HOME_ROUTE: &str = "/profile";

const MAX_REDIRECTS: usize = 8;

// =============================================================================
// LOCATION
// =============================================================================

/// A client-side location: path plus optional query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    path: String,
    query: Option<String>,
}

impl Location {
    /// Parse `"/path?query"`. A missing leading slash is added.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned()).filter(|q| !q.is_empty())),
            None => (raw, None),
        };
        let path = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };
        Self { path, query }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{}?{query}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

// =============================================================================
// ROUTE TABLE
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Public,
    Protected,
    /// Guarded redirect to another route.
    Alias(String),
    Unknown,
}

/// Which paths are public, which need a session, and where aliases point.
#[derive(Clone, Debug)]
pub struct RouteTable {
    login: String,
    home: String,
    public: Vec<String>,
    protected: Vec<String>,
    aliases: Vec<(String, String)>,
}

impl RouteTable {
    /// Empty table. `login` is always public; `home` is the post-login default.
    #[must_use]
    pub fn new(login: &str, home: &str) -> Self {
        Self {
            login: login.to_owned(),
            home: home.to_owned(),
            public: vec![login.to_owned()],
            protected: Vec::new(),
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn public(mut self, path: &str) -> Self {
        self.public.push(path.to_owned());
        self
    }

    #[must_use]
    pub fn protected(mut self, path: &str) -> Self {
        self.protected.push(path.to_owned());
        self
    }

    #[must_use]
    pub fn alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.push((from.to_owned(), to.to_owned()));
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login
    }

    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home
    }

    /// Classify `path`. Aliases match exactly; other routes also cover
    /// nested segments (`/dogs` covers `/dogs/12`).
    #[must_use]
    pub fn resolve(&self, path: &str) -> RouteKind {
        if let Some((_, to)) = self.aliases.iter().find(|(from, _)| from == path) {
            return RouteKind::Alias(to.clone());
        }
        if self.public.iter().any(|p| covers(p, path)) {
            return RouteKind::Public;
        }
        if self.protected.iter().any(|p| covers(p, path)) {
            return RouteKind::Protected;
        }
        RouteKind::Unknown
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(LOGIN_ROUTE, HOME_ROUTE)
            .public(REGISTER_ROUTE)
            .alias("/", HOME_ROUTE)
            .protected("/profile")
            .protected("/dogs")
            .protected("/offers")
            .protected("/requests")
            .protected("/notifications")
    }
}

fn covers(pattern: &str, path: &str) -> bool {
    if path == pattern {
        return true;
    }
    pattern != "/" && path.strip_prefix(pattern).is_some_and(|rest| rest.starts_with('/'))
}

// =============================================================================
// EVALUATION
// =============================================================================

/// What a guarded location renders as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Screen {
    pub location: Location,
    pub protected: bool,
    /// Login in flight; render a non-blocking progress indicator.
    pub show_progress: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Render(Screen),
    Redirect {
        to: Location,
        /// Originally requested location, kept for the post-login return.
        from: Option<Location>,
    },
}

/// Decide how `location` renders for `session`. Pure; no side effects.
#[must_use]
pub fn evaluate(routes: &RouteTable, session: &Session, location: &Location) -> GuardDecision {
    let authenticated = session.is_authenticated();
    let to_login = |from: Option<Location>| GuardDecision::Redirect { to: Location::parse(&routes.login), from };

    match routes.resolve(location.path()) {
        RouteKind::Public => {
            GuardDecision::Render(Screen { location: location.clone(), protected: false, show_progress: false })
        }
        RouteKind::Protected if authenticated => {
            GuardDecision::Render(Screen { location: location.clone(), protected: true, show_progress: session.pending })
        }
        RouteKind::Alias(to) if authenticated => GuardDecision::Redirect { to: Location::parse(&to), from: None },
        RouteKind::Protected | RouteKind::Alias(_) => to_login(Some(location.clone())),
        RouteKind::Unknown => to_login(None),
    }
}

/// Where to go after a successful login.
#[must_use]
pub fn post_login_destination(routes: &RouteTable, from: Option<&Location>) -> Location {
    from.cloned().unwrap_or_else(|| Location::parse(&routes.home))
}

// =============================================================================
// GUARD
// =============================================================================

/// Session-aware wrapper around a [`RouteTable`].
#[derive(Clone, Debug)]
pub struct RouteGuard {
    controller: SessionController,
    routes: Arc<RouteTable>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(controller: SessionController, routes: RouteTable) -> Self {
        Self { controller, routes: Arc::new(routes) }
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Evaluate `location` against the current session.
    #[must_use]
    pub fn evaluate(&self, location: &Location) -> GuardDecision {
        evaluate(&self.routes, &self.controller.current_session(), location)
    }

    /// Start navigating at `path`.
    #[must_use]
    pub fn navigator(&self, path: &str) -> Navigator {
        Navigator::new(self.clone(), path)
    }
}

// =============================================================================
// NAVIGATOR
// =============================================================================

/// Current location plus the lifetime of the mounted protected view.
pub struct Navigator {
    guard: RouteGuard,
    session: watch::Receiver<Session>,
    requested: Location,
    screen: Screen,
    return_to: Option<Location>,
    mounted: Option<Scope>,
}

impl Navigator {
    #[must_use]
    pub fn new(guard: RouteGuard, path: &str) -> Self {
        let session = guard.controller.subscribe();
        let login = Location::parse(guard.routes.login_path());
        let mut navigator = Self {
            guard,
            session,
            requested: login.clone(),
            screen: Screen { location: login, protected: false, show_progress: false },
            return_to: None,
            mounted: None,
        };
        navigator.navigate(path);
        navigator
    }

    /// Navigate to `path`, following redirects until something renders.
    pub fn navigate(&mut self, path: &str) -> &Screen {
        self.requested = Location::parse(path);
        self.settle();
        &self.screen
    }

    /// Navigate to the remembered location, or home.
    pub fn after_login(&mut self) -> &Screen {
        let destination = post_login_destination(&self.guard.routes, self.return_to.take().as_ref());
        self.navigate(&destination.to_string())
    }

    /// Wait for the next session change and re-evaluate the requested location.
    ///
    /// Returns `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<&Screen> {
        self.session.changed().await.ok()?;
        self.settle();
        Some(&self.screen)
    }

    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    #[must_use]
    pub fn return_to(&self) -> Option<&Location> {
        self.return_to.as_ref()
    }

    /// Token for requests issued by the mounted protected view.
    #[must_use]
    pub fn view_token(&self) -> Option<CancelToken> {
        self.mounted.as_ref().map(Scope::token)
    }

    fn settle(&mut self) {
        let session = self.session.borrow_and_update().clone();
        let mut location = self.requested.clone();
        for _ in 0..MAX_REDIRECTS {
            match evaluate(&self.guard.routes, &session, &location) {
                GuardDecision::Render(screen) => {
                    self.show(screen);
                    return;
                }
                GuardDecision::Redirect { to, from } => {
                    if from.is_some() {
                        self.return_to = from;
                    }
                    location = to;
                }
            }
        }
        tracing::warn!(requested = %self.requested, "redirect loop in route table; falling back to login");
        let login = Location::parse(self.guard.routes.login_path());
        self.show(Screen { location: login, protected: false, show_progress: false });
    }

    fn show(&mut self, screen: Screen) {
        let same_view = self.mounted.is_some() && screen.protected && screen.location == self.screen.location;
        if !screen.protected {
            // Dropping the scope cancels the torn-down view's requests.
            self.mounted = None;
        } else if !same_view {
            self.mounted = Some(Scope::new());
        }
        self.screen = screen;
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("requested", &self.requested)
            .field("screen", &self.screen)
            .field("return_to", &self.return_to)
            .field("mounted", &self.mounted.is_some())
            .finish_non_exhaustive()
    }
}
