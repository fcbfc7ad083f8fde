use std::sync::OnceLock;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RouteError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthRoute {
    Login,
    Signup,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    PostList,
    Create,
    Edit { post_id: String },
    Auth(AuthRoute),
}

impl Route {
    /// Canonical path for this route.
    pub fn path(&self) -> String {
        match self {
            Route::PostList => "/".to_owned(),
            Route::Create => "/create".to_owned(),
            Route::Edit { post_id } => format!("/edit/{post_id}"),
            Route::Auth(AuthRoute::Login) => "/auth/login".to_owned(),
            Route::Auth(AuthRoute::Signup) => "/auth/signup".to_owned(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Create | Route::Edit { .. })
    }
}

/// Component a route entry renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    PostList,
    PostForm,
    Login,
    Signup,
}

#[derive(Debug, Clone, Copy)]
pub enum Target {
    Component(View),
    /// Child table loaded on first use.
    Lazy(fn() -> &'static [RouteEntry]),
}

#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub pattern: &'static str,
    pub target: Target,
    pub guarded: bool,
}

pub static ROUTES: &[RouteEntry] = &[
    RouteEntry {
        pattern: "",
        target: Target::Component(View::PostList),
        guarded: false,
    },
    RouteEntry {
        pattern: "create",
        target: Target::Component(View::PostForm),
        guarded: true,
    },
    RouteEntry {
        pattern: "edit/:postId",
        target: Target::Component(View::PostForm),
        guarded: true,
    },
    RouteEntry {
        pattern: "auth",
        target: Target::Lazy(auth_routes),
        guarded: false,
    },
];

fn auth_routes() -> &'static [RouteEntry] {
    static AUTH: OnceLock<Vec<RouteEntry>> = OnceLock::new();
    AUTH.get_or_init(|| {
        debug!("loading auth route table");
        vec![
            RouteEntry {
                pattern: "login",
                target: Target::Component(View::Login),
                guarded: false,
            },
            RouteEntry {
                pattern: "signup",
                target: Target::Component(View::Signup),
                guarded: false,
            },
        ]
    })
}

/// Decides whether the current session may enter a route.
pub trait Guard {
    fn can_activate(&self, route: &Route) -> bool;
}

/// Guard that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Guard for AllowAll {
    fn can_activate(&self, _route: &Route) -> bool {
        true
    }
}

/// Receives navigation requests raised by services.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

impl Navigator for mpsc::UnboundedSender<Route> {
    fn navigate(&self, route: Route) {
        if self.send(route).is_err() {
            warn!("navigation receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Router {
    table: &'static [RouteEntry],
}

impl Default for Router {
    fn default() -> Self {
        Self { table: ROUTES }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `path` against the table, consulting `guard` for guarded entries.
    pub fn resolve(&self, path: &str, guard: &dyn Guard) -> Result<Route, RouteError> {
        let segments: Vec<&str> = path
            .split('?')
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let (view, params, guarded) = match_table(self.table, &segments, false)
            .ok_or_else(|| RouteError::NotFound(path.to_owned()))?;
        let route = build_route(view, &params);

        if guarded && !guard.can_activate(&route) {
            debug!(path, "guard rejected navigation");
            return Err(RouteError::Unauthorized(path.to_owned()));
        }
        Ok(route)
    }
}

type Params<'a> = Vec<(&'static str, &'a str)>;

fn match_table<'a>(
    table: &'static [RouteEntry],
    segments: &[&'a str],
    inherited_guard: bool,
) -> Option<(View, Params<'a>, bool)> {
    for entry in table {
        let pattern: Vec<&'static str> = entry.pattern.split('/').filter(|s| !s.is_empty()).collect();
        let guarded = inherited_guard || entry.guarded;
        match entry.target {
            Target::Component(view) => {
                if pattern.len() != segments.len() {
                    continue;
                }
                if let Some(params) = match_segments(&pattern, segments) {
                    return Some((view, params, guarded));
                }
            }
            Target::Lazy(load) => {
                if segments.len() < pattern.len() {
                    continue;
                }
                let (head, rest) = segments.split_at(pattern.len());
                if let Some(mut params) = match_segments(&pattern, head) {
                    if let Some((view, child_params, child_guarded)) = match_table(load(), rest, guarded) {
                        params.extend(child_params);
                        return Some((view, params, child_guarded));
                    }
                }
            }
        }
    }
    None
}

fn match_segments<'a>(pattern: &[&'static str], segments: &[&'a str]) -> Option<Params<'a>> {
    let mut params = Vec::new();
    for (expected, actual) in pattern.iter().copied().zip(segments.iter().copied()) {
        if let Some(name) = expected.strip_prefix(':') {
            params.push((name, actual));
        } else if expected != actual {
            return None;
        }
    }
    Some(params)
}

fn build_route(view: View, params: &Params<'_>) -> Route {
    match view {
        View::PostList => Route::PostList,
        View::PostForm => match params.iter().find(|(name, _)| *name == "postId") {
            Some((_, id)) => Route::Edit {
                post_id: (*id).to_owned(),
            },
            None => Route::Create,
        },
        View::Login => Route::Auth(AuthRoute::Login),
        View::Signup => Route::Auth(AuthRoute::Signup),
    }
}
