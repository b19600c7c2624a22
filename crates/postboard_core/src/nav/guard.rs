//! Navigation guard.
//!
//! # Responsibility
//! - Decide whether a transition proceeds or redirects, based on route
//!   access and the session store's authentication status.
//!
//! # Invariants
//! - No decision is taken before the session store has finished its
//!   initial recovery.
//! - The guard never starts session initialization itself.

use crate::nav::routes::{RouteAccess, RouteTable, DASHBOARD_ROUTE, LOGIN_ROUTE};
use crate::store::session_store::SessionStore;
use log::{debug, warn};
use std::sync::Arc;
use url::form_urlencoded;

const REDIRECT_PARAM: &str = "redirect";

/// Outcome of one navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Proceed,
    Redirect {
        name: &'static str,
        path: &'static str,
        /// Originally requested full path, to resume after sign-in.
        redirect: Option<String>,
    },
}

impl NavigationDecision {
    /// Browser-style location, with the `redirect` query when present.
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Proceed => None,
            Self::Redirect {
                path,
                redirect: None,
                ..
            } => Some((*path).to_string()),
            Self::Redirect {
                path,
                redirect: Some(redirect),
                ..
            } => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(REDIRECT_PARAM, redirect)
                    .finish();
                Some(format!("{path}?{query}"))
            }
        }
    }
}

/// Pure access decision for one target.
///
/// Redirect targets are looked up by name in `routes`; a table without the
/// target route lets the transition proceed.
pub fn decide(routes: &RouteTable, authenticated: bool, full_path: &str) -> NavigationDecision {
    match (routes.access_for(full_path), authenticated) {
        (RouteAccess::RequiresAuth, false) => {
            redirect_to(routes, LOGIN_ROUTE, Some(full_path.to_string()))
        }
        (RouteAccess::GuestOnly, true) => redirect_to(routes, DASHBOARD_ROUTE, None),
        _ => NavigationDecision::Proceed,
    }
}

fn redirect_to(routes: &RouteTable, name: &str, redirect: Option<String>) -> NavigationDecision {
    match routes.by_name(name) {
        Some(route) => NavigationDecision::Redirect {
            name: route.name,
            path: route.path,
            redirect,
        },
        None => {
            warn!(
                "event=navigation module=nav status=no_target route={}",
                name
            );
            NavigationDecision::Proceed
        }
    }
}

/// Pre-transition hook bound to one session store.
#[derive(Clone)]
pub struct NavigationGuard {
    session: Arc<SessionStore>,
    routes: Arc<RouteTable>,
}

impl NavigationGuard {
    pub fn new(session: Arc<SessionStore>, routes: RouteTable) -> Self {
        Self {
            session,
            routes: Arc::new(routes),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Checks a transition to `full_path`.
    ///
    /// Suspends until the session store is ready.
    pub async fn before_each(&self, full_path: &str) -> NavigationDecision {
        let snapshot = self.session.wait_until_ready().await;
        let decision = decide(&self.routes, snapshot.is_authenticated(), full_path);
        if let NavigationDecision::Redirect { name, .. } = &decision {
            debug!(
                "event=navigation module=nav status=redirect target={}",
                name
            );
        }
        decision
    }
}
