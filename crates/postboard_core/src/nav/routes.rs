//! Application route table.
//!
//! # Invariants
//! - Route paths are unique and start with `/`.
//! - Lookup ignores query string, fragment and trailing slash.

pub const HOME_ROUTE: &str = "home";
pub const LOGIN_ROUTE: &str = "login";
pub const SIGNUP_ROUTE: &str = "signup";
pub const DASHBOARD_ROUTE: &str = "dashboard";

/// Who may enter a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    /// Only signed-in users.
    RequiresAuth,
    /// Only anonymous users (login, sign-up).
    GuestOnly,
}

/// One named destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub path: &'static str,
    pub access: RouteAccess,
}

/// Ordered set of known routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Routes of the article board: home, login, signup and dashboard.
    pub fn default_app() -> Self {
        Self::new(vec![
            Route {
                name: HOME_ROUTE,
                path: "/",
                access: RouteAccess::Public,
            },
            Route {
                name: LOGIN_ROUTE,
                path: "/login",
                access: RouteAccess::GuestOnly,
            },
            Route {
                name: SIGNUP_ROUTE,
                path: "/signup",
                access: RouteAccess::GuestOnly,
            },
            Route {
                name: DASHBOARD_ROUTE,
                path: "/dashboard",
                access: RouteAccess::RequiresAuth,
            },
        ])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn by_name(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// Finds the route matching the path part of `full_path`.
    pub fn resolve(&self, full_path: &str) -> Option<&Route> {
        let path = route_path(full_path);
        self.routes.iter().find(|route| route.path == path)
    }

    /// Access level for `full_path`; unknown paths are public.
    pub fn access_for(&self, full_path: &str) -> RouteAccess {
        self.resolve(full_path)
            .map_or(RouteAccess::Public, |route| route.access)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::default_app()
    }
}

fn route_path(full_path: &str) -> &str {
    let end = full_path.find(['?', '#']).unwrap_or(full_path.len());
    let path = &full_path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::{RouteAccess, RouteTable, DASHBOARD_ROUTE};

    #[test]
    fn resolve_ignores_query_fragment_and_trailing_slash() {
        let table = RouteTable::default_app();
        for path in ["/dashboard", "/dashboard/", "/dashboard?tab=mine", "/dashboard#top"] {
            let route = table.resolve(path).expect("dashboard should resolve");
            assert_eq!(route.name, DASHBOARD_ROUTE);
        }
        assert_eq!(table.resolve("").map(|route| route.path), Some("/"));
        assert_eq!(table.resolve("/?ref=mail").map(|route| route.path), Some("/"));
    }

    #[test]
    fn unknown_paths_are_public() {
        let table = RouteTable::default_app();
        assert!(table.resolve("/nowhere").is_none());
        assert_eq!(table.access_for("/nowhere"), RouteAccess::Public);
        assert_eq!(table.access_for("/login"), RouteAccess::GuestOnly);
    }
}
