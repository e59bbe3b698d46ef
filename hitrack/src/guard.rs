//! Route table and admission control for protected pages.
//!
//! A route is a path pattern (segments starting with `:` match any single segment). The guard
//! only looks at in-memory session state; token validity is checked lazily by the first API
//! call the destination makes.

use crate::session::TokenStore;
use log::{debug, info};
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/login";
pub const DEFAULT_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub pattern: &'static str,
    pub requires_auth: bool,
}

pub static ROUTES: &[Route] = &[
    Route {
        name: "login",
        pattern: LOGIN_PATH,
        requires_auth: false,
    },
    Route {
        name: "home",
        pattern: DEFAULT_PATH,
        requires_auth: true,
    },
    Route {
        name: "repositories",
        pattern: "/repositories",
        requires_auth: true,
    },
    Route {
        name: "images",
        pattern: "/images",
        requires_auth: true,
    },
    Route {
        name: "image-detail",
        pattern: "/images/:uuid",
        requires_auth: true,
    },
    Route {
        name: "components",
        pattern: "/components",
        requires_auth: true,
    },
    Route {
        name: "vulnerabilities",
        pattern: "/vulnerabilities",
        requires_auth: true,
    },
    Route {
        name: "acr",
        pattern: "/acr",
        requires_auth: true,
    },
    Route {
        name: "repository-detail",
        pattern: "/repositories/:uuid",
        requires_auth: true,
    },
    Route {
        name: "tag-images",
        pattern: "/repository-tags/:uuid/images",
        requires_auth: true,
    },
];

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Route {
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split(&['?', '#'][..]).next().unwrap_or("");
        let mut want = segments(self.pattern);
        let mut got = segments(path);
        loop {
            match (want.next(), got.next()) {
                (None, None) => return true,
                (Some(w), Some(_)) if w.starts_with(':') => continue,
                (Some(w), Some(g)) if w == g => continue,
                _ => return false,
            }
        }
    }
}

pub fn find_route(path: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.matches(path))
}

/// Outcome of a navigation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(&'static str),
}

/// Performs a navigation. In a terminal this usually just tells the user where to go next.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that only logs the requested destination
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        info!("navigating to {}", path);
    }
}

pub struct NavigationGuard {
    tokens: Arc<TokenStore>,
}

impl NavigationGuard {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        NavigationGuard { tokens }
    }

    /// Decides whether navigation to `to` may proceed
    pub fn check(&self, to: &str) -> Navigation {
        let authenticated = self.tokens.is_authenticated();
        let route = find_route(to);
        let decision = match route {
            Some(r) if r.requires_auth && !authenticated => Navigation::Redirect(LOGIN_PATH),
            Some(r) if r.pattern == LOGIN_PATH && authenticated => {
                Navigation::Redirect(DEFAULT_PATH)
            }
            _ => Navigation::Proceed,
        };
        debug!(
            "navigation to={} route={:?} authenticated={} decision={:?}",
            to,
            route.map(|r| r.name),
            authenticated,
            decision
        );
        decision
    }
}

#[test]
fn test_route_matching() {
    assert_eq!(find_route("/").map(|r| r.name), Some("home"));
    assert_eq!(find_route("").map(|r| r.name), Some("home"));
    assert_eq!(find_route("/login").map(|r| r.name), Some("login"));
    assert_eq!(find_route("/login/?next=/images").map(|r| r.name), Some("login"));
    assert_eq!(find_route("/images").map(|r| r.name), Some("images"));
    assert_eq!(
        find_route("/images/2f1e0c8a-7d7b-4a0e-9c53-1f0d2d6d8c11").map(|r| r.name),
        Some("image-detail")
    );
    assert_eq!(
        find_route("/repository-tags/abc/images").map(|r| r.name),
        Some("tag-images")
    );
    assert_eq!(find_route("/repository-tags/abc"), None);
    assert_eq!(find_route("/images/abc/extra"), None);
    assert_eq!(find_route("/nowhere"), None);
}
