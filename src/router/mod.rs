/// Router context
///
/// The concrete context the binding layer automates against: an axum `Router`
/// being wired, plus the child routers that get merged into it.
/// It handles:
/// - Endpoint descriptions (path + methods)
/// - Registering handlers with duplicate detection
/// - Merging child routers and looking them up by group name

use crate::automation::{Automation, AutomationError, Context, Outcome};
use arc_swap::ArcSwap;
use axum::{
    handler::Handler,
    routing::{on, MethodFilter},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Automation tree over a router context
pub type RouterAutomation = Automation<EndpointsRouter>;

/// Which kind of router a context wraps
///
/// Nodes can restrict themselves to one kind, e.g. app-wide setup that must not
/// run against a nested group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouterKind {
    /// Top-level application router
    App,
    /// Nested group merged into its parent by `include`
    Router,
}

/// HTTP methods an endpoint can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    fn filter(self) -> MethodFilter {
        match self {
            Method::Get => MethodFilter::GET,
            Method::Post => MethodFilter::POST,
            Method::Put => MethodFilter::PUT,
            Method::Delete => MethodFilter::DELETE,
            Method::Patch => MethodFilter::PATCH,
            Method::Head => MethodFilter::HEAD,
            Method::Options => MethodFilter::OPTIONS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a handler is exposed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Route path, must start with '/' (e.g. "/login", "/users/{id}")
    pub path: String,
    /// Methods the handler answers; duplicates are ignored
    pub methods: Vec<Method>,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            path: path.into(),
            methods: methods.into_iter().collect(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path, [Method::Get])
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(path, [Method::Post])
    }

    /// Distinct methods in declaration order
    fn distinct_methods(&self) -> Vec<Method> {
        let mut seen = HashSet::new();
        self.methods.iter().copied().filter(|m| seen.insert(*m)).collect()
    }

    fn validate(&self) -> Result<Vec<Method>, AutomationError> {
        if !self.path.starts_with('/') {
            return Err(AutomationError::usage(format!(
                "endpoint path '{}' must start with '/'", self.path
            )));
        }

        let methods = self.distinct_methods();
        if methods.is_empty() {
            return Err(AutomationError::usage(format!(
                "endpoint '{}' declares no methods", self.path
            )));
        }

        Ok(methods)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.distinct_methods().into_iter().map(Method::as_str).collect();
        write!(f, "{} {}", methods.join("|"), self.path)
    }
}

/// Router being wired by automations
///
/// Registration goes through `&self` so that sibling automations fanned out by
/// `async_automate` can share one context. The router and the set of registered
/// routes are swapped atomically on every change.
pub struct EndpointsRouter {
    kind: RouterKind,
    name: Option<String>,
    router: ArcSwap<Router>,
    /// (path, method) pairs already bound, used to reject overlaps before axum panics
    registered: ArcSwap<HashSet<(String, Method)>>,
    routers: Vec<EndpointsRouter>,
    /// Set once this router has been merged into its parent
    included: AtomicBool,
}

impl fmt::Debug for EndpointsRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointsRouter")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("routes", &self.routes())
            .field("routers", &self.routers)
            .finish()
    }
}

impl EndpointsRouter {
    fn with_kind(kind: RouterKind, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            router: ArcSwap::from_pointee(Router::new()),
            registered: ArcSwap::from_pointee(HashSet::new()),
            routers: Vec::new(),
            included: AtomicBool::new(false),
        }
    }

    /// Top-level application router
    pub fn app() -> Self {
        Self::with_kind(RouterKind::App, None)
    }

    /// Named group, meant to be attached to an app with `with_router`
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(RouterKind::Router, Some(name.into()))
    }

    /// Attach a child router; its routes join this one on `include`
    pub fn with_router(mut self, router: EndpointsRouter) -> Self {
        self.routers.push(router);
        self
    }

    pub fn kind(&self) -> RouterKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn routers(&self) -> &[EndpointsRouter] {
        &self.routers
    }

    /// First child router with the given group name
    pub fn select(&self, name: &str) -> Option<&EndpointsRouter> {
        self.routers.iter().find(|router| router.name() == Some(name))
    }

    /// Snapshot of the wired axum router
    pub fn router(&self) -> Router {
        Router::clone(&self.router.load())
    }

    /// Registered (path, method) pairs, sorted
    pub fn routes(&self) -> Vec<(String, Method)> {
        let mut routes: Vec<(String, Method)> = self.registered.load().iter().cloned().collect();
        routes.sort();
        routes
    }

    /// Bind `handler` to every method of `endpoint`
    ///
    /// Fails with `Usage` for a malformed endpoint or when any of its
    /// (path, method) pairs is already bound on this router.
    pub fn add_endpoint<H, T>(&self, endpoint: &Endpoint, handler: H) -> Result<(), AutomationError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let methods = endpoint.validate()?;

        let conflict = {
            let registered = self.registered.load();
            methods
                .iter()
                .copied()
                .find(|m| registered.contains(&(endpoint.path.clone(), *m)))
        };
        if let Some(method) = conflict {
            return Err(AutomationError::usage(format!(
                "route {} {} is already registered", method, endpoint.path
            )));
        }

        let filter = methods
            .iter()
            .skip(1)
            .fold(methods[0].filter(), |filter, m| filter.or(m.filter()));
        let method_router = on(filter, handler);

        self.router
            .rcu(|current| Router::clone(current).route(&endpoint.path, method_router.clone()));
        self.registered.rcu(|current| {
            let mut next = HashSet::clone(current);
            next.extend(methods.iter().map(|m| (endpoint.path.clone(), *m)));
            next
        });

        tracing::info!("🔗 Registered endpoint {} on {:?} router", endpoint, self.kind);
        Ok(())
    }

    /// Merge every child router (recursively) into this one
    ///
    /// Each child is merged once; calling `include` again skips children that are
    /// already in, so routes bound on a child after its merge are not picked up.
    /// Fails with `Usage` when a child binds a (path, method) pair this router
    /// already has.
    pub fn include(&self) -> Result<(), AutomationError> {
        for child in &self.routers {
            child.include()?;

            if child.included.load(Ordering::Relaxed) {
                tracing::debug!("⏭️ Router '{}' already included, skipping",
                    child.name().unwrap_or("unnamed"));
                continue;
            }

            let child_routes = child.registered.load_full();
            let conflict = {
                let registered = self.registered.load();
                child_routes.iter().find(|route| registered.contains(*route)).cloned()
            };
            if let Some((path, method)) = conflict {
                return Err(AutomationError::usage(format!(
                    "route {} {} from router '{}' is already registered",
                    method,
                    path,
                    child.name().unwrap_or("unnamed")
                )));
            }

            let child_router = child.router();
            self.router
                .rcu(|current| Router::clone(current).merge(child_router.clone()));
            self.registered.rcu(|current| {
                let mut next = HashSet::clone(current);
                next.extend(child_routes.iter().cloned());
                next
            });
            child.included.store(true, Ordering::Relaxed);

            tracing::debug!("📎 Included router '{}' ({} routes)",
                child.name().unwrap_or("unnamed"), child_routes.len());
        }

        Ok(())
    }
}

impl Context for EndpointsRouter {
    type Kind = RouterKind;

    fn kind(&self) -> RouterKind {
        self.kind
    }
}

/// Automation that binds `handler` to `endpoint` on whatever router it runs against
pub fn endpoint_automation<H, T>(endpoint: Endpoint, handler: H) -> RouterAutomation
where
    H: Handler<T, ()> + Sync,
    T: 'static,
{
    let name = endpoint.to_string();
    let endpoint = Arc::new(endpoint);

    Automation::builder(move |router: &EndpointsRouter| {
        router.add_endpoint(&endpoint, handler.clone())?;
        Ok(Outcome::Ready)
    })
    .name(name)
    .build()
}

/// Automation that merges child routers into the router it runs against
pub fn include_automation() -> RouterAutomation {
    Automation::builder(|router: &EndpointsRouter| {
        router.include()?;
        Ok(Outcome::Ready)
    })
    .name("include")
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn rejects_paths_without_leading_slash() {
        let router = EndpointsRouter::app();

        let err = router.add_endpoint(&Endpoint::get("login"), ok).unwrap_err();

        assert!(matches!(err, AutomationError::Usage(_)));
        assert!(router.routes().is_empty());
    }

    #[test]
    fn rejects_endpoints_without_methods() {
        let router = EndpointsRouter::app();

        let err = router.add_endpoint(&Endpoint::new("/login", []), ok).unwrap_err();

        assert!(matches!(err, AutomationError::Usage(ref msg) if msg.contains("no methods")));
    }

    #[test]
    fn rejects_overlapping_methods_but_allows_new_ones() {
        let router = EndpointsRouter::app();
        router.add_endpoint(&Endpoint::new("/items", [Method::Get, Method::Get]), ok).unwrap();

        let err = router.add_endpoint(&Endpoint::new("/items", [Method::Post, Method::Get]), ok).unwrap_err();
        assert!(matches!(err, AutomationError::Usage(ref msg) if msg.contains("GET /items")));

        router.add_endpoint(&Endpoint::post("/items"), ok).unwrap();
        assert_eq!(
            router.routes(),
            vec![("/items".to_string(), Method::Get), ("/items".to_string(), Method::Post)]
        );
    }

    #[test]
    fn include_merges_children_once() {
        let app = EndpointsRouter::app()
            .with_router(EndpointsRouter::group("auth"))
            .with_router(EndpointsRouter::group("admin"));
        app.select("auth").unwrap().add_endpoint(&Endpoint::post("/login"), ok).unwrap();

        app.include().unwrap();
        assert_eq!(app.routes(), vec![("/login".to_string(), Method::Post)]);

        app.include().unwrap();
        assert_eq!(app.routes(), vec![("/login".to_string(), Method::Post)]);
    }

    #[test]
    fn include_rejects_routes_the_parent_already_binds() {
        let app = EndpointsRouter::app().with_router(EndpointsRouter::group("auth"));
        app.add_endpoint(&Endpoint::post("/login"), ok).unwrap();
        app.select("auth").unwrap().add_endpoint(&Endpoint::post("/login"), ok).unwrap();

        let err = app.include().unwrap_err();

        assert!(matches!(err, AutomationError::Usage(ref msg) if msg.contains("from router 'auth'")));
    }

    #[test]
    fn select_finds_groups_by_name() {
        let app = EndpointsRouter::app().with_router(EndpointsRouter::group("auth"));

        assert_eq!(app.select("auth").map(|r| r.kind()), Some(RouterKind::Router));
        assert!(app.select("missing").is_none());
        assert_eq!(app.kind(), RouterKind::App);
    }

    #[test]
    fn endpoint_display_lists_distinct_methods() {
        let endpoint = Endpoint::new("/login", [Method::Get, Method::Post, Method::Get]);

        assert_eq!(endpoint.to_string(), "GET|POST /login");
    }
}
