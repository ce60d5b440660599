use autowire::{
    automation::{Automation, AutomationError, Outcome},
    router::{endpoint_automation, include_automation, Endpoint, EndpointsRouter, Method, RouterAutomation, RouterKind},
    server::{create_app, default_automation},
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

async fn login(body: String) -> String {
    format!("welcome {}", body)
}

async fn list_users() -> &'static str {
    "[]"
}

async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Binds `endpoint` on the named child group of the app it runs against
fn group_endpoint(group: &'static str, endpoint: Endpoint) -> RouterAutomation {
    let name = format!("{}: {}", group, endpoint);

    Automation::builder(move |app: &EndpointsRouter| {
        let router = app
            .select(group)
            .ok_or_else(|| anyhow::anyhow!("no router group named '{}'", group))?;
        router.add_endpoint(&endpoint, login)?;
        Ok(Outcome::Ready)
    })
    .accepting([RouterKind::App])
    .name(name)
    .build()
}

#[tokio::test]
async fn health_check_is_served() {
    let app = create_app(EndpointsRouter::app(), &default_automation()).await.unwrap();

    let (status, body) = send(app, "GET", "/healthz", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn group_routes_are_merged_into_the_app() {
    let setup = Automation::supports([
        default_automation(),
        group_endpoint("auth", Endpoint::post("/login")),
    ])
    .support(|_: &EndpointsRouter| Ok(Outcome::Ready));
    let router = EndpointsRouter::app().with_router(EndpointsRouter::group("auth"));

    let app = create_app(router, &setup).await.unwrap();

    let (status, body) = send(app.clone(), "POST", "/login", "ada").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "welcome ada");

    let (status, _) = send(app, "GET", "/login", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn the_same_tree_builds_independent_apps() {
    let setup = endpoint_automation(Endpoint::get("/users"), list_users);

    let first = create_app(EndpointsRouter::app(), &setup).await.unwrap();
    let second = create_app(EndpointsRouter::app(), &setup).await.unwrap();

    assert!(!setup.is_complete());
    assert_eq!(send(first, "GET", "/users", "").await.1, "[]");
    assert_eq!(send(second, "GET", "/users", "").await.1, "[]");
}

#[tokio::test]
async fn duplicate_endpoints_fail_the_setup() {
    let setup = Automation::supports([
        endpoint_automation(Endpoint::get("/users"), list_users),
        endpoint_automation(Endpoint::new("/users", [Method::Post, Method::Get]), list_users),
    ])
    .support(|_: &EndpointsRouter| Ok(Outcome::Ready));

    let err = create_app(EndpointsRouter::app(), &setup).await.unwrap_err();

    assert!(err.to_string().contains("GET /users is already registered"));
}

#[tokio::test]
async fn malformed_endpoint_fails_the_setup() {
    let setup = endpoint_automation(Endpoint::new("/users", []), list_users);

    let err = setup.async_automate(&EndpointsRouter::app()).await.unwrap_err();
    assert!(matches!(err, AutomationError::Usage(ref msg) if msg.contains("declares no methods")));
    assert!(!err.is_operation_failure());

    let err = create_app(EndpointsRouter::app(), &setup).await.unwrap_err();
    assert!(err.to_string().contains("declares no methods"));
}

#[tokio::test]
async fn create_app_accepts_trees_that_include_themselves() {
    let setup = include_automation();
    setup.dependencies().push(group_endpoint("auth", Endpoint::post("/login")));
    let router = EndpointsRouter::app().with_router(EndpointsRouter::group("auth"));

    let app = create_app(router, &setup).await.unwrap();

    let (status, body) = send(app, "POST", "/login", "linus").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "welcome linus");
}

#[tokio::test]
async fn app_only_automation_rejects_group_context() {
    let group = EndpointsRouter::group("auth");
    let automation = group_endpoint("auth", Endpoint::post("/login"));

    let err = automation.async_automate(&group).await.unwrap_err();

    assert!(matches!(err, AutomationError::TypeMismatch { ref actual, ref expected }
        if actual == "Router" && expected == "App"));
    assert!(group.routes().is_empty());
    assert!(!automation.is_complete());
}

#[tokio::test]
async fn include_automation_merges_after_group_wiring() {
    let app = EndpointsRouter::app().with_router(EndpointsRouter::group("auth"));
    let setup = include_automation();
    setup.dependencies().push(group_endpoint("auth", Endpoint::post("/login")));

    setup.automate(&app).unwrap();

    assert_eq!(app.routes(), vec![("/login".to_string(), Method::Post)]);
    let (status, body) = send(app.router(), "POST", "/login", "grace").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "welcome grace");
}
