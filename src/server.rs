/// Server setup and initialization
/// 
/// Runs the setup automations against a fresh router context and serves the result.
/// Provides the main application factory function for creating the Axum app.

use crate::{
    automation::CopyOptions,
    config::Config,
    router::{endpoint_automation, Endpoint, EndpointsRouter, RouterAutomation},
};
use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

/// Setup steps every server gets: currently just the health check
pub fn default_automation() -> RouterAutomation {
    endpoint_automation(Endpoint::get("/healthz"), health_check)
}

/// Create the Axum application by automating `router`
/// 
/// The automation tree is deep-copied and reset first, so the caller's tree keeps
/// its own state and can build any number of apps. Dependencies are fanned out
/// concurrently; child routers are merged once everything has run.
pub async fn create_app(router: EndpointsRouter, automation: &RouterAutomation) -> Result<Router> {
    let automation = automation.copy(CopyOptions::deep().complete(false));

    let plan = automation.plan()
        .map_err(|e| anyhow::anyhow!("Invalid setup automation: {}", e))?;
    tracing::info!("🗺️ Running {} setup steps", plan.len());
    for (step_num, step) in plan.iter().enumerate() {
        tracing::debug!("  📍 Step {}/{}: '{}'", step_num + 1, plan.len(), step.label);
    }

    let start_time = std::time::Instant::now();
    automation.async_automate(&router).await
        .map_err(|e| anyhow::anyhow!("Setup automation failed: {}", e))?;

    tracing::info!("📎 Including {} child routers", router.routers().len());
    router.include()
        .map_err(|e| anyhow::anyhow!("Failed to include child routers: {}", e))?;

    tracing::info!("✅ Application wired in {:?} ({} routes)", start_time.elapsed(), router.routes().len());

    Ok(router.router())
}

/// Start the HTTP server with the given configuration
/// 
/// Creates the application and starts the Axum server on the configured address and port.
pub async fn start_server(config: Config, automation: RouterAutomation) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_max_level(config.logging.max_level())
        .init();

    tracing::info!("Starting autowire server...");

    // Create the application
    let app = create_app(EndpointsRouter::app(), &automation).await?;

    // Bind to the configured address
    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    // Start the server
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
