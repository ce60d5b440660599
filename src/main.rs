/// Autowire: declarative handler wiring for axum apps
/// 
/// Main entry point. Loads configuration, wires the default automations onto a
/// fresh app router and serves it.

use autowire::{config::Config, server::{default_automation, start_server}};

/// Application entry point
/// 
/// The server provides:
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (defaults to 0.0.0.0:3004, info logging)
    let config = Config::default();

    start_server(config, default_automation()).await?;

    Ok(())
}
