/// Autowire: declarative handler wiring for axum apps
/// 
/// This library provides a small automation engine (dependency-ordered, idempotent
/// setup steps with blocking and concurrent traversal) and the router context those
/// steps wire endpoints onto.

// Core configuration and setup
pub mod config;

// Automation engine - typed callbacks, nodes, combinators, traversal, copies
pub mod automation;

// Router context - endpoint descriptions and handler registration
pub mod router;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use automation::{Automation, AutomationError, Context, CopyOptions, Outcome};
pub use router::{Endpoint, EndpointsRouter, Method, RouterAutomation, RouterKind};
pub use server::start_server;
