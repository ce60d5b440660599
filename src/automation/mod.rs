/// Automation Engine
/// 
/// Composable, dependency-ordered setup steps run against a shared context.
/// It handles:
/// - Type-checked invocation of operations (callback)
/// - Node state, composition combinators and structural copies (node)
/// - Blocking and concurrent traversal, validation and planning (engine)

// Typed callback and the context contract
pub mod callback;

// Automation nodes, dependency lists, support/supports, copy
pub mod node;

// automate / async_automate / validate / plan
pub mod engine;

pub mod error;

// Re-export main types
pub use callback::{operation, Accepts, Callback, Context, Operation, Outcome};
pub use engine::PlannedStep;
pub use error::AutomationError;
pub use node::{Automation, AutomationBuilder, CopyOptions, Dependencies, Supports};
