/// Error taxonomy for the automation engine
///
/// Every failure aborts the traversal that produced it. Nothing here is retried
/// and nodes that finished before the failure keep their `complete` flag.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    /// The context kind is not in the node's accepted set. Raised before the
    /// operation is invoked.
    #[error("context of kind {actual} is not accepted (expected one of: {expected})")]
    TypeMismatch { actual: String, expected: String },

    /// Error returned by the user-supplied operation, passed through verbatim.
    #[error(transparent)]
    Operation(#[from] anyhow::Error),

    /// Invalid input at the binding layer (endpoint descriptions, router wiring).
    #[error("invalid usage: {0}")]
    Usage(String),

    #[error("automation graph contains a cycle through node '{0}'")]
    Cycle(String),
}

impl AutomationError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Wrap an operation's error, unwrapping engine errors it passed through
    pub(crate) fn from_operation(error: anyhow::Error) -> Self {
        error.downcast::<AutomationError>().unwrap_or_else(Self::Operation)
    }

    /// True for errors raised by the operation itself rather than the engine.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
}
