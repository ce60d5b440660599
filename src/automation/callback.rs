/// Typed callback: an operation guarded by a context-kind check
///
/// The check is the only thing the engine ever asks of a context. It is a closed
/// tag comparison done once at the call boundary, before the operation runs.

use crate::automation::error::AutomationError;
use futures::future::BoxFuture;
use std::{collections::HashSet, fmt, future::Future, hash::Hash, sync::Arc};

/// The value every operation is invoked against
///
/// Implementors expose a closed kind tag (an enum in practice). Nodes declare which
/// kinds they accept and the callback refuses anything else.
pub trait Context: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// What an operation hands back: finished work, or work still to be awaited
pub enum Outcome<'a> {
    Ready,
    Deferred(BoxFuture<'a, anyhow::Result<()>>),
}

impl<'a> Outcome<'a> {
    /// Wrap a future as deferred work
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        Self::Deferred(Box::pin(future))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl fmt::Debug for Outcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("Ready"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A unit of work over a context
pub type Operation<C> = Arc<dyn for<'a> Fn(&'a C) -> anyhow::Result<Outcome<'a>> + Send + Sync>;

/// Box a closure as an [`Operation`]
///
/// Going through this bound lets closures whose deferred work borrows the context
/// infer their higher-ranked signature.
pub fn operation<C, F>(f: F) -> Operation<C>
where
    C: Context,
    F: for<'a> Fn(&'a C) -> anyhow::Result<Outcome<'a>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Set of context kinds a callback accepts
#[derive(Debug, Clone)]
pub enum Accepts<K: Eq + Hash> {
    /// Every kind of the context type
    Any,
    Only(HashSet<K>),
}

impl<K: Eq + Hash + fmt::Debug> Accepts<K> {
    pub fn only(kinds: impl IntoIterator<Item = K>) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    pub fn admits(&self, kind: &K) -> bool {
        match self {
            Self::Any => true,
            Self::Only(kinds) => kinds.contains(kind),
        }
    }

    /// Stable, human-readable rendering used in mismatch errors
    fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Only(kinds) => {
                let mut names: Vec<String> = kinds.iter().map(|k| format!("{:?}", k)).collect();
                names.sort();
                names.join(", ")
            }
        }
    }
}

/// Type-checked invocation wrapper around an operation
pub struct Callback<C: Context> {
    operation: Operation<C>,
    accepts: Accepts<C::Kind>,
}

impl<C: Context> Clone for Callback<C> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            accepts: self.accepts.clone(),
        }
    }
}

impl<C: Context> fmt::Debug for Callback<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("accepts", &self.accepts)
            .finish_non_exhaustive()
    }
}

impl<C: Context> Callback<C> {
    pub fn new(operation: Operation<C>, accepts: Accepts<C::Kind>) -> Self {
        Self { operation, accepts }
    }

    pub fn accepts(&self) -> &Accepts<C::Kind> {
        &self.accepts
    }

    pub fn operation(&self) -> &Operation<C> {
        &self.operation
    }

    /// Fail with `TypeMismatch` unless the context kind is accepted
    pub fn check(&self, context: &C) -> Result<(), AutomationError> {
        let kind = context.kind();
        if self.accepts.admits(&kind) {
            return Ok(());
        }

        tracing::warn!("🚫 Context kind {:?} rejected (accepts: {})", kind, self.accepts.describe());
        Err(AutomationError::TypeMismatch {
            actual: format!("{:?}", kind),
            expected: self.accepts.describe(),
        })
    }

    /// Blocking invocation
    ///
    /// Deferred work returned by the operation is driven to completion on the
    /// calling thread before returning. Errors the operation raised as an
    /// `AutomationError` keep their variant; anything else becomes `Operation`.
    pub fn call(&self, context: &C) -> Result<(), AutomationError> {
        self.check(context)?;

        match (self.operation)(context).map_err(AutomationError::from_operation)? {
            Outcome::Ready => Ok(()),
            Outcome::Deferred(future) => {
                futures::executor::block_on(future).map_err(AutomationError::from_operation)
            }
        }
    }

    /// Suspension-capable invocation: same check, deferred work is awaited
    pub async fn async_call(&self, context: &C) -> Result<(), AutomationError> {
        self.check(context)?;

        match (self.operation)(context).map_err(AutomationError::from_operation)? {
            Outcome::Ready => Ok(()),
            Outcome::Deferred(future) => future.await.map_err(AutomationError::from_operation),
        }
    }
}
