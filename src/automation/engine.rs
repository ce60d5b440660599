/// Execution engine for automation trees
///
/// Two traversals over the same node model:
/// - `automate`: synchronous depth-first walk, siblings strictly left to right
/// - `async_automate`: siblings fanned out concurrently behind a join barrier
///
/// Both guard on `complete`, so a node shared by several parents runs once per
/// Pending -> Done cycle. Nothing is rolled back on failure.
///
/// `validate` and `plan` build a petgraph view of the tree for cycle detection
/// and dry-run ordering. The traversals themselves never build a graph.

use crate::automation::{
    callback::Context,
    error::AutomationError,
    node::Automation,
};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};
use uuid::Uuid;

/// One node a blocking `automate` call would execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: Uuid,
    pub label: String,
}

/// Holds `running` high for the lifetime of one traversal of a node
///
/// Dropping the guard (success, failure, or the future being dropped) lowers the flag.
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Relaxed);
        Self { flag }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Petgraph view of every node reachable from a root
struct AutomationGraph {
    /// Edge direction: dependency -> dependent
    graph: DiGraph<String, ()>,
    id_to_index: HashMap<Uuid, NodeIndex>,
}

impl AutomationGraph {
    /// Index for `node`, adding it if unseen. The flag tells whether it was new.
    fn index_for<C: Context>(&mut self, node: &Automation<C>) -> (NodeIndex, bool) {
        if let Some(index) = self.id_to_index.get(&node.id()) {
            return (*index, false);
        }

        let index = self.graph.add_node(node.label());
        self.id_to_index.insert(node.id(), index);
        (index, true)
    }
}

impl<C: Context> Automation<C> {
    /// Run every pending dependency, then this node's operation, on the caller's thread
    ///
    /// Dependencies run depth-first in list order. Returns immediately when the node
    /// is already complete.
    pub fn automate(&self, context: &C) -> Result<(), AutomationError> {
        if self.is_complete() {
            tracing::debug!("⏭️ Automation '{}' already complete, skipping", self.label());
            return Ok(());
        }

        let _running = RunningGuard::enter(&self.node.state.running);
        let start_time = std::time::Instant::now();

        let dependencies = self.dependencies().snapshot();
        tracing::debug!("▶️ Automating '{}' after {} dependencies", self.label(), dependencies.len());

        for dependency in dependencies.iter() {
            dependency.automate(context)?;
        }

        if let Err(e) = self.callback().call(context) {
            tracing::error!("❌ Automation '{}' failed after {:?} - Error: {}",
                self.label(), start_time.elapsed(), e);
            return Err(e);
        }

        self.node.state.complete.store(true, Ordering::Relaxed);
        tracing::debug!("✅ Automation '{}' completed in {:?}", self.label(), start_time.elapsed());

        Ok(())
    }

    /// Suspension-capable traversal
    ///
    /// Every direct dependency gets its own future; all of them are polled together
    /// and joined before this node's operation starts. The join is fail-fast: the
    /// first error drops the remaining sibling futures and propagates.
    ///
    /// A dependency reachable through several siblings still runs at most once:
    /// whichever branch gets there first runs it, the others wait for it.
    pub fn async_automate<'a>(&'a self, context: &'a C) -> BoxFuture<'a, Result<(), AutomationError>> {
        async move {
            if self.is_complete() {
                tracing::debug!("⏭️ Automation '{}' already complete, skipping", self.label());
                return Ok(());
            }

            // A node shared by sibling branches is entered once; later entrants wait
            // here and then see it complete.
            let _gate = self.node.state.gate.lock().await;
            if self.is_complete() {
                tracing::debug!("⏭️ Automation '{}' finished by another branch, skipping", self.label());
                return Ok(());
            }

            let _running = RunningGuard::enter(&self.node.state.running);
            let start_time = std::time::Instant::now();

            let dependencies = self.dependencies().snapshot();
            tracing::debug!("🔀 Fanning out {} dependencies of '{}'", dependencies.len(), self.label());

            try_join_all(
                dependencies
                    .iter()
                    .map(|dependency| dependency.async_automate(context)),
            )
            .await?;

            if let Err(e) = self.callback().async_call(context).await {
                tracing::error!("❌ Automation '{}' failed after {:?} - Error: {}",
                    self.label(), start_time.elapsed(), e);
                return Err(e);
            }

            self.node.state.complete.store(true, Ordering::Relaxed);
            tracing::debug!("✅ Automation '{}' completed in {:?}", self.label(), start_time.elapsed());

            Ok(())
        }
        .boxed()
    }

    /// Fail with `Cycle` if dependency lists were mutated into a loop
    ///
    /// The combinators never create one, but `Dependencies::push` can.
    pub fn validate(&self) -> Result<(), AutomationError> {
        let graph = self.build_graph();

        tracing::debug!("🔍 Validating automation graph rooted at '{}' ({} nodes)",
            self.label(), graph.graph.node_count());

        toposort(&graph.graph, None)
            .map_err(|cycle| AutomationError::Cycle(graph.graph[cycle.node_id()].clone()))?;

        Ok(())
    }

    /// Pending nodes a blocking `automate` would run, in execution order
    ///
    /// Complete nodes are skipped together with everything beneath them, matching
    /// the idempotence guard. Shared nodes appear once.
    pub fn plan(&self) -> Result<Vec<PlannedStep>, AutomationError> {
        self.validate()?;

        let mut visited = HashSet::new();
        let mut steps = Vec::new();
        self.plan_into(&mut visited, &mut steps);

        Ok(steps)
    }

    fn plan_into(&self, visited: &mut HashSet<Uuid>, steps: &mut Vec<PlannedStep>) {
        if self.is_complete() || !visited.insert(self.id()) {
            return;
        }

        for dependency in self.dependencies().snapshot().iter() {
            dependency.plan_into(visited, steps);
        }

        steps.push(PlannedStep { id: self.id(), label: self.label() });
    }

    fn build_graph(&self) -> AutomationGraph {
        let mut graph = AutomationGraph {
            graph: DiGraph::new(),
            id_to_index: HashMap::new(),
        };

        graph.index_for(self);
        let mut pending = vec![self.clone()];

        while let Some(node) = pending.pop() {
            let (node_index, _) = graph.index_for(&node);

            for dependency in node.dependencies().snapshot().iter() {
                let (dependency_index, fresh) = graph.index_for(dependency);
                if fresh {
                    pending.push(dependency.clone());
                }
                graph.graph.add_edge(dependency_index, node_index, ());
            }
        }

        graph
    }
}
