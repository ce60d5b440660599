/// Automation nodes, their dependency lists, composition and copying
///
/// An [`Automation`] is a cheap handle. Cloning the handle gives another reference
/// to the same node instance (same `complete`/`running` state); independent
/// instances only come out of [`Automation::copy`].

use crate::automation::callback::{operation, Accepts, Callback, Context, Operation, Outcome};
use arc_swap::ArcSwap;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use uuid::Uuid;

/// Ordered list of prerequisite nodes
///
/// The list itself lives behind an `Arc`, so two nodes can share one list object.
/// That is exactly the shallow copy mode; every other construction path gets a
/// list of its own. Mutations swap the whole vector, readers take snapshots.
pub struct Dependencies<C: Context> {
    nodes: Arc<ArcSwap<Vec<Automation<C>>>>,
}

impl<C: Context> Clone for Dependencies<C> {
    /// Shares the underlying list
    fn clone(&self) -> Self {
        Self { nodes: Arc::clone(&self.nodes) }
    }
}

impl<C: Context> Default for Dependencies<C> {
    fn default() -> Self {
        Self::from_vec(Vec::new())
    }
}

impl<C: Context> fmt::Debug for Dependencies<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.snapshot().iter().map(|node| node.label()))
            .finish()
    }
}

impl<C: Context> Dependencies<C> {
    pub fn from_vec(nodes: Vec<Automation<C>>) -> Self {
        Self { nodes: Arc::new(ArcSwap::from_pointee(nodes)) }
    }

    /// Append a node; visible to every node sharing this list
    pub fn push(&self, node: Automation<C>) {
        self.nodes.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(node.clone());
            next
        });
    }

    /// Insert a node at `index` (clamped to the list length)
    pub fn insert(&self, index: usize, node: Automation<C>) {
        self.nodes.rcu(|current| {
            let mut next = Vec::clone(current);
            next.insert(index.min(next.len()), node.clone());
            next
        });
    }

    /// Remove every entry referring to the given node instance
    pub fn remove(&self, node: &Automation<C>) {
        self.nodes.rcu(|current| {
            current
                .iter()
                .filter(|existing| !existing.same_instance(node))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Point-in-time view of the list
    pub fn snapshot(&self) -> Arc<Vec<Automation<C>>> {
        self.nodes.load_full()
    }

    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.load().is_empty()
    }

    /// True when both handles refer to one underlying list object
    pub fn is_shared_with(&self, other: &Dependencies<C>) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    /// New list object holding the same child node handles
    fn detached(&self) -> Self {
        Self::from_vec(Vec::clone(&self.snapshot()))
    }
}

/// Per-node execution flags
///
/// The flags are plain state: invoking one instance from two independent callers
/// is unsupported, copy the tree first. `gate` only serialises entrants reaching
/// a shared node from sibling branches of one `async_automate` call.
#[derive(Debug, Default)]
pub(crate) struct NodeState {
    pub(crate) complete: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) gate: tokio::sync::Mutex<()>,
}

impl NodeState {
    fn new(complete: bool) -> Self {
        Self {
            complete: AtomicBool::new(complete),
            running: AtomicBool::new(false),
            gate: tokio::sync::Mutex::new(()),
        }
    }
}

pub(crate) struct Node<C: Context> {
    pub(crate) id: Uuid,
    pub(crate) name: Option<String>,
    pub(crate) callback: Callback<C>,
    pub(crate) state: NodeState,
    pub(crate) dependencies: Dependencies<C>,
}

/// A unit of composable, idempotent work
pub struct Automation<C: Context> {
    pub(crate) node: Arc<Node<C>>,
}

impl<C: Context> Clone for Automation<C> {
    /// Another handle to the same node instance
    fn clone(&self) -> Self {
        Self { node: Arc::clone(&self.node) }
    }
}

impl<C: Context> fmt::Debug for Automation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Automation")
            .field("id", &self.node.id)
            .field("name", &self.node.name)
            .field("complete", &self.is_complete())
            .field("running", &self.is_running())
            .field("dependencies", &self.node.dependencies)
            .finish()
    }
}

/// Construction options for a node
pub struct AutomationBuilder<C: Context> {
    operation: Operation<C>,
    accepts: Accepts<C::Kind>,
    name: Option<String>,
    dependencies: Vec<Automation<C>>,
    complete: bool,
}

impl<C: Context> AutomationBuilder<C> {
    fn new(operation: Operation<C>) -> Self {
        Self {
            operation,
            accepts: Accepts::Any,
            name: None,
            dependencies: Vec::new(),
            complete: false,
        }
    }

    /// Restrict the context kinds the node's callback accepts
    pub fn accepting(mut self, kinds: impl IntoIterator<Item = C::Kind>) -> Self {
        self.accepts = Accepts::only(kinds);
        self
    }

    pub fn accepts(mut self, accepts: Accepts<C::Kind>) -> Self {
        self.accepts = accepts;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dependency(mut self, node: Automation<C>) -> Self {
        self.dependencies.push(node);
        self
    }

    pub fn dependencies(mut self, nodes: impl IntoIterator<Item = Automation<C>>) -> Self {
        self.dependencies.extend(nodes);
        self
    }

    /// Start the node already satisfied
    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn build(self) -> Automation<C> {
        Automation::from_parts(
            self.name,
            Callback::new(self.operation, self.accepts),
            Dependencies::from_vec(self.dependencies),
            self.complete,
        )
    }
}

/// Options for [`Automation::copy`]
///
/// `Default` is the shared mode: the copy aliases the receiver's dependency list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Recursively copy every dependency; overrides `separate`
    pub deep: bool,
    /// Give the copy its own list holding the same child nodes
    pub separate: bool,
    /// Force the copy's `complete` flag instead of inheriting it
    pub complete: Option<bool>,
}

impl CopyOptions {
    pub fn shared() -> Self {
        Self::default()
    }

    pub fn separate() -> Self {
        Self { separate: true, ..Self::default() }
    }

    pub fn deep() -> Self {
        Self { deep: true, ..Self::default() }
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }
}

fn noop<C: Context>(_: &C) -> anyhow::Result<Outcome<'_>> {
    Ok(Outcome::Ready)
}

impl<C: Context> Automation<C> {
    /// Node with no dependencies that accepts every kind of `C`
    pub fn new<F>(op: F) -> Self
    where
        F: for<'a> Fn(&'a C) -> anyhow::Result<Outcome<'a>> + Send + Sync + 'static,
    {
        Self::builder(op).build()
    }

    pub fn builder<F>(op: F) -> AutomationBuilder<C>
    where
        F: for<'a> Fn(&'a C) -> anyhow::Result<Outcome<'a>> + Send + Sync + 'static,
    {
        AutomationBuilder::new(operation(op))
    }

    /// Builder over an already boxed operation
    pub fn from_operation(op: Operation<C>) -> AutomationBuilder<C> {
        AutomationBuilder::new(op)
    }

    fn from_parts(
        name: Option<String>,
        callback: Callback<C>,
        dependencies: Dependencies<C>,
        complete: bool,
    ) -> Self {
        Self {
            node: Arc::new(Node {
                id: Uuid::new_v4(),
                name,
                callback,
                state: NodeState::new(complete),
                dependencies,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.node.id
    }

    pub fn name(&self) -> Option<&str> {
        self.node.name.as_deref()
    }

    /// Name if set, otherwise the first block of the id
    pub fn label(&self) -> String {
        match &self.node.name {
            Some(name) => name.clone(),
            None => self.node.id.simple().to_string()[..8].to_string(),
        }
    }

    pub fn callback(&self) -> &Callback<C> {
        &self.node.callback
    }

    pub fn dependencies(&self) -> &Dependencies<C> {
        &self.node.dependencies
    }

    pub fn is_complete(&self) -> bool {
        self.node.state.complete.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.node.state.running.load(Ordering::Relaxed)
    }

    /// True when both handles refer to one node instance
    pub fn same_instance(&self, other: &Automation<C>) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Mark the node pending again; dependencies are left untouched
    pub fn clear(&self) {
        self.node.state.complete.store(false, Ordering::Relaxed);
    }

    /// New node running `op`, with this node as its first dependency
    pub fn support<F>(&self, op: F) -> Automation<C>
    where
        F: for<'a> Fn(&'a C) -> anyhow::Result<Outcome<'a>> + Send + Sync + 'static,
    {
        self.support_with(Self::builder(op))
    }

    /// Like [`support`](Self::support), with full construction options
    pub fn support_with(&self, builder: AutomationBuilder<C>) -> Automation<C> {
        let automation = builder.build();
        automation.dependencies().insert(0, self.clone());
        automation
    }

    /// Group `nodes` under an anonymous no-op root and return a builder bound to it
    pub fn supports(nodes: impl IntoIterator<Item = Automation<C>>) -> Supports<C> {
        let root = Self::builder(noop::<C>)
            .name("supports")
            .dependencies(nodes)
            .build();

        Supports { root, accepts: Accepts::Any, name: None }
    }

    /// Structural clone; see [`CopyOptions`]
    pub fn copy(&self, options: CopyOptions) -> Automation<C> {
        let dependencies = if options.deep {
            let nested = CopyOptions { deep: true, separate: false, complete: options.complete };
            Dependencies::from_vec(
                self.dependencies()
                    .snapshot()
                    .iter()
                    .map(|dependency| dependency.copy(nested))
                    .collect(),
            )
        } else if options.separate {
            self.dependencies().detached()
        } else {
            self.dependencies().clone()
        };

        Self::from_parts(
            self.node.name.clone(),
            self.node.callback.clone(),
            dependencies,
            options.complete.unwrap_or_else(|| self.is_complete()),
        )
    }
}

/// Partially applied [`Automation::support`] over a group of prerequisites
///
/// Every node produced through the same `Supports` depends on one shared anonymous
/// root, so the group runs at most once per root instance no matter how many
/// dependents trigger it.
pub struct Supports<C: Context> {
    root: Automation<C>,
    accepts: Accepts<C::Kind>,
    name: Option<String>,
}

impl<C: Context> fmt::Debug for Supports<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supports")
            .field("root", &self.root)
            .field("accepts", &self.accepts)
            .field("name", &self.name)
            .finish()
    }
}

impl<C: Context> Supports<C> {
    /// Applied to every node this builder produces
    pub fn accepting(mut self, kinds: impl IntoIterator<Item = C::Kind>) -> Self {
        self.accepts = Accepts::only(kinds);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The anonymous root the group hangs from
    pub fn root(&self) -> &Automation<C> {
        &self.root
    }

    pub fn support<F>(&self, op: F) -> Automation<C>
    where
        F: for<'a> Fn(&'a C) -> anyhow::Result<Outcome<'a>> + Send + Sync + 'static,
    {
        let mut builder = Automation::builder(op).accepts(self.accepts.clone());
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        self.root.support_with(builder)
    }

    pub fn support_with(&self, builder: AutomationBuilder<C>) -> Automation<C> {
        self.root.support_with(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Unit;

    struct Blank;

    impl Context for Blank {
        type Kind = Unit;

        fn kind(&self) -> Unit {
            Unit
        }
    }

    fn leaf(name: &str) -> Automation<Blank> {
        Automation::builder(noop::<Blank>).name(name).build()
    }

    fn names(dependencies: &Dependencies<Blank>) -> Vec<String> {
        dependencies.snapshot().iter().map(|node| node.label()).collect()
    }

    #[test]
    fn new_node_starts_pending_with_no_dependencies() {
        let node = Automation::new(noop::<Blank>);

        assert!(!node.is_complete());
        assert!(!node.is_running());
        assert!(node.dependencies().is_empty());
        assert!(matches!(node.callback().accepts(), Accepts::Any));
    }

    #[test]
    fn support_puts_receiver_first_without_touching_it() {
        let base = leaf("base");
        let other = leaf("other");

        let built = base.support_with(Automation::builder(noop::<Blank>).dependency(other));

        assert_eq!(names(built.dependencies()), vec!["base", "other"]);
        assert!(base.dependencies().is_empty());
    }

    #[test]
    fn supports_hangs_nodes_off_one_anonymous_root() {
        let a = leaf("a");
        let b = leaf("b");

        let group = Automation::supports([a.clone(), b.clone()]);
        let first = group.support(noop::<Blank>);
        let second = group.support(noop::<Blank>);

        let first_deps = first.dependencies().snapshot();
        assert_eq!(first_deps.len(), 1);
        assert!(first_deps[0].same_instance(group.root()));
        assert!(second.dependencies().snapshot()[0].same_instance(group.root()));
        assert_eq!(names(group.root().dependencies()), vec!["a", "b"]);
    }

    #[test]
    fn handle_clone_shares_state_but_copy_does_not() {
        let node = leaf("n");
        let handle = node.clone();
        let copy = node.copy(CopyOptions::shared());

        node.node.state.complete.store(true, Ordering::Relaxed);

        assert!(handle.is_complete());
        assert!(!copy.is_complete());
        assert_ne!(copy.id(), node.id());
    }

    #[test]
    fn shared_copy_aliases_the_dependency_list() {
        let node = Automation::builder(noop::<Blank>).dependency(leaf("a")).build();
        let copy = node.copy(CopyOptions::shared());

        copy.dependencies().push(leaf("b"));

        assert!(copy.dependencies().is_shared_with(node.dependencies()));
        assert_eq!(names(node.dependencies()), vec!["a", "b"]);
    }

    #[test]
    fn separate_copy_owns_its_list_but_shares_children() {
        let a = leaf("a");
        let node = Automation::builder(noop::<Blank>).dependency(a.clone()).build();
        let copy = node.copy(CopyOptions::separate());

        copy.dependencies().push(leaf("b"));

        assert_eq!(names(node.dependencies()), vec!["a"]);
        assert_eq!(names(copy.dependencies()), vec!["a", "b"]);
        assert!(copy.dependencies().snapshot()[0].same_instance(&a));
    }

    #[test]
    fn deep_copy_replaces_every_child() {
        let grandchild = leaf("g");
        let child = Automation::builder(noop::<Blank>).name("c").dependency(grandchild.clone()).build();
        let node = Automation::builder(noop::<Blank>).dependency(child.clone()).build();

        let copy = node.copy(CopyOptions { deep: true, separate: true, complete: None });

        let copied_child = copy.dependencies().snapshot()[0].clone();
        assert!(!copied_child.same_instance(&child));
        assert_eq!(copied_child.label(), "c");
        assert!(!copied_child.dependencies().snapshot()[0].same_instance(&grandchild));
        assert!(!copied_child.dependencies().is_shared_with(child.dependencies()));
    }

    #[test]
    fn complete_override_wins_over_inherited_flag() {
        let done = Automation::builder(noop::<Blank>).complete(true).build();

        assert!(done.copy(CopyOptions::shared()).is_complete());
        assert!(!done.copy(CopyOptions::shared().complete(false)).is_complete());
        assert!(done.is_complete());

        let pending = Automation::builder(noop::<Blank>).dependency(leaf("a")).build();
        let primed = pending.copy(CopyOptions::deep().complete(true));
        assert!(primed.is_complete());
        assert!(primed.dependencies().snapshot()[0].is_complete());
    }

    #[test]
    fn remove_drops_all_entries_for_an_instance() {
        let a = leaf("a");
        let node = Automation::builder(noop::<Blank>)
            .dependencies([a.clone(), leaf("b"), a.clone()])
            .build();

        node.dependencies().remove(&a);

        assert_eq!(names(node.dependencies()), vec!["b"]);
    }
}
