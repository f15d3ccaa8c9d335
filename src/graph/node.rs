use crate::error::RuntimeError;

/// Core behavior shared by every node in the dependency graph.
pub trait ReactiveNode {
    /// Marks this node as possibly stale and pushes the same mark through
    /// its subscribers. Marking never runs user code.
    fn mark_check(&self);

    /// Pushes a `Check` mark to this node's subscribers without touching
    /// this node's own state.
    fn mark_subscribers_check(&self);

    /// Brings this node up to date with its sources, re-evaluating it if a
    /// source's version no longer matches the version recorded during the
    /// last evaluation.
    fn update_if_necessary(&self) -> Result<(), RuntimeError>;
}

/// Dirty-checking state machine.
///
/// `Check` is the load-bearing middle state: a write pushes cheap `Check`
/// marks down the graph, and a read pulls recomputation back up only as far
/// as the sources whose versions actually moved. Collapsing `Check` into
/// `Dirty` would recompute every transitive dependent of a write even when
/// the written value produced no observable change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReactiveNodeState {
    /// The cached value (if any) reflects the current source values.
    Clean,
    /// Some transitive source was written; staleness is not yet known.
    Check,
    /// At least one source is known to have changed since last evaluation.
    Dirty,
    /// The node is currently being evaluated.
    Running,
    /// The node was disposed and must never be evaluated again.
    Disposed,
}
