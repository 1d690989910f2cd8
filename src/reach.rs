//! Reachability oracle for alignment pruning.
//!
//! Decides, for the current marking, whether an event can still fire (or be
//! excluded) in some future run, without enumerating runs: three mutually
//! recursive sub-oracles walk the condition/milestone obstacles of an event
//! back through the events that could execute, exclude or include them.
//!
//! The oracle over-approximates: it may answer "reachable" for an event no
//! run can actually reach, but it never answers "unreachable" for a
//! reachable one, so pruning on a negative answer is always sound.
//!
//! Termination: each recursive descent extends one of three in-progress sets
//! (`exec`, `excl`, `incl`) that are never shrunk along a path, bounding the
//! recursion depth at three times the event count even when the relations
//! are cyclic.

use crate::arena::{EventId, LabelId};
use crate::engine::is_enabled;
use crate::graph::DcrGraph;
use crate::sets::EventSet;
use std::collections::HashSet;

/// In-progress sets threaded through the recursion.
#[derive(Clone)]
struct Progress {
    exec: EventSet,
    excl: EventSet,
    incl: EventSet,
}

impl Progress {
    fn new(universe: usize) -> Self {
        Self {
            exec: EventSet::empty(universe),
            excl: EventSet::empty(universe),
            incl: EventSet::empty(universe),
        }
    }
}

/// Reachability queries against one graph, marking and context.
///
/// `context` labels are forbidden to re-fire: an event whose label is in the
/// context is refused unless it is the original query itself. Callers use
/// this to break recursion through labels they are already handling.
pub struct ReachOracle<'a> {
    graph: &'a DcrGraph,
    context: &'a HashSet<LabelId>,
}

impl<'a> ReachOracle<'a> {
    pub fn new(graph: &'a DcrGraph, context: &'a HashSet<LabelId>) -> Self {
        Self { graph, context }
    }

    /// Is there a future execution sequence, avoiding context labels, that
    /// ends with `e` firing?
    pub fn can_be_executed(&self, e: EventId) -> bool {
        self.can_exec(e, e, &Progress::new(self.graph.n_events()))
    }

    /// Can `e` either fire or be removed from `included` in the future?
    pub fn can_be_executed_or_excluded(&self, e: EventId) -> bool {
        let progress = Progress::new(self.graph.n_events());
        self.can_exec(e, e, &progress) || self.can_excl(e, e, &progress)
    }

    fn can_exec(&self, e: EventId, origin: EventId, progress: &Progress) -> bool {
        if progress.exec.contains(e) {
            return false;
        }
        if e != origin && self.context.contains(&self.graph.label_of(e)) {
            return false;
        }
        if is_enabled(self.graph, e) {
            return true;
        }

        let mut progress = progress.clone();
        progress.exec.insert(e);
        let marking = &self.graph.marking;

        for c in self.graph.conditions_for.targets(e) {
            if marking.included.contains(c) && !marking.executed.contains(c) {
                if !self.can_exec(c, origin, &progress) && !self.can_excl(c, origin, &progress) {
                    return false;
                }
            }
        }
        for m in self.graph.milestones_for.targets(e) {
            if marking.included.contains(m) && marking.pending.contains(m) {
                if !self.can_exec(m, origin, &progress) && !self.can_excl(m, origin, &progress) {
                    return false;
                }
            }
        }
        if !marking.included.contains(e) {
            return self.can_incl(e, origin, &progress);
        }
        true
    }

    fn can_excl(&self, e: EventId, origin: EventId, progress: &Progress) -> bool {
        if progress.excl.contains(e) {
            return false;
        }
        let mut progress = progress.clone();
        progress.excl.insert(e);
        self.graph
            .excludes_for
            .targets(e)
            .iter()
            .any(|x| self.can_exec(x, origin, &progress))
    }

    fn can_incl(&self, e: EventId, origin: EventId, progress: &Progress) -> bool {
        if progress.incl.contains(e) {
            return false;
        }
        let mut progress = progress.clone();
        progress.incl.insert(e);
        self.graph
            .includes_for
            .targets(e)
            .iter()
            .any(|i| self.can_exec(i, origin, &progress))
    }
}
