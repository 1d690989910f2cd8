//! Execution kernel: enabledness, firing, acceptance.
//!
//! Free functions over a [`DcrGraph`]. Relations are read-only here; only the
//! live marking is written, and only by [`execute`]. Callers that explore
//! alternative futures wrap each branch in [`with_scratch_marking`], which
//! restores the prior marking on every exit path, including unwinding.
//!
//! # Citations
//! - Execution semantics: Hildebrandt & Mukkamala, "Declarative Event-Based
//!   Workflow as Distributed Dynamic Condition Response Graphs" (2010)
//! - Milestones and nesting: Hildebrandt, Mukkamala & Slaats, "Nested Dynamic
//!   Condition Response Graphs" (2011)

use crate::arena::EventId;
use crate::graph::{DcrGraph, Marking};
use crate::sets::EventSet;

/// Enabledness of `e` under the graph's live marking.
///
/// Holds iff `e` is included, every included condition of `e` is executed,
/// and no included milestone of `e` is pending.
pub fn is_enabled(g: &DcrGraph, e: EventId) -> bool {
    is_enabled_in(g, e, &g.marking)
}

/// Enabledness of `e` under an explicit marking.
///
/// The relations come from `g`; the state comes from `marking`. Callers with
/// sub-process scoped events pass the group marking of the scope here.
pub fn is_enabled_in(g: &DcrGraph, e: EventId, marking: &Marking) -> bool {
    if !marking.included.contains(e) {
        return false;
    }
    for c in g.conditions_for.targets(e) {
        if marking.included.contains(c) && !marking.executed.contains(c) {
            return false;
        }
    }
    for m in g.milestones_for.targets(e) {
        if marking.included.contains(m) && marking.pending.contains(m) {
            return false;
        }
    }
    true
}

/// All events enabled under the live marking, in ascending id order.
pub fn get_enabled(g: &DcrGraph) -> EventSet {
    let mut out = EventSet::empty(g.n_events());
    for (e, _) in g.events() {
        if is_enabled(g, e) {
            out.insert(e);
        }
    }
    out
}

/// Fires `e`, updating the live marking.
///
/// Steps, in order: record execution (only for events some condition depends
/// on), clear `e`'s pending obligation, add `e`'s responses to `pending`,
/// apply exclusions, apply inclusions. Include is applied after exclude, so
/// an event that both excludes and includes itself ends up included.
///
/// Enabledness is not checked; conformance replay deliberately fires
/// disabled events and scores the violation instead.
pub fn execute(g: &mut DcrGraph, e: EventId) {
    if g.conditions.contains(e) {
        g.marking.executed.insert(e);
    }
    g.marking.pending.remove(e);
    g.marking.pending.union_with(g.response_to.targets(e));
    g.marking.included.difference_with(g.excludes_to.targets(e));
    g.marking.included.union_with(g.includes_to.targets(e));
}

/// Acceptance of the live marking: no included event is pending.
pub fn is_accepting(g: &DcrGraph) -> bool {
    is_accepting_marking(&g.marking)
}

/// Acceptance of an explicit marking.
pub fn is_accepting_marking(marking: &Marking) -> bool {
    marking.pending.is_disjoint(&marking.included)
}

/// Runs `f` against a scratch copy of the live marking.
///
/// The prior marking is restored when `f` returns, and also if `f` unwinds;
/// the restore lives in a drop guard, so no exit path escapes it.
pub fn with_scratch_marking<R>(g: &mut DcrGraph, f: impl FnOnce(&mut DcrGraph) -> R) -> R {
    struct Restore<'a> {
        graph: &'a mut DcrGraph,
        saved: Option<Marking>,
    }
    impl Drop for Restore<'_> {
        fn drop(&mut self) {
            if let Some(saved) = self.saved.take() {
                self.graph.marking = saved;
            }
        }
    }

    let saved = g.marking.clone();
    let mut guard = Restore { graph: g, saved: Some(saved) };
    f(&mut *guard.graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn build(f: impl FnOnce(&mut GraphBuilder)) -> DcrGraph {
        let mut b = GraphBuilder::new();
        f(&mut b);
        b.build().unwrap()
    }

    #[test]
    fn condition_blocks_until_source_executes() {
        let mut g = build(|b| {
            b.plain_event("A").plain_event("B").condition("A", "B").include_all();
        });
        let a = g.event_id("A").unwrap();
        let b = g.event_id("B").unwrap();
        assert!(is_enabled(&g, a));
        assert!(!is_enabled(&g, b));
        execute(&mut g, a);
        assert!(is_enabled(&g, b));
    }

    #[test]
    fn excluded_condition_source_does_not_block() {
        let mut g = build(|b| {
            b.plain_event("A")
                .plain_event("B")
                .plain_event("K")
                .condition("A", "B")
                .excludes("K", "A")
                .include_all();
        });
        let b = g.event_id("B").unwrap();
        let k = g.event_id("K").unwrap();
        assert!(!is_enabled(&g, b));
        execute(&mut g, k);
        assert!(is_enabled(&g, b));
    }

    #[test]
    fn milestone_blocks_while_pending() {
        let mut g = build(|b| {
            b.plain_event("A")
                .plain_event("B")
                .milestone("B", "A")
                .include_all()
                .initially_pending("B");
        });
        let a = g.event_id("A").unwrap();
        let b = g.event_id("B").unwrap();
        assert!(!is_enabled(&g, a));
        execute(&mut g, b);
        assert!(is_enabled(&g, a));
    }

    #[test]
    fn execute_applies_responses_and_clears_pending() {
        let mut g = build(|b| {
            b.plain_event("A").plain_event("B").response("A", "B").include_all();
        });
        let a = g.event_id("A").unwrap();
        let b = g.event_id("B").unwrap();
        execute(&mut g, a);
        assert!(g.marking().pending.contains(b));
        assert!(!is_accepting(&g));
        execute(&mut g, b);
        assert!(!g.marking().pending.contains(b));
        assert!(is_accepting(&g));
    }

    #[test]
    fn include_wins_over_self_exclusion() {
        let mut g = build(|b| {
            b.plain_event("A").excludes("A", "A").includes("A", "A").include_all();
        });
        let a = g.event_id("A").unwrap();
        execute(&mut g, a);
        assert!(g.marking().included.contains(a));
    }

    #[test]
    fn executed_only_written_for_condition_sources() {
        let mut g = build(|b| {
            b.plain_event("A").plain_event("B").condition("A", "B").include_all();
        });
        let a = g.event_id("A").unwrap();
        let b = g.event_id("B").unwrap();
        execute(&mut g, b);
        assert!(!g.marking().executed.contains(b));
        execute(&mut g, a);
        assert!(g.marking().executed.contains(a));
    }

    #[test]
    fn get_enabled_agrees_with_is_enabled() {
        let g = build(|b| {
            b.plain_event("A")
                .plain_event("B")
                .plain_event("C")
                .condition("A", "B")
                .include_all();
        });
        let enabled = get_enabled(&g);
        for (e, _) in g.events() {
            assert_eq!(enabled.contains(e), is_enabled(&g, e));
        }
    }

    #[test]
    fn scratch_marking_restores_on_return() {
        let mut g = build(|b| {
            b.plain_event("A").plain_event("B").response("A", "B").include_all();
        });
        let a = g.event_id("A").unwrap();
        let before = g.marking().clone();
        let changed = with_scratch_marking(&mut g, |g| {
            execute(g, a);
            g.marking().clone()
        });
        assert_ne!(changed, before);
        assert_eq!(g.marking(), &before);
    }

    #[test]
    fn scratch_marking_restores_on_unwind() {
        let mut g = build(|b| {
            b.plain_event("A").include_all();
        });
        let a = g.event_id("A").unwrap();
        let before = g.marking().clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_scratch_marking(&mut g, |g| {
                execute(g, a);
                panic!("branch failed");
            })
        }));
        assert!(result.is_err());
        assert_eq!(g.marking(), &before);
    }

    #[test]
    fn nested_scratch_markings_compose() {
        let mut g = build(|b| {
            b.plain_event("A").plain_event("B").response("A", "B").include_all();
        });
        let a = g.event_id("A").unwrap();
        let b = g.event_id("B").unwrap();
        let before = g.marking().clone();
        with_scratch_marking(&mut g, |g| {
            execute(g, a);
            with_scratch_marking(g, |g| {
                execute(g, b);
            });
            assert!(g.marking().pending.contains(b));
        });
        assert_eq!(g.marking(), &before);
    }
}
