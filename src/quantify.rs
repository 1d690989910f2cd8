//! Conformance quantification.
//!
//! Where replay answers "does the trace fit?", the quantifier answers "how
//! badly does it not": it replays the trace executing a candidate event for
//! every token whether or not it is enabled, counts the relation constraints
//! each step breaks, and across all resolutions of ambiguous labels keeps
//! the resolution with the fewest total violations.
//!
//! Violations and activations are recorded per relation edge in
//! [`FuzzyRelation`] matrices, merged cell-wise along the chosen branch.
//!
//! # Citations
//! - Conformance checking by replay: Rozinat & van der Aalst, "Conformance
//!   checking of processes based on monitoring real behavior" (2008)

use crate::arena::EventId;
use crate::engine::execute;
use crate::graph::DcrGraph;
use crate::replay::RoleStep;
use crate::sets::EventSet;
use std::collections::BTreeMap;

/// An `Event → Event → count` double map; absent cells are zero.
///
/// Rows exist for every event of the universe. Inner maps are ordered so
/// iteration (and the codec's rendering) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyRelation {
    rows: Vec<BTreeMap<EventId, u32>>,
}

impl FuzzyRelation {
    /// Creates an all-zero matrix over `universe` events.
    pub fn empty(universe: usize) -> Self {
        Self {
            rows: (0..universe).map(|_| BTreeMap::new()).collect(),
        }
    }

    /// Adds `n` to cell `(src, tgt)`.
    pub fn add(&mut self, src: EventId, tgt: EventId, n: u32) {
        *self.rows[src.index()].entry(tgt).or_insert(0) += n;
    }

    /// Reads cell `(src, tgt)`.
    pub fn get(&self, src: EventId, tgt: EventId) -> u32 {
        self.rows[src.index()].get(&tgt).copied().unwrap_or(0)
    }

    /// Cell-wise addition of `other` into `self`.
    pub fn merge(&mut self, other: &FuzzyRelation) {
        for (row, other_row) in self.rows.iter_mut().zip(&other.rows) {
            for (&tgt, &n) in other_row {
                *row.entry(tgt).or_insert(0) += n;
            }
        }
    }

    /// Sum over all cells.
    pub fn total(&self) -> u32 {
        self.rows.iter().flat_map(|r| r.values()).sum()
    }

    /// Iterates non-zero cells as `(src, tgt, count)` in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (EventId, EventId, u32)> + '_ {
        self.rows.iter().enumerate().flat_map(|(i, row)| {
            row.iter()
                .map(move |(&tgt, &n)| (EventId::new(i as u32), tgt, n))
        })
    }
}

/// One [`FuzzyRelation`] per relation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationViolations {
    pub conditions_for: FuzzyRelation,
    pub milestones_for: FuzzyRelation,
    pub response_to: FuzzyRelation,
    pub excludes_to: FuzzyRelation,
}

impl RelationViolations {
    /// Creates all-zero matrices over `universe` events.
    pub fn empty(universe: usize) -> Self {
        Self {
            conditions_for: FuzzyRelation::empty(universe),
            milestones_for: FuzzyRelation::empty(universe),
            response_to: FuzzyRelation::empty(universe),
            excludes_to: FuzzyRelation::empty(universe),
        }
    }

    /// Cell-wise addition of `other` into `self`, per relation kind.
    pub fn merge(&mut self, other: &RelationViolations) {
        self.conditions_for.merge(&other.conditions_for);
        self.milestones_for.merge(&other.milestones_for);
        self.response_to.merge(&other.response_to);
        self.excludes_to.merge(&other.excludes_to);
    }

    /// Sum over all cells of all kinds.
    pub fn total(&self) -> u32 {
        self.conditions_for.total()
            + self.milestones_for.total()
            + self.response_to.total()
            + self.excludes_to.total()
    }
}

/// Result of quantifying a trace: the minimal-violation resolution's counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformanceReport {
    /// Total violation count of the chosen resolution.
    pub total_violations: u32,
    /// Per-edge violation counts.
    pub violations: RelationViolations,
    /// Per-edge activation counts (relation edges live at the moment their
    /// source fired).
    pub activations: RelationViolations,
}

impl ConformanceReport {
    fn empty(universe: usize) -> Self {
        Self {
            total_violations: 0,
            violations: RelationViolations::empty(universe),
            activations: RelationViolations::empty(universe),
        }
    }

    fn merge(&mut self, other: &ConformanceReport) {
        self.total_violations += other.total_violations;
        self.violations.merge(&other.violations);
        self.activations.merge(&other.activations);
    }
}

/// Per-event execution history threaded through the recursion.
///
/// `ex_since_in[e]`: events executed since `e` was last included.
/// `ex_since_ex[e]`: events executed since `e` last executed.
#[derive(Debug, Clone)]
struct History {
    ex_since_in: Vec<EventSet>,
    ex_since_ex: Vec<EventSet>,
}

impl History {
    fn new(universe: usize) -> Self {
        Self {
            ex_since_in: vec![EventSet::empty(universe); universe],
            ex_since_ex: vec![EventSet::empty(universe); universe],
        }
    }

    /// Applies the history updates for a just-executed `e`.
    fn record(&mut self, g: &DcrGraph, e: EventId) {
        for o in g.includes_to.targets(e) {
            self.ex_since_in[o.index()].clear();
        }
        for o in self.ex_since_in.iter_mut() {
            o.insert(e);
        }
        for o in self.ex_since_ex.iter_mut() {
            o.insert(e);
        }
        let own = &mut self.ex_since_ex[e.index()];
        own.clear();
        own.insert(e);
    }
}

/// Quantifies how far `trace` deviates from `g`.
///
/// Over all resolutions of ambiguous `(activity, role)` tokens, the
/// resolution with the fewest total violations is selected (first-found on
/// ties) and its per-relation violation and activation counts are returned.
/// The live marking is used as the starting state and is unchanged on
/// return.
pub fn quantify_violations(g: &mut DcrGraph, trace: &[RoleStep]) -> ConformanceReport {
    let mut history = History::new(g.n_events());
    quantify_from(g, trace, &mut history)
}

fn quantify_from(g: &mut DcrGraph, trace: &[RoleStep], history: &mut History) -> ConformanceReport {
    let universe = g.n_events();
    let Some((step, tail)) = trace.split_first() else {
        return end_of_trace_report(g, history);
    };

    let candidates: Vec<EventId> = match (g.label_id(&step.activity), g.role_id(&step.role)) {
        (Some(label), Some(role)) => g
            .events_with_label(label)
            .iter()
            .filter(|&e| g.role_of(e) == role)
            .collect(),
        _ => Vec::new(),
    };
    // Open world: tokens the graph cannot resolve carry no violations.
    if candidates.is_empty() {
        return quantify_from(g, tail, history);
    }

    let mut best: Option<ConformanceReport> = None;
    for e in candidates {
        let mut report = ConformanceReport::empty(universe);
        score_step(g, e, history, &mut report);
        record_activations(g, e, &mut report.activations);

        let saved_marking = g.marking.clone();
        let saved_history = history.clone();
        execute(g, e);
        history.record(g, e);
        let sub = quantify_from(g, tail, history);
        g.marking = saved_marking;
        *history = saved_history;

        report.merge(&sub);
        if best.as_ref().is_none_or(|b| report.total_violations < b.total_violations) {
            best = Some(report);
        }
    }
    best.expect("candidate list is non-empty")
}

/// Scores the violations of firing `e` in the current marking.
fn score_step(g: &DcrGraph, e: EventId, history: &History, report: &mut ConformanceReport) {
    let marking = &g.marking;
    for c in g.conditions_for.targets(e) {
        if marking.included.contains(c) && !marking.executed.contains(c) {
            report.violations.conditions_for.add(e, c, 1);
            report.total_violations += 1;
        }
    }
    for m in g.milestones_for.targets(e) {
        if marking.included.contains(m) && marking.pending.contains(m) {
            report.violations.milestones_for.add(e, m, 1);
            report.total_violations += 1;
        }
    }
    if !marking.included.contains(e) {
        // Firing an excluded event is charged to whichever excluders fired
        // since e was last included.
        let excluders = history.ex_since_in[e.index()].intersection(g.excludes_for.targets(e));
        for o in &excluders {
            report.violations.excludes_to.add(o, e, 1);
            report.total_violations += 1;
        }
    }
}

/// Records the relation edges active at the moment `e` fires.
fn record_activations(g: &DcrGraph, e: EventId, activations: &mut RelationViolations) {
    for t in g.conditions_for.targets(e) {
        activations.conditions_for.add(e, t, 1);
    }
    for t in g.milestones_for.targets(e) {
        activations.milestones_for.add(e, t, 1);
    }
    for t in g.response_to.targets(e) {
        activations.response_to.add(e, t, 1);
    }
    for t in g.excludes_to.targets(e) {
        activations.excludes_to.add(e, t, 1);
    }
}

/// Response violations owed at end of trace: a pending included event is
/// charged to the responses that put it on the hook since it last executed.
fn end_of_trace_report(g: &DcrGraph, history: &History) -> ConformanceReport {
    let mut report = ConformanceReport::empty(g.n_events());
    let unresolved = g.marking.pending.intersection(&g.marking.included);
    for e in &unresolved {
        let owed = g.response_for.targets(e).intersection(&history.ex_since_ex[e.index()]);
        for o in &owed {
            report.violations.response_to.add(o, e, 1);
            report.total_violations += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::replay::{replay_trace, RoleStep};

    fn steps(pairs: &[(&str, &str)]) -> Vec<RoleStep> {
        pairs.iter().map(|(r, a)| RoleStep::new(r, a)).collect()
    }

    #[test]
    fn condition_violation_is_counted() {
        let mut b = GraphBuilder::new();
        b.plain_event("A").plain_event("B").condition("A", "B").include_all();
        let mut g = b.build().unwrap();
        let a = g.event_id("A").unwrap();
        let bb = g.event_id("B").unwrap();

        let report = quantify_violations(&mut g, &steps(&[("B", "B")]));
        assert_eq!(report.total_violations, 1);
        assert_eq!(report.violations.conditions_for.get(bb, a), 1);
        // The condition edge was active when B fired.
        assert_eq!(report.activations.conditions_for.get(bb, a), 1);
    }

    #[test]
    fn accepted_trace_has_zero_violations() {
        let mut b = GraphBuilder::new();
        b.plain_event("A")
            .plain_event("B")
            .condition("A", "B")
            .response("A", "B")
            .include_all();
        let mut g = b.build().unwrap();
        let trace = steps(&[("A", "A"), ("B", "B")]);
        assert!(replay_trace(&mut g, &trace));
        let report = quantify_violations(&mut g, &trace);
        assert_eq!(report.total_violations, 0);
    }

    #[test]
    fn milestone_violation_is_counted() {
        let mut b = GraphBuilder::new();
        b.plain_event("A")
            .plain_event("B")
            .milestone("B", "A")
            .include_all()
            .initially_pending("B");
        let mut g = b.build().unwrap();
        let a = g.event_id("A").unwrap();
        let bb = g.event_id("B").unwrap();
        let report = quantify_violations(&mut g, &steps(&[("A", "A")]));
        assert_eq!(report.violations.milestones_for.get(a, bb), 1);
    }

    #[test]
    fn unanswered_response_is_charged_at_end_of_trace() {
        let mut b = GraphBuilder::new();
        b.plain_event("A").plain_event("B").response("A", "B").include_all();
        let mut g = b.build().unwrap();
        let a = g.event_id("A").unwrap();
        let bb = g.event_id("B").unwrap();
        let report = quantify_violations(&mut g, &steps(&[("A", "A")]));
        assert_eq!(report.total_violations, 1);
        assert_eq!(report.violations.response_to.get(a, bb), 1);
    }

    #[test]
    fn firing_an_excluded_event_charges_the_excluder() {
        let mut b = GraphBuilder::new();
        b.plain_event("K").plain_event("B").excludes("K", "B").include_all();
        let mut g = b.build().unwrap();
        let k = g.event_id("K").unwrap();
        let bb = g.event_id("B").unwrap();
        let report = quantify_violations(&mut g, &steps(&[("K", "K"), ("B", "B")]));
        assert_eq!(report.total_violations, 1);
        assert_eq!(report.violations.excludes_to.get(k, bb), 1);
    }

    #[test]
    fn reinclusion_clears_the_exclusion_charge() {
        // K excludes B, I re-includes it; after I fires, executing B is no
        // longer charged to K.
        let mut b = GraphBuilder::new();
        b.plain_event("K")
            .plain_event("I")
            .plain_event("B")
            .excludes("K", "B")
            .includes("I", "B")
            .include_all();
        let mut g = b.build().unwrap();
        let report =
            quantify_violations(&mut g, &steps(&[("K", "K"), ("I", "I"), ("B", "B")]));
        assert_eq!(report.total_violations, 0);
    }

    #[test]
    fn ambiguous_labels_pick_the_minimal_resolution() {
        // Two events share a label; firing A1 violates a condition, firing
        // A2 does not. The quantifier must report zero violations.
        let mut b = GraphBuilder::new();
        b.event("A1", "Approve", "r")
            .event("A2", "Approve", "r")
            .plain_event("C")
            .condition("C", "A1")
            .include_all();
        let mut g = b.build().unwrap();
        let report = quantify_violations(&mut g, &steps(&[("r", "Approve")]));
        assert_eq!(report.total_violations, 0);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let mut b = GraphBuilder::new();
        b.plain_event("A").include_all();
        let mut g = b.build().unwrap();
        let report = quantify_violations(&mut g, &steps(&[("x", "Noise"), ("A", "A")]));
        assert_eq!(report.total_violations, 0);
    }

    #[test]
    fn marking_is_unchanged_after_quantification() {
        let mut b = GraphBuilder::new();
        b.plain_event("A").plain_event("B").response("A", "B").include_all();
        let mut g = b.build().unwrap();
        let before = g.marking().clone();
        quantify_violations(&mut g, &steps(&[("A", "A")]));
        assert_eq!(g.marking(), &before);
    }

    #[test]
    fn merge_is_cellwise_addition() {
        let mut a = FuzzyRelation::empty(3);
        let mut b = FuzzyRelation::empty(3);
        let e0 = EventId::new(0);
        let e1 = EventId::new(1);
        a.add(e0, e1, 2);
        b.add(e0, e1, 3);
        b.add(e1, e0, 1);
        a.merge(&b);
        assert_eq!(a.get(e0, e1), 5);
        assert_eq!(a.get(e1, e0), 1);
        assert_eq!(a.total(), 6);
    }
}
