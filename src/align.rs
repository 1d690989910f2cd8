//! Trace alignment by bounded branch-and-bound search.
//!
//! Computes the cheapest sequence of moves turning an observed label trace
//! into an accepting run: `consume` fires an enabled event matching the head
//! token, `trace-skip` drops the head token, `model-skip` fires an enabled
//! event without consuming a token. The search is depth-first with an upper
//! bound tightened on every improvement, a two-level memo table over
//! (remaining trace length, marking), and an optional reachability pruning
//! pass that runs only while no finite bound exists.
//!
//! The aligner operates on the flattened graph; sub-process scopes are a
//! replay concern and are not consulted here.
//!
//! # Citations
//! - Alignments: Adriansyah, van Dongen & van der Aalst, "Conformance
//!   checking using cost-based fitness analysis" (2011)
//! - Branch and bound: Lawler & Wood, "Branch-and-bound methods: a survey"
//!   (1966)

use crate::arena::{EventId, LabelId};
use crate::engine::{execute, get_enabled, is_accepting, is_enabled, with_scratch_marking};
use crate::graph::DcrGraph;
use crate::reach::ReachOracle;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Kind of alignment move, passed to the cost function together with the
/// event name (consume, model-skip) or the trace label (trace-skip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Consume,
    ModelSkip,
    TraceSkip,
}

/// A computed alignment.
///
/// `trace` is the sequence of fired events (consume and model-skip moves);
/// trace-skip moves leave no entry. `cost = f64::INFINITY` means no
/// alignment exists within the given bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub cost: f64,
    pub trace: Vec<EventId>,
}

impl Alignment {
    /// The failure value: infinite cost, empty trace.
    pub fn infeasible() -> Self {
        Self { cost: f64::INFINITY, trace: Vec::new() }
    }

    /// True if the search found an alignment within its bounds.
    pub fn is_feasible(&self) -> bool {
        self.cost.is_finite()
    }
}

/// Search bounds and pruning switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignOptions {
    /// Maximum recursion depth; also used as the initial cost bound when
    /// set. `None` derives the bound from skipping the whole trace.
    pub depth_limit: Option<u32>,
    /// Enables the reachability pruning pass (only active while no finite
    /// bound has been established).
    pub pruning: bool,
}

/// One trace token: the raw label and, when the graph knows it, its id.
struct Token {
    label: String,
    id: Option<LabelId>,
}

struct SearchCtx<'c, F> {
    cost_fn: &'c F,
    tokens: &'c [Token],
    context: &'c HashSet<LabelId>,
    /// `memo[remaining][marking key]` = cheapest running cost seen.
    memo: Vec<HashMap<String, f64>>,
    max_cost: f64,
    depth_limit: u32,
    pruning: bool,
}

/// Aligns `trace` against `g`, starting from the live marking.
///
/// `context` labels are forbidden to re-fire inside the reachability oracle
/// (callers already handling those labels pass them here). The returned
/// cost is minimal over all move sequences that consume the whole trace and
/// end accepting; the live marking is unchanged on return.
pub fn align<F>(
    g: &mut DcrGraph,
    trace: &[String],
    context: &HashSet<String>,
    cost_fn: F,
    options: AlignOptions,
) -> Alignment
where
    F: Fn(MoveKind, &str) -> f64,
{
    let tokens: Vec<Token> = trace
        .iter()
        .map(|l| Token { label: l.clone(), id: g.label_id(l) })
        .collect();
    let context_ids: HashSet<LabelId> =
        context.iter().filter_map(|l| g.label_id(l)).collect();

    let max_cost = match options.depth_limit {
        Some(limit) => f64::from(limit),
        None => {
            // Cost of skipping every token and then aligning the empty
            // trace; a valid alignment whenever finite, so a sound upper
            // bound. The bound phase uses its own memo table.
            let skip_all: f64 = tokens
                .iter()
                .map(|t| cost_fn(MoveKind::TraceSkip, &t.label))
                .sum();
            let mut bound_ctx = SearchCtx {
                cost_fn: &cost_fn,
                tokens: &[],
                context: &context_ids,
                memo: vec![HashMap::new()],
                max_cost: f64::INFINITY,
                depth_limit: u32::MAX,
                pruning: options.pruning,
            };
            skip_all + search(g, &mut bound_ctx, 0, 0.0, 0).cost
        }
    };
    debug!(max_cost, trace_len = trace.len(), "alignment search start");

    let mut ctx = SearchCtx {
        cost_fn: &cost_fn,
        tokens: &tokens,
        context: &context_ids,
        memo: vec![HashMap::new(); tokens.len() + 1],
        max_cost,
        depth_limit: options.depth_limit.unwrap_or(u32::MAX),
        pruning: options.pruning,
    };
    let result = search(g, &mut ctx, 0, 0.0, 0);
    debug!(cost = result.cost, moves = result.trace.len(), "alignment search done");
    result
}

fn search<F>(
    g: &mut DcrGraph,
    ctx: &mut SearchCtx<'_, F>,
    pos: usize,
    cur_cost: f64,
    depth: u32,
) -> Alignment
where
    F: Fn(MoveKind, &str) -> f64,
{
    let remaining = ctx.tokens.len() - pos;

    // Acceptance is checked before the cost cut so an alignment meeting the
    // bound exactly is still returned.
    if remaining == 0 && is_accepting(g) {
        return Alignment { cost: cur_cost, trace: Vec::new() };
    }
    if cur_cost >= ctx.max_cost || depth >= ctx.depth_limit {
        return Alignment::infeasible();
    }

    let key = g.marking.canonical_key();
    if let Some(&seen) = ctx.memo[remaining].get(&key) {
        if cur_cost >= seen {
            return Alignment::infeasible();
        }
    }
    ctx.memo[remaining].insert(key, cur_cost);

    let mut best = Alignment::infeasible();

    if remaining > 0 {
        // Consume: fire an enabled event carrying the head label.
        if let Some(label) = ctx.tokens[pos].id {
            let candidates: Vec<EventId> = g.events_with_label(label).iter().collect();
            for e in candidates {
                if !is_enabled(g, e) {
                    continue;
                }
                let move_cost = (ctx.cost_fn)(MoveKind::Consume, g.event_name(e));
                let sub = with_scratch_marking(g, |g| {
                    execute(g, e);
                    search(g, ctx, pos + 1, cur_cost + move_cost, depth + 1)
                });
                consider(&mut best, ctx, Some(e), sub);
            }
        }
        // Trace-skip: drop the head token.
        let move_cost = (ctx.cost_fn)(MoveKind::TraceSkip, &ctx.tokens[pos].label);
        let sub = search(g, ctx, pos + 1, cur_cost + move_cost, depth + 1);
        consider(&mut best, ctx, None, sub);
    }

    // Reachability pruning, only while no finite bound exists.
    if ctx.pruning && ctx.max_cost.is_infinite() && !reachable(g, ctx, pos) {
        return best;
    }

    // Model-skip: fire any enabled event without consuming a token.
    let enabled = get_enabled(g);
    for e in &enabled {
        let move_cost = (ctx.cost_fn)(MoveKind::ModelSkip, g.event_name(e));
        let sub = with_scratch_marking(g, |g| {
            execute(g, e);
            search(g, ctx, pos, cur_cost + move_cost, depth + 1)
        });
        consider(&mut best, ctx, Some(e), sub);
    }

    best
}

/// Folds a branch result into the running best and tightens the bound.
fn consider<F>(
    best: &mut Alignment,
    ctx: &mut SearchCtx<'_, F>,
    fired: Option<EventId>,
    sub: Alignment,
) {
    if sub.cost < best.cost {
        let mut trace = Vec::with_capacity(sub.trace.len() + 1);
        trace.extend(fired);
        trace.extend(sub.trace);
        *best = Alignment { cost: sub.cost, trace };
        if best.cost < ctx.max_cost {
            ctx.max_cost = best.cost;
            debug!(max_cost = ctx.max_cost, "bound tightened");
        }
    }
}

/// The pruning test of the oracle: with a token at hand, some event carrying
/// its label must still be executable; at end of trace, every pending
/// included event must be executable or excludable.
fn reachable<F>(g: &DcrGraph, ctx: &SearchCtx<'_, F>, pos: usize) -> bool {
    let oracle = ReachOracle::new(g, ctx.context);
    if pos < ctx.tokens.len() {
        match ctx.tokens[pos].id {
            Some(label) => g
                .events_with_label(label)
                .iter()
                .any(|e| oracle.can_be_executed(e)),
            None => false,
        }
    } else {
        let blocked = g.marking.pending.intersection(&g.marking.included);
        blocked.iter().all(|p| oracle.can_be_executed_or_excluded(p))
    }
}
