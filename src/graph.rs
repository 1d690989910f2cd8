//! Core data structures for DCR graphs.
//!
//! A Dynamic Condition Response graph constrains a set of events through four
//! binary relations (condition, response, include/exclude, milestone) instead
//! of a control-flow graph. The static structure is immutable after
//! construction; only the marking (executed/included/pending) evolves.
//!
//! # Invariants
//! - Every event referenced from a relation, the role map, a marking or a
//!   sub-process entry is a member of the event arena; `GraphBuilder::build`
//!   rejects anything else.
//! - Relation tables are never mutated after `build`.
//! - Marking components are subsets of the event universe by construction
//!   (fixed-width bitsets).
//!
//! # Citations
//! - Hildebrandt & Mukkamala, "Declarative Event-Based Workflow as
//!   Distributed Dynamic Condition Response Graphs" (2010)
//! - Debois, Hildebrandt & Slaats, "Hierarchical Declarative Modelling with
//!   Refinement and Sub-processes" (2014)

use crate::arena::{EventId, Interner, LabelId, RoleId};
use crate::sets::EventSet;
use std::collections::HashMap;
use std::fmt;

/// The dynamic state of a DCR graph.
///
/// - `executed`: events that have fired at least once since their last
///   exclusion (the optimised kernel only records events some condition
///   depends on, see [`DcrGraph::conditions`]).
/// - `included`: events currently part of the process.
/// - `pending`: events that owe a future execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marking {
    pub executed: EventSet,
    pub included: EventSet,
    pub pending: EventSet,
}

impl Marking {
    /// Creates an all-empty marking over `universe` events.
    pub fn empty(universe: usize) -> Self {
        Self {
            executed: EventSet::empty(universe),
            included: EventSet::empty(universe),
            pending: EventSet::empty(universe),
        }
    }

    /// Canonical memo key: the three sets as ascending comma-joined id
    /// lists, sections separated by `|`.
    ///
    /// The separator cannot occur inside a section, so distinct markings map
    /// to distinct keys.
    pub fn canonical_key(&self) -> String {
        let mut key = String::new();
        for (i, set) in [&self.executed, &self.included, &self.pending].into_iter().enumerate() {
            if i > 0 {
                key.push('|');
            }
            for (j, e) in set.iter().enumerate() {
                if j > 0 {
                    key.push(',');
                }
                key.push_str(&e.as_u32().to_string());
            }
        }
        key
    }
}

/// A total binary relation over events: one target set per source event.
///
/// Rows exist for every event; an event with no targets has an empty row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTable {
    rows: Vec<EventSet>,
}

impl RelationTable {
    /// Creates an empty relation over `universe` events.
    pub fn empty(universe: usize) -> Self {
        Self {
            rows: (0..universe).map(|_| EventSet::empty(universe)).collect(),
        }
    }

    /// Adds `tgt` to the row of `src`.
    pub(crate) fn insert(&mut self, src: EventId, tgt: EventId) {
        self.rows[src.index()].insert(tgt);
    }

    /// The targets related to `src`.
    #[inline]
    pub fn targets(&self, src: EventId) -> &EventSet {
        &self.rows[src.index()]
    }

    /// Number of source rows (the event universe size).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates `(source, targets)` rows in ascending source order.
    pub fn iter(&self) -> impl Iterator<Item = (EventId, &EventSet)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, set)| (EventId::new(i as u32), set))
    }

    /// The union of all rows.
    pub fn row_union(&self) -> EventSet {
        let universe = self.rows.len();
        let mut out = EventSet::empty(universe);
        for row in &self.rows {
            out.union_with(row);
        }
        out
    }

    /// The inverse relation: `tgt ∈ targets(src)` becomes
    /// `src ∈ reversed.targets(tgt)`.
    pub fn reversed(&self) -> RelationTable {
        let mut out = RelationTable::empty(self.rows.len());
        for (src, row) in self.iter() {
            for tgt in row {
                out.insert(tgt, src);
            }
        }
        out
    }
}

/// A DCR graph: immutable structure plus its live marking.
///
/// Construction goes through [`GraphBuilder`]; the builder resolves names to
/// dense ids, validates structural consistency and precomputes the derived
/// data (the `conditions` filter and the reverse relation tables) used by
/// the execution kernel, the conformance quantifier and the reachability
/// oracle.
///
/// Equality compares the full structure and both markings; two graphs built
/// from the same declarations in the same order are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct DcrGraph {
    pub(crate) events: Interner,
    pub(crate) labels: Interner,
    pub(crate) roles: Interner,
    /// Label of each event, indexed by `EventId`.
    pub(crate) label_map: Vec<LabelId>,
    /// Events carrying each label, indexed by `LabelId`.
    pub(crate) label_map_inv: Vec<EventSet>,
    /// Role of each event, indexed by `EventId`.
    pub(crate) role_map: Vec<RoleId>,
    /// `conditions_for.targets(e)`: events `e` needs executed or excluded.
    pub(crate) conditions_for: RelationTable,
    /// `milestones_for.targets(e)`: events whose pending-and-included status blocks `e`.
    pub(crate) milestones_for: RelationTable,
    /// `response_to.targets(e)`: events made pending when `e` fires.
    pub(crate) response_to: RelationTable,
    /// `excludes_to.targets(e)`: events removed from `included` when `e` fires.
    pub(crate) excludes_to: RelationTable,
    /// `includes_to.targets(e)`: events added to `included` when `e` fires.
    pub(crate) includes_to: RelationTable,
    /// Union of all condition rows: only these events dirty `executed`.
    pub(crate) conditions: EventSet,
    /// Reverse of `includes_to`.
    pub(crate) includes_for: RelationTable,
    /// Reverse of `excludes_to`.
    pub(crate) excludes_for: RelationTable,
    /// Reverse of `response_to`.
    pub(crate) response_for: RelationTable,
    pub(crate) initial_marking: Marking,
    /// The live marking, mutated by the execution kernel.
    pub(crate) marking: Marking,
    /// Events whose enabledness is evaluated in a nested group marking.
    pub(crate) sub_process_map: HashMap<EventId, DcrGraph>,
}

impl DcrGraph {
    /// Number of events in the graph.
    pub fn n_events(&self) -> usize {
        self.events.len()
    }

    /// Iterates `(id, name)` pairs in ascending id order.
    pub fn events(&self) -> impl Iterator<Item = (EventId, &str)> {
        self.events.iter().map(|(i, n)| (EventId::new(i), n))
    }

    /// Resolves an event name to its id.
    pub fn event_id(&self, name: &str) -> Option<EventId> {
        self.events.get(name).map(EventId::new)
    }

    /// Resolves an event id back to its name.
    pub fn event_name(&self, e: EventId) -> &str {
        self.events.name(e.as_u32())
    }

    /// Resolves a label name to its id.
    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        self.labels.get(name).map(LabelId::new)
    }

    /// The label of an event.
    pub fn label_of(&self, e: EventId) -> LabelId {
        self.label_map[e.index()]
    }

    /// The label of an event, as a string.
    pub fn label_name(&self, l: LabelId) -> &str {
        self.labels.name(l.as_u32())
    }

    /// All events carrying `label`.
    pub fn events_with_label(&self, label: LabelId) -> &EventSet {
        &self.label_map_inv[label.index()]
    }

    /// The role of an event.
    pub fn role_of(&self, e: EventId) -> RoleId {
        self.role_map[e.index()]
    }

    /// Resolves a role name to its id.
    pub fn role_id(&self, name: &str) -> Option<RoleId> {
        self.roles.get(name).map(RoleId::new)
    }

    /// The role of an event, as a string.
    pub fn role_name(&self, r: RoleId) -> &str {
        self.roles.name(r.as_u32())
    }

    /// The live marking.
    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    /// The marking the graph was built with.
    pub fn initial_marking(&self) -> &Marking {
        &self.initial_marking
    }

    /// Restores the live marking to the initial marking.
    pub fn reset(&mut self) {
        self.marking = self.initial_marking.clone();
    }

    /// The nested graph scoping `e`, if any.
    pub fn sub_process(&self, e: EventId) -> Option<&DcrGraph> {
        self.sub_process_map.get(&e)
    }

    /// Relation accessors, in the order (conditions_for, milestones_for,
    /// response_to, excludes_to, includes_to).
    pub fn conditions_for(&self) -> &RelationTable {
        &self.conditions_for
    }

    pub fn milestones_for(&self) -> &RelationTable {
        &self.milestones_for
    }

    pub fn response_to(&self) -> &RelationTable {
        &self.response_to
    }

    pub fn excludes_to(&self) -> &RelationTable {
        &self.excludes_to
    }

    pub fn includes_to(&self) -> &RelationTable {
        &self.includes_to
    }
}

/// Kind of relation a builder edge belongs to; used for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Condition,
    Milestone,
    Response,
    Exclude,
    Include,
}

impl EdgeKind {
    fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Condition => "condition",
            EdgeKind::Milestone => "milestone",
            EdgeKind::Response => "response",
            EdgeKind::Exclude => "exclude",
            EdgeKind::Include => "include",
        }
    }
}

/// Error raised by [`GraphBuilder::build`] for structurally inconsistent
/// input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The same event name was added twice.
    DuplicateEvent(String),
    /// A relation, marking entry or sub-process references an event that was
    /// never added.
    UnknownEvent {
        /// The missing event name.
        event: String,
        /// Where the reference occurred (relation kind or marking set).
        context: String,
    },
    /// A sub-process graph does not contain an event named after its host.
    SubProcessMissingEvent {
        /// The host event name.
        host: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateEvent(name) => {
                write!(f, "event '{name}' was added more than once")
            }
            GraphError::UnknownEvent { event, context } => {
                write!(f, "unknown event '{event}' referenced by {context}")
            }
            GraphError::SubProcessMissingEvent { host } => {
                write!(f, "sub-process graph for '{host}' has no event of that name")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Name-based construction API for [`DcrGraph`].
///
/// Relations and marking entries may be declared in any order; names are
/// resolved and validated once at [`GraphBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    names: Vec<String>,
    label_names: Vec<String>,
    role_names: Vec<String>,
    edges: Vec<(EdgeKind, String, String)>,
    included: Vec<String>,
    pending: Vec<String>,
    executed: Vec<String>,
    include_all: bool,
    subs: Vec<(String, DcrGraph)>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event with its label and role.
    pub fn event(&mut self, name: &str, label: &str, role: &str) -> &mut Self {
        self.names.push(name.to_owned());
        self.label_names.push(label.to_owned());
        self.role_names.push(role.to_owned());
        self
    }

    /// Adds an event whose label and role both equal its name.
    pub fn plain_event(&mut self, name: &str) -> &mut Self {
        self.event(name, name, name)
    }

    /// Declares `src` a condition for `tgt` (`src →● tgt`).
    pub fn condition(&mut self, src: &str, tgt: &str) -> &mut Self {
        self.edge(EdgeKind::Condition, src, tgt)
    }

    /// Declares `src` a milestone for `tgt` (`src →◆ tgt`).
    pub fn milestone(&mut self, src: &str, tgt: &str) -> &mut Self {
        self.edge(EdgeKind::Milestone, src, tgt)
    }

    /// Declares `tgt` a response to `src` (`src ●→ tgt`).
    pub fn response(&mut self, src: &str, tgt: &str) -> &mut Self {
        self.edge(EdgeKind::Response, src, tgt)
    }

    /// Declares that firing `src` excludes `tgt` (`src →% tgt`).
    pub fn excludes(&mut self, src: &str, tgt: &str) -> &mut Self {
        self.edge(EdgeKind::Exclude, src, tgt)
    }

    /// Declares that firing `src` includes `tgt` (`src →+ tgt`).
    pub fn includes(&mut self, src: &str, tgt: &str) -> &mut Self {
        self.edge(EdgeKind::Include, src, tgt)
    }

    /// Marks `name` as initially included.
    pub fn initially_included(&mut self, name: &str) -> &mut Self {
        self.included.push(name.to_owned());
        self
    }

    /// Marks every event as initially included.
    pub fn include_all(&mut self) -> &mut Self {
        self.include_all = true;
        self
    }

    /// Marks `name` as initially pending.
    pub fn initially_pending(&mut self, name: &str) -> &mut Self {
        self.pending.push(name.to_owned());
        self
    }

    /// Marks `name` as initially executed.
    pub fn initially_executed(&mut self, name: &str) -> &mut Self {
        self.executed.push(name.to_owned());
        self
    }

    /// Attaches a sub-process graph scoping the event `host`.
    ///
    /// The nested graph must itself contain an event named `host`; its group
    /// marking is consulted when checking `host`'s enabledness during replay
    /// and quantification.
    pub fn sub_process(&mut self, host: &str, graph: DcrGraph) -> &mut Self {
        self.subs.push((host.to_owned(), graph));
        self
    }

    fn edge(&mut self, kind: EdgeKind, src: &str, tgt: &str) -> &mut Self {
        self.edges.push((kind, src.to_owned(), tgt.to_owned()));
        self
    }

    /// Resolves names, validates structural consistency and produces the
    /// graph with its derived data.
    pub fn build(&self) -> Result<DcrGraph, GraphError> {
        let mut events = Interner::new();
        let mut labels = Interner::new();
        let mut roles = Interner::new();
        let mut label_map = Vec::with_capacity(self.names.len());
        let mut role_map = Vec::with_capacity(self.names.len());

        for (i, name) in self.names.iter().enumerate() {
            if events.get(name).is_some() {
                return Err(GraphError::DuplicateEvent(name.clone()));
            }
            events.intern(name);
            label_map.push(LabelId::new(labels.intern(&self.label_names[i])));
            role_map.push(RoleId::new(roles.intern(&self.role_names[i])));
        }
        let universe = events.len();

        let resolve = |name: &str, context: String| -> Result<EventId, GraphError> {
            events
                .get(name)
                .map(EventId::new)
                .ok_or(GraphError::UnknownEvent { event: name.to_owned(), context })
        };

        let mut conditions_for = RelationTable::empty(universe);
        let mut milestones_for = RelationTable::empty(universe);
        let mut response_to = RelationTable::empty(universe);
        let mut excludes_to = RelationTable::empty(universe);
        let mut includes_to = RelationTable::empty(universe);
        for (kind, src, tgt) in &self.edges {
            let context = format!("{} relation", kind.as_str());
            let s = resolve(src, context.clone())?;
            let t = resolve(tgt, context)?;
            match kind {
                // conditions_for / milestones_for are keyed by the
                // constrained event, so the edge source lands in the
                // target's row.
                EdgeKind::Condition => conditions_for.insert(t, s),
                EdgeKind::Milestone => milestones_for.insert(t, s),
                EdgeKind::Response => response_to.insert(s, t),
                EdgeKind::Exclude => excludes_to.insert(s, t),
                EdgeKind::Include => includes_to.insert(s, t),
            }
        }

        let mut label_map_inv: Vec<EventSet> =
            (0..labels.len()).map(|_| EventSet::empty(universe)).collect();
        for (i, &label) in label_map.iter().enumerate() {
            label_map_inv[label.index()].insert(EventId::new(i as u32));
        }

        let mut initial = Marking::empty(universe);
        if self.include_all {
            initial.included = EventSet::full(universe);
        }
        for name in &self.included {
            initial.included.insert(resolve(name, "initial included set".into())?);
        }
        for name in &self.pending {
            initial.pending.insert(resolve(name, "initial pending set".into())?);
        }
        for name in &self.executed {
            initial.executed.insert(resolve(name, "initial executed set".into())?);
        }

        let mut sub_process_map = HashMap::new();
        for (host, sub) in &self.subs {
            let host_id = resolve(host, "sub-process map".into())?;
            if sub.event_id(host).is_none() {
                return Err(GraphError::SubProcessMissingEvent { host: host.clone() });
            }
            sub_process_map.insert(host_id, sub.clone());
        }

        let conditions = conditions_for.row_union();
        let includes_for = includes_to.reversed();
        let excludes_for = excludes_to.reversed();
        let response_for = response_to.reversed();

        Ok(DcrGraph {
            events,
            labels,
            roles,
            label_map,
            label_map_inv,
            role_map,
            conditions_for,
            milestones_for,
            response_to,
            excludes_to,
            includes_to,
            conditions,
            includes_for,
            excludes_for,
            response_for,
            marking: initial.clone(),
            initial_marking: initial,
            sub_process_map,
        })
    }
}
