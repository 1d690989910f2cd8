//! dcr-engine: execution, conformance and trace alignment for Dynamic
//! Condition Response graphs.
//!
//! A DCR graph constrains a set of events through four binary relations
//! (condition, response, include/exclude, milestone) instead of a
//! control-flow graph. This crate implements the runtime core around that
//! model:
//! - Execution kernel: enabledness, firing, acceptance over a marking.
//! - Trace replay: does an observed role-typed trace correspond to some
//!   accepting run?
//! - Conformance quantification: per-relation violation and activation
//!   counts for the least-violating resolution of a trace.
//! - Trace alignment: a minimum-cost sequence of consume, model-skip and
//!   trace-skip moves, computed by bounded branch-and-bound with a
//!   reachability pruning oracle.
//!
//! All four share one state representation (the marking) and one
//! enabledness predicate. Graph structure is immutable after construction;
//! recursive searches snapshot and restore the marking around every branch.
//!
//! # Mathematical Foundations
//!
//! The semantics follow the DCR graph formalism of Hildebrandt and
//! Mukkamala: an event is enabled when it is included, its included
//! conditions are executed, and its included milestones are not pending;
//! firing updates the executed/pending sets and applies the
//! exclude-then-include effects. A marking is accepting when no included
//! event is pending.
//!
//! # References
//!
//! - Hildebrandt, Mukkamala. "Declarative Event-Based Workflow as
//!   Distributed Dynamic Condition Response Graphs" (2010)
//! - Hildebrandt, Mukkamala, Slaats. "Nested Dynamic Condition Response
//!   Graphs" (2011)
//! - Adriansyah, van Dongen, van der Aalst. "Conformance checking using
//!   cost-based fitness analysis" (2011)
//! - Debois, Hildebrandt, Slaats. "Hierarchical Declarative Modelling with
//!   Refinement and Sub-processes" (2014)
//!
//! # Example
//!
//! ```
//! use dcr_engine::prelude::*;
//!
//! let mut builder = GraphBuilder::new();
//! builder
//!     .plain_event("Order")
//!     .plain_event("Ship")
//!     .condition("Order", "Ship")
//!     .response("Order", "Ship")
//!     .include_all();
//! let mut graph = builder.build().unwrap();
//!
//! let order = graph.event_id("Order").unwrap();
//! assert!(is_enabled(&graph, order));
//! execute(&mut graph, order);
//! assert!(!is_accepting(&graph)); // Ship is now pending.
//! ```

pub mod align;
pub mod arena;
pub mod codec;
pub mod engine;
pub mod graph;
pub mod quantify;
pub mod reach;
pub mod replay;
pub mod sets;

pub use align::{align, Alignment, AlignOptions, MoveKind};
pub use arena::{EventId, LabelId, RoleId};
pub use engine::{execute, get_enabled, is_accepting, is_enabled, with_scratch_marking};
pub use graph::{DcrGraph, GraphBuilder, GraphError, Marking, RelationTable};
pub use quantify::{quantify_violations, ConformanceReport, FuzzyRelation, RelationViolations};
pub use replay::{replay_trace, RoleStep};
pub use sets::EventSet;

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::align::{align, Alignment, AlignOptions, MoveKind};
    pub use crate::arena::{EventId, LabelId, RoleId};
    pub use crate::codec::{parse_graph, serialize_graph};
    pub use crate::engine::{
        execute, get_enabled, is_accepting, is_enabled, with_scratch_marking,
    };
    pub use crate::graph::{DcrGraph, GraphBuilder, GraphError, Marking};
    pub use crate::quantify::{quantify_violations, ConformanceReport};
    pub use crate::replay::{replay_trace, RoleStep};
    pub use crate::sets::EventSet;
}
