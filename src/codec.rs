//! Canonical JSON codec and structural fingerprinting.
//!
//! Graphs and alignments map to name-keyed JSON documents: sets become
//! arrays sorted by event name, relations become maps from event name to
//! sorted target arrays, and the reserved `trace` key of an alignment stays
//! an ordered array. Parsing goes back through [`GraphBuilder`], so a parsed
//! document is re-validated structurally. `parse(serialize(x)) == x` holds
//! under set equality.
//!
//! The fingerprint hashes the canonical JSON bytes with SHA-256 under a
//! domain tag and a length prefix, giving a stable identity for a graph and
//! its marking.
//!
//! # Citations
//! - Domain separation & length prefixing: Bernstein et al., "How to hash
//!   into elliptic curves" (2009)
//! - SHA-256: NIST FIPS 180-4 (2015)

use crate::align::Alignment;
use crate::graph::{DcrGraph, GraphBuilder, GraphError};
use crate::sets::EventSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Error raised while serializing or parsing canonical documents.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Malformed JSON, or a value serde could not map onto the document.
    Json(String),
    /// The document parsed but failed graph validation.
    Graph(GraphError),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Json(msg) => write!(f, "json error: {msg}"),
            CodecError::Graph(err) => write!(f, "graph validation failed: {err}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Json(err.to_string())
    }
}

impl From<GraphError> for CodecError {
    fn from(err: GraphError) -> Self {
        CodecError::Graph(err)
    }
}

/// One event declaration: name, label, role. Order in the `events` array is
/// the interning order, so ids survive a round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventDoc {
    id: String,
    label: String,
    role: String,
}

/// The marking as name arrays (order-insensitive; rendered sorted).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MarkingDoc {
    executed: Vec<String>,
    included: Vec<String>,
    pending: Vec<String>,
}

/// Canonical graph document.
///
/// `conditions_for`/`milestones_for` are keyed by the constrained event;
/// `response_to`/`excludes_to`/`includes_to` by the firing event. Empty rows
/// are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphDoc {
    events: Vec<EventDoc>,
    conditions_for: BTreeMap<String, Vec<String>>,
    milestones_for: BTreeMap<String, Vec<String>>,
    response_to: BTreeMap<String, Vec<String>>,
    excludes_to: BTreeMap<String, Vec<String>>,
    includes_to: BTreeMap<String, Vec<String>>,
    marking: MarkingDoc,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sub_processes: BTreeMap<String, GraphDoc>,
}

/// Canonical alignment document. `trace` is the one reserved ordered key;
/// an infinite cost is encoded as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlignmentDoc {
    cost: Option<f64>,
    trace: Vec<String>,
}

fn set_names(g: &DcrGraph, set: &EventSet) -> Vec<String> {
    let mut names: Vec<String> = set.iter().map(|e| g.event_name(e).to_owned()).collect();
    names.sort();
    names
}

fn graph_to_doc(g: &DcrGraph) -> GraphDoc {
    let events = g
        .events()
        .map(|(e, name)| EventDoc {
            id: name.to_owned(),
            label: g.label_name(g.label_of(e)).to_owned(),
            role: g.role_name(g.role_of(e)).to_owned(),
        })
        .collect();

    let table_to_doc = |table: &crate::graph::RelationTable| {
        let mut doc = BTreeMap::new();
        for (src, row) in table.iter() {
            if !row.is_empty() {
                doc.insert(g.event_name(src).to_owned(), set_names(g, row));
            }
        }
        doc
    };

    let mut sub_processes = BTreeMap::new();
    for (e, _) in g.events() {
        if let Some(sub) = g.sub_process(e) {
            sub_processes.insert(g.event_name(e).to_owned(), graph_to_doc(sub));
        }
    }

    GraphDoc {
        events,
        conditions_for: table_to_doc(g.conditions_for()),
        milestones_for: table_to_doc(g.milestones_for()),
        response_to: table_to_doc(g.response_to()),
        excludes_to: table_to_doc(g.excludes_to()),
        includes_to: table_to_doc(g.includes_to()),
        marking: MarkingDoc {
            executed: set_names(g, &g.marking().executed),
            included: set_names(g, &g.marking().included),
            pending: set_names(g, &g.marking().pending),
        },
        sub_processes,
    }
}

fn doc_to_graph(doc: &GraphDoc) -> Result<DcrGraph, GraphError> {
    let mut b = GraphBuilder::new();
    for event in &doc.events {
        b.event(&event.id, &event.label, &event.role);
    }
    // Constraint tables are keyed by the constrained event, effect tables by
    // the firing event; the builder takes (source, target) edges.
    for (tgt, srcs) in &doc.conditions_for {
        for src in srcs {
            b.condition(src, tgt);
        }
    }
    for (tgt, srcs) in &doc.milestones_for {
        for src in srcs {
            b.milestone(src, tgt);
        }
    }
    for (src, tgts) in &doc.response_to {
        for tgt in tgts {
            b.response(src, tgt);
        }
    }
    for (src, tgts) in &doc.excludes_to {
        for tgt in tgts {
            b.excludes(src, tgt);
        }
    }
    for (src, tgts) in &doc.includes_to {
        for tgt in tgts {
            b.includes(src, tgt);
        }
    }
    for name in &doc.marking.executed {
        b.initially_executed(name);
    }
    for name in &doc.marking.included {
        b.initially_included(name);
    }
    for name in &doc.marking.pending {
        b.initially_pending(name);
    }
    for (host, sub_doc) in &doc.sub_processes {
        b.sub_process(host, doc_to_graph(sub_doc)?);
    }
    b.build()
}

/// Renders `g` (structure plus live marking) as canonical JSON.
pub fn serialize_graph(g: &DcrGraph) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(&graph_to_doc(g))?)
}

/// Parses a canonical graph document, re-validating through the builder.
pub fn parse_graph(json: &str) -> Result<DcrGraph, CodecError> {
    let doc: GraphDoc = serde_json::from_str(json)?;
    Ok(doc_to_graph(&doc)?)
}

/// Renders an alignment as canonical JSON; event ids become names.
pub fn serialize_alignment(g: &DcrGraph, alignment: &Alignment) -> Result<String, CodecError> {
    let doc = AlignmentDoc {
        cost: alignment.cost.is_finite().then_some(alignment.cost),
        trace: alignment
            .trace
            .iter()
            .map(|&e| g.event_name(e).to_owned())
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Parses a canonical alignment document against `g`.
pub fn parse_alignment(g: &DcrGraph, json: &str) -> Result<Alignment, CodecError> {
    let doc: AlignmentDoc = serde_json::from_str(json)?;
    let mut trace = Vec::with_capacity(doc.trace.len());
    for name in &doc.trace {
        let e = g.event_id(name).ok_or_else(|| GraphError::UnknownEvent {
            event: name.clone(),
            context: "alignment trace".into(),
        })?;
        trace.push(e);
    }
    Ok(Alignment {
        cost: doc.cost.unwrap_or(f64::INFINITY),
        trace,
    })
}

/// SHA-256 fingerprint of the canonical graph document, with domain
/// separation and a length prefix.
pub fn graph_fingerprint(g: &DcrGraph) -> Result<[u8; 32], CodecError> {
    let json = serialize_graph(g)?;
    let mut hasher = Sha256::new();
    hasher.update(b"DCR:GRAPH_FP:v1");
    hasher.update((json.len() as u64).to_le_bytes());
    hasher.update(json.as_bytes());
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::Alignment;
    use crate::engine::execute;
    use crate::graph::GraphBuilder;

    fn sample_graph() -> DcrGraph {
        let mut b = GraphBuilder::new();
        b.event("A", "Approve", "manager")
            .event("B", "Book", "clerk")
            .event("C", "Cancel", "clerk")
            .condition("A", "B")
            .milestone("C", "B")
            .response("A", "B")
            .excludes("C", "B")
            .includes("A", "C")
            .initially_included("A")
            .initially_included("B")
            .initially_pending("C");
        b.build().unwrap()
    }

    #[test]
    fn graph_round_trips() {
        let g = sample_graph();
        let json = serialize_graph(&g).unwrap();
        let parsed = parse_graph(&json).unwrap();
        assert_eq!(parsed, g);
        // And the rendering itself is stable.
        assert_eq!(serialize_graph(&parsed).unwrap(), json);
    }

    #[test]
    fn live_marking_is_what_round_trips() {
        let mut g = sample_graph();
        let a = g.event_id("A").unwrap();
        execute(&mut g, a);
        let parsed = parse_graph(&serialize_graph(&g).unwrap()).unwrap();
        assert_eq!(parsed.marking(), g.marking());
    }

    #[test]
    fn sub_processes_round_trip() {
        let mut inner = GraphBuilder::new();
        inner.plain_event("S").plain_event("Gate").condition("Gate", "S").include_all();
        let inner = inner.build().unwrap();
        let mut b = GraphBuilder::new();
        b.plain_event("S").include_all().sub_process("S", inner);
        let g = b.build().unwrap();

        let parsed = parse_graph(&serialize_graph(&g).unwrap()).unwrap();
        assert_eq!(parsed, g);
        assert!(parsed.sub_process(parsed.event_id("S").unwrap()).is_some());
    }

    #[test]
    fn parse_rejects_inconsistent_documents() {
        let json = r#"{
            "events": [{"id": "A", "label": "A", "role": "A"}],
            "conditions_for": {"A": ["Ghost"]},
            "milestones_for": {},
            "response_to": {},
            "excludes_to": {},
            "includes_to": {},
            "marking": {"executed": [], "included": ["A"], "pending": []}
        }"#;
        assert!(matches!(parse_graph(json), Err(CodecError::Graph(_))));
        assert!(matches!(parse_graph("not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn alignment_round_trips_and_keeps_order() {
        let g = sample_graph();
        let alignment = Alignment {
            cost: 3.0,
            trace: vec![g.event_id("B").unwrap(), g.event_id("A").unwrap()],
        };
        let json = serialize_alignment(&g, &alignment).unwrap();
        let parsed = parse_alignment(&g, &json).unwrap();
        assert_eq!(parsed, alignment);
    }

    #[test]
    fn infeasible_alignment_encodes_cost_as_null() {
        let g = sample_graph();
        let json = serialize_alignment(&g, &Alignment::infeasible()).unwrap();
        assert!(json.contains("null"));
        let parsed = parse_alignment(&g, &json).unwrap();
        assert!(!parsed.is_feasible());
        assert!(parsed.trace.is_empty());
    }

    #[test]
    fn fingerprint_tracks_structure_and_marking() {
        let g = sample_graph();
        let mut h = sample_graph();
        assert_eq!(graph_fingerprint(&g).unwrap(), graph_fingerprint(&h).unwrap());
        let a = h.event_id("A").unwrap();
        execute(&mut h, a);
        assert_ne!(graph_fingerprint(&g).unwrap(), graph_fingerprint(&h).unwrap());
    }
}
