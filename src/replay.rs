//! Role-typed trace replay.
//!
//! Answers whether an observed trace corresponds to *some* accepting run of
//! the graph. Ambiguous labels (many events sharing one label) make this a
//! disjunction over candidate events; each branch executes under a scratch
//! marking and the first accepting branch wins.
//!
//! Unknown activities are skipped rather than rejected (open-world
//! principle): a trace may interleave activity from processes the graph does
//! not model.

use crate::arena::EventId;
use crate::engine::{execute, is_accepting, is_enabled, is_enabled_in, with_scratch_marking};
use crate::graph::DcrGraph;
use serde::{Deserialize, Serialize};

/// One observed step: which role performed which activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleStep {
    pub role: String,
    pub activity: String,
}

impl RoleStep {
    /// Convenience constructor.
    pub fn new(role: &str, activity: &str) -> Self {
        Self { role: role.to_owned(), activity: activity.to_owned() }
    }
}

/// Does `trace` correspond to some accepting run of `g`?
///
/// The live marking is used as the starting state and is unchanged on
/// return.
pub fn replay_trace(g: &mut DcrGraph, trace: &[RoleStep]) -> bool {
    replay_from(g, trace)
}

fn replay_from(g: &mut DcrGraph, trace: &[RoleStep]) -> bool {
    let Some((step, tail)) = trace.split_first() else {
        return is_accepting(g);
    };

    // Open world: an activity the graph does not know is not part of the
    // process and is skipped.
    let Some(label) = g.label_id(&step.activity) else {
        return replay_from(g, tail);
    };
    let Some(role) = g.role_id(&step.role) else {
        return false;
    };

    let candidates: Vec<EventId> = g
        .events_with_label(label)
        .iter()
        .filter(|&e| g.role_of(e) == role)
        .collect();

    for e in candidates {
        if !scoped_is_enabled(g, e) {
            continue;
        }
        let accepted = with_scratch_marking(g, |g| {
            execute(g, e);
            replay_from(g, tail)
        });
        if accepted {
            return true;
        }
    }
    false
}

/// Enabledness of `e`, evaluated in the group marking of its sub-process
/// scope when it has one.
///
/// The nested graph hosts an event of the same name (enforced at build
/// time); its marking supplies the state while the nested relations
/// constrain it.
pub(crate) fn scoped_is_enabled(g: &DcrGraph, e: EventId) -> bool {
    match g.sub_process(e) {
        None => is_enabled(g, e),
        Some(sub) => {
            let scoped = sub
                .event_id(g.event_name(e))
                .expect("sub-process host event validated at build time");
            is_enabled_in(sub, scoped, sub.marking())
        }
    }
}
