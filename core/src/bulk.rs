//! All-or-nothing batches.
//!
//! Items are checked in submission order against a scratch copy of the state.
//! After an item passes, its event is folded into the scratch copy, so later
//! items see the effects of earlier ones: a batch may accept `1.1` and then a
//! node that requires `1.1` to be validated, but not the other way round. The
//! first failing item aborts the whole batch and nothing is appended.

use chrono::{DateTime, Utc};

use vetted_config::ProofConfig;
use vetted_types::{AgentId, Event, NodeId};

use crate::error::ProofError;
use crate::gate::{
    AcceptPolicy, Acceptance, DepthWarning, NewNode, check_acceptance, check_creation,
    require_pending,
};
use crate::state::State;

/// Events for a batch plus the per-item outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<T> {
    pub events: Vec<Event>,
    pub items: Vec<T>,
}

/// One node created by a refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: NodeId,
    pub warning: Option<DepthWarning>,
}

/// Number children of `parent` consecutively and run each through the creation gate.
pub fn plan_refinement(
    state: &State,
    config: &ProofConfig,
    parent: &NodeId,
    owner: &AgentId,
    nodes: Vec<NewNode>,
    now: DateTime<Utc>,
) -> Result<Plan<Created>, ProofError> {
    if nodes.is_empty() {
        return Err(ProofError::EmptyBatch);
    }
    let mut scratch = state.clone();
    let mut plan = Plan {
        events: Vec::with_capacity(nodes.len()),
        items: Vec::with_capacity(nodes.len()),
    };

    for (index, node) in nodes.into_iter().enumerate() {
        let id = require_pending(&scratch, parent)
            .map_err(|err| err.in_batch(index))?
            .next_child_id();
        let admitted = check_creation(&scratch, config, &id, owner, node, now)
            .map_err(|err| err.in_batch(index))?;
        scratch.apply(&admitted.event)?;
        plan.events.push(admitted.event);
        plan.items.push(Created {
            id,
            warning: admitted.warning,
        });
    }
    Ok(plan)
}

/// Run each node through the acceptance gate with the same policy.
pub fn plan_acceptance(
    state: &State,
    ids: &[NodeId],
    policy: &AcceptPolicy,
) -> Result<Plan<Acceptance>, ProofError> {
    if ids.is_empty() {
        return Err(ProofError::EmptyBatch);
    }
    let mut scratch = state.clone();
    let mut plan = Plan {
        events: Vec::with_capacity(ids.len()),
        items: Vec::with_capacity(ids.len()),
    };

    for (index, id) in ids.iter().enumerate() {
        let (event, acceptance) =
            check_acceptance(&scratch, id, policy).map_err(|err| err.in_batch(index))?;
        scratch.apply(&event)?;
        plan.events.push(event);
        plan.items.push(acceptance);
    }
    Ok(plan)
}
