//! Claims on nodes.
//!
//! A lease is nothing more than the latest `NodeClaimed` event for a node,
//! cleared by `NodeReleased`. Whether it is active is decided by comparing its
//! expiry with the caller's clock at the moment of the check.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use vetted_types::{AgentId, Event, NodeId};

use crate::error::ProofError;
use crate::gate::require_pending;
use crate::state::{Lease, Node, State};

/// Convert a requested lease length, rejecting zero and out-of-range values.
pub fn lease_length(duration: Duration) -> Result<TimeDelta, ProofError> {
    match TimeDelta::from_std(duration) {
        Ok(delta) if delta > TimeDelta::zero() => Ok(delta),
        _ => Err(ProofError::InvalidLeaseDuration),
    }
}

/// Grant `owner` a lease on `id` until `now + duration`.
///
/// Succeeds when the node is pending and either unleased, holding an expired
/// lease, or already leased to `owner` (which renews it).
pub fn check_claim(
    state: &State,
    id: &NodeId,
    owner: &AgentId,
    now: DateTime<Utc>,
    duration: TimeDelta,
) -> Result<(Event, Lease), ProofError> {
    if duration <= TimeDelta::zero() {
        return Err(ProofError::InvalidLeaseDuration);
    }
    let node = require_pending(state, id)?;
    if let Some(lease) = node.active_lease(now)
        && lease.owner != *owner
    {
        return Err(ProofError::LeaseHeld {
            id: id.clone(),
            holder: lease.owner.clone(),
            expires_at: lease.expires_at,
        });
    }
    let expires_at = now
        .checked_add_signed(duration)
        .ok_or(ProofError::InvalidLeaseDuration)?;

    let event = Event::NodeClaimed {
        id: id.clone(),
        owner: owner.clone(),
        expires_at,
    };
    Ok((
        event,
        Lease {
            owner: owner.clone(),
            expires_at,
        },
    ))
}

/// Require that `owner` holds an active lease on `id`.
pub fn check_ownership<'a>(
    state: &'a State,
    id: &NodeId,
    owner: &AgentId,
    now: DateTime<Utc>,
) -> Result<&'a Node, ProofError> {
    let node = state
        .get_node(id)
        .ok_or_else(|| ProofError::NodeNotFound(id.clone()))?;
    match node.active_lease(now) {
        None => Err(ProofError::NotClaimed(id.clone())),
        Some(lease) if lease.owner != *owner => Err(ProofError::OwnerMismatch {
            id: id.clone(),
            holder: lease.owner.clone(),
            caller: owner.clone(),
        }),
        Some(_) => Ok(node),
    }
}

/// Give up `owner`'s active lease on a pending node.
pub fn check_release(
    state: &State,
    id: &NodeId,
    owner: &AgentId,
    now: DateTime<Utc>,
) -> Result<Event, ProofError> {
    require_pending(state, id)?;
    check_ownership(state, id, owner, now)?;
    Ok(Event::NodeReleased {
        id: id.clone(),
        owner: owner.clone(),
    })
}
