//! Materialized proof state.
//!
//! [`State`] is a pure fold over the ledger: [`State::replay`] applies each
//! event in order and nothing else contributes to it. Any event that breaks an
//! invariant the admission gate is meant to uphold makes replay fail with a
//! [`ReplayError`], which callers treat as ledger corruption.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use thiserror::Error;

use vetted_types::{
    AgentId, ChallengeId, ChallengeTarget, DefinitionName, EpistemicState, Event, InferenceTag,
    NodeId, NodeType, NonEmptyString, Severity,
};

/// Time-bounded exclusive editing right on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub owner: AgentId,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Active strictly before expiry.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// `None` only for the root.
    pub parent: Option<NodeId>,
    pub node_type: NodeType,
    pub statement: NonEmptyString,
    pub inference: InferenceTag,
    pub state: EpistemicState,
    /// Most recent lease, active or not.
    pub lease: Option<Lease>,
    pub dependencies: Vec<NodeId>,
    pub validation_dependencies: Vec<NodeId>,
    pub note: Option<String>,
    pub accepted_by: Option<AgentId>,
    pub refutation: Option<String>,
    pub refuted_by: Option<AgentId>,
    highest_child: u32,
}

impl Node {
    #[must_use]
    pub fn active_lease(&self, now: DateTime<Utc>) -> Option<&Lease> {
        self.lease.as_ref().filter(|lease| lease.is_active(now))
    }

    /// Pending and not held by anyone: open for a prover to pick up.
    #[must_use]
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.state == EpistemicState::Pending && self.active_lease(now).is_none()
    }

    /// The identifier the next automatically numbered child receives.
    ///
    /// Always one past the highest child segment ever created, so an
    /// identifier is never handed out twice.
    #[must_use]
    pub fn next_child_id(&self) -> NodeId {
        self.id
            .child(NonZeroU32::MIN.saturating_add(self.highest_child))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: ChallengeId,
    pub node: NodeId,
    pub target: ChallengeTarget,
    pub reason: NonEmptyString,
    pub severity: Severity,
    pub raised_by: Option<AgentId>,
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl Challenge {
    #[must_use]
    pub fn blocks_acceptance(&self) -> bool {
        !self.resolved && self.severity.blocks_acceptance()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: DefinitionName,
    pub description: NonEmptyString,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChallengeCounts {
    pub raised: usize,
    pub resolved: usize,
}

impl ChallengeCounts {
    #[must_use]
    pub fn open(&self) -> usize {
        self.raised - self.resolved
    }
}

/// Node and challenge totals for a whole proof.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub pending: usize,
    pub validated: usize,
    pub refuted: usize,
    pub challenges: BTreeMap<Severity, ChallengeCounts>,
    pub definitions: usize,
}

impl Summary {
    #[must_use]
    pub fn nodes(&self) -> usize {
        self.pending + self.validated + self.refuted
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.nodes() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger event {seq} is invalid: {violation}")]
pub struct ReplayError {
    pub seq: u64,
    pub violation: Violation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("event precedes proof initialization")]
    NotInitialized,
    #[error("proof initialized twice")]
    AlreadyInitialized,
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0} created twice")]
    DuplicateNode(NodeId),
    #[error("node {id} recorded with parent {recorded}")]
    ParentMismatch { id: NodeId, recorded: NodeId },
    #[error("node {id} created under missing parent {parent}")]
    MissingParent { id: NodeId, parent: NodeId },
    #[error("node {id} depends on missing node {dependency}")]
    MissingDependency { id: NodeId, dependency: NodeId },
    #[error("node {id} changed after becoming {state}")]
    Terminal { id: NodeId, state: EpistemicState },
    #[error("node {id} released by {owner}, who holds no lease on it")]
    LeaseMismatch { id: NodeId, owner: AgentId },
    #[error("challenge {0} raised twice")]
    DuplicateChallenge(ChallengeId),
    #[error("challenge {0} does not exist")]
    UnknownChallenge(ChallengeId),
    #[error("challenge {0} resolved twice")]
    ChallengeAlreadyResolved(ChallengeId),
    #[error("definition {0} added twice")]
    DuplicateDefinition(DefinitionName),
    #[error("expected sequence number {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    conjecture: Option<NonEmptyString>,
    author: Option<AgentId>,
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    challenges: Vec<Challenge>,
    challenge_index: HashMap<ChallengeId, usize>,
    challenges_by_node: HashMap<NodeId, Vec<usize>>,
    definitions: Vec<Definition>,
    definition_index: HashMap<DefinitionName, usize>,
    event_count: u64,
}

impl State {
    /// Fold `events` from an empty state. Event `i` has sequence number `i + 1`.
    pub fn replay(events: &[Event]) -> Result<Self, ReplayError> {
        let mut state = Self::default();
        for event in events {
            state.apply(event)?;
        }
        Ok(state)
    }

    /// Number of events folded so far; equals the ledger sequence number of the last one.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.conjecture.is_some()
    }

    #[must_use]
    pub fn conjecture(&self) -> Option<&NonEmptyString> {
        self.conjecture.as_ref()
    }

    #[must_use]
    pub fn author(&self) -> Option<&AgentId> {
        self.author.as_ref()
    }

    #[must_use]
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&index| &self.nodes[index])
    }

    /// Every node, in creation order.
    #[must_use]
    pub fn all_nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Pending nodes nobody currently holds a lease on.
    #[must_use]
    pub fn pending_nodes(&self, now: DateTime<Utc>) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| node.is_available(now))
            .collect()
    }

    pub fn children<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.parent.as_ref() == Some(id))
    }

    #[must_use]
    pub fn challenge(&self, id: &ChallengeId) -> Option<&Challenge> {
        self.challenge_index
            .get(id)
            .map(|&index| &self.challenges[index])
    }

    /// Every challenge, in the order raised.
    #[must_use]
    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    #[must_use]
    pub fn challenges_for(&self, node: &NodeId) -> Vec<&Challenge> {
        self.challenges_by_node
            .get(node)
            .map(|indices| indices.iter().map(|&i| &self.challenges[i]).collect())
            .unwrap_or_default()
    }

    /// Raised/resolved totals per severity for one node.
    #[must_use]
    pub fn challenge_counts(&self, node: &NodeId) -> BTreeMap<Severity, ChallengeCounts> {
        tally(self.challenges_for(node))
    }

    #[must_use]
    pub fn definition(&self, name: &DefinitionName) -> Option<&Definition> {
        self.definition_index
            .get(name)
            .map(|&index| &self.definitions[index])
    }

    #[must_use]
    pub fn definition_by_name(&self, name: &str) -> Option<&Definition> {
        DefinitionName::new(name)
            .ok()
            .and_then(|name| self.definition(&name))
    }

    #[must_use]
    pub fn has_definition(&self, name: &DefinitionName) -> bool {
        self.definition_index.contains_key(name)
    }

    #[must_use]
    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            challenges: tally(self.challenges.iter()),
            definitions: self.definitions.len(),
            ..Summary::default()
        };
        for node in &self.nodes {
            match node.state {
                EpistemicState::Pending => summary.pending += 1,
                EpistemicState::Validated => summary.validated += 1,
                EpistemicState::Refuted => summary.refuted += 1,
            }
        }
        summary
    }

    /// Fold one more event. On error the state is left unchanged.
    pub(crate) fn apply(&mut self, event: &Event) -> Result<(), ReplayError> {
        let seq = self.event_count + 1;
        let fail = |violation| ReplayError { seq, violation };

        if !self.is_initialized() && !matches!(event, Event::ProofInitialized { .. }) {
            return Err(fail(Violation::NotInitialized));
        }

        match event {
            Event::ProofInitialized { conjecture, author } => {
                if self.is_initialized() {
                    return Err(fail(Violation::AlreadyInitialized));
                }
                self.conjecture = Some(conjecture.clone());
                self.author = Some(author.clone());
                self.insert_node(Node {
                    id: NodeId::root(),
                    parent: None,
                    node_type: NodeType::Claim,
                    statement: conjecture.clone(),
                    inference: InferenceTag::assumption(),
                    state: EpistemicState::Pending,
                    lease: None,
                    dependencies: Vec::new(),
                    validation_dependencies: Vec::new(),
                    note: None,
                    accepted_by: None,
                    refutation: None,
                    refuted_by: None,
                    highest_child: 0,
                });
            }
            Event::NodeCreated {
                id,
                parent,
                node_type,
                statement,
                inference,
                dependencies,
                validation_dependencies,
            } => {
                if self.node_index.contains_key(id) {
                    return Err(fail(Violation::DuplicateNode(id.clone())));
                }
                if id.parent().as_ref() != Some(parent) {
                    return Err(fail(Violation::ParentMismatch {
                        id: id.clone(),
                        recorded: parent.clone(),
                    }));
                }
                let parent_node = self.get_node(parent).ok_or_else(|| {
                    fail(Violation::MissingParent {
                        id: id.clone(),
                        parent: parent.clone(),
                    })
                })?;
                if parent_node.state.is_terminal() {
                    return Err(fail(Violation::Terminal {
                        id: parent.clone(),
                        state: parent_node.state,
                    }));
                }
                if let Some(missing) = dependencies
                    .iter()
                    .chain(validation_dependencies)
                    .find(|dep| !self.node_index.contains_key(*dep))
                {
                    return Err(fail(Violation::MissingDependency {
                        id: id.clone(),
                        dependency: missing.clone(),
                    }));
                }

                let segment = id.last_segment().get();
                let parent_node = self.node_mut(parent);
                parent_node.highest_child = parent_node.highest_child.max(segment);
                self.insert_node(Node {
                    id: id.clone(),
                    parent: Some(parent.clone()),
                    node_type: *node_type,
                    statement: statement.clone(),
                    inference: inference.clone(),
                    state: EpistemicState::Pending,
                    lease: None,
                    dependencies: dependencies.clone(),
                    validation_dependencies: validation_dependencies.clone(),
                    note: None,
                    accepted_by: None,
                    refutation: None,
                    refuted_by: None,
                    highest_child: 0,
                });
            }
            Event::NodeClaimed {
                id,
                owner,
                expires_at,
            } => {
                self.pending_node(id).map_err(fail)?;
                self.node_mut(id).lease = Some(Lease {
                    owner: owner.clone(),
                    expires_at: *expires_at,
                });
            }
            Event::NodeReleased { id, owner } => {
                let node = self.pending_node(id).map_err(fail)?;
                if node.lease.as_ref().map(|lease| &lease.owner) != Some(owner) {
                    return Err(fail(Violation::LeaseMismatch {
                        id: id.clone(),
                        owner: owner.clone(),
                    }));
                }
                self.node_mut(id).lease = None;
            }
            Event::NodeValidated {
                id,
                note,
                accepted_by,
            } => {
                self.pending_node(id).map_err(fail)?;
                let node = self.node_mut(id);
                node.state = EpistemicState::Validated;
                node.note.clone_from(note);
                node.accepted_by.clone_from(accepted_by);
            }
            Event::NodeRefuted {
                id,
                reason,
                refuted_by,
            } => {
                self.pending_node(id).map_err(fail)?;
                let node = self.node_mut(id);
                node.state = EpistemicState::Refuted;
                node.refutation.clone_from(reason);
                node.refuted_by.clone_from(refuted_by);
            }
            Event::ChallengeRaised {
                id,
                node,
                target,
                reason,
                severity,
                raised_by,
            } => {
                self.pending_node(node).map_err(fail)?;
                if self.challenge_index.contains_key(id) {
                    return Err(fail(Violation::DuplicateChallenge(id.clone())));
                }
                let index = self.challenges.len();
                self.challenges.push(Challenge {
                    id: id.clone(),
                    node: node.clone(),
                    target: *target,
                    reason: reason.clone(),
                    severity: *severity,
                    raised_by: raised_by.clone(),
                    resolved: false,
                    resolution: None,
                });
                self.challenge_index.insert(id.clone(), index);
                self.challenges_by_node
                    .entry(node.clone())
                    .or_default()
                    .push(index);
            }
            Event::ChallengeResolved {
                challenge,
                resolution,
            } => {
                let index = *self
                    .challenge_index
                    .get(challenge)
                    .ok_or_else(|| fail(Violation::UnknownChallenge(challenge.clone())))?;
                let record = &mut self.challenges[index];
                if record.resolved {
                    return Err(fail(Violation::ChallengeAlreadyResolved(challenge.clone())));
                }
                record.resolved = true;
                record.resolution.clone_from(resolution);
            }
            Event::DefinitionAdded { name, description } => {
                if self.definition_index.contains_key(name) {
                    return Err(fail(Violation::DuplicateDefinition(name.clone())));
                }
                self.definition_index
                    .insert(name.clone(), self.definitions.len());
                self.definitions.push(Definition {
                    name: name.clone(),
                    description: description.clone(),
                });
            }
        }

        self.event_count = seq;
        Ok(())
    }

    fn insert_node(&mut self, node: Node) {
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    fn pending_node(&self, id: &NodeId) -> Result<&Node, Violation> {
        let node = self
            .get_node(id)
            .ok_or_else(|| Violation::UnknownNode(id.clone()))?;
        if node.state.is_terminal() {
            return Err(Violation::Terminal {
                id: id.clone(),
                state: node.state,
            });
        }
        Ok(node)
    }

    /// Only called after the node's existence has been checked.
    fn node_mut(&mut self, id: &NodeId) -> &mut Node {
        let index = self.node_index[id];
        &mut self.nodes[index]
    }
}

fn tally<'a>(
    challenges: impl IntoIterator<Item = &'a Challenge>,
) -> BTreeMap<Severity, ChallengeCounts> {
    let mut counts: BTreeMap<Severity, ChallengeCounts> = BTreeMap::new();
    for challenge in challenges {
        let entry = counts.entry(challenge.severity).or_default();
        entry.raised += 1;
        if challenge.resolved {
            entry.resolved += 1;
        }
    }
    counts
}
