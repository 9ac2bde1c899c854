//! Admission checks run against freshly replayed state before anything is
//! appended.
//!
//! Each `check_*` function either returns the event(s) the operation may
//! append or the error explaining why it may not. None of them touch the
//! ledger; the service runs them inside the ledger's write transaction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;

use vetted_config::ProofConfig;
use vetted_types::{
    AgentId, ChallengeId, ChallengeTarget, DefinitionName, EpistemicState, Event, InferenceTag,
    NodeId, NodeType, NonEmptyString, Severity,
};

use crate::error::{BlockingChallenge, ProofError};
use crate::lease::check_ownership;
use crate::state::{ChallengeCounts, Node, State};

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"def:([A-Za-z0-9_][A-Za-z0-9_-]*)").expect("valid definition citation regex")
});

/// Definition names cited as `def:<name>` in `text`, first occurrence order, without duplicates.
///
/// Every `def:` occurrence counts, including one glued to a preceding word.
#[must_use]
pub fn cited_definitions(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for capture in CITATION.captures_iter(text) {
        if let Some(name) = capture.get(1).map(|m| m.as_str())
            && !names.contains(&name)
        {
            names.push(name);
        }
    }
    names
}

/// Fail unless `id` exists and is still pending.
pub(crate) fn require_pending<'a>(state: &'a State, id: &NodeId) -> Result<&'a Node, ProofError> {
    let node = state
        .get_node(id)
        .ok_or_else(|| ProofError::NodeNotFound(id.clone()))?;
    if node.state != EpistemicState::Pending {
        return Err(ProofError::NotPending {
            id: id.clone(),
            state: node.state,
        });
    }
    Ok(node)
}

// ============================================================================
// Creation
// ============================================================================

/// A node to create, as a caller describes it: identifiers in textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub node_type: NodeType,
    pub statement: String,
    /// Defaults to `assumption` when unset.
    pub inference: Option<String>,
    pub dependencies: Vec<String>,
    pub validation_dependencies: Vec<String>,
}

impl NodeSpec {
    pub fn new(node_type: NodeType, statement: impl Into<String>) -> Self {
        Self {
            node_type,
            statement: statement.into(),
            inference: None,
            dependencies: Vec::new(),
            validation_dependencies: Vec::new(),
        }
    }

    pub fn claim(statement: impl Into<String>) -> Self {
        Self::new(NodeType::Claim, statement)
    }

    pub fn inference(mut self, tag: impl Into<String>) -> Self {
        self.inference = Some(tag.into());
        self
    }

    /// Cite another node the statement logically relies on.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Require another node to be validated before this one may be accepted.
    pub fn requires_validated(mut self, id: impl Into<String>) -> Self {
        self.validation_dependencies.push(id.into());
        self
    }

    /// Check the textual fields and convert them to domain types.
    pub fn resolve(&self) -> Result<NewNode, ProofError> {
        let statement = NonEmptyString::new(self.statement.as_str())
            .map_err(|_| ProofError::EmptyText { field: "statement" })?;
        let inference = match &self.inference {
            Some(tag) => InferenceTag::new(tag.as_str())?,
            None => InferenceTag::assumption(),
        };
        Ok(NewNode {
            node_type: self.node_type,
            statement,
            inference,
            dependencies: parse_ids(&self.dependencies)?,
            validation_dependencies: parse_ids(&self.validation_dependencies)?,
        })
    }
}

fn parse_ids(ids: &[String]) -> Result<Vec<NodeId>, ProofError> {
    ids.iter()
        .map(|id| NodeId::parse(id).map_err(ProofError::from))
        .collect()
}

/// A [`NodeSpec`] whose fields are well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub node_type: NodeType,
    pub statement: NonEmptyString,
    pub inference: InferenceTag,
    pub dependencies: Vec<NodeId>,
    pub validation_dependencies: Vec<NodeId>,
}

/// A node was created deeper than the proof's warning threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthWarning {
    pub id: NodeId,
    pub depth: usize,
    pub warn_depth: u32,
}

impl fmt::Display for DepthWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} is at depth {}, beyond the suggested limit of {}; consider restructuring",
            self.id, self.depth, self.warn_depth
        )
    }
}

/// An admitted creation: the event to append and any soft warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub event: Event,
    pub warning: Option<DepthWarning>,
}

/// Creation gate for a single `NodeCreated`.
pub fn check_creation(
    state: &State,
    config: &ProofConfig,
    id: &NodeId,
    owner: &AgentId,
    node: NewNode,
    now: DateTime<Utc>,
) -> Result<Admitted, ProofError> {
    let parent = id.parent().ok_or(ProofError::RootCreation)?;
    if state.get_node(id).is_some() {
        return Err(ProofError::NodeExists(id.clone()));
    }
    require_pending(state, &parent)?;
    check_ownership(state, &parent, owner, now)?;

    let depth = id.depth();
    if depth > config.max_depth as usize {
        return Err(ProofError::DepthExceeded {
            id: id.clone(),
            depth,
            max_depth: config.max_depth,
        });
    }

    let mut missing: Vec<NodeId> = Vec::new();
    for dep in node.dependencies.iter().chain(&node.validation_dependencies) {
        if state.get_node(dep).is_none() && !missing.contains(dep) {
            missing.push(dep.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ProofError::MissingDependencies {
            id: id.clone(),
            missing,
        });
    }

    let undefined: Vec<String> = cited_definitions(node.statement.as_str())
        .into_iter()
        .filter(|name| state.definition_by_name(name).is_none())
        .map(str::to_owned)
        .collect();
    if !undefined.is_empty() {
        return Err(ProofError::MissingDefinitions {
            id: id.clone(),
            missing: undefined,
        });
    }

    let warning = (depth > config.warn_depth as usize).then(|| DepthWarning {
        id: id.clone(),
        depth,
        warn_depth: config.warn_depth,
    });
    if let Some(warning) = &warning {
        warn!(node = %id, depth, warn_depth = config.warn_depth, "{warning}");
    }

    Ok(Admitted {
        event: Event::NodeCreated {
            id: id.clone(),
            parent,
            node_type: node.node_type,
            statement: node.statement,
            inference: node.inference,
            dependencies: node.dependencies,
            validation_dependencies: node.validation_dependencies,
        },
        warning,
    })
}

// ============================================================================
// Acceptance
// ============================================================================

/// Caller-supplied acceptance parameters, identifiers in textual form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptOptions {
    /// Recorded verbatim with the event.
    pub note: Option<String>,
    /// The verifier accepting the node.
    pub agent: Option<String>,
    /// Accept even though `agent` raised no challenges against the node.
    pub allow_no_challenges: bool,
}

impl AcceptOptions {
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn by(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn allow_no_challenges(mut self) -> Self {
        self.allow_no_challenges = true;
        self
    }

    pub fn resolve(&self) -> Result<AcceptPolicy, ProofError> {
        Ok(AcceptPolicy {
            note: self.note.clone(),
            agent: self.agent.as_deref().map(AgentId::new).transpose()?,
            allow_no_challenges: self.allow_no_challenges,
        })
    }
}

/// Well-formed [`AcceptOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptPolicy {
    pub note: Option<String>,
    pub agent: Option<AgentId>,
    pub allow_no_challenges: bool,
}

/// Outcome of a successful acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub id: NodeId,
    pub note: Option<String>,
    /// Challenges on the node by severity, including the non-blocking ones.
    pub challenges: BTreeMap<Severity, ChallengeCounts>,
}

/// Acceptance gate for a single `NodeValidated`.
///
/// Reports every unvalidated validation dependency and every blocking
/// challenge together, so they can all be addressed before retrying.
pub fn check_acceptance(
    state: &State,
    id: &NodeId,
    policy: &AcceptPolicy,
) -> Result<(Event, Acceptance), ProofError> {
    let node = require_pending(state, id)?;

    let unvalidated: Vec<NodeId> = node
        .validation_dependencies
        .iter()
        .filter(|dep| {
            state
                .get_node(dep)
                .is_none_or(|dep| dep.state != EpistemicState::Validated)
        })
        .cloned()
        .collect();

    let challenges = state.challenges_for(id);
    let blocking: Vec<BlockingChallenge> = challenges
        .iter()
        .filter(|challenge| challenge.blocks_acceptance())
        .map(|challenge| BlockingChallenge {
            id: challenge.id.clone(),
            target: challenge.target,
            severity: challenge.severity,
            reason: challenge.reason.to_string(),
        })
        .collect();

    if !unvalidated.is_empty() || !blocking.is_empty() {
        return Err(ProofError::AcceptanceBlocked {
            id: id.clone(),
            unvalidated,
            challenges: blocking,
        });
    }

    if let Some(agent) = &policy.agent
        && !policy.allow_no_challenges
        && !challenges
            .iter()
            .any(|challenge| challenge.raised_by.as_ref() == Some(agent))
    {
        return Err(ProofError::NoChallengesRaised {
            id: id.clone(),
            agent: agent.clone(),
        });
    }

    let event = Event::NodeValidated {
        id: id.clone(),
        note: policy.note.clone(),
        accepted_by: policy.agent.clone(),
    };
    let acceptance = Acceptance {
        id: id.clone(),
        note: policy.note.clone(),
        challenges: state.challenge_counts(id),
    };
    Ok((event, acceptance))
}

// ============================================================================
// Refutation, challenges, definitions
// ============================================================================

/// Refutation only requires a pending node.
pub fn check_refutation(
    state: &State,
    id: &NodeId,
    reason: Option<String>,
    agent: Option<AgentId>,
) -> Result<Event, ProofError> {
    require_pending(state, id)?;
    Ok(Event::NodeRefuted {
        id: id.clone(),
        reason,
        refuted_by: agent,
    })
}

/// A well-formed challenge ready to be checked against state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChallenge {
    pub id: ChallengeId,
    pub node: NodeId,
    pub target: ChallengeTarget,
    pub reason: NonEmptyString,
    pub severity: Severity,
    pub raised_by: Option<AgentId>,
}

pub fn check_challenge(state: &State, challenge: NewChallenge) -> Result<Event, ProofError> {
    require_pending(state, &challenge.node)?;
    if state.challenge(&challenge.id).is_some() {
        return Err(ProofError::ChallengeExists(challenge.id));
    }
    Ok(Event::ChallengeRaised {
        id: challenge.id,
        node: challenge.node,
        target: challenge.target,
        reason: challenge.reason,
        severity: challenge.severity,
        raised_by: challenge.raised_by,
    })
}

pub fn check_resolution(
    state: &State,
    id: &ChallengeId,
    resolution: Option<String>,
) -> Result<Event, ProofError> {
    let challenge = state
        .challenge(id)
        .ok_or_else(|| ProofError::ChallengeNotFound(id.clone()))?;
    if challenge.resolved {
        return Err(ProofError::ChallengeResolved(id.clone()));
    }
    Ok(Event::ChallengeResolved {
        challenge: id.clone(),
        resolution,
    })
}

pub fn check_definition(
    state: &State,
    name: DefinitionName,
    description: NonEmptyString,
) -> Result<Event, ProofError> {
    if state.has_definition(&name) {
        return Err(ProofError::DefinitionExists(name));
    }
    Ok(Event::DefinitionAdded { name, description })
}
