//! The closed set of facts a proof ledger can record.
//!
//! Events are immutable once appended. State is never stored directly; it is
//! recomputed by folding these records in ledger order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AgentId, ChallengeId, ChallengeTarget, DefinitionName, InferenceTag, NodeId, NodeType,
    NonEmptyString, Severity,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ProofInitialized {
        conjecture: NonEmptyString,
        author: AgentId,
    },
    NodeCreated {
        id: NodeId,
        parent: NodeId,
        node_type: NodeType,
        statement: NonEmptyString,
        inference: InferenceTag,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        dependencies: Vec<NodeId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        validation_dependencies: Vec<NodeId>,
    },
    NodeClaimed {
        id: NodeId,
        owner: AgentId,
        expires_at: DateTime<Utc>,
    },
    NodeReleased {
        id: NodeId,
        owner: AgentId,
    },
    NodeValidated {
        id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accepted_by: Option<AgentId>,
    },
    NodeRefuted {
        id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refuted_by: Option<AgentId>,
    },
    ChallengeRaised {
        id: ChallengeId,
        node: NodeId,
        target: ChallengeTarget,
        reason: NonEmptyString,
        severity: Severity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raised_by: Option<AgentId>,
    },
    ChallengeResolved {
        challenge: ChallengeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolution: Option<String>,
    },
    DefinitionAdded {
        name: DefinitionName,
        description: NonEmptyString,
    },
}

/// Discriminant of an [`Event`], stored alongside the payload for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProofInitialized,
    NodeCreated,
    NodeClaimed,
    NodeReleased,
    NodeValidated,
    NodeRefuted,
    ChallengeRaised,
    ChallengeResolved,
    DefinitionAdded,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProofInitialized => "proof_initialized",
            Self::NodeCreated => "node_created",
            Self::NodeClaimed => "node_claimed",
            Self::NodeReleased => "node_released",
            Self::NodeValidated => "node_validated",
            Self::NodeRefuted => "node_refuted",
            Self::ChallengeRaised => "challenge_raised",
            Self::ChallengeResolved => "challenge_resolved",
            Self::DefinitionAdded => "definition_added",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ProofInitialized { .. } => EventKind::ProofInitialized,
            Self::NodeCreated { .. } => EventKind::NodeCreated,
            Self::NodeClaimed { .. } => EventKind::NodeClaimed,
            Self::NodeReleased { .. } => EventKind::NodeReleased,
            Self::NodeValidated { .. } => EventKind::NodeValidated,
            Self::NodeRefuted { .. } => EventKind::NodeRefuted,
            Self::ChallengeRaised { .. } => EventKind::ChallengeRaised,
            Self::ChallengeResolved { .. } => EventKind::ChallengeResolved,
            Self::DefinitionAdded { .. } => EventKind::DefinitionAdded,
        }
    }

    /// The node an event is about, if it targets one directly.
    #[must_use]
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::NodeCreated { id, .. }
            | Self::NodeClaimed { id, .. }
            | Self::NodeReleased { id, .. }
            | Self::NodeValidated { id, .. }
            | Self::NodeRefuted { id, .. } => Some(id),
            Self::ChallengeRaised { node, .. } => Some(node),
            Self::ProofInitialized { .. }
            | Self::ChallengeResolved { .. }
            | Self::DefinitionAdded { .. } => None,
        }
    }
}
