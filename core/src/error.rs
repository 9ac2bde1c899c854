use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use vetted_config::ConfigError;
use vetted_ledger::LedgerError;
use vetted_types::{
    AgentId, ChallengeId, ChallengeTarget, DefinitionName, EpistemicState, IdentifierError,
    NodeId, NodeIdError, Severity, UnknownVariant,
};

use crate::state::ReplayError;

/// Coarse classification of a [`ProofError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input. Nothing was read or written.
    Format,
    /// The current proof state does not permit the operation.
    Precondition,
    /// Acceptance is blocked; every blocking item is listed.
    Gate,
    /// The ledger contains an event that violates a proof invariant.
    Corruption,
    /// The store could not be read or written.
    Storage,
}

/// An unresolved critical or major challenge standing in the way of acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingChallenge {
    pub id: ChallengeId,
    pub target: ChallengeTarget,
    pub severity: Severity,
    pub reason: String,
}

impl Display for BlockingChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] on {}: {}",
            self.id, self.severity, self.target, self.reason
        )
    }
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error(transparent)]
    InvalidNodeId(#[from] NodeIdError),
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),
    #[error("{field} must not be empty")]
    EmptyText { field: &'static str },
    #[error("lease duration must be positive and representable")]
    InvalidLeaseDuration,
    #[error("batch contains no items")]
    EmptyBatch,

    #[error("no proof found at {}", .0.display())]
    NotInitialized(PathBuf),
    #[error("proof already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} already exists")]
    NodeExists(NodeId),
    #[error("the root node is created by proof initialization")]
    RootCreation,
    #[error("node {id} is {state}, not pending")]
    NotPending { id: NodeId, state: EpistemicState },
    #[error("node {0} is not claimed")]
    NotClaimed(NodeId),
    #[error("node {id} is claimed by {holder}, not {caller}")]
    OwnerMismatch {
        id: NodeId,
        holder: AgentId,
        caller: AgentId,
    },
    #[error("node {id} is claimed by {holder} until {expires_at}")]
    LeaseHeld {
        id: NodeId,
        holder: AgentId,
        expires_at: DateTime<Utc>,
    },
    #[error("node {id} would have depth {depth}, exceeding the maximum of {max_depth}")]
    DepthExceeded {
        id: NodeId,
        depth: usize,
        max_depth: u32,
    },
    #[error("node {id} depends on nodes that do not exist: {}", join(.missing))]
    MissingDependencies { id: NodeId, missing: Vec<NodeId> },
    #[error("node {id} cites undefined definitions: {}", join(.missing))]
    MissingDefinitions { id: NodeId, missing: Vec<String> },
    #[error("definition {0} already exists")]
    DefinitionExists(DefinitionName),
    #[error("challenge {0} already exists")]
    ChallengeExists(ChallengeId),
    #[error("challenge {0} not found")]
    ChallengeNotFound(ChallengeId),
    #[error("challenge {0} is already resolved")]
    ChallengeResolved(ChallengeId),

    #[error("{}", describe_block(.id, .unvalidated, .challenges))]
    AcceptanceBlocked {
        id: NodeId,
        unvalidated: Vec<NodeId>,
        challenges: Vec<BlockingChallenge>,
    },
    #[error(
        "{agent} raised no challenges against node {id}; accept with the override flag to confirm nothing was found"
    )]
    NoChallengesRaised { id: NodeId, agent: AgentId },

    #[error("batch item {index} failed: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<ProofError>,
    },

    #[error(transparent)]
    Corrupt(#[from] ReplayError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProofError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidNodeId(_)
            | Self::InvalidIdentifier(_)
            | Self::UnknownVariant(_)
            | Self::EmptyText { .. }
            | Self::InvalidLeaseDuration
            | Self::EmptyBatch => ErrorKind::Format,
            Self::NotInitialized(_)
            | Self::AlreadyInitialized(_)
            | Self::NodeNotFound(_)
            | Self::NodeExists(_)
            | Self::RootCreation
            | Self::NotPending { .. }
            | Self::NotClaimed(_)
            | Self::OwnerMismatch { .. }
            | Self::LeaseHeld { .. }
            | Self::DepthExceeded { .. }
            | Self::MissingDependencies { .. }
            | Self::MissingDefinitions { .. }
            | Self::DefinitionExists(_)
            | Self::ChallengeExists(_)
            | Self::ChallengeNotFound(_)
            | Self::ChallengeResolved(_) => ErrorKind::Precondition,
            Self::AcceptanceBlocked { .. } | Self::NoChallengesRaised { .. } => ErrorKind::Gate,
            Self::BatchItem { source, .. } => source.kind(),
            Self::Corrupt(_) => ErrorKind::Corruption,
            Self::Ledger(err) if err.is_corruption() => ErrorKind::Corruption,
            Self::Ledger(_) | Self::Config(_) | Self::Io { .. } => ErrorKind::Storage,
        }
    }

    #[must_use]
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }

    /// The error for the failing item itself, unwrapping batch context.
    #[must_use]
    pub fn root_item(&self) -> &Self {
        match self {
            Self::BatchItem { source, .. } => source.root_item(),
            other => other,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn in_batch(self, index: usize) -> Self {
        Self::BatchItem {
            index,
            source: Box::new(self),
        }
    }
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_block(
    id: &NodeId,
    unvalidated: &[NodeId],
    challenges: &[BlockingChallenge],
) -> String {
    let mut out = format!("node {id} cannot be accepted");
    if !unvalidated.is_empty() {
        out.push_str(&format!(
            "; validation dependencies not yet validated: {}",
            join(unvalidated)
        ));
    }
    if !challenges.is_empty() {
        out.push_str(&format!(
            "; blocking challenges: {}; resolve each challenge, or refine node {id} to address it",
            challenges
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        ));
    }
    out
}
