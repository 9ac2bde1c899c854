use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// Structural role of a node in the proof tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// An ordinary claim to be justified by its children or its inference.
    Claim,
    /// Introduces a hypothesis scoped to the subtree.
    LocalAssume,
    /// Closes a scope opened by a local assumption.
    LocalDischarge,
    /// One branch of a case split.
    Case,
    /// Concludes the enclosing argument.
    Qed,
}

impl NodeType {
    const EXPECTED: &'static str = "claim, local_assume, local_discharge, case, qed";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::LocalAssume => "local_assume",
            Self::LocalDischarge => "local_discharge",
            Self::Case => "case",
            Self::Qed => "qed",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claim" => Ok(Self::Claim),
            "local_assume" => Ok(Self::LocalAssume),
            "local_discharge" => Ok(Self::LocalDischarge),
            "case" => Ok(Self::Case),
            "qed" => Ok(Self::Qed),
            other => Err(UnknownVariant {
                kind: "node type",
                value: other.to_owned(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Social verification state of a node.
///
/// `Pending` is the only non-terminal state. A node leaves it exactly once,
/// either through acceptance (`Validated`) or refutation (`Refuted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpistemicState {
    #[default]
    Pending,
    Validated,
    Refuted,
}

impl EpistemicState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Refuted => "refuted",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Validated | Self::Refuted)
    }
}

impl fmt::Display for EpistemicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
