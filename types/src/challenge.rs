use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// How strongly a challenge objects to a node.
///
/// `Critical` and `Major` challenges block acceptance while unresolved;
/// `Minor` and `Note` are kept for the audit trail only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Note,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Critical, Self::Major, Self::Minor, Self::Note];

    const EXPECTED: &'static str = "critical, major, minor, note";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Note => "note",
        }
    }

    #[must_use]
    pub const fn blocks_acceptance(self) -> bool {
        matches!(self, Self::Critical | Self::Major)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "note" => Ok(Self::Note),
            other => Err(UnknownVariant {
                kind: "severity",
                value: other.to_owned(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Which part of a node a challenge is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeTarget {
    Statement,
    Inference,
    Context,
    Dependencies,
    Scope,
    Gap,
    TypeError,
    Domain,
    Completeness,
}

impl ChallengeTarget {
    const EXPECTED: &'static str =
        "statement, inference, context, dependencies, scope, gap, type_error, domain, completeness";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Statement => "statement",
            Self::Inference => "inference",
            Self::Context => "context",
            Self::Dependencies => "dependencies",
            Self::Scope => "scope",
            Self::Gap => "gap",
            Self::TypeError => "type_error",
            Self::Domain => "domain",
            Self::Completeness => "completeness",
        }
    }
}

impl fmt::Display for ChallengeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeTarget {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statement" => Ok(Self::Statement),
            "inference" => Ok(Self::Inference),
            "context" => Ok(Self::Context),
            "dependencies" => Ok(Self::Dependencies),
            "scope" => Ok(Self::Scope),
            "gap" => Ok(Self::Gap),
            "type_error" => Ok(Self::TypeError),
            "domain" => Ok(Self::Domain),
            "completeness" => Ok(Self::Completeness),
            other => Err(UnknownVariant {
                kind: "challenge target",
                value: other.to_owned(),
                expected: Self::EXPECTED,
            }),
        }
    }
}
