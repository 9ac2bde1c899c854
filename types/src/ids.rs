use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },
    #[error("{kind} {value:?} contains whitespace or control characters")]
    InvalidCharacters { kind: &'static str, value: String },
    #[error("{kind} {value:?} must match [A-Za-z0-9_][A-Za-z0-9_-]*")]
    InvalidToken { kind: &'static str, value: String },
}

fn validate_opaque(kind: &'static str, value: String) -> Result<String, IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(IdentifierError::InvalidCharacters { kind, value });
    }
    Ok(value)
}

/// Tokens are what statement text can cite (`def:<name>`), so they use a
/// restricted alphabet the citation scanner can find unambiguously.
fn validate_token(kind: &'static str, value: String) -> Result<String, IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    let mut chars = value.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if head_ok && tail_ok {
        Ok(value)
    } else {
        Err(IdentifierError::InvalidToken { kind, value })
    }
}

/// Identity of a prover or verifier acting on the proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        validate_opaque("agent id", value.into()).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(value: AgentId) -> Self {
        value.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied challenge identifier, unique across a proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChallengeId(String);

impl ChallengeId {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        validate_opaque("challenge id", value.into()).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChallengeId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChallengeId> for String {
    fn from(value: ChallengeId) -> Self {
        value.0
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a definition, cited in statements as `def:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DefinitionName(String);

impl DefinitionName {
    /// Prefix marking a definition citation inside statement text.
    pub const CITATION_PREFIX: &'static str = "def:";

    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        validate_token("definition name", value.into()).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The citation token that refers to this definition.
    #[must_use]
    pub fn citation(&self) -> String {
        format!("{}{}", Self::CITATION_PREFIX, self.0)
    }
}

impl TryFrom<String> for DefinitionName {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DefinitionName> for String {
    fn from(value: DefinitionName) -> Self {
        value.0
    }
}

impl fmt::Display for DefinitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Justification tag naming the inference rule a node relies on.
///
/// The catalogue of rule names lives outside the ledger; any token is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InferenceTag(String);

impl InferenceTag {
    pub const ASSUMPTION: &'static str = "assumption";

    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        validate_token("inference tag", value.into()).map(Self)
    }

    /// Tag used for the root conjecture, which is asserted rather than derived.
    #[must_use]
    pub fn assumption() -> Self {
        Self(Self::ASSUMPTION.to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InferenceTag {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InferenceTag> for String {
    fn from(value: InferenceTag) -> Self {
        value.0
    }
}

impl fmt::Display for InferenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
