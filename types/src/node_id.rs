//! Hierarchical node addresses.
//!
//! A [`NodeId`] is a non-empty sequence of positive integers printed with `.`
//! separators (`1`, `1.2`, `1.2.3`). Every address is rooted at `1`, so the
//! parent of any non-root node is simply its prefix.
//!
//! Zero is structurally unrepresentable via `NonZeroU32`, and the only
//! constructors are [`NodeId::root`], [`NodeId::parse`] and [`NodeId::child`],
//! so a held `NodeId` is always well-formed.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SEPARATOR: char = '.';
const ROOT_SEGMENT: NonZeroU32 = NonZeroU32::MIN;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(Vec<NonZeroU32>);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid node id {input:?}: {reason}")]
pub struct NodeIdError {
    pub input: String,
    pub reason: NodeIdErrorReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeIdErrorReason {
    #[error("identifier is empty")]
    Empty,
    #[error("segment {position} is empty (leading, trailing or doubled separator)")]
    EmptySegment { position: usize },
    #[error("segment {segment:?} is not a positive integer")]
    NotNumeric { segment: String },
    #[error("segment values must be positive")]
    ZeroSegment,
    #[error("identifier must start at the root segment 1, found {first}")]
    NotRooted { first: u32 },
}

impl NodeId {
    /// The proof root, `1`.
    #[must_use]
    pub fn root() -> Self {
        Self(vec![ROOT_SEGMENT])
    }

    pub fn parse(input: &str) -> Result<Self, NodeIdError> {
        let fail = |reason| NodeIdError {
            input: input.to_owned(),
            reason,
        };

        if input.is_empty() {
            return Err(fail(NodeIdErrorReason::Empty));
        }

        let mut segments = Vec::new();
        for (position, raw) in input.split(SEPARATOR).enumerate() {
            if raw.is_empty() {
                return Err(fail(NodeIdErrorReason::EmptySegment { position }));
            }
            // `u32::from_str` accepts a leading `+`; only bare digits are valid here.
            if !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(fail(NodeIdErrorReason::NotNumeric {
                    segment: raw.to_owned(),
                }));
            }
            let value: u32 = raw.parse().map_err(|_err| {
                fail(NodeIdErrorReason::NotNumeric {
                    segment: raw.to_owned(),
                })
            })?;
            let value = NonZeroU32::new(value).ok_or_else(|| fail(NodeIdErrorReason::ZeroSegment))?;
            segments.push(value);
        }

        if segments[0] != ROOT_SEGMENT {
            return Err(fail(NodeIdErrorReason::NotRooted {
                first: segments[0].get(),
            }));
        }

        Ok(Self(segments))
    }

    /// The address of child `n` of this node.
    #[must_use]
    pub fn child(&self, n: NonZeroU32) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(n);
        Self(segments)
    }

    /// The parent address, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Number of segments; the root has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Final segment: the child index under the parent.
    #[must_use]
    pub fn last_segment(&self) -> NonZeroU32 {
        // Non-empty by construction.
        self.0[self.0.len() - 1]
    }

    pub fn segments(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().map(|segment| segment.get())
    }

    /// True if `self` is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &NodeId) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_string()
    }
}
