use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedReason {
    FieldCount(usize),
    EmptyField,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::FieldCount(n) => {
                write!(f, "expected 3 comma-separated fields, found {n}")
            }
            MalformedReason::EmptyField => f.write_str("a field is empty"),
        }
    }
}

/// A candidate that could not be read as a triple. Recorded and skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Invalid triplet skipped: {candidate} ({reason})")]
pub struct MalformedTriple {
    pub candidate: String,
    pub reason: MalformedReason,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Read `(subject, predicate, object)` from a candidate string.
    ///
    /// One leading `(` and one trailing `)` are dropped, then the body is split on
    /// every comma with no quoting or escaping: an entity name containing a comma
    /// changes the field count and the candidate is rejected. Fields are trimmed
    /// but otherwise kept verbatim (no case folding).
    pub fn parse(candidate: &str) -> Result<Self, MalformedTriple> {
        let trimmed = candidate.trim();
        let body = trimmed.strip_prefix('(').unwrap_or(trimmed);
        let body = body.strip_suffix(')').unwrap_or(body);

        let fields: Vec<&str> = body.split(',').map(str::trim).collect();
        let malformed = |reason| MalformedTriple {
            candidate: candidate.to_string(),
            reason,
        };

        match fields.as_slice() {
            [subject, predicate, object] => {
                if subject.is_empty() || predicate.is_empty() || object.is_empty() {
                    return Err(malformed(MalformedReason::EmptyField));
                }
                Ok(Self::new(*subject, *predicate, *object))
            }
            _ => Err(malformed(MalformedReason::FieldCount(fields.len()))),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}
