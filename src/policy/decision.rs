//! Pre-check decision outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a pre-check. A block is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The caller may send the request to the provider
    Approved,
    /// The caller must not send the request
    Blocked,
}

impl Decision {
    /// Check if this decision approves the request.
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approved" => Ok(Decision::Approved),
            "blocked" => Ok(Decision::Blocked),
            _ => Err(crate::Error::parse(format!("Unknown decision: {}", s))),
        }
    }
}
