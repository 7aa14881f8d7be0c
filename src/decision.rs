//! Detection outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a request was blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The explicit trigger query parameter was present. Overrides
    /// everything, including allow-listed agents; it exists for manual
    /// testing.
    ScrambleParameter,
    /// The user-agent matched an active deny-list pattern.
    KnownBadAgent,
    /// The visitor exceeded the sliding-window rate limit.
    RateLimitExceeded { count: u32, limit: u32 },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ScrambleParameter => write!(f, "scramble_parameter"),
            BlockReason::KnownBadAgent => write!(f, "known_bad_agent"),
            BlockReason::RateLimitExceeded { count, limit } => {
                write!(f, "rate_limit_exceeded:{count}/{limit}")
            }
        }
    }
}

/// Outcome of classifying one request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub blocked: bool,
    pub reason: Option<BlockReason>,
    pub visitor_id: String,
}

impl DetectionResult {
    pub fn allowed(visitor_id: impl Into<String>) -> Self {
        Self {
            blocked: false,
            reason: None,
            visitor_id: visitor_id.into(),
        }
    }

    pub fn blocked(visitor_id: impl Into<String>, reason: BlockReason) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
            visitor_id: visitor_id.into(),
        }
    }

    /// Reason string for audit logging; `None` when allowed.
    pub fn reason_string(&self) -> Option<String> {
        self.reason.as_ref().map(|r| r.to_string())
    }
}
