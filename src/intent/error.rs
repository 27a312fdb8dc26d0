//! intent::error
//!
//! Stable wire-format error codes surfaced on the response envelope's
//! `error_code` field. `Display` renders the exact token a caller
//! matches on; the enum is `#[non_exhaustive]` so adding a variant is
//! additive and callers should keep a catch-all arm.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    UnknownIntent,
    InvalidRequest,
    NotFound,
    TargetNotFound,
    NotImplemented,
    StrictTargetingRequiresExpectedTargetId,
    ExpectedTargetMismatch,
    RevisionMismatch,
    MissingNote,
    MissingOverrideReason,
    VerifyNoop,
    NotReadyForCompletion,
    TooManyOperationsAfterExpansion,
    RunwayClosed,
    StoreLocked,
    CircularDependency,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            ErrorCode::UnknownIntent => "UNKNOWN_INTENT",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TargetNotFound => "TARGET_NOT_FOUND",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::StrictTargetingRequiresExpectedTargetId => "STRICT_TARGETING_REQUIRES_EXPECTED_TARGET_ID",
            ErrorCode::ExpectedTargetMismatch => "EXPECTED_TARGET_MISMATCH",
            ErrorCode::RevisionMismatch => "REVISION_MISMATCH",
            ErrorCode::MissingNote => "MISSING_NOTE",
            ErrorCode::MissingOverrideReason => "MISSING_OVERRIDE_REASON",
            ErrorCode::VerifyNoop => "VERIFY_NOOP",
            ErrorCode::NotReadyForCompletion => "NOT_READY_FOR_COMPLETION",
            ErrorCode::TooManyOperationsAfterExpansion => "TOO_MANY_OPERATIONS_AFTER_EXPANSION",
            ErrorCode::RunwayClosed => "RUNWAY_CLOSED",
            ErrorCode::StoreLocked => "STORE_LOCKED",
            ErrorCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_stable_wire_token() {
        assert_eq!(ErrorCode::RevisionMismatch.to_string(), "REVISION_MISMATCH");
        assert_eq!(
            ErrorCode::StrictTargetingRequiresExpectedTargetId.to_string(),
            "STRICT_TARGETING_REQUIRES_EXPECTED_TARGET_ID"
        );
    }
}
