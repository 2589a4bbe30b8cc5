// Structured rejections sent back to the requesting connection only.
//
// Every failure of a game request is reported as an `ErrorReport`: a closed
// `ErrorKind`, a human-readable detail string, and (for per-descriptor
// failures) the index of the descriptor that failed. Kinds are grouped into
// categories so a client can tell "the request was malformed" apart from
// "the request was fine but the world forbids it right now".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable failure kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The message could not be decoded.
    Decode,
    UnknownAggregate,
    NotOwner,
    EmptyBatch,
    UnknownSubject,
    UnknownDestination,
    UnknownGoodsType,
    InvalidRole,
    /// The rules engine refused a descriptor while applying the batch.
    ConstraintViolation,
}

/// Broad grouping of `ErrorKind`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Protocol,
    Authorization,
    Validation,
    Application,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::Decode => ErrorCategory::Protocol,
            ErrorKind::UnknownAggregate | ErrorKind::NotOwner => ErrorCategory::Authorization,
            ErrorKind::EmptyBatch
            | ErrorKind::UnknownSubject
            | ErrorKind::UnknownDestination
            | ErrorKind::UnknownGoodsType
            | ErrorKind::InvalidRole => ErrorCategory::Validation,
            ErrorKind::ConstraintViolation => ErrorCategory::Application,
        }
    }
}

/// A rejected request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub detail: String,
    /// Index of the failing descriptor, when one is to blame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{:?} at change {i}: {}", self.kind, self.detail),
            None => write!(f, "{:?}: {}", self.kind, self.detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_separate_malformed_from_forbidden() {
        assert_eq!(ErrorKind::Decode.category(), ErrorCategory::Protocol);
        assert_eq!(ErrorKind::NotOwner.category(), ErrorCategory::Authorization);
        assert_eq!(
            ErrorKind::UnknownSubject.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ErrorKind::ConstraintViolation.category(),
            ErrorCategory::Application
        );
    }

    #[test]
    fn display_includes_index() {
        let report = ErrorReport::new(ErrorKind::UnknownSubject, "unit:9 does not exist").at(2);
        assert_eq!(
            report.to_string(),
            "UnknownSubject at change 2: unit:9 does not exist"
        );
    }
}
