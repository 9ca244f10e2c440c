// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types and the diagnostics channel used by the topology engine.
//!
//! Most engine operations degrade silently (a `None`, `false` or zero count).
//! The few seams that validate caller input return [`TopologyError`]; coded
//! failures and warnings raised while an algorithm runs are collected in
//! [`Diagnostics`] and mirrored to the `log` facade.

use std::fmt;
use thiserror::Error;

/// Result alias for fallible engine entry points.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors returned by validating entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// A topological invariant does not hold.
    #[error("topology invariant violated: {check} at {element}: {details}")]
    InvariantViolated {
        check: &'static str,
        element: String,
        details: String,
    },

    /// A parameter is out of range.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl TopologyError {
    pub fn invalid_param<T: fmt::Display>(name: &'static str, value: T, reason: &'static str) -> Self {
        TopologyError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    pub fn invariant(check: &'static str, element: impl fmt::Display, details: impl Into<String>) -> Self {
        TopologyError::InvariantViolated {
            check,
            element: element.to_string(),
            details: details.into(),
        }
    }
}

/// Enumerated failure codes reported through [`Diagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Fail,
    Degenerate,
    BooleanANotClosed,
    BooleanBNotClosed,
    BooleanANotPoly,
    BooleanBNotPoly,
    BooleanPrecision,
    SkeletonBadTriangulation,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Fail => "GQ_ERROR_FAIL",
            ErrorCode::Degenerate => "GQ_ERROR_DEGEN",
            ErrorCode::BooleanANotClosed => "GQ_ERROR_BOOLEAN_A_NOT_CLOSED",
            ErrorCode::BooleanBNotClosed => "GQ_ERROR_BOOLEAN_B_NOT_CLOSED",
            ErrorCode::BooleanANotPoly => "GQ_ERROR_BOOLEAN_A_NOT_POLY",
            ErrorCode::BooleanBNotPoly => "GQ_ERROR_BOOLEAN_B_NOT_POLY",
            ErrorCode::BooleanPrecision => "GQ_ERROR_BOOLEAN_PRECISION",
            ErrorCode::SkeletonBadTriangulation => "GQ_ERROR_SKELETON_BAD_TRIANGULATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enumerated warnings reported through [`Diagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    DuplicatePoints,
    InsideOutsideFallback,
    BadPartition,
    AbortedFlipEvent,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::DuplicatePoints => "GQ_WARNING_DUPLICATE_POINTS",
            WarningCode::InsideOutsideFallback => "GQ_WARNING_INSIDE_OUTSIDE_FALLBACK",
            WarningCode::BadPartition => "GQ_WARNING_BAD_PARTITION",
            WarningCode::AbortedFlipEvent => "GQ_WARNING_ABORTED_FLIP_EVENT",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collected failures and warnings for one Detail.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    errors: Vec<(ErrorCode, String)>,
    warnings: Vec<(WarningCode, String)>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", code, message);
        self.errors.push((code, message));
    }

    pub fn warning(&mut self, code: WarningCode, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", code, message);
        self.warnings.push((code, message));
    }

    pub fn errors(&self) -> &[(ErrorCode, String)] {
        &self.errors
    }

    pub fn warnings(&self) -> &[(WarningCode, String)] {
        &self.warnings
    }

    pub fn has_error(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|(c, _)| *c == code)
    }

    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|(c, _)| *c == code)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_records_codes() {
        let mut diag = Diagnostics::new();
        assert!(diag.is_empty());

        diag.error(ErrorCode::Degenerate, "polygon 3 has fewer than three points");
        diag.warning(WarningCode::DuplicatePoints, "merged 2 points");

        assert!(diag.has_error(ErrorCode::Degenerate));
        assert!(!diag.has_error(ErrorCode::Fail));
        assert!(diag.has_warning(WarningCode::DuplicatePoints));
        assert_eq!(diag.errors().len(), 1);

        diag.clear();
        assert!(diag.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = TopologyError::invalid_param("divisions", 0, "must be at least 1");
        assert_eq!(err.to_string(), "invalid parameter: divisions = 0 (must be at least 1)");
        assert_eq!(ErrorCode::Degenerate.to_string(), "GQ_ERROR_DEGEN");
    }
}
