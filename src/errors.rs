//! Unified error types for the natspec engine.
//!
//! All engine failure modes are represented by [`SpecError`], classified by
//! the type-safe [`ErrorKind`] enum. The classification is part of the
//! engine's contract: `then_fail` accepts only `ExpectationNotMet` failures,
//! and cleanup failures of any kind are discarded.

use miette::Diagnostic;
use thiserror::Error;

/// Type-safe error classification corresponding to SpecError variants.
///
/// Replaces string-based error kind matching in hosts and in the
/// `then_fail` inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Declaration-time misuse (wrong shapes, `and` without a prior then).
    Usage,
    /// Failure while running a given/when preparation step.
    Preparation,
    /// Natural-assertion failure: an expectation resolved to exactly false.
    ExpectationNotMet,
    /// Arbitrary action failure (user errors, dropped continuations,
    /// inversion mismatches).
    Action,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Usage => "Usage",
            ErrorKind::Preparation => "Preparation",
            ErrorKind::ExpectationNotMet => "ExpectationNotMet",
            ErrorKind::Action => "Action",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for all engine failure modes.
///
/// `Clone` is required because lazy context cells cache their initializer's
/// failure and replay it on every subsequent read.
#[derive(Debug, Clone, Error)]
pub enum SpecError {
    #[error("{keyword}: {message}")]
    Usage { keyword: String, message: String },
    #[error("{message}")]
    Preparation {
        message: String,
        #[source]
        source: Option<Box<SpecError>>,
    },
    #[error("{message}")]
    ExpectationNotMet { message: String },
    #[error("{message}")]
    Action { message: String },
}

impl SpecError {
    pub fn usage(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        SpecError::Usage {
            keyword: keyword.into(),
            message: message.into(),
        }
    }

    pub fn action(message: impl Into<String>) -> Self {
        SpecError::Action {
            message: message.into(),
        }
    }

    pub fn expectation_not_met(message: impl Into<String>) -> Self {
        SpecError::ExpectationNotMet {
            message: message.into(),
        }
    }

    pub fn preparation(message: impl Into<String>, source: SpecError) -> Self {
        SpecError::Preparation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the type-safe classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpecError::Usage { .. } => ErrorKind::Usage,
            SpecError::Preparation { .. } => ErrorKind::Preparation,
            SpecError::ExpectationNotMet { .. } => ErrorKind::ExpectationNotMet,
            SpecError::Action { .. } => ErrorKind::Action,
        }
    }
}

impl Diagnostic for SpecError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match self.kind() {
            ErrorKind::Usage => "natspec::usage",
            ErrorKind::Preparation => "natspec::preparation",
            ErrorKind::ExpectationNotMet => "natspec::expectation_not_met",
            ErrorKind::Action => "natspec::action",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            SpecError::Usage { .. } => Some(Box::new(
                "fix the declaration; usage errors are fatal to spec loading",
            )),
            _ => None,
        }
    }
}
