#![forbid(unsafe_code)]

//! Error types for the binding runtime.

use std::panic::Location;

use thiserror::Error;

use crate::observation::Context;

/// Faults raised while evaluating, assigning or connecting an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluateError {
    #[error("{0} is not a function")]
    NotAFunction(String),

    #[error("expression is not assignable: {0}")]
    NotAssignable(String),

    #[error("no value converter named \"{0}\" was found")]
    UnknownValueConverter(String),

    #[error("no binding behavior named \"{0}\" was found")]
    UnknownBindingBehavior(String),

    #[error("a binding behavior named \"{0}\" has already been applied to this binding")]
    DuplicateBindingBehavior(String),
}

/// Faults raised by a binding or an observer notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),

    #[error("unexpected notification context: {0:?}")]
    UnexpectedContext(Context),
}

/// A queued task failed and did not handle its own error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("uncaught task error: {error}{}", queue_site(.queued_at))]
pub struct TaskError {
    #[source]
    pub error: BindingError,
    /// Where the failing task was queued, when long stacks are enabled.
    pub queued_at: Option<&'static Location<'static>>,
}

impl TaskError {
    #[must_use]
    pub fn new(error: BindingError, queued_at: Option<&'static Location<'static>>) -> Self {
        Self { error, queued_at }
    }
}

fn queue_site(site: &Option<&'static Location<'static>>) -> String {
    site.map(|site| format!(" (queued at {site})"))
        .unwrap_or_default()
}

impl From<BindingError> for TaskError {
    fn from(error: BindingError) -> Self {
        Self::new(error, None)
    }
}

/// No parser could produce an expression for the given text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no parsed expression is available for \"{0}\"")]
    Unknown(String),
}

/// Failure loading an [`EngineConfig`](crate::config::EngineConfig) from a file.
#[cfg(feature = "policy-config")]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config extension: {0}")]
    UnsupportedFormat(String),
}

pub type EvaluateResult<T> = Result<T, EvaluateError>;
pub type BindingResult<T> = Result<T, BindingError>;
