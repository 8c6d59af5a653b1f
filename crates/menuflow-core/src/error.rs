//! Error types for the navigation core.
//!
//! Navigation operations never return these to their callers: a failed
//! `open_overlay` or `go_back` is logged and resolves to
//! [`NavOutcome::Rejected`](crate::controller::NavOutcome::Rejected).
//! Builders and lookups that run at composition time return them directly.

use thiserror::Error;

use crate::overlay::OverlayKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavError {
    /// The requested overlay does not exist on this controller.
    #[error("invalid navigation target on controller '{controller}': {target}")]
    InvalidTarget { controller: String, target: String },

    /// No template is registered for the requested overlay kind.
    #[error("no overlay template for kind '{0}'")]
    MissingTemplate(OverlayKind),

    /// More than one hosted overlay claims to be the default.
    #[error("controller '{controller}' has more than one default overlay ('{first}', '{second}')")]
    DuplicateDefault {
        controller: String,
        first: OverlayKind,
        second: OverlayKind,
    },

    /// The controller was built outside a tokio runtime.
    #[error("controller '{0}' must be built inside a tokio runtime")]
    NoRuntime(String),
}

pub type NavResult<T> = Result<T, NavError>;
