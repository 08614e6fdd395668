use thiserror::Error;

use crate::session::SessionId;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("upstream unavailable: {message}")]
    Upstream { code: &'static str, message: String },
    #[error("not configured: {message}")]
    NotConfigured {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            code: "upstream_unavailable",
            message: message.into(),
        }
    }

    pub fn not_configured(code: &'static str, message: &'static str) -> Self {
        Self::NotConfigured { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. }
            | Self::Upstream { code, .. }
            | Self::NotConfigured { code, .. }
            | Self::Internal { code, .. } => code,
        }
    }
}

/// Failures of the session registry and per-session transports.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session")]
    UnknownSession,
    #[error("session is closed")]
    SessionClosed,
    #[error("session transport has no dispatcher attached")]
    NotAttached,
    #[error("an event stream is already open for this session")]
    StreamAlreadyOpen,
    #[error("cannot resume after event {requested}: oldest retained event is {oldest_available}")]
    ResumeGap {
        requested: u64,
        oldest_available: u64,
    },
    #[error("session id {0} already exists")]
    Collision(SessionId),
}

/// Failures of tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {name} is already registered")]
    DuplicateToolName { name: String },
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("invalid argument {field}: {message}")]
    InvalidArguments { field: String, message: String },
    #[error("tool {tool} failed: {message}")]
    Execution { tool: String, message: String },
    #[error("tool {tool} failed unexpectedly")]
    Internal { tool: String },
}

impl ToolError {
    pub fn invalid_arguments(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            field: field.into(),
            message: message.into(),
        }
    }
}
