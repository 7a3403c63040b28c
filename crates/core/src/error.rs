//! Error types for the LingoClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and [`Error::error_type`]
//! gives the stable machine-readable name clients switch on.

use thiserror::Error;

use crate::record::Resource;

/// The top-level error type for all LingoClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Quota errors ---
    #[error("Quota error: {0}")]
    Quota(#[from] QuotaError),

    // --- Persistence errors ---
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Auth errors ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Agent run errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Input validation ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable, machine-readable error name.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Provider(e) => e.error_type(),
            Self::Quota(e) => e.error_type(),
            Self::Repository(e) => e.error_type(),
            Self::Tool(ToolError::InvalidArguments(_)) => "validation_error",
            Self::Tool(ToolError::Repository(e)) => e.error_type(),
            Self::Tool(ToolError::Provider(e)) => e.error_type(),
            Self::Tool(_) => "internal_error",
            Self::Auth(e) => e.error_type(),
            Self::Agent(e) => e.error_type(),
            Self::Validation(_) => "validation_error",
            Self::Config { .. } | Self::Serialization(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code matching [`Error::error_type`].
    pub fn status_code(&self) -> u16 {
        status_for(self.error_type())
    }
}

/// Map an `error_type` to its HTTP status.
pub fn status_for(error_type: &str) -> u16 {
    match error_type {
        "token_quota_exceeded" | "too_many_requests" => 429,
        "unauthorized" | "invalid_token" | "user_not_found" => 401,
        "permission_denied" => 403,
        "bad_request" | "validation_error" => 400,
        "database_error" | "internal_error" => 500,
        t if t.ends_with("_not_found") => 404,
        _ => 500,
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Quota(#[from] QuotaError),
}

impl ProviderError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Quota(e) => e.error_type(),
            Self::RateLimited { .. } => "too_many_requests",
            _ => "internal_error",
        }
    }
}

/// Failures of the per-user token bucket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("Token quota exceeded: {remaining} remaining, {required} required")]
    Exceeded { remaining: i64, required: i64 },

    /// The backing store could not be reached or rejected the operation.
    #[error("Quota store failure: {0}")]
    Store(String),
}

impl QuotaError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Exceeded { .. } => "token_quota_exceeded",
            Self::Store(_) => "database_error",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("{resource} {id} not found")]
    NotFound { resource: Resource, id: i64 },

    #[error("{resource} {id} belongs to another user")]
    PermissionDenied { resource: Resource, id: i64 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { resource, .. } => resource.not_found_type(),
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Storage(_) => "database_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("User {0} not found")]
    UserNotFound(i64),
}

impl AuthError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingToken => "unauthorized",
            Self::InvalidToken(_) => "invalid_token",
            Self::UserNotFound(_) => "user_not_found",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Invalid agent input: {0}")]
    InvalidInput(String),

    #[error("Question set {0} not found")]
    QuestionSetNotFound(i64),

    /// The run task panicked or was cancelled before producing a result.
    #[error("Agent task failed: {0}")]
    TaskFailed(String),

    #[error("Agent finished without a result")]
    NoResult,
}

impl AgentError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "bad_request",
            Self::QuestionSetNotFound(_) => "question_set_not_found",
            Self::TaskFailed(_) | Self::NoResult => "internal_error",
        }
    }
}
