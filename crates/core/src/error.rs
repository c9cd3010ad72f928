//! Error types for Scriptbox.

use thiserror::Error;

/// Result type alias using Scriptbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Scriptbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Script Errors
    // =========================================================================
    #[error("{0}")]
    BareAssertion(String),

    #[error("SyntaxError: {0}")]
    ScriptSyntax(String),

    #[error("{0}")]
    ScriptRuntime(String),

    #[error("Script stalled: {0}")]
    ScriptStalled(String),

    // =========================================================================
    // Context Errors
    // =========================================================================
    #[error("Variable tier '{0}' is read-only")]
    ReadOnlyTier(String),

    #[error("Field '{0}' is not writable from scripts")]
    ReadOnlyField(String),

    #[error("Unknown variable tier: {0}")]
    UnknownTier(String),

    #[error("Variable name '{0}' contains invalid characters; names may only contain alphanumerics, '-', '_' and '.'")]
    InvalidVariableName(String),

    #[error("Host callback failed: {0}")]
    HostCallback(String),

    // =========================================================================
    // Capability Errors
    // =========================================================================
    #[error("Module not available: {0}")]
    ModuleUnavailable(String),

    #[error("Module call failed: {0}")]
    ModuleCall(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    // =========================================================================
    // Engine Errors
    // =========================================================================
    #[error("Script engine error: {0}")]
    Engine(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a bare assertion error.
    pub fn bare_assertion(msg: impl Into<String>) -> Self {
        Self::BareAssertion(msg.into())
    }

    /// Create a script runtime error.
    pub fn script_runtime(msg: impl Into<String>) -> Self {
        Self::ScriptRuntime(msg.into())
    }

    /// Create a script syntax error.
    pub fn script_syntax(msg: impl Into<String>) -> Self {
        Self::ScriptSyntax(msg.into())
    }

    /// Create a host callback error.
    pub fn host_callback(msg: impl Into<String>) -> Self {
        Self::HostCallback(msg.into())
    }

    /// Create a module call error.
    pub fn module_call(msg: impl Into<String>) -> Self {
        Self::ModuleCall(msg.into())
    }

    /// Create a script engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error originated in user script code rather than in the engine or host.
    pub fn is_script_error(&self) -> bool {
        matches!(
            self,
            Self::BareAssertion(_)
                | Self::ScriptSyntax(_)
                | Self::ScriptRuntime(_)
                | Self::ScriptStalled(_)
        )
    }
}
