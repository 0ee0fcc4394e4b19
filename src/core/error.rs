//! Unified error taxonomy for the core (spec §7).
//!
//! Errors are grouped into five families — Input, State, External, Security,
//! System — each its own enum, unified under [`CoreError`]. Tool handlers
//! never let an error escape as a panic: every variant carries enough
//! context to render the single-line "sigil + kind + message" shape tool
//! dispatch (§4.H) puts on the wire.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error("argument out of range: {0}")]
    ArgumentOutOfRange(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("parent node not found: {0}")]
    MissingParent(String),
    #[error("hierarchy violation: {0}")]
    HierarchyViolation(String),
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
    #[error("corrupt blob: {0}")]
    CorruptBlob(String),
}

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("external LLM call timed out after {0:?}")]
    LlmTimeout(std::time::Duration),
    #[error("external LLM rejected the request: {0}")]
    LlmRejected(String),
    #[error("redis unavailable: {0}")]
    RedisUnavailable(String),
}

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("manipulation threat critical")]
    ManipulationCritical,
    #[error("principal loyalty breach")]
    PrincipalLoyaltyBreach,
    #[error("validator override irrecoverable")]
    ValidatorOverrideIrrecoverable,
}

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("I/O failure: {0}")]
    IoFailure(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    System(#[from] SystemError),
}

impl CoreError {
    /// Short UPPER_SNAKE kind tag used in tool-dispatch error lines and
    /// JSON-RPC error mapping (§6, §7).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Input(InputError::MalformedRequest(_)) => "MalformedRequest",
            CoreError::Input(InputError::SchemaViolation(_)) => "SchemaViolation",
            CoreError::Input(InputError::ArgumentOutOfRange(_)) => "ArgumentOutOfRange",
            CoreError::State(StateError::MissingParent(_)) => "MissingParent",
            CoreError::State(StateError::HierarchyViolation(_)) => "HierarchyViolation",
            CoreError::State(StateError::VersionMismatch { .. }) => "VersionMismatch",
            CoreError::State(StateError::CorruptBlob(_)) => "CorruptBlob",
            CoreError::External(ExternalError::LlmTimeout(_)) => "LLMTimeout",
            CoreError::External(ExternalError::LlmRejected(_)) => "LLMRejected",
            CoreError::External(ExternalError::RedisUnavailable(_)) => "RedisUnavailable",
            CoreError::Security(SecurityError::ManipulationCritical) => "ManipulationCritical",
            CoreError::Security(SecurityError::PrincipalLoyaltyBreach) => "PrincipalLoyaltyBreach",
            CoreError::Security(SecurityError::ValidatorOverrideIrrecoverable) => {
                "ValidatorOverrideIrrecoverable"
            }
            CoreError::System(SystemError::IoFailure(_)) => "IOFailure",
            CoreError::System(SystemError::OutOfMemory) => "OutOfMemory",
            CoreError::System(SystemError::InternalInvariant(_)) => "InternalInvariant",
        }
    }

    /// True for the Security family — these are never masked and always
    /// logged + persisted as an incident (§7 propagation policy).
    pub fn is_security(&self) -> bool {
        matches!(self, CoreError::Security(_))
    }

    /// True for the System family — repeated InternalInvariant should lead
    /// the process to exit(1) after flushing state (§7).
    pub fn is_internal_invariant(&self) -> bool {
        matches!(self, CoreError::System(SystemError::InternalInvariant(_)))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::System(SystemError::IoFailure(err.to_string()))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::State(StateError::CorruptBlob(err.to_string()))
    }
}
