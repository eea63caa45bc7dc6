//! Error types for the alignment core.

/// Coarse error taxonomy used by callers to branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InsufficientData,
    OptimizationFailed,
    Backend,
    Config,
}

/// Alignment core errors.
#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    /// Judge, trace, scorer or evaluation run absent.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Request cannot be served with the given input.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Too few labeled examples to spend an optimization cycle.
    #[error(
        "insufficient labeled examples for alignment: found {actual}, need at least {required}"
    )]
    InsufficientData { required: usize, actual: usize },

    /// Optimizer reported failure. Never masked by a fallback.
    #[error("judge optimization failed for {judge_id}: {message}")]
    OptimizationFailed { judge_id: String, message: String },

    /// Remote collaborator failure.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AlignError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::OptimizationFailed { .. } => ErrorKind::OptimizationFailed,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Whether the caller can recover by changing its request (404/400 class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::InsufficientData
        )
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::InsufficientData => 1,
            ErrorKind::Config => 2,
            ErrorKind::OptimizationFailed => 3,
            ErrorKind::Backend => 4,
        }
    }
}

impl From<serde_json::Error> for AlignError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend {
            message: format!("malformed payload: {}", err),
        }
    }
}

/// Result type for alignment core operations.
pub type AlignResult<T> = Result<T, AlignError>;
