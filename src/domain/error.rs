//! Error handling types.

use thiserror::Error;

/// Result type alias for operations that can fail.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the code-intelligence engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Embedding provider error: {message}")]
    Embedding { message: String },

    #[error("Vector store error: {message}")]
    Store { message: String, corruption: bool },

    #[error("Vector store unavailable after {attempts} recovery attempts: {message}")]
    StoreUnavailable { message: String, attempts: u32 },

    #[error("Integrity violation: {message}")]
    Integrity { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a parse error for a given file.
    pub fn parse<P: Into<String>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an embedding provider error.
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a vector store error.
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
            corruption: false,
        }
    }

    /// Create a vector store error flagged as corruption.
    ///
    /// Corruption errors trigger the recovery protocol instead of a plain
    /// retry.
    pub fn corruption<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
            corruption: true,
        }
    }

    /// Create an integrity violation error.
    pub fn integrity<S: Into<String>>(message: S) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the error indicates detectable store corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Store {
                corruption: true,
                ..
            }
        )
    }

    /// True for cooperative termination (cancel / deadline).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Process exit code when surfaced through a CLI adapter.
    ///
    /// 0 success; 1 generic; 2 configuration; 3 store unavailable/corrupt;
    /// 4 cancelled/timeout.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidArgument { .. } => 2,
            Self::StoreUnavailable { .. } => 3,
            Self::Store {
                corruption: true, ..
            } => 3,
            Self::Cancelled | Self::DeadlineExceeded => 4,
            _ => 1,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::Internal { message: s }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Self::Internal {
            message: s.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_cli_contract() {
        assert_eq!(Error::config("bad key").exit_code(), 2);
        assert_eq!(
            Error::StoreUnavailable {
                message: "gone".into(),
                attempts: 3
            }
            .exit_code(),
            3
        );
        assert_eq!(Error::corruption("bad magic").exit_code(), 3);
        assert_eq!(Error::Cancelled.exit_code(), 4);
        assert_eq!(Error::DeadlineExceeded.exit_code(), 4);
        assert_eq!(Error::embedding("model down").exit_code(), 1);
    }

    #[test]
    fn corruption_flag_is_detectable() {
        assert!(Error::corruption("x").is_corruption());
        assert!(!Error::store("x").is_corruption());
    }
}
