use std::fmt;

/// Error types for the tactic miner
#[derive(Debug, Clone)]
pub enum TacticMinerError {
    /// Invalid chess position (unparsable FEN, bad replay)
    InvalidPosition(String),
    /// Move that is malformed or illegal in the position it was applied to
    InvalidMove(String),
    /// Engine output that lacks a principal variation or a score
    MalformedAnalysis(String),
    /// A position key was loaded while a handle for it is still open
    AlreadyCheckedOut(String),
    /// Commit of a position key that has no open checkout
    NotCheckedOut(String),
    /// Position store used before `open` or after `close`
    StoreNotOpen,
    /// Database operation failed
    DatabaseError(String),
    /// Analysis engine process failed
    EngineError(String),
    /// Move statistics service failed
    StatsError(String),
    /// Move statistics service asked us to slow down
    RateLimited(String),
    /// File I/O operation failed
    IoError(String),
    /// Configuration error
    ConfigurationError(String),
    /// Validation error with context
    ValidationError {
        field: String,
        value: String,
        expected: String,
    },
    /// Chained error with context
    ChainedError {
        source: Box<TacticMinerError>,
        context: String,
    },
}

impl fmt::Display for TacticMinerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TacticMinerError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
            TacticMinerError::InvalidMove(msg) => write!(f, "Invalid move: {}", msg),
            TacticMinerError::MalformedAnalysis(msg) => write!(f, "Malformed analysis: {}", msg),
            TacticMinerError::AlreadyCheckedOut(key) => {
                write!(f, "Position already checked out: {}", key)
            }
            TacticMinerError::NotCheckedOut(key) => {
                write!(f, "Position committed without checkout: {}", key)
            }
            TacticMinerError::StoreNotOpen => write!(f, "Position store is not open"),
            TacticMinerError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            TacticMinerError::EngineError(msg) => write!(f, "Engine error: {}", msg),
            TacticMinerError::StatsError(msg) => write!(f, "Move statistics error: {}", msg),
            TacticMinerError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            TacticMinerError::IoError(msg) => write!(f, "I/O error: {}", msg),
            TacticMinerError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            TacticMinerError::ValidationError { field, value, expected } => {
                write!(f, "Validation failed for field '{}': got '{}', expected '{}'", field, value, expected)
            }
            TacticMinerError::ChainedError { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for TacticMinerError {}

// Convenience type alias
pub type Result<T> = std::result::Result<T, TacticMinerError>;

// Convert from common error types
impl From<std::io::Error> for TacticMinerError {
    fn from(error: std::io::Error) -> Self {
        TacticMinerError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for TacticMinerError {
    fn from(error: serde_json::Error) -> Self {
        TacticMinerError::IoError(format!("JSON serialization error: {}", error))
    }
}

impl From<bincode::Error> for TacticMinerError {
    fn from(error: bincode::Error) -> Self {
        TacticMinerError::DatabaseError(format!("Binary serialization error: {}", error))
    }
}

impl From<rusqlite::Error> for TacticMinerError {
    fn from(error: rusqlite::Error) -> Self {
        TacticMinerError::DatabaseError(error.to_string())
    }
}

/// Retry helpers for the remote statistics service
pub mod resilience {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tracing::warn;

    /// Run `operation` until it stops reporting `RateLimited`, sleeping
    /// `interval` between attempts. There is no attempt limit; any other
    /// error is returned to the caller untouched.
    pub fn retry_while_rate_limited<T, F>(
        operation_name: &str,
        interval: Duration,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt: u64 = 1;
        loop {
            match operation() {
                Err(TacticMinerError::RateLimited(reason)) => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        wait_secs = interval.as_secs(),
                        %reason,
                        "rate limited, waiting before retry"
                    );
                    thread::sleep(interval);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

// Helper macros for error creation
#[macro_export]
macro_rules! invalid_position {
    ($msg:expr) => {
        $crate::errors::TacticMinerError::InvalidPosition($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::TacticMinerError::InvalidPosition(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! malformed_analysis {
    ($msg:expr) => {
        $crate::errors::TacticMinerError::MalformedAnalysis($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::TacticMinerError::MalformedAnalysis(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::TacticMinerError::ConfigurationError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::TacticMinerError::ConfigurationError(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($field:expr, $value:expr, $expected:expr) => {
        $crate::errors::TacticMinerError::ValidationError {
            field: $field.to_string(),
            value: $value.to_string(),
            expected: $expected.to_string(),
        }
    };
}

#[macro_export]
macro_rules! add_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| $crate::errors::TacticMinerError::ChainedError {
            source: Box::new(e),
            context: $context.to_string(),
        })
    };
}
