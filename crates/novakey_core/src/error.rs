//! Error types for the NovaKey data-access core.
//!
//! Every failure is a [`GatewayError`]. Errors fall into three classes (see
//! [`ErrorClass`]): fatal startup conditions that the entry point turns into
//! a process abort, validation errors reported to the caller as 4xx, and
//! pipeline/transport errors reported as 5xx.

use crate::models::ValidationError;

use thiserror::Error;

/// Main error type for the gateway core.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Endpoint configuration is missing or malformed.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// SSH key parsing, dial or authentication failed.
    #[error("SSH error: {message}")]
    Ssh {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Local tunnel listener could not be set up.
    #[error("Tunnel error: {message}")]
    Tunnel {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection pool construction or validation failed.
    #[error("Pool error: {message}")]
    Pool {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A pooled connection could not be obtained or was lost mid-call.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request body is not valid JSON for the request type.
    #[error("Cannot parse JSON: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// Request parsed but violated its declared constraints.
    #[error("Validation failed for {} field(s)", .errors.len())]
    Validation {
        /// One entry per violated field, in schema order.
        errors: Vec<ValidationError>,
    },

    /// Procedure name is not a plain SQL identifier.
    #[error("Invalid procedure name: {name:?}")]
    InvalidProcedure {
        /// The rejected name.
        name: String,
    },

    /// Validated request could not be re-serialized.
    #[error("Cannot marshal request: {message}")]
    Serialize {
        /// Serializer message.
        message: String,
    },

    /// Procedure call failed inside PostgreSQL.
    #[error("{message}")]
    Database {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// SQLSTATE code (e.g., "42883").
        code: Option<String>,
    },

    /// Procedure result is not a valid response document.
    #[error("Cannot decode db response: {message}")]
    Decode {
        /// Deserializer message.
        message: String,
    },
}

/// How an error must be handled by whoever receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Startup cannot proceed; the process must not serve requests.
    Fatal,
    /// The request itself is at fault (4xx).
    Validation,
    /// The request was fine but the pipeline failed (5xx).
    Pipeline,
}

impl GatewayError {
    // ========== Constructors ==========

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new SSH error.
    pub fn ssh(message: impl Into<String>) -> Self {
        Self::Ssh { message: message.into(), source: None }
    }

    /// Create a new tunnel error with source.
    pub fn tunnel_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Tunnel { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new pool error.
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool { message: message.into(), source: None }
    }

    /// Create a new pool error with source.
    pub fn pool_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Pool { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    /// Wrap a list of field violations.
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self::Validation { errors }
    }

    /// Create a new serialize error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize { message: message.into() }
    }

    /// Create a new decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    // ========== Methods ==========

    /// Classify this error for the caller.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config { .. } | Self::Ssh { .. } | Self::Tunnel { .. } | Self::Pool { .. } => {
                ErrorClass::Fatal
            }
            Self::Parse { .. } | Self::Validation { .. } | Self::InvalidProcedure { .. } => {
                ErrorClass::Validation
            }
            Self::Connection { .. }
            | Self::Serialize { .. }
            | Self::Database { .. }
            | Self::Decode { .. } => ErrorClass::Pipeline,
        }
    }

    /// Check if this error must abort startup.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// Field violations, if this is a validation error.
    pub fn violations(&self) -> Option<&[ValidationError]> {
        match self {
            Self::Validation { errors } => Some(errors),
            _ => None,
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::Ssh { .. } => "SSH",
            Self::Tunnel { .. } => "Tunnel",
            Self::Pool { .. } => "Pool",
            Self::Connection { .. } => "Connection",
            Self::Parse { .. } => "Parse",
            Self::Validation { .. } => "Validation",
            Self::InvalidProcedure { .. } => "Procedure",
            Self::Serialize { .. } => "Serialize",
            Self::Database { .. } => "Database",
            Self::Decode { .. } => "Decode",
        }
    }

    /// Get actionable hint for the operator.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Check the environment variables and .env file"),
            Self::Ssh { .. } => Some("Check SSH_PRIVATE_KEY, SSH_USER and bastion reachability"),
            Self::Tunnel { .. } => Some("Another process may already be listening on DB_HOST:DB_PORT"),
            Self::Pool { .. } => Some("Check that the database server is running"),
            Self::Connection { .. } => Some("The database may be overloaded or unreachable"),
            Self::Database { hint, .. } => hint.as_deref(),
            Self::Decode { .. } => Some("The procedure returned an unexpected document shape"),
            Self::Parse { .. }
            | Self::Validation { .. }
            | Self::InvalidProcedure { .. }
            | Self::Serialize { .. } => None,
        }
    }

    /// Get the SQLSTATE code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to GatewayError.
impl From<tokio_postgres::Error> for GatewayError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code();
            // Connection exceptions (08xxx) surface as transport failures
            if code.starts_with("08") {
                return GatewayError::Connection {
                    message: db_err.message().to_string(),
                    source: Some(Box::new(err)),
                };
            }
            return GatewayError::Database {
                message: db_err.message().to_string(),
                detail: db_err.detail().map(String::from),
                hint: db_err.hint().map(String::from),
                code: Some(code.to_string()),
            };
        }

        if err.is_closed() {
            return GatewayError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        GatewayError::Database { message: err.to_string(), detail: None, hint: None, code: None }
    }
}

/// Convert from deadpool checkout errors to GatewayError.
impl From<deadpool_postgres::PoolError> for GatewayError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        GatewayError::Connection {
            message: format!("Failed to acquire connection: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

/// Result alias used across the crate.
pub type GatewayResult<T> = Result<T, GatewayError>;
