// Error handling framework

use thiserror::Error;

/// SSH session and remote execution errors
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Missing or invalid credentials: {0}")]
    Configuration(String),

    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    #[error("Unsupported auth method: {0}")]
    UnsupportedAuth(String),

    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("SSH session error: {0}")]
    Session(String),

    #[error("Remote command exited with status {exit_status}")]
    RemoteCommand {
        exit_status: i32,
        stdout: String,
        stderr: String,
    },

    #[error("File transfer failed: {0}")]
    Transfer(String),

    #[error("Unsupported script type: {0}")]
    UnsupportedScriptType(String),
}

impl SshError {
    /// Whether a retry could plausibly succeed. Credential and configuration
    /// problems are deterministic and must not consume retry attempts.
    pub fn is_retryable(&self) -> bool {
        match self {
            SshError::Configuration(_)
            | SshError::KeyParse(_)
            | SshError::UnsupportedAuth(_)
            | SshError::UnsupportedScriptType(_) => false,
            SshError::Connection { .. }
            | SshError::Session(_)
            | SshError::RemoteCommand { .. }
            | SshError::Transfer(_) => true,
        }
    }
}

/// Authentication and authorization errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Insufficient permissions: required {0}")]
    InsufficientPermissions(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Artifact and upload storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<SshError> for ApiError {
    fn from(err: SshError) -> Self {
        ApiError::new("SSH_ERROR", err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) | AuthError::TokenExpired => {
                "UNAUTHORIZED"
            }
            AuthError::InsufficientPermissions(_) => "FORBIDDEN",
            _ => "AUTH_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new("VALIDATION_ERROR", err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        let code = match err {
            DatabaseError::NotFound(_) => "NOT_FOUND",
            _ => "DATABASE_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::new("STORAGE_ERROR", err.to_string())
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::FileSystem(err.to_string())
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}
