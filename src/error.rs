use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnowflakeError {
    #[error("{0}")]
    Validation(String),

    #[error("Key(s) {} not specified, the mandatory request parameters are {}", quoted(.0), quoted(.1))]
    MissingFields(Vec<String>, Vec<String>),

    #[error("Could not determine a suitable command for '{0}'")]
    CommandResolution(String),

    #[error("Identifier '{0}' not found")]
    NotFound(String),

    #[error("Job name '{0}' is already taken")]
    NameConflict(String),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process {pid:?} still alive after {attempts} termination attempts")]
    StopFailed { pid: Option<u32>, attempts: u32 },

    #[error("Dependencies for custom job '{0}' are not installed")]
    DependencyMissing(String),

    #[error("Custom job '{name}' failed: {reason}")]
    Plugin { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnowflakeError {
    /// Stable code used in server-side logs.
    pub fn code(&self) -> &'static str {
        match self {
            SnowflakeError::Validation(_) => "E_VALIDATION",
            SnowflakeError::MissingFields(..) => "E_MISSING_FIELDS",
            SnowflakeError::CommandResolution(_) => "E_COMMAND_RESOLUTION",
            SnowflakeError::NotFound(_) => "E_NOT_FOUND",
            SnowflakeError::NameConflict(_) => "E_NAME_CONFLICT",
            SnowflakeError::Spawn { .. } => "E_SPAWN",
            SnowflakeError::StopFailed { .. } => "E_STOP_FAILED",
            SnowflakeError::DependencyMissing(_) => "E_DEPENDENCY_MISSING",
            SnowflakeError::Plugin { .. } => "E_PLUGIN",
            SnowflakeError::Config(_) => "E_CONFIG",
            SnowflakeError::Bind { .. } => "E_BIND",
            SnowflakeError::Io(_) => "E_IO",
            SnowflakeError::Json(_) => "E_JSON",
            SnowflakeError::Internal(_) => "E_INTERNAL",
        }
    }

    /// Whether the message may be shown to a control-channel caller as is.
    /// Process and internal failures are reported without detail.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SnowflakeError::Validation(_)
                | SnowflakeError::MissingFields(..)
                | SnowflakeError::CommandResolution(_)
                | SnowflakeError::NotFound(_)
                | SnowflakeError::NameConflict(_)
        )
    }
}

fn quoted(keys: &[String]) -> String {
    let inner: Vec<String> = keys.iter().map(|k| format!("\"{}\"", k)).collect();
    format!("[{}]", inner.join(", "))
}

pub type Result<T> = std::result::Result<T, SnowflakeError>;
