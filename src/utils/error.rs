use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProximityError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Routing provider rejected credentials (HTTP {status})")]
    AuthRejected { status: u16 },

    #[error("Provider error: {message}")]
    ProviderError { message: String },

    #[error("Invalid origin {origin_id}: {reason}")]
    InvalidOrigin { origin_id: String, reason: String },

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Provider,
    Input,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ProximityError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProximityError::RequestError(_) => ErrorCategory::Network,
            ProximityError::ConfigError { .. }
            | ProximityError::MissingConfigError { .. }
            | ProximityError::InvalidConfigValueError { .. }
            | ProximityError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            ProximityError::AuthRejected { .. } | ProximityError::ProviderError { .. } => {
                ErrorCategory::Provider
            }
            ProximityError::InvalidOrigin { .. } | ProximityError::SerializationError(_) => {
                ErrorCategory::Input
            }
            ProximityError::IoError(_) | ProximityError::PersistenceError { .. } => {
                ErrorCategory::Storage
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProximityError::InvalidOrigin { .. } => ErrorSeverity::Low,
            ProximityError::RequestError(_) | ProximityError::ProviderError { .. } => {
                ErrorSeverity::Medium
            }
            ProximityError::SerializationError(_) | ProximityError::PersistenceError { .. } => {
                ErrorSeverity::High
            }
            ProximityError::AuthRejected { .. }
            | ProximityError::IoError(_)
            | ProximityError::ConfigError { .. }
            | ProximityError::MissingConfigError { .. }
            | ProximityError::InvalidConfigValueError { .. }
            | ProximityError::ConfigValidationError { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether the error should stop a whole batch run rather than a single origin.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            ProximityError::AuthRejected { .. }
                | ProximityError::ConfigError { .. }
                | ProximityError::MissingConfigError { .. }
                | ProximityError::InvalidConfigValueError { .. }
                | ProximityError::ConfigValidationError { .. }
        )
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach a remote service: {}", self),
            ErrorCategory::Configuration => format!("The configuration is not usable: {}", self),
            ErrorCategory::Provider => format!("A geodata provider refused the request: {}", self),
            ErrorCategory::Input => format!("Some input data could not be used: {}", self),
            ErrorCategory::Storage => format!("Results could not be stored: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ProximityError::AuthRejected { .. } => {
                "Check routing.api_key or the credentials expected by the routing backend"
            }
            ProximityError::RequestError(_) | ProximityError::ProviderError { .. } => {
                "Check network connectivity and the configured backend URLs, then retry"
            }
            ProximityError::MissingConfigError { .. }
            | ProximityError::InvalidConfigValueError { .. }
            | ProximityError::ConfigValidationError { .. }
            | ProximityError::ConfigError { .. } => {
                "Fix the configuration file and run again"
            }
            ProximityError::InvalidOrigin { .. } | ProximityError::SerializationError(_) => {
                "Verify that every origin has a valid [lon, lat] location"
            }
            ProximityError::IoError(_) | ProximityError::PersistenceError { .. } => {
                "Make sure the output directory exists and is writable"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ProximityError>;
