use thiserror::Error;

/// Configuration errors. `MissingIdentifier` is fatal to startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Managed backend is enabled but {0} is not set")]
    MissingIdentifier(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the generative model client
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Request Error: {0}")]
    RequestError(String),

    #[error("Response Error: {0}")]
    ResponseError(String),

    #[error("HTTP Error: {status_code} - {message}")]
    HttpError { status_code: u16, message: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;
