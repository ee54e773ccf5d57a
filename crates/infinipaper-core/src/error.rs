use thiserror::Error;

/// All errors that can occur in infinipaper-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Paper not found: {0}")]
    PaperNotFound(i64),

    #[error("Author not found: {0}")]
    AuthorNotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate DOI: {0}")]
    DuplicateDoi(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    NetworkError = 6,
    Conflict = 7,
}

pub type Result<T> = std::result::Result<T, CoreError>;
