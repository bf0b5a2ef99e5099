use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// An invalid filter or study field definition, surfaced to the administrator.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A value that cannot be cast to the declared type of its field.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Request input that has to be rejected rather than coerced.
    #[error("Invalid input: {0}")]
    Input(String),
    #[error("Unknown {kind}: {name}")]
    Unknown { kind: &'static str, name: String },
    #[error("Duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl CatalogError {
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Unknown { kind, name: name.into() }
    }
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate { kind, name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

// Helper conversions
impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for CatalogError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
