//! CLI error type.

use shelflife_core::{ConfigError, ShelfError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Shelf(#[from] ShelfError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Product {code} not found")]
    NotFound { code: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
