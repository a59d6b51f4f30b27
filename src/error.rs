use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ContractScope operations
#[derive(Error, Debug)]
pub enum ContractScopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Import {path} resolves outside workspace {root}")]
    OutsideWorkspace { path: PathBuf, root: PathBuf },

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
}

pub type Result<T> = std::result::Result<T, ContractScopeError>;
