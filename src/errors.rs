use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AdminError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(lodestone::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(lodestone::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(lodestone::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(lodestone::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Bad request: {0}")]
    #[diagnostic(code(lodestone::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(lodestone::other))]
    Other(String),
}
