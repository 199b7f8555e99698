//! Rule catalog error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("IO error reading rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rule parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("unknown rule id '{0}'")]
    UnknownRule(String),
}
