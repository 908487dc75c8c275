use thiserror::Error;

/// Raised when a backend key cannot be turned into a usable backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("No backend configured under key `{0}`")]
    MissingBackendKey(String),

    #[error("Backend `{key}` has unrecognized kind `{kind}`")]
    UnknownBackendKind { key: String, kind: String },
}
