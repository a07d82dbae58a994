use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid image reference {image:?}: {reason}")]
    InvalidImage { image: String, reason: String },

    #[error("Invalid label {key:?}: {reason}")]
    InvalidLabel { key: String, reason: String },

    #[error("Cannot set owner reference to {0}: object has no name or uid")]
    OwnerReference(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// True for an API error carrying HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
