//! Error types shared by the request pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T, E = RequestError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RequestError {
    /// Bad hostname, host file, credentials or output directory.
    #[error("{0}")]
    Validation(String),

    /// Key generation or CSR serialisation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] rcgen::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("can't write file {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The API refused the operator's credentials.
    #[error("HTTP {status} {reason}: check your authentication credentials")]
    Authentication { status: u16, reason: String },

    #[error("Interrupted by user")]
    Interrupted,
}

impl RequestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }
}
