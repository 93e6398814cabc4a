//! Error taxonomy for OSS operations

use hyper::StatusCode;
use thiserror::Error;

/// OSS client errors
#[derive(Error, Debug)]
pub enum OssError {
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("Body error: {0}")]
    Body(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-success response from the service. Displays as the service's own
    /// message so callers can match on it.
    #[error("{message}")]
    Service {
        status: StatusCode,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
        host_id: Option<String>,
    },

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid upload policy, raised before anything is signed or sent
    #[error("Invalid policy: {0}")]
    Policy(String),

    #[error("Listing did not advance past marker {marker:?}")]
    StalledListing { marker: String },

    #[error("Download task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<quick_xml::Error> for OssError {
    fn from(err: quick_xml::Error) -> Self {
        OssError::XmlParse(err.to_string())
    }
}

impl OssError {
    /// HTTP status of a service error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            OssError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service error code (e.g. `NoSuchKey`), when the body carried one
    pub fn code(&self) -> Option<&str> {
        match self {
            OssError::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OssError>;
