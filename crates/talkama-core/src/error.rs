use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure while turning a picked or dropped file into an attachment.
#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("Could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Failure while querying or configuring the host/model directory.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Host unreachable: {host} ({detail})")]
    HostUnreachable { host: String, detail: String },

    #[error("Invalid host address: {0}")]
    InvalidHost(String),

    #[error("No host configured")]
    NoHost,

    #[error("Failed to list models (status {status}): {detail}")]
    Status { status: u16, detail: String },

    #[error("Unexpected response from host: {0}")]
    UnexpectedResponse(String),

    #[error("Model name must not be empty")]
    EmptyModel,
}

/// Failure of a single inference call. `Display` is the detail shown in the transcript.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("No model selected")]
    NoModelSelected,

    #[error("Host not defined")]
    NoHost,

    #[error("{0}")]
    Transport(String),

    #[error("Ollama request failed with status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No response after {0:?}")]
    TimedOut(Duration),
}
