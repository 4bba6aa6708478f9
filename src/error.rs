use thiserror::Error;

/// Errors surfaced by the capture control operations.
///
/// Query surfaces (alert listing, stats, DNS history) are total and never
/// return these; only starting and driving a capture session can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("capture already in progress")]
    CaptureInProgress,

    #[error("no capture device available")]
    NoDevice,

    #[error("cannot open capture on '{iface}': {source}")]
    CaptureOpen {
        iface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("invalid capture filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
