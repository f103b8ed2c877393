use thiserror::Error;

/// Errors that can occur while relaying datagrams.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Underlying socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A datagram is neither a decoy nor a wrapped payload.
    #[error("wire error: {0}")]
    Wire(#[from] mixfs_common::WireError),
}
