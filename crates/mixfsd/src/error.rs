use thiserror::Error;

/// Errors that can occur while serving requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Underlying socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A datagram could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] mixfs_common::WireError),
    /// A datagram exceeded the configured maximum size.
    #[error("datagram too large: max {max}, got {actual}")]
    Oversize {
        /// Configured maximum in bytes.
        max: usize,
        /// Size of the offending datagram.
        actual: usize,
    },
}
