use thiserror::Error;

/// Errors returned by [`crate::Client`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Underlying socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A request could not be encoded or a reply could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] mixfs_common::WireError),
    /// No reply arrived after every attempt.
    #[error("no reply after {attempts} attempts")]
    Timeout {
        /// Number of sends made.
        attempts: u32,
    },
    /// The server answered with an `"error"` reply.
    #[error("server error: {0}")]
    Remote(String),
    /// The reply's status is neither `"ok"` nor `"error"`.
    #[error("unexpected reply status")]
    UnexpectedReply,
}
