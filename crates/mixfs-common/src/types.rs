//! Protocol constants shared by servers, relays and clients.

/// Reference maximum datagram size in bytes.
pub const MAX_DATAGRAM_SIZE: usize = 1000;

/// Maximum number of fields in an RPC message.
pub const MAX_FIELDS: usize = 10;

/// Maximum number of layers walked when listing a route.
pub const MAX_ROUTE_DEPTH: usize = 16;

/// Payload of a relay decoy: the single-field message `0`.
pub const DECOY_PAYLOAD: &[u8] = b"0";

/// Reply status strings.
pub mod status {
    /// The operation succeeded; results follow.
    pub const OK: &str = "ok";
    /// The operation failed; a reason follows.
    pub const ERROR: &str = "error";
}

/// Operation names carried in field 1 of a request.
pub mod op {
    /// `read(path, offset, length)`.
    pub const READ: &str = "read";
    /// `write(path, offset, content)`.
    pub const WRITE: &str = "write";
    /// `append(path, content)`. Not idempotent.
    pub const APPEND: &str = "append";
    /// `lastWrite(path)`.
    pub const LAST_WRITE: &str = "lastWrite";
    /// `chmod(path, mode)`.
    pub const CHMOD: &str = "chmod";
    /// `subscribe(path, durationMs)`.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Acknowledges a server push by its msg id.
    pub const ACK: &str = "ack";
    /// Operation name of server-initiated pushes.
    pub const SUBSCRIPTION_UPDATE: &str = "subscriptionupdate";
}
