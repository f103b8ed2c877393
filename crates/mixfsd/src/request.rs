//! Typed requests and reply encoding.
//!
//! A request is `[msg_id, operation, ...]`. Field types are fixed per
//! operation, so a known operation whose fields do not match its schema is
//! rejected like any other malformed datagram.

use mixfs_common::types::{op, status};
use mixfs_common::wire::{encode, Field, Message, WireError};

/// A file operation and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Read `length` bytes at `offset`.
    Read {
        /// File path.
        path: String,
        /// Byte offset.
        offset: u64,
        /// Requested byte count.
        length: u64,
    },
    /// Overwrite bytes at `offset`.
    Write {
        /// File path.
        path: String,
        /// Byte offset.
        offset: u64,
        /// Bytes to write.
        content: Vec<u8>,
    },
    /// Append bytes at the end of the file.
    Append {
        /// File path.
        path: String,
        /// Bytes to append.
        content: Vec<u8>,
    },
    /// Return the file's modification time.
    LastWrite {
        /// File path.
        path: String,
    },
    /// Change the file's permission bits.
    Chmod {
        /// File path.
        path: String,
        /// New mode.
        mode: u32,
    },
    /// Push the file's contents on every write for `duration_ms`.
    Subscribe {
        /// File path.
        path: String,
        /// Requested subscription length in milliseconds.
        duration_ms: u64,
    },
    /// Acknowledge the push whose id is the request's msg id.
    Ack,
    /// An operation name the server does not implement.
    Unknown(String),
}

impl Operation {
    /// Label used for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => op::READ,
            Self::Write { .. } => op::WRITE,
            Self::Append { .. } => op::APPEND,
            Self::LastWrite { .. } => op::LAST_WRITE,
            Self::Chmod { .. } => op::CHMOD,
            Self::Subscribe { .. } => op::SUBSCRIBE,
            Self::Ack => op::ACK,
            Self::Unknown(_) => "unknown",
        }
    }

    /// Returns `true` if executing the operation twice has the same
    /// observable effect as executing it once.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Append { .. })
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Caller-chosen correlation id.
    pub msg_id: u64,
    /// What to do.
    pub op: Operation,
}

impl Request {
    /// Parses a decoded message against the schema of its operation.
    ///
    /// # Errors
    ///
    /// Fails if the msg id or operation name is missing, or if a known
    /// operation's fields are missing or of the wrong type.
    pub fn parse(msg: &Message) -> Result<Self, WireError> {
        let msg_id = msg.number(0)?;
        let name = msg.bytes(1)?;
        let op = match name {
            n if n == op::READ.as_bytes() => Operation::Read {
                path: path(msg)?,
                offset: msg.number(3)?,
                length: msg.number(4)?,
            },
            n if n == op::WRITE.as_bytes() => Operation::Write {
                path: path(msg)?,
                offset: msg.number(3)?,
                content: msg.bytes(4)?.to_vec(),
            },
            n if n == op::APPEND.as_bytes() => Operation::Append {
                path: path(msg)?,
                content: msg.bytes(3)?.to_vec(),
            },
            n if n == op::LAST_WRITE.as_bytes() => Operation::LastWrite { path: path(msg)? },
            n if n == op::CHMOD.as_bytes() => Operation::Chmod {
                path: path(msg)?,
                mode: u32::try_from(msg.number(3)?).map_err(|_| WireError::NumberOverflow)?,
            },
            n if n == op::SUBSCRIBE.as_bytes() => Operation::Subscribe {
                path: path(msg)?,
                duration_ms: msg.number(3)?,
            },
            n if n == op::ACK.as_bytes() => Operation::Ack,
            other => Operation::Unknown(String::from_utf8_lossy(other).into_owned()),
        };
        Ok(Self { msg_id, op })
    }
}

fn path(msg: &Message) -> Result<String, WireError> {
    msg.str(2).map(str::to_owned)
}

/// Encodes `[msg_id, "ok", ...results]`.
#[must_use]
pub fn ok_reply(msg_id: u64, results: Vec<Field>) -> Vec<u8> {
    reply(msg_id, status::OK, results)
}

/// Encodes `[msg_id, "error", reason]`.
#[must_use]
pub fn error_reply(msg_id: u64, reason: &str) -> Vec<u8> {
    reply(msg_id, status::ERROR, vec![Field::from(reason)])
}

/// Encodes a server push `[push_id, "subscriptionupdate", contents]`.
#[must_use]
pub fn subscription_update(push_id: u64, contents: &[u8]) -> Vec<u8> {
    reply(push_id, op::SUBSCRIPTION_UPDATE, vec![Field::bytes(contents)])
}

fn reply(msg_id: u64, kind: &str, rest: Vec<Field>) -> Vec<u8> {
    let mut fields = Vec::with_capacity(2 + rest.len());
    fields.push(Field::Number(msg_id));
    fields.push(Field::from(kind));
    fields.extend(rest);
    // At least two fields, so encoding cannot fail.
    encode(&fields).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Result<Request, WireError> {
        Request::parse(&Message::decode(bytes, 10)?)
    }

    #[test]
    fn parses_read() {
        let req = parse(b"5,\"read\",\"/tmp/f\",0,3").unwrap();
        assert_eq!(req.msg_id, 5);
        assert_eq!(
            req.op,
            Operation::Read {
                path: "/tmp/f".into(),
                offset: 0,
                length: 3
            }
        );
    }

    #[test]
    fn parses_write_with_quotes_in_content() {
        let req = parse(b"9,\"write\",\"f\",4,\"a\\\"b\"").unwrap();
        assert_eq!(
            req.op,
            Operation::Write {
                path: "f".into(),
                offset: 4,
                content: b"a\"b".to_vec()
            }
        );
    }

    #[test]
    fn ack_needs_no_path() {
        let req = parse(b"77,\"ack\"").unwrap();
        assert_eq!(req.msg_id, 77);
        assert_eq!(req.op, Operation::Ack);
    }

    #[test]
    fn unknown_operation_is_kept() {
        let req = parse(b"1,\"delete\",\"f\"").unwrap();
        assert_eq!(req.op, Operation::Unknown("delete".into()));
    }

    #[test]
    fn mistyped_field_is_rejected() {
        assert_eq!(
            parse(b"1,\"read\",\"f\",\"0\",3").unwrap_err(),
            WireError::ExpectedNumber(3)
        );
        assert_eq!(
            parse(b"1,\"append\",\"f\",12").unwrap_err(),
            WireError::ExpectedBytes(3)
        );
    }

    #[test]
    fn missing_field_is_rejected() {
        assert_eq!(
            parse(b"1,\"lastWrite\"").unwrap_err(),
            WireError::MissingField(2)
        );
    }

    #[test]
    fn quoted_msg_id_is_rejected() {
        assert!(parse(b"\"1\",\"lastWrite\",\"f\"").is_err());
    }

    #[test]
    fn chmod_mode_must_fit_u32() {
        assert_eq!(
            parse(b"1,\"chmod\",\"f\",4294967296").unwrap_err(),
            WireError::NumberOverflow
        );
    }

    #[test]
    fn only_append_is_not_idempotent() {
        let append = Operation::Append {
            path: "f".into(),
            content: vec![],
        };
        assert!(!append.is_idempotent());
        assert!(Operation::LastWrite { path: "f".into() }.is_idempotent());
        assert!(Operation::Write {
            path: "f".into(),
            offset: 0,
            content: vec![]
        }
        .is_idempotent());
    }

    #[test]
    fn replies_match_wire_format() {
        assert_eq!(
            ok_reply(5, vec![Field::from("abc"), Field::Number(1000)]),
            b"5,\"ok\",\"abc\",1000"
        );
        assert_eq!(ok_reply(6, vec![]), b"6,\"ok\"");
        assert_eq!(
            error_reply(7, "error seeking"),
            b"7,\"error\",\"error seeking\""
        );
        assert_eq!(
            subscription_update(8, b"new"),
            b"8,\"subscriptionupdate\",\"new\""
        );
    }
}
