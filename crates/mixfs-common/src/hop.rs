//! Onion-style routing layers carried inside wire messages.
//!
//! A hop envelope is the two-field message `[next_hop, remaining]` where
//! `remaining` is either empty (last hop) or another encoded envelope. A
//! relay datagram is `[envelope, payload]`; each relay peels one layer and
//! never looks inside the payload.

use crate::types::MAX_ROUTE_DEPTH;
use crate::wire::{encode, Field, Message, WireError};

/// One routing layer: where to send next and the layers after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopEnvelope {
    /// Address (`host:port`) of the next node.
    pub next_hop: String,
    /// Encoded envelope for the following hops, empty at the last hop.
    pub remaining: Vec<u8>,
}

impl HopEnvelope {
    /// Creates an envelope from its parts.
    pub fn new(next_hop: impl Into<String>, remaining: Vec<u8>) -> Self {
        Self {
            next_hop: next_hop.into(),
            remaining,
        }
    }

    /// Encodes this envelope as `[next_hop, remaining]`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_pair(self.next_hop.as_bytes(), &self.remaining)
    }

    /// Decodes one envelope layer.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not a two-byte-string message or the address
    /// is not UTF-8.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let msg = Message::decode(bytes, 2)?;
        Ok(Self {
            next_hop: msg.str(0)?.to_owned(),
            remaining: msg.bytes(1)?.to_vec(),
        })
    }

    /// Returns `true` if no layers follow this one.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Builds the datagram `next_hop` should receive for `payload`.
    ///
    /// At the last hop this is the payload itself; otherwise it is
    /// `[remaining, payload]`, so exactly one layer is removed.
    #[must_use]
    pub fn forward_payload(&self, payload: &[u8]) -> Vec<u8> {
        if self.is_last() {
            payload.to_vec()
        } else {
            encode_pair(&self.remaining, payload)
        }
    }

    /// Lists every address in the route that starts with this envelope.
    ///
    /// # Errors
    ///
    /// Fails on a malformed inner layer or when the route nests deeper than
    /// [`MAX_ROUTE_DEPTH`].
    pub fn addresses(&self) -> Result<Vec<String>, WireError> {
        let mut out = vec![self.next_hop.clone()];
        let mut rest = self.remaining.clone();
        while !rest.is_empty() {
            if out.len() == MAX_ROUTE_DEPTH {
                return Err(WireError::RouteTooDeep {
                    max: MAX_ROUTE_DEPTH,
                });
            }
            let layer = Self::decode(&rest)?;
            out.push(layer.next_hop);
            rest = layer.remaining;
        }
        Ok(out)
    }
}

/// A relay datagram split into its routing layer and opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapped {
    /// Routing layer addressed to the receiving node.
    pub envelope: HopEnvelope,
    /// Bytes the receiving node must not interpret.
    pub payload: Vec<u8>,
}

impl Wrapped {
    /// Decodes `[envelope, payload]`.
    ///
    /// # Errors
    ///
    /// Fails if either layer is malformed.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let msg = Message::decode(bytes, 2)?;
        Self::from_message(&msg)
    }

    /// Extracts `[envelope, payload]` from an already decoded message.
    ///
    /// # Errors
    ///
    /// Fails if either field is missing or malformed.
    pub fn from_message(msg: &Message) -> Result<Self, WireError> {
        Ok(Self {
            envelope: HopEnvelope::decode(msg.bytes(0)?)?,
            payload: msg.bytes(1)?.to_vec(),
        })
    }
}

/// Nests `hops` into a single envelope: `[h0, [h1, [..., [hn, ""]]]]`.
///
/// Returns an empty vector for an empty route.
///
/// # Examples
///
/// ```
/// use mixfs_common::hop::{onion, HopEnvelope};
/// let route = onion(&["10.0.0.1:5100", "10.0.0.2:5006"]);
/// let outer = HopEnvelope::decode(&route).unwrap();
/// assert_eq!(outer.next_hop, "10.0.0.1:5100");
/// assert_eq!(outer.addresses().unwrap().len(), 2);
/// ```
#[must_use]
pub fn onion<S: AsRef<str>>(hops: &[S]) -> Vec<u8> {
    hops.iter()
        .rev()
        .fold(Vec::new(), |inner, hop| encode_pair(hop.as_ref().as_bytes(), &inner))
}

/// Wraps `payload` for the first node of `hops` and returns that node's
/// address with the datagram to send it.
///
/// Returns `None` for an empty route.
#[must_use]
pub fn wrap<S: AsRef<str>>(hops: &[S], payload: &[u8]) -> Option<(String, Vec<u8>)> {
    let (first, rest) = hops.split_first()?;
    let envelope = onion(rest);
    let datagram = if envelope.is_empty() {
        payload.to_vec()
    } else {
        encode_pair(&envelope, payload)
    };
    Some((first.as_ref().to_owned(), datagram))
}

fn encode_pair(first: &[u8], second: &[u8]) -> Vec<u8> {
    // Two fields are never an empty message.
    encode(&[Field::bytes(first), Field::bytes(second)]).unwrap_or_default()
}
