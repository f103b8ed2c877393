//! Length-delimited text codec used for every mixfs datagram.
//!
//! A message is a comma-separated list of fields. A field is either a
//! decimal number or a quoted byte-string in which every literal `"` is
//! written as `\"`:
//!
//! ```text
//! 5,"read","/tmp/f",0,3
//! ```
//!
//! The decoder makes a single pass with the same amount of work per input
//! byte regardless of its value. Message length and field count are still
//! observable.
//!
//! A byte-string whose content ends in `\` cannot be decoded: its closing
//! quote reads as an escaped quote and the region never terminates. This is
//! a property of the format and is kept for wire compatibility.

use thiserror::Error;

/// A single typed field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Non-negative integer rendered in canonical decimal.
    Number(u64),
    /// Arbitrary bytes rendered as a quoted, escaped string.
    Bytes(Vec<u8>),
}

impl Field {
    /// Builds a byte-string field from anything byte-like.
    pub fn bytes(b: impl AsRef<[u8]>) -> Self {
        Self::Bytes(b.as_ref().to_vec())
    }
}

impl From<u64> for Field {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Field {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Field {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Errors produced while encoding or decoding messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Encoding was asked for a message without fields.
    #[error("message has no fields")]
    EmptyMessage,
    /// The input byte slice was empty.
    #[error("datagram is empty")]
    Empty,
    /// The message has more fields than the receiver accepts.
    #[error("too many fields: max {max}")]
    TooManyFields {
        /// Maximum accepted field count.
        max: usize,
    },
    /// A byte outside a quoted region is not a digit or delimiter.
    #[error("unexpected byte outside quoted field")]
    InvalidByte,
    /// A numeric field does not fit in 64 bits.
    #[error("number overflows u64")]
    NumberOverflow,
    /// The input ended inside a quoted region.
    #[error("unterminated byte-string")]
    Unterminated,
    /// The schema expects a field the message does not carry.
    #[error("missing field {0}")]
    MissingField(usize),
    /// The schema expects a number where a byte-string was sent.
    #[error("field {0} is not a number")]
    ExpectedNumber(usize),
    /// The schema expects a byte-string where a number was sent.
    #[error("field {0} is not a byte-string")]
    ExpectedBytes(usize),
    /// A text field is not valid UTF-8.
    #[error("field is not valid utf-8")]
    InvalidUtf8,
    /// A route nests more layers than allowed.
    #[error("route exceeds {max} layers")]
    RouteTooDeep {
        /// Maximum accepted layer count.
        max: usize,
    },
}

/// Encodes `fields` into a datagram payload.
///
/// # Errors
///
/// Returns [`WireError::EmptyMessage`] when `fields` is empty.
///
/// # Examples
///
/// ```
/// use mixfs_common::wire::{encode, Field};
/// let bytes = encode(&[Field::Number(5), Field::from("ok")]).unwrap();
/// assert_eq!(bytes, b"5,\"ok\"");
/// ```
pub fn encode(fields: &[Field]) -> Result<Vec<u8>, WireError> {
    if fields.is_empty() {
        return Err(WireError::EmptyMessage);
    }
    let mut out = Vec::with_capacity(fields.iter().map(encoded_len_hint).sum());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        match field {
            Field::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
            Field::Bytes(b) => {
                out.push(b'"');
                for &byte in b {
                    if byte == b'"' {
                        out.push(b'\\');
                    }
                    out.push(byte);
                }
                out.push(b'"');
            }
        }
    }
    Ok(out)
}

fn encoded_len_hint(field: &Field) -> usize {
    match field {
        Field::Number(_) => 21,
        Field::Bytes(b) => b.len() + 3,
    }
}

/// A decoded message.
///
/// The codec does not know field types; callers pick [`Message::number`] or
/// [`Message::bytes`] for each index according to their schema.
#[derive(Debug, Clone)]
pub struct Message {
    count: usize,
    numbers: Vec<u64>,
    quoted: Vec<bool>,
    buffers: Vec<Vec<u8>>,
}

impl Message {
    /// Decodes `input`, accepting at most `max_fields` fields.
    ///
    /// While a quoted region is open the numeric slot of the field tracks
    /// the decoded byte count, so once it closes the slot holds the length
    /// of the byte-string stored in the parallel buffer.
    ///
    /// # Errors
    ///
    /// Fails on empty input, more than `max_fields` fields, a non-digit
    /// byte outside quotes, bytes around a quoted region within its field,
    /// numeric overflow or an unterminated string.
    ///
    /// # Examples
    ///
    /// ```
    /// use mixfs_common::wire::Message;
    /// let msg = Message::decode(b"7,\"a\\\"b\"", 4).unwrap();
    /// assert_eq!(msg.number(0).unwrap(), 7);
    /// assert_eq!(msg.bytes(1).unwrap(), b"a\"b");
    /// ```
    pub fn decode(input: &[u8], max_fields: usize) -> Result<Self, WireError> {
        if input.is_empty() {
            return Err(WireError::Empty);
        }
        if max_fields == 0 {
            return Err(WireError::TooManyFields { max: 0 });
        }

        let len = input.len();
        let mut numbers = vec![0u64; max_fields];
        let mut quoted = vec![false; max_fields];
        let mut buffers = vec![vec![0u8; len]; max_fields];

        let mut item = 0usize;
        let mut cursor = 0usize;
        let mut in_quotes = 0u64;
        let mut after_backslash = 0u64;
        let mut invalid = 0u64;
        let mut overflow = 0u64;
        // `started`: the current field has consumed a byte.
        // `closed`: the current field's quoted region has ended.
        let mut started = 0u64;
        let mut closed = 0u64;

        for &v in input {
            let is_comma = u64::from(v == b',');
            let is_quote = u64::from(v == b'"');
            let is_digit = u64::from(v.is_ascii_digit());
            let outside = 1 - in_quotes;
            let next_field = is_comma & outside;

            // Numeric accumulation runs for every byte and is selected away
            // inside quotes and on delimiters.
            let (scaled, o1) = numbers[item].overflowing_mul(10);
            let (accumulated, o2) = scaled.overflowing_add(u64::from(v.wrapping_sub(b'0')));
            overflow |= outside & is_digit & u64::from(o1 | o2);
            invalid |= outside & (1 - is_digit) & (1 - is_comma) & (1 - is_quote);

            let slot = in_quotes * cursor as u64 + outside * accumulated;
            numbers[item] = next_field * numbers[item] + (1 - next_field) * slot;

            let escaped = is_quote & after_backslash;
            let toggles = is_quote & (1 - after_backslash);
            let opening = toggles & outside;
            let closing = toggles & in_quotes;
            // only a delimiter may follow a closing quote, and a quote may
            // only open a field
            invalid |= closed & (1 - is_comma);
            invalid |= opening & started;
            closed = (1 - next_field) * (closed | closing);
            started = 1 - next_field;
            cursor -= escaped as usize;
            in_quotes ^= toggles;
            after_backslash = u64::from(v == b'\\');
            buffers[item][cursor] = v;

            let opened = (toggles & in_quotes) as usize;
            quoted[item] |= opened == 1;
            cursor = (1 - next_field as usize) * (1 - opened) * (cursor + 1);

            if next_field == 1 {
                item += 1;
                if item == max_fields {
                    return Err(WireError::TooManyFields { max: max_fields });
                }
            }
        }

        if in_quotes == 1 {
            return Err(WireError::Unterminated);
        }
        if invalid != 0 {
            return Err(WireError::InvalidByte);
        }
        if overflow != 0 {
            return Err(WireError::NumberOverflow);
        }

        Ok(Self {
            count: item + 1,
            numbers,
            quoted,
            buffers,
        })
    }

    /// Number of fields present in the message.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the message has no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` if the field at `index` was a quoted byte-string.
    #[must_use]
    pub fn is_bytes(&self, index: usize) -> bool {
        index < self.count && self.quoted[index]
    }

    /// Reads field `index` as a number.
    ///
    /// # Errors
    ///
    /// Fails if the field is missing or was sent as a byte-string.
    pub fn number(&self, index: usize) -> Result<u64, WireError> {
        if index >= self.count {
            return Err(WireError::MissingField(index));
        }
        if self.quoted[index] {
            return Err(WireError::ExpectedNumber(index));
        }
        Ok(self.numbers[index])
    }

    /// Reads field `index` as a byte-string.
    ///
    /// # Errors
    ///
    /// Fails if the field is missing or was sent as a number.
    pub fn bytes(&self, index: usize) -> Result<&[u8], WireError> {
        if index >= self.count {
            return Err(WireError::MissingField(index));
        }
        if !self.quoted[index] {
            return Err(WireError::ExpectedBytes(index));
        }
        let buf = &self.buffers[index];
        let len = usize::try_from(self.numbers[index]).map_or(buf.len(), |n| n.min(buf.len()));
        Ok(&buf[..len])
    }

    /// Reads field `index` as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails like [`Message::bytes`], or with [`WireError::InvalidUtf8`]
    /// when the bytes are not UTF-8.
    pub fn str(&self, index: usize) -> Result<&str, WireError> {
        std::str::from_utf8(self.bytes(index)?).map_err(|_| WireError::InvalidUtf8)
    }

    /// Returns `true` for the relay decoy sentinel: a single unquoted field
    /// equal to zero.
    ///
    /// A genuine one-field message carrying the number zero is
    /// indistinguishable from a decoy.
    #[must_use]
    pub fn is_decoy(&self) -> bool {
        self.count == 1 && !self.quoted[0] && self.numbers[0] == 0
    }

    /// Rebuilds the typed field list, using the quoting of each field.
    #[must_use]
    pub fn fields(&self) -> Vec<Field> {
        (0..self.count)
            .map(|i| match self.bytes(i) {
                Ok(b) => Field::Bytes(b.to_vec()),
                Err(_) => Field::Number(self.numbers[i]),
            })
            .collect()
    }
}
