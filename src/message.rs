//! Wire codec for the datagram text protocol.
//!
//! A request datagram carries four newline-separated fields:
//!
//! ```text
//! <source>\n<stream>\n<True|False>\n<body...>
//! ```
//!
//! The body is the remainder of the datagram and may itself contain
//! newlines. Replies are a single datagram whose first byte is `+`
//! (success) or `-` (failure), followed by opaque detail text.

use std::str;

use thiserror::Error;

/// Number of newline-separated fields in a request datagram.
const FIELD_COUNT: usize = 4;

/// The `responseRequested` field as it appeared on the wire.
///
/// Only the exact literals `True` and `False` are recognized. Anything
/// else still decodes — the datagram is structurally fine — but is kept
/// verbatim so validation can reject it with a distinct error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFlag {
    True,
    False,
    Invalid(String),
}

impl ResponseFlag {
    pub fn parse(literal: &str) -> Self {
        match literal {
            "True" => Self::True,
            "False" => Self::False,
            other => Self::Invalid(other.to_string()),
        }
    }

    /// The sender asked for a reply on success.
    pub fn requested(&self) -> bool {
        matches!(self, Self::True)
    }

    /// The sender explicitly declined replies. An unrecognized literal
    /// does not count as declining: a sender that wrote garbage still
    /// gets told about it.
    pub fn declined(&self) -> bool {
        matches!(self, Self::False)
    }

    pub fn as_literal(&self) -> &str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Invalid(other) => other,
        }
    }
}

/// A routed message, either decoded from a datagram or built by the
/// client API. Immutable once constructed; each in-flight message is
/// owned by exactly one dispatch task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: String,
    pub stream: String,
    pub response: ResponseFlag,
    pub body: String,
}

impl Message {
    pub fn new(
        source: impl Into<String>,
        stream: impl Into<String>,
        body: impl Into<String>,
        response_requested: bool,
    ) -> Self {
        Self {
            source: source.into(),
            stream: stream.into(),
            response: if response_requested {
                ResponseFlag::True
            } else {
                ResponseFlag::False
            },
            body: body.into(),
        }
    }

    /// Encodes the message as a request datagram payload.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n{}",
            self.source,
            self.stream,
            self.response.as_literal(),
            self.body
        )
        .into_bytes()
    }

    /// Decodes a request datagram. The payload must be UTF-8 and contain
    /// at least four newline-separated fields; the fourth field absorbs
    /// every remaining byte, newlines included.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let text = str::from_utf8(datagram).map_err(|_| DecodeError::NotUtf8)?;
        let mut fields = text.splitn(FIELD_COUNT, '\n');
        let source = fields.next().ok_or(DecodeError::MissingFields)?;
        let stream = fields.next().ok_or(DecodeError::MissingFields)?;
        let flag = fields.next().ok_or(DecodeError::MissingFields)?;
        let body = fields.next().ok_or(DecodeError::MissingFields)?;

        Ok(Self {
            source: source.to_string(),
            stream: stream.to_string(),
            response: ResponseFlag::parse(flag),
            body: body.to_string(),
        })
    }
}

/// Why a datagram could not be decoded into a [`Message`]. Either way the
/// broker answers `-Format error` unconditionally, since the response
/// flag itself was unreadable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram is not valid UTF-8")]
    NotUtf8,
    #[error("datagram has fewer than {FIELD_COUNT} fields")]
    MissingFields,
}

/// A reply datagram, as seen by the client: a `+`/`-` sigil followed by
/// free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(String),
    Failure(String),
}

impl Reply {
    /// Splits a reply payload on its leading sigil. `None` means the
    /// reply carried no recognizable sigil at all.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = str::from_utf8(payload).ok()?;
        let mut chars = text.chars();
        match chars.next()? {
            '+' => Some(Self::Ok(chars.as_str().to_string())),
            '-' => Some(Self::Failure(chars.as_str().to_string())),
            _ => None,
        }
    }
}
