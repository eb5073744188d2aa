//! Serial message protocol between the harness and the guest kernel.
//!
//! The guest talks in EOL-delimited frames of two shapes:
//!
//! - one-line: `$name` or `$name arg` — body is everything after the first
//!   space, absent when there is no space;
//! - multi-line: `:name sig` followed by a body terminated by the byte
//!   sequence `EOL sig EOL`.
//!
//! Submodules:
//! - `framer`: incremental [`MessageCodec`] implementing
//!   [`tokio_util::codec::Decoder`] over a raw byte buffer.
//! - `endpoint`: [`GuestEndpoint`] — message-level send/recv port layered on
//!   a pump's channel pair.

pub mod endpoint;
pub mod framer;

pub use endpoint::GuestEndpoint;
pub use framer::MessageCodec;

/// Line terminator used on the virtual serial line.
pub const CRLF: &str = "\r\n";

/// Line terminator used in entry-file directive blocks.
pub const LF: &str = "\n";

/// One parsed protocol frame.
///
/// `body` is `None` when the frame carried no payload: a one-line frame
/// without a space, or a multi-line frame whose terminator immediately
/// follows the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Frame name, e.g. `please`, `run`, `success`, `echo`.
    pub name: String,
    /// Optional payload.
    pub body: Option<String>,
}

impl Message {
    /// Create a frame without a payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: None,
        }
    }

    /// Create a frame with a payload.
    #[must_use]
    pub fn with_body(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Some(body.into()),
        }
    }

    /// Payload text, or the empty string when absent.
    #[must_use]
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}
