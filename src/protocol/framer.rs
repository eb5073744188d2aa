//! Incremental frame decoder for the guest serial protocol.
//!
//! [`MessageCodec`] implements [`tokio_util::codec::Decoder`]: `decode`
//! either produces one complete [`Message`] and consumes exactly its bytes,
//! or returns `Ok(None)` leaving the buffer untouched so the caller can
//! append more input and retry. Frames are re-scanned from the buffer start
//! on every call; frame sizes here are tens of bytes to a few kilobytes, so
//! the simplicity wins over a resumable scanner.
//!
//! The EOL is a constructor parameter because the same grammar appears in
//! two places: CRLF on the serial line, LF inside entry-file directive
//! blocks.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::protocol::Message;
use crate::{HarnessError, Result};

/// Incremental decoder for `$`/`:` frames with a fixed EOL.
#[derive(Debug)]
pub struct MessageCodec {
    eol: &'static str,
}

impl MessageCodec {
    /// Create a codec using `eol` as the line terminator.
    #[must_use]
    pub fn new(eol: &'static str) -> Self {
        Self { eol }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = HarnessError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete frame yet: no
    /// header EOL, or a multi-line frame whose terminator has not arrived.
    /// In that case `src` is left exactly as given.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Protocol`] for an empty header line, a header
    /// starting with neither `$` nor `:`, or a `:` header without a
    /// signature token.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let eol = self.eol.as_bytes();
        let Some(header_end) = find(src, eol) else {
            return Ok(None);
        };
        let line = &src[..header_end];

        match line.first().copied() {
            Some(b'$') => {
                let text = String::from_utf8_lossy(&line[1..]);
                let message = match text.split_once(' ') {
                    Some((name, arg)) => Message::with_body(name, arg),
                    None => Message::new(text.into_owned()),
                };
                src.advance(header_end + eol.len());
                Ok(Some(message))
            }
            Some(b':') => {
                let header = String::from_utf8_lossy(&line[1..]).into_owned();
                let mut tokens = header.split_whitespace();
                let (Some(name), Some(sig)) = (tokens.next(), tokens.next()) else {
                    return Err(HarnessError::Protocol(format!(
                        "multi-line header {header:?} is missing a signature"
                    )));
                };

                // Terminator is searched from the buffer start; the first EOL
                // in the buffer is the header's, so a match at `header_end`
                // means an empty frame gap and therefore no body.
                let mut terminator = Vec::with_capacity(2 * eol.len() + sig.len());
                terminator.extend_from_slice(eol);
                terminator.extend_from_slice(sig.as_bytes());
                terminator.extend_from_slice(eol);
                let Some(term_at) = find(src, &terminator) else {
                    return Ok(None);
                };

                let body_start = header_end + eol.len();
                let message = if term_at < body_start {
                    Message::new(name)
                } else {
                    Message::with_body(
                        name,
                        String::from_utf8_lossy(&src[body_start..term_at]).into_owned(),
                    )
                };
                src.advance(term_at + terminator.len());
                Ok(Some(message))
            }
            Some(other) => Err(HarnessError::Protocol(format!(
                "unrecognized frame header byte {:?} in line {:?}",
                char::from(other),
                String::from_utf8_lossy(line)
            ))),
            None => Err(HarnessError::Protocol("empty frame header line".into())),
        }
    }
}

/// First index of `needle` in `haystack`, if any.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
