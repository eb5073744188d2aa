//! Message-level port over a pump's channel pair.
//!
//! [`GuestEndpoint`] owns the reading half of the guest pump's inbound
//! channel plus an accumulation buffer. Receiving always tries the framer
//! against already-buffered bytes before awaiting another chunk, so chunk
//! boundaries never split or merge messages. Sends are fire-and-forget
//! enqueues; the pump picks them up on its next cycle.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::protocol::{Message, MessageCodec, CRLF};
use crate::pump::{ChunkReceiver, ChunkSender};
use crate::{HarnessError, Result};

/// Send/receive port for the guest serial line.
#[derive(Debug)]
pub struct GuestEndpoint {
    outbound: ChunkSender,
    inbound: ChunkReceiver,
    accumulated: BytesMut,
    codec: MessageCodec,
}

impl GuestEndpoint {
    /// Wrap a pump channel pair. The codec uses the serial CRLF terminator.
    #[must_use]
    pub fn new(outbound: ChunkSender, inbound: ChunkReceiver) -> Self {
        Self {
            outbound,
            inbound,
            accumulated: BytesMut::new(),
            codec: MessageCodec::new(CRLF),
        }
    }

    /// Enqueue `text` plus a trailing newline for the guest.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Protocol`] when the pump has terminated and
    /// the channel is closed.
    pub fn send_line(&self, text: &str) -> Result<()> {
        self.enqueue(Bytes::from(format!("{text}\n")))
    }

    /// Enqueue raw payload bytes exactly as given (stdin passthrough).
    /// Empty payloads are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Protocol`] when the pump has terminated.
    pub fn push_raw(&self, data: &str) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.enqueue(Bytes::from(data.to_owned()))
    }

    /// Receive the next complete message.
    ///
    /// Buffered bytes are decoded before any await, so messages already in
    /// flight are never reordered behind fresh reads.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Protocol`] on a malformed frame or when the
    /// pump terminates with no complete message buffered.
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.codec.decode(&mut self.accumulated)? {
                return Ok(message);
            }
            match self.inbound.recv().await {
                Some(chunk) => self.accumulated.extend_from_slice(&chunk),
                None => return Err(HarnessError::Protocol("guest stream ended".into())),
            }
        }
    }

    /// Bytes received but not yet consumed by the framer.
    ///
    /// Diagnostic view used to build the unresponsive-session report.
    #[must_use]
    pub fn unparsed(&self) -> &[u8] {
        &self.accumulated
    }

    /// Lossy text rendering of [`Self::unparsed`].
    #[must_use]
    pub fn unparsed_text(&self) -> String {
        String::from_utf8_lossy(&self.accumulated).into_owned()
    }

    fn enqueue(&self, chunk: Bytes) -> Result<()> {
        self.outbound
            .send(chunk)
            .map_err(|_| HarnessError::Protocol("guest stream closed".into()))
    }
}
