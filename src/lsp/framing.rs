//! LSP message framing layer
//!
//! Handles LSP-specific message framing using Content-Length headers
//! as the Language Server Protocol base protocol defines them.
//!
//! LSP message framing format:
//! Content-Length: <length>\r\n\r\n<content>
//!
//! The length counts bytes, so frames are cut from raw bytes and handed on
//! undecoded. Callers decide what to do with a body that is not UTF-8.

use crate::io::transport::Transport;
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::trace;

/// Error types for LSP framing
#[derive(Debug, thiserror::Error)]
pub enum LspFramingError<T: std::error::Error + Send + Sync + 'static> {
    #[error("Transport error: {0}")]
    Transport(T),

    #[error("Invalid LSP message format: {0}")]
    InvalidFormat(String),

    #[error("Invalid content length: {0}")]
    InvalidContentLength(String),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Maximum message size to prevent memory exhaustion
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB

const HEADER_SEPARATOR: &str = "\r\n\r\n";
const HEADER_SEPARATOR_BYTES: &[u8] = HEADER_SEPARATOR.as_bytes();

/// LSP message framing wrapper
///
/// Wraps any transport to handle LSP message framing with Content-Length headers.
/// The underlying transport works with raw chunks while this wrapper
/// reassembles them into complete message bodies.
pub struct LspFraming<T: Transport> {
    /// Underlying transport
    transport: T,

    /// Buffer for accumulating partial messages
    receive_buffer: Vec<u8>,

    /// Queue of complete message bodies ready to be returned
    message_queue: VecDeque<Vec<u8>>,
}

impl<T: Transport> LspFraming<T> {
    /// Create a new LSP framing wrapper around a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            receive_buffer: Vec::new(),
            message_queue: VecDeque::new(),
        }
    }

    /// Get a reference to the underlying transport
    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Frame a payload with its Content-Length header
    pub fn frame(message: &str) -> String {
        format!("Content-Length: {}{}{}", message.len(), HEADER_SEPARATOR, message)
    }

    /// Parse LSP message from the receive buffer
    ///
    /// Returns Some(body) if a complete message was parsed,
    /// None if more data is needed.
    fn try_parse_message(&mut self) -> Result<Option<Vec<u8>>, LspFramingError<T::Error>> {
        let Some(header_end) = self
            .receive_buffer
            .windows(HEADER_SEPARATOR_BYTES.len())
            .position(|window| window == HEADER_SEPARATOR_BYTES)
        else {
            return Ok(None);
        };

        let header = std::str::from_utf8(&self.receive_buffer[..header_end]).map_err(|_| {
            LspFramingError::InvalidFormat("Header is not valid UTF-8".to_string())
        })?;
        let content_start = header_end + HEADER_SEPARATOR_BYTES.len();
        let content_length = Self::parse_content_length(header)?;

        let available_content = self.receive_buffer.len() - content_start;
        if available_content < content_length {
            trace!(
                "LspFraming: Incomplete message - need {} more bytes",
                content_length - available_content
            );
            return Ok(None);
        }

        let content_end = content_start + content_length;
        let message = self.receive_buffer[content_start..content_end].to_vec();
        self.receive_buffer.drain(..content_end);

        trace!(
            "LspFraming: Parsed complete message ({} bytes)",
            content_length
        );
        Ok(Some(message))
    }

    /// Parse Content-Length from LSP headers
    fn parse_content_length(header: &str) -> Result<usize, LspFramingError<T::Error>> {
        for line in header.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("content-length") {
                continue;
            }

            let length_str = value.trim();
            let length = length_str
                .parse::<usize>()
                .map_err(|_| LspFramingError::InvalidContentLength(length_str.to_string()))?;

            if length > MAX_MESSAGE_SIZE {
                return Err(LspFramingError::MessageTooLarge {
                    size: length,
                    max: MAX_MESSAGE_SIZE,
                });
            }

            return Ok(length);
        }

        Err(LspFramingError::InvalidFormat(
            "Missing Content-Length header".to_string(),
        ))
    }

    /// Read one chunk from the transport and extract any complete messages
    async fn process_transport_data(&mut self) -> Result<(), LspFramingError<T::Error>> {
        let new_data = self
            .transport
            .receive()
            .await
            .map_err(LspFramingError::Transport)?;

        self.receive_buffer.extend_from_slice(&new_data);

        while let Some(message) = self.try_parse_message()? {
            self.message_queue.push_back(message);
        }

        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for LspFraming<T> {
    type Error = LspFramingError<T::Error>;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        trace!(
            "LspFraming: Sending framed message ({} bytes content)",
            message.len()
        );

        self.transport
            .send(&Self::frame(message))
            .await
            .map_err(LspFramingError::Transport)
    }

    /// Receive one complete message body
    ///
    /// Cancel safe: the only suspension point is the underlying transport
    /// read, and parsed messages are queued on `self` before returning.
    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        loop {
            if let Some(message) = self.message_queue.pop_front() {
                return Ok(message);
            }

            self.process_transport_data().await?;
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.transport
            .close()
            .await
            .map_err(LspFramingError::Transport)
    }
}
