//! Transport layer - Pure I/O abstraction for message exchange
//!
//! This module provides the core transport abstraction that handles
//! bidirectional message exchange without knowledge of message format.
//! The same transport serves standard streams, TCP connections and
//! in-memory pipes used by tests.

use async_trait::async_trait;
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, trace};

// ============================================================================
// Constants
// ============================================================================

/// Size of the read buffer for inbound reading operations
const READ_BUFFER_SIZE: usize = 4096;

/// Core transport trait for bidirectional message exchange
///
/// Inbound data is delivered as raw byte chunks with no alignment to
/// messages or to UTF-8 sequences; decoding is left to the framing layer.
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a message (raw string)
    async fn send(&mut self, message: &str) -> Result<(), Self::Error>;

    /// Receive a chunk of raw bytes
    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;
}

// ============================================================================
// Stream Transport Implementation
// ============================================================================

/// Error types for stream transport
#[derive(Debug, thiserror::Error)]
pub enum StreamTransportError {
    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Transport implementation over an arbitrary byte stream pair
///
/// Reading and writing happen on dedicated background tasks; the transport
/// itself only talks to them through channels. The single writer task is
/// what serializes concurrent outbound writes.
#[derive(Debug)]
pub struct StreamTransport {
    /// Channel for sending messages to the writer task
    outbound_sender: Option<mpsc::UnboundedSender<String>>,

    /// Channel for receiving raw chunks from the reader task
    inbound_receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,

    /// Connection status
    connected: bool,
}

impl StreamTransport {
    /// Create a new StreamTransport from a reader/writer pair
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel();
        let (inbound_sender, inbound_receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::writer_task(writer, outbound_receiver));
        tokio::spawn(Self::reader_task(reader, inbound_sender));

        Self {
            outbound_sender: Some(outbound_sender),
            inbound_receiver: Some(inbound_receiver),
            connected: true,
        }
    }

    /// Transport over the process's own standard input and output
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Background task that writes messages to the output stream
    async fn writer_task<W>(mut writer: W, mut receiver: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        while let Some(message) = receiver.recv().await {
            trace!(
                "StreamTransport: Writing message (length: {})",
                message.len()
            );

            if let Err(e) = writer.write_all(message.as_bytes()).await {
                error!("Failed to write to output stream: {}", e);
                break;
            }

            if let Err(e) = writer.flush().await {
                error!("Failed to flush output stream: {}", e);
                break;
            }
        }

        let _ = writer.shutdown().await;
        trace!("StreamTransport: writer task finished");
    }

    /// Background task that forwards everything read from the input stream
    async fn reader_task<R>(reader: R, sender: mpsc::UnboundedSender<Vec<u8>>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(reader);
        let mut read_buffer = Box::new([0u8; READ_BUFFER_SIZE]);

        loop {
            match reader.read(read_buffer.as_mut()).await {
                Ok(0) => {
                    trace!("StreamTransport: input stream reached EOF");
                    break;
                }
                Ok(n) => {
                    if sender.send(read_buffer[..n].to_vec()).is_err() {
                        trace!("StreamTransport: receiver dropped, stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    error!("Failed to read from input stream: {}", e);
                    break;
                }
            }
        }

        trace!("StreamTransport: reader task finished");
    }
}

#[async_trait]
impl Transport for StreamTransport {
    type Error = StreamTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StreamTransportError::Disconnected);
        }

        let sender = self
            .outbound_sender
            .as_ref()
            .ok_or(StreamTransportError::Disconnected)?;

        sender
            .send(message.to_string())
            .map_err(|e| StreamTransportError::Channel(e.to_string()))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        if !self.connected {
            return Err(StreamTransportError::Disconnected);
        }

        let receiver = self
            .inbound_receiver
            .as_mut()
            .ok_or(StreamTransportError::Disconnected)?;

        match receiver.recv().await {
            Some(data) => Ok(data),
            None => {
                self.connected = false;
                Err(StreamTransportError::Disconnected)
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        // Dropping the sender lets the writer task flush what is queued and exit
        self.outbound_sender.take();
        self.inbound_receiver.take();
        Ok(())
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[cfg(test)]
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,
    #[error("No more responses available")]
    NoMoreResponses,
}

/// Mock transport for testing - allows controlling sent/received messages
#[cfg(test)]
pub struct MockTransport {
    /// Messages that were sent via this transport
    sent_messages: Arc<Mutex<Vec<String>>>,

    /// Predefined chunks to return when receive() is called
    responses: Arc<Mutex<VecDeque<Vec<u8>>>>,

    /// Connection status
    connected: bool,
}

#[cfg(test)]
impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            sent_messages: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            connected: true,
        }
    }

    /// Create a mock transport with predefined inbound chunks
    pub fn with_responses<C: Into<Vec<u8>>>(responses: Vec<C>) -> Self {
        let transport = Self::new();
        transport
            .responses
            .lock()
            .unwrap()
            .extend(responses.into_iter().map(Into::into));
        transport
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Get all messages that were sent via this transport
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent_messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.sent_messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .ok_or(MockTransportError::NoMoreResponses)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
