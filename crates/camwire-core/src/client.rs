//! Async client for the camera control channel.
//!
//! [`CameraClient`] owns at most one connection to the relay server (or the
//! camera itself) and writes [`CommandMessage`]s to it using the framing in
//! [`crate::protocol`]. Connect, write and read are each bounded by a timeout
//! from [`ClientConfig`]; any I/O failure or timeout drops the connection so a
//! half-written or stale stream is never reused.
//!
//! The client can connect via TCP or wrap a pre-connected stream, which is
//! how the tests drive it over an in-memory duplex pipe.
//!
//! # Example
//!
//! ```no_run
//! use camwire_core::client::CameraClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = CameraClient::new("192.168.1.200", 6123);
//! client.connect().await?;
//! client.start_streaming("deadbeef").await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Encoder;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::message::CommandMessage;
use crate::protocol::{
    parse_payload, CodecError, Frame, FrameCodec, FrameHeader, FrameOptions, ProtocolError,
    HEADER_LEN,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timeouts and socket options for a [`CameraClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Limit on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Limit on writing one complete frame.
    pub write_timeout: Duration,
    /// Limit on reading one complete frame.
    pub read_timeout: Duration,
    /// Enable TCP keepalive on the socket.
    pub keepalive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            keepalive: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CameraStream trait
// ---------------------------------------------------------------------------

/// A bidirectional async stream the client can talk over.
pub trait CameraStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> CameraStream for T {}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the camera.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Attempted to send or receive without an active connection.
    #[error("not connected")]
    NotConnected,

    /// Failed to establish a TCP connection.
    #[error("connection to {target} failed: {reason}")]
    ConnectionFailed { target: String, reason: String },

    /// A connect, write or read exceeded its timeout.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// An I/O error occurred on the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be encoded or the reply could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the connection before a full frame arrived.
    #[error("connection closed by peer")]
    Closed,
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => ClientError::Io(e),
            CodecError::Protocol(e) => ClientError::Protocol(e),
            CodecError::Truncated(_) => ClientError::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// CameraClient
// ---------------------------------------------------------------------------

/// Single-connection client for the camera control channel.
pub struct CameraClient {
    stream: Option<Box<dyn CameraStream>>,
    target: Option<String>,
    config: ClientConfig,
    codec: FrameCodec,
}

impl CameraClient {
    /// Create a client for `host:port`. No connection is made until
    /// [`connect`](Self::connect).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            stream: None,
            target: Some(format!("{}:{}", host.into(), port)),
            config: ClientConfig::default(),
            codec: FrameCodec::new(),
        }
    }

    /// Create a client over an already connected stream.
    pub fn from_stream(stream: impl CameraStream + 'static) -> Self {
        Self {
            stream: Some(Box::new(stream)),
            target: None,
            config: ClientConfig::default(),
            codec: FrameCodec::new(),
        }
    }

    /// Replace the timeout and socket configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Header fields and payload style used by [`send`](Self::send).
    pub fn with_frame_options(mut self, options: FrameOptions) -> Self {
        self.codec = self.codec.with_options(options);
        self
    }

    /// Payload ceiling for frames sent and received.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.codec = self.codec.with_max_payload(max_payload);
        self
    }

    /// The `host:port` this client connects to, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Establish the TCP connection.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let target = self.target.clone().ok_or_else(|| ClientError::ConnectionFailed {
            target: "<stream>".into(),
            reason: "no address configured".into(),
        })?;

        debug!(%target, "connecting");

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| ClientError::Timeout { operation: "connect" })?
            .map_err(|e| ClientError::ConnectionFailed {
                target: target.clone(),
                reason: e.to_string(),
            })?;

        stream.set_nodelay(true)?;
        if self.config.keepalive {
            socket2::SockRef::from(&stream).set_keepalive(true)?;
        }

        self.stream = Some(Box::new(stream));
        debug!(%target, "connected");
        Ok(())
    }

    /// Returns `true` if the client holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop the connection without a graceful shutdown.
    pub fn disconnect(&mut self) {
        self.stream.take();
    }

    /// Flush and shut down the write side, then release the connection.
    ///
    /// The connection is released even if the shutdown fails.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let result = timeout(self.config.write_timeout, async {
            stream.flush().await?;
            stream.shutdown().await
        })
        .await;
        debug!("connection closed");
        match result {
            Ok(res) => res.map_err(ClientError::Io),
            Err(_) => Err(ClientError::Timeout { operation: "close" }),
        }
    }

    /// Encode and send one command using the client's frame options.
    ///
    /// Returns the number of bytes written.
    pub async fn send(&mut self, message: &CommandMessage) -> Result<usize, ClientError> {
        let mut frame = BytesMut::new();
        self.codec.encode(message, &mut frame)?;
        let span = debug_span!("camera_send", code = message.code);
        self.write_frame(&frame).instrument(span).await?;
        Ok(frame.len())
    }

    /// Encode and send one command with explicit header fields.
    pub async fn send_with(
        &mut self,
        message: &CommandMessage,
        options: &FrameOptions,
    ) -> Result<usize, ClientError> {
        let mut frame = BytesMut::new();
        self.codec.clone().with_options(*options).encode(message, &mut frame)?;
        let span = debug_span!("camera_send", code = message.code, package_id = options.package_id);
        self.write_frame(&frame).instrument(span).await?;
        Ok(frame.len())
    }

    /// Ask `dev_target` to start streaming.
    pub async fn start_streaming(&mut self, dev_target: &str) -> Result<usize, ClientError> {
        self.send(&CommandMessage::start_streaming(dev_target)).await
    }

    /// Read one frame from the connection.
    ///
    /// A frame with an unparseable payload is fully consumed and reported as
    /// [`ProtocolError::MalformedPayload`]; the connection stays usable.
    pub async fn recv(&mut self) -> Result<Frame, ClientError> {
        let (header, payload) = self.read_frame().await?;
        let message = parse_payload(&payload, header.frame_len())?;
        Ok(Frame { header, message })
    }

    // -----------------------------------------------------------------------
    // Internal frame I/O
    // -----------------------------------------------------------------------

    async fn write_frame(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        trace!(frame = %hex::encode(data), "writing frame");

        let result = timeout(self.config.write_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => {
                debug!(frame_bytes = data.len(), "frame sent");
                Ok(())
            }
            Ok(Err(e)) => {
                self.stream.take();
                Err(ClientError::Io(e))
            }
            Err(_) => {
                // Part of the frame may be on the wire; the stream is no
                // longer frame-aligned.
                warn!("write timed out, dropping connection");
                self.stream.take();
                Err(ClientError::Timeout { operation: "write" })
            }
        }
    }

    async fn read_frame(&mut self) -> Result<(FrameHeader, Vec<u8>), ClientError> {
        let max_payload = self.codec.max_payload();
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let result = timeout(self.config.read_timeout, async {
            let mut header = [0u8; HEADER_LEN];
            stream.read_exact(&mut header).await.map_err(read_error)?;
            let header = FrameHeader::parse(&header)?;

            let length = header.length as usize;
            if length > max_payload {
                return Err(ClientError::Protocol(ProtocolError::FrameTooLarge {
                    length,
                    limit: max_payload,
                }));
            }

            let mut payload = vec![0u8; length];
            trace!(payload_bytes = length, "reading frame");
            stream.read_exact(&mut payload).await.map_err(read_error)?;
            Ok::<_, ClientError>((header, payload))
        })
        .await;

        match result {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(e)) => {
                // The rest of the frame is still unread.
                self.stream.take();
                Err(e)
            }
            Err(_) => {
                // A late reply would desynchronise the next read.
                self.stream.take();
                Err(ClientError::Timeout { operation: "read" })
            }
        }
    }
}

fn read_error(err: std::io::Error) -> ClientError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ClientError::Closed
    } else {
        ClientError::Io(err)
    }
}

/// Connect, send a single command, and close.
///
/// Once connected, the connection is closed on every exit path.
pub async fn send_once(
    host: &str,
    port: u16,
    config: ClientConfig,
    message: &CommandMessage,
    options: &FrameOptions,
) -> Result<usize, ClientError> {
    let mut client = CameraClient::new(host, port).with_config(config);
    client.connect().await?;

    let sent = client.send_with(message, options).await;
    if let Err(e) = client.close().await {
        debug!(error = %e, "close after send failed");
    }
    sent
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
