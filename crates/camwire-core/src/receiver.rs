//! Receiving frames from a byte stream.
//!
//! [`FrameReceiver`] turns any [`AsyncRead`] into a sequence of [`Frame`]s.
//! Frames with an unparseable payload are logged, counted and skipped; the
//! receiver carries on with the bytes that follow them. [`CommandListener`]
//! accepts TCP connections one at a time and feeds every decoded frame to a
//! callback, which is enough to stand in for the camera or the relay server
//! when testing a client.
//!
//! # Example
//!
//! ```no_run
//! use camwire_core::receiver::CommandListener;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = CommandListener::bind("0.0.0.0:6123").await?;
//! let cancel = CancellationToken::new();
//! listener
//!     .run(cancel, |peer, frame| println!("{peer}: {}", frame.message))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::protocol::{CodecError, Frame, FrameCodec};

const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// FrameReceiver
// ---------------------------------------------------------------------------

/// Pulls frames out of a byte stream.
pub struct FrameReceiver<R> {
    reader: R,
    codec: FrameCodec,
    buf: BytesMut,
    malformed: u64,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, FrameCodec::new())
    }

    /// Use a custom codec (e.g. a different payload ceiling).
    pub fn with_codec(reader: R, codec: FrameCodec) -> Self {
        Self {
            reader,
            codec,
            buf: BytesMut::with_capacity(READ_CHUNK),
            malformed: 0,
        }
    }

    /// Number of malformed frames skipped so far.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Wait for the next well-formed frame.
    ///
    /// Returns `Ok(None)` when the stream ends on a frame boundary and
    /// [`CodecError::Truncated`] when it ends partway through one.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            while let Some(item) = self.codec.decode(&mut self.buf)? {
                match item {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        self.malformed += 1;
                        warn!(error = %e, "dropping malformed frame");
                    }
                }
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return match self.codec.decode_eof(&mut self.buf)? {
                    Some(Ok(frame)) => Ok(Some(frame)),
                    Some(Err(e)) => {
                        self.malformed += 1;
                        warn!(error = %e, "dropping malformed frame");
                        Ok(None)
                    }
                    None => Ok(None),
                };
            }
            debug!(bytes = n, buffered = self.buf.len(), "read from stream");
        }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

// ---------------------------------------------------------------------------
// CommandListener
// ---------------------------------------------------------------------------

/// TCP listener that decodes incoming frames, serving one peer at a time.
pub struct CommandListener {
    listener: TcpListener,
    codec: FrameCodec,
}

impl CommandListener {
    /// Bind to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            codec: FrameCodec::new(),
        })
    }

    /// Use a custom codec for every connection.
    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
    }

    /// The bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until `cancel` fires.
    ///
    /// Each connection is read to completion before the next is accepted.
    /// A connection that fails (I/O error, truncated or oversized frame) is
    /// logged and dropped; the listener keeps running.
    pub async fn run<F>(&self, cancel: CancellationToken, mut on_frame: F) -> std::io::Result<()>
    where
        F: FnMut(SocketAddr, Frame),
    {
        info!(addr = ?self.listener.local_addr().ok(), "listening for frames");

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };

            let span = info_span!("peer", %peer);
            self.serve(stream, peer, &cancel, &mut on_frame)
                .instrument(span)
                .await;
        }

        info!("listener stopped");
        Ok(())
    }

    async fn serve<F>(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: &CancellationToken,
        on_frame: &mut F,
    ) where
        F: FnMut(SocketAddr, Frame),
    {
        info!("peer connected");
        let mut receiver = FrameReceiver::with_codec(stream, self.codec.clone());

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = receiver.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => {
                    debug!(code = frame.message.code, package_id = frame.header.package_id, "frame received");
                    on_frame(peer, frame);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "dropping connection");
                    break;
                }
            }
        }

        info!(malformed = receiver.malformed_count(), "peer disconnected");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
