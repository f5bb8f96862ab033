//! Shared test helpers for camwire-core integration tests.
//!
//! Provides a scriptable mock camera that accepts one TCP connection and a
//! helper for running a [`CommandListener`] in the background.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use camwire_core::message::CommandMessage;
use camwire_core::protocol::{encode, Frame, FrameHeader, HEADER_LEN};
use camwire_core::receiver::CommandListener;

// ---------------------------------------------------------------------------
// Programmable mock camera
// ---------------------------------------------------------------------------

/// What the mock camera does next.
pub enum MockBehavior {
    /// Read everything until the client closes.
    Capture,
    /// Read one frame and answer with the given message.
    Reply(CommandMessage),
    /// Read one frame and then close the connection.
    Drop,
    /// Accept the connection but never read or write.
    Hang,
}

/// Start a mock camera that accepts exactly one connection and runs
/// `behaviors` in order.
///
/// The returned handle resolves to every byte the camera read.
pub async fn mock_camera(behaviors: Vec<MockBehavior>) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();

        for behavior in behaviors {
            match behavior {
                MockBehavior::Capture => {
                    stream.read_to_end(&mut received).await.unwrap();
                }
                MockBehavior::Reply(message) => {
                    if read_one_frame(&mut stream, &mut received).await.is_err() {
                        return received;
                    }
                    stream.write_all(&encode(&message).unwrap()).await.unwrap();
                    stream.flush().await.unwrap();
                }
                MockBehavior::Drop => {
                    let _ = read_one_frame(&mut stream, &mut received).await;
                    return received;
                }
                MockBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }
        }
        received
    });

    (addr, handle)
}

async fn read_one_frame(stream: &mut TcpStream, received: &mut Vec<u8>) -> std::io::Result<()> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let parsed = FrameHeader::parse(&header).unwrap();
    let mut payload = vec![0u8; parsed.length as usize];
    stream.read_exact(&mut payload).await?;
    received.extend_from_slice(&header);
    received.extend_from_slice(&payload);
    Ok(())
}

/// An address nothing is listening on.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

// ---------------------------------------------------------------------------
// Background listener
// ---------------------------------------------------------------------------

/// A [`CommandListener`] running on a background task.
pub struct RunningListener {
    pub addr: SocketAddr,
    pub frames: Arc<Mutex<Vec<Frame>>>,
    cancel: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningListener {
    pub async fn start() -> Self {
        let listener = CommandListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let sink = frames.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            listener
                .run(token, move |_, frame| sink.lock().unwrap().push(frame))
                .await
        });

        Self {
            addr,
            frames,
            cancel,
            handle,
        }
    }

    /// Wait until at least `count` frames arrived, or panic after 5s.
    pub async fn wait_for(&self, count: usize) -> Vec<Frame> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let frames = self.frames.lock().unwrap().clone();
            if frames.len() >= count {
                return frames;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("expected {count} frames, got {}", frames.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Cancel the listener and wait for it to stop.
    pub async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}
