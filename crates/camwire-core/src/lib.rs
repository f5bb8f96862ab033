//! # camwire-core
//!
//! Core library for talking to V720-family IP cameras over their binary
//! control channel.
//!
//! Every command travels as a frame: an 18-byte little-endian header
//! followed by a JSON payload whose length the header announces. This crate
//! provides the codec for that framing, a client that owns one scoped TCP
//! connection, a receiver for reading frames back off a stream, and a thin
//! wrapper around an external packet-capture tool.
//!
//! ## Modules
//!
//! - [`message`] - The JSON command message (`code`, `devTarget`, extras)
//! - [`protocol`] - Frame header layout, encode/decode and a tokio-util codec
//! - [`client`] - Connection lifecycle with timeouts and single-shot sends
//! - [`receiver`] - Frame receiver and a one-peer-at-a-time command listener
//! - [`capture`] - Packet capture via `tcpdump` plus an in-process fake
//! - [`config`] - Persistent settings in `~/.camwire/config.json`
//!
//! ## External Dependencies
//!
//! Only [`capture`] needs outside tools: **tcpdump** (and usually `sudo`).
//!
//! ## Example
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

pub mod capture;
pub mod client;
pub mod config;
pub mod message;
pub mod protocol;
pub mod receiver;
