//! CommandListener fed by real TCP clients.

mod common;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use camwire_core::client::{send_once, ClientConfig};
use camwire_core::message::CommandMessage;
use camwire_core::protocol::{encode, encode_frame, FrameHeader, FrameOptions};

use common::RunningListener;

fn malformed_frame(payload: &[u8]) -> Vec<u8> {
    let mut wire = FrameHeader::for_payload(payload.len() as u32, &FrameOptions::default())
        .to_bytes()
        .to_vec();
    wire.extend_from_slice(payload);
    wire
}

#[tokio::test]
async fn frames_from_sequential_clients_arrive_in_order() {
    let listener = RunningListener::start().await;
    let host = listener.addr.ip().to_string();
    let port = listener.addr.port();

    for target in ["deadbeef", "cafef00d"] {
        let msg = CommandMessage::start_streaming(target);
        send_once(&host, port, ClientConfig::default(), &msg, &FrameOptions::default())
            .await
            .unwrap();
    }

    let frames = listener.wait_for(2).await;
    assert_eq!(frames[0].message.dev_target.as_deref(), Some("deadbeef"));
    assert_eq!(frames[1].message.dev_target.as_deref(), Some("cafef00d"));
    listener.stop().await;
}

#[tokio::test]
async fn malformed_frame_does_not_end_the_connection() {
    let listener = RunningListener::start().await;
    let first = CommandMessage::start_streaming("deadbeef");
    let second = CommandMessage::new(4).with_dev_target("deadbeef");

    let mut wire = encode(&first).unwrap();
    wire.extend(malformed_frame(b"{\"code\": "));
    wire.extend(malformed_frame(&[0xff, 0xfe]));
    wire.extend(encode(&second).unwrap());

    let mut stream = TcpStream::connect(listener.addr).await.unwrap();
    stream.write_all(&wire).await.unwrap();
    stream.shutdown().await.unwrap();

    let frames = listener.wait_for(2).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].message, first);
    assert_eq!(frames[1].message, second);
    listener.stop().await;
}

#[tokio::test]
async fn frame_trickled_in_pieces_is_reassembled() {
    let listener = RunningListener::start().await;
    let msg = CommandMessage::start_streaming("deadbeef").with_field("channel", 1);
    let wire = encode_frame(&msg, &FrameOptions::default().with_package_id(42)).unwrap();

    let mut stream = TcpStream::connect(listener.addr).await.unwrap();
    for chunk in wire.chunks(7) {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    stream.shutdown().await.unwrap();

    let frames = listener.wait_for(1).await;
    assert_eq!(frames[0].message, msg);
    assert_eq!(frames[0].header.package_id, 42);
    listener.stop().await;
}

#[tokio::test]
async fn truncated_connection_does_not_stop_the_listener() {
    let listener = RunningListener::start().await;

    let wire = encode(&CommandMessage::start_streaming("deadbeef")).unwrap();
    let mut stream = TcpStream::connect(listener.addr).await.unwrap();
    stream.write_all(&wire[..wire.len() / 2]).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    let msg = CommandMessage::start_streaming("cafef00d");
    send_once(
        &listener.addr.ip().to_string(),
        listener.addr.port(),
        ClientConfig::default(),
        &msg,
        &FrameOptions::default(),
    )
    .await
    .unwrap();

    let frames = listener.wait_for(1).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].message, msg);
    listener.stop().await;
}
