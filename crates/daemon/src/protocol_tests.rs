// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;
use cg_core::{ActionSpec, Trigger};

#[test]
fn create_request_carries_full_spec() {
    let spec = TaskSpec::new(
        "wake nas",
        Trigger::cron("30 6 * * mon-fri").unwrap(),
        ActionSpec::new("wake").with_param("mac", "aa:bb:cc:dd:ee:ff"),
    )
    .with_timeout(Duration::from_secs(10));
    let request = Request::CreateTask { spec };

    let encoded = encode(&request).expect("encode failed");
    let decoded: Request = decode(&encoded).expect("decode failed");
    assert_eq!(request, decoded);
}

#[test]
fn requests_are_tagged_by_type() {
    let encoded = encode(&Request::RunNow {
        id: TaskId::new("abc"),
    })
    .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
    assert_eq!(json["type"], "RunNow");
    assert_eq!(json["id"], "abc");
}

#[test]
fn error_responses_decode_from_plain_json() {
    let decoded: Response =
        decode(br#"{"type":"Busy","message":"task abc already has an active run"}"#).unwrap();
    assert!(matches!(decoded, Response::Busy { message } if message.contains("abc")));
}

#[test]
fn garbage_is_a_json_error() {
    let err = decode::<Request>(b"not json").unwrap_err();
    assert!(matches!(err, ProtocolError::Json(_)));
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data)
        .await
        .expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn read_message_reads_back_what_was_written() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, b"hello world").await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    assert_eq!(read_message(&mut cursor).await.unwrap(), b"hello world");
}

#[tokio::test]
async fn empty_stream_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_is_rejected_before_reading_body() {
    let len = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
    let mut cursor = std::io::Cursor::new(len.to_vec());
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::TooLarge(_)));
}

#[tokio::test]
async fn request_read_times_out_on_silent_peer() {
    let (_client, server) = tokio::io::duplex(64);
    let (mut reader, _writer) = tokio::io::split(server);
    let err = read_request(&mut reader, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}
