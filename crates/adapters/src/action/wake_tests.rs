// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::collections::BTreeMap;

#[test]
fn parses_common_mac_notations() {
    let expected = [0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03];
    assert_eq!(parse_mac("aa:bb:cc:01:02:03").unwrap(), expected);
    assert_eq!(parse_mac("AA-BB-CC-01-02-03").unwrap(), expected);
    assert_eq!(parse_mac("aabbcc010203").unwrap(), expected);
}

#[test]
fn rejects_malformed_mac() {
    assert!(parse_mac("aa:bb:cc").is_err());
    assert!(parse_mac("zz:bb:cc:01:02:03").is_err());
    assert!(parse_mac("ää:bb:cc:01:02").is_err());
}

#[test]
fn magic_packet_layout() {
    let mac = [1, 2, 3, 4, 5, 6];
    let packet = magic_packet(&mac);
    assert_eq!(packet.len(), 102);
    assert_eq!(&packet[..6], &[0xFF; 6]);
    for chunk in packet[6..].chunks(6) {
        assert_eq!(chunk, &mac);
    }
}

#[tokio::test]
async fn sends_packet_to_target() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();

    let params: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
        "mac": "aa:bb:cc:dd:ee:ff",
        "broadcast": "127.0.0.1",
        "port": port,
    }))
    .unwrap();
    let outcome = WakeAction::new()
        .invoke(
            &Params::new(params),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(outcome.is_ok());

    let mut buf = [0u8; 256];
    let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
    assert_eq!(
        &buf[..len],
        magic_packet(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]).as_slice()
    );
}

#[tokio::test]
async fn invalid_broadcast_address_is_rejected() {
    let params: BTreeMap<String, serde_json::Value> =
        serde_json::from_value(json!({ "mac": "aabbccddeeff", "broadcast": "everyone" })).unwrap();
    let err = WakeAction::new()
        .invoke(
            &Params::new(params),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::InvalidParams(_)));
}
