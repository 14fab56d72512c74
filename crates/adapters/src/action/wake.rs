// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wake-on-LAN action
//!
//! Parameters: `mac` (required), `broadcast` (default `255.255.255.255`),
//! `port` (default 9).

use super::{Action, ActionError, ActionOutcome, Params};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

const DEFAULT_PORT: u16 = 9;

#[derive(Clone, Default)]
pub struct WakeAction;

impl WakeAction {
    pub const KIND: &'static str = "wake";

    pub fn new() -> Self {
        Self
    }
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated, or bare hex) into six bytes
pub fn parse_mac(text: &str) -> Result<[u8; 6], ActionError> {
    let invalid = || ActionError::InvalidParams(format!("invalid MAC address: {}", text));
    let hex: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 || !hex.is_ascii() {
        return Err(invalid());
    }
    let mut mac = [0u8; 6];
    for (i, byte) in mac.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(mac)
}

/// Six `0xFF` bytes followed by the MAC repeated sixteen times
pub fn magic_packet(mac: &[u8; 6]) -> Vec<u8> {
    let mut packet = vec![0xFF; 6];
    for _ in 0..16 {
        packet.extend_from_slice(mac);
    }
    packet
}

#[async_trait]
impl Action for WakeAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn invoke(
        &self,
        params: &Params,
        _deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let mac_text = params.require("mac")?;
        let mac = parse_mac(&mac_text)?;
        let broadcast: Ipv4Addr = match params.string("broadcast")? {
            Some(addr) => addr.parse().map_err(|_| {
                ActionError::InvalidParams(format!("invalid broadcast address: {}", addr))
            })?,
            None => Ipv4Addr::BROADCAST,
        };
        let port = params.port("port")?.unwrap_or(DEFAULT_PORT);

        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled);
        }

        let transport = |e: std::io::Error| ActionError::Transport(e.to_string());
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(transport)?;
        socket.set_broadcast(true).map_err(transport)?;
        socket
            .send_to(&magic_packet(&mac), (broadcast, port))
            .await
            .map_err(transport)?;

        Ok(ActionOutcome::ok(format!(
            "magic packet for {} sent to {}:{}\n",
            mac_text, broadcast, port
        )))
    }
}

#[cfg(test)]
#[path = "wake_tests.rs"]
mod tests;
