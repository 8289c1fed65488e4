// Rime: Runtime Verification of OpenFlow Forwarding Policies
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Postcards
//!
//! A postcard is a truncated copy of a dataplane packet, stamped by the switch that forwarded
//! it and sent to the collector. The stamp lives in the destination MAC address:
//!
//! ```text
//! 0x42 0x42 | switch-id high | switch-id low | outport high | outport low
//! ```
//!
//! This module holds the MAC codec and the JSON record the collector emits for every captured
//! postcard.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// The two magic bytes opening every postcard MAC address.
pub const POSTCARD_MAGIC: [u8; 2] = [0x42, 0x42];

/// Encode a switch id and output port into a postcard destination MAC address.
pub fn encode_mac(switch: u16, outport: u16) -> [u8; 6] {
    [
        POSTCARD_MAGIC[0],
        POSTCARD_MAGIC[1],
        (switch >> 8) as u8,
        (switch & 0xff) as u8,
        (outport >> 8) as u8,
        (outport & 0xff) as u8,
    ]
}

/// Decode a postcard destination MAC address back into `(switch id, output port)`. Returns
/// `None` if the address does not start with the magic bytes.
pub fn decode_mac(mac: [u8; 6]) -> Option<(u16, u16)> {
    if mac[0..2] != POSTCARD_MAGIC {
        return None;
    }
    let switch = ((mac[2] as u16) << 8) | mac[3] as u16;
    let outport = ((mac[4] as u16) << 8) | mac[5] as u16;
    Some((switch, outport))
}

/// The L4 protocol of a probe packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    /// ICMP echo request
    Icmp,
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl fmt::Display for ProbeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "icmp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// One decoded postcard, as stored in the JSON trace file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcardRecord {
    /// Probe id (L4 source port, or the echo sequence number for ICMP)
    pub id: u16,
    /// Capture timestamp in seconds
    pub ts: f64,
    /// Source IP address of the probe
    pub src: Ipv4Addr,
    /// Destination IP address of the probe
    pub dst: Ipv4Addr,
    /// Group-condition id carried in `ip.id`
    pub gcid: u16,
    /// L4 protocol of the probe
    pub proto: ProbeProtocol,
    /// Switch that emitted the postcard
    pub switch: u16,
    /// Port the original packet was forwarded on
    pub outport: u16,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mac_decode_inverts_encode() {
        for &(switch, outport) in
            &[(0u16, 0u16), (1, 2), (0x1234, 0x00ff), (0xffff, 0xfeff), (7, 0xfeff)]
        {
            assert_eq!(decode_mac(encode_mac(switch, outport)), Some((switch, outport)));
        }
    }

    #[test]
    fn mac_magic_is_checked() {
        assert_eq!(decode_mac([0x42, 0x42, 0, 1, 0, 2]), Some((1, 2)));
        assert_eq!(decode_mac([0x42, 0x43, 0, 1, 0, 2]), None);
        assert_eq!(decode_mac([0, 0, 0, 1, 0, 2]), None);
    }

    #[test]
    fn record_json_shape() {
        let record = PostcardRecord {
            id: 4242,
            ts: 1.5,
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(10, 0, 0, 2),
            gcid: 1,
            proto: ProbeProtocol::Udp,
            switch: 1,
            outport: 2,
        };
        let json = serde_json::to_string(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 4242);
        assert_eq!(value["src"], "10.0.0.1");
        assert_eq!(value["proto"], "udp");
        assert_eq!(value["switch"], 1);

        let back: PostcardRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
