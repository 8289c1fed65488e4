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

//! # Postcard collector
//!
//! Sniffs all non-ARP traffic on the capture interface for a fixed wall-clock interval and
//! decodes every tagged postcard into a [`PostcardRecord`]. During the capture the callback
//! only stores the raw frames; decoding happens after the timeout elapsed, to keep the sniff
//! loop cheap.

use crate::postcard::{decode_mac, PostcardRecord, ProbeProtocol};
use crate::protocols::MAGIC_CHECKSUM;
use rime_openflow::port;

use etherparse::{InternetSlice, LinkSlice, SlicedPacket, TransportSlice};
use log::*;
use pcap::{Capture, Device};
use std::error::Error;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Sniff the default capture device for `seconds` and return all decoded postcards in capture
/// order.
pub fn collect(seconds: u64) -> Result<Vec<PostcardRecord>, Box<dyn Error>> {
    let device = Device::lookup()?;
    info!("Capturing on device {} for {} seconds", device.name, seconds);

    let mut cap = Capture::from_device(device)?.promisc(true).timeout(100).open()?;
    cap.filter("not arp")?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut frames: Vec<(f64, Vec<u8>)> = Vec::new();

    while Instant::now() < deadline {
        match cap.next() {
            Ok(packet) => {
                let ts = packet.header.ts.tv_sec as f64
                    + packet.header.ts.tv_usec as f64 * 1e-6;
                frames.push((ts, packet.data.to_vec()));
            }
            // read timeout: just check the clock again
            Err(_) => continue,
        }
    }

    info!("Captured {} frames", frames.len());
    Ok(frames.iter().filter_map(|(ts, data)| decode_postcard(*ts, data)).collect())
}

/// Serialize postcard records into the JSON trace format.
pub fn to_json(records: &[PostcardRecord]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}

/// Decode one captured frame into a postcard record.
///
/// Frames without the postcard MAC magic are ignored; postcards whose output port points to a
/// reserved OpenFlow port (the copy a switch sent to its controller), with an unknown L4
/// protocol, or without the magic checksum are dropped with a warning.
pub fn decode_postcard(ts: f64, data: &[u8]) -> Option<PostcardRecord> {
    let sliced = match SlicedPacket::from_ethernet(data) {
        Ok(sliced) => sliced,
        Err(e) => {
            debug!("Cannot parse captured frame: {:?}", e);
            return None;
        }
    };

    let eth = match &sliced.link {
        Some(LinkSlice::Ethernet2(e)) => e.to_header(),
        None => return None,
    };
    let (switch, outport) = match decode_mac(eth.destination) {
        Some(decoded) => decoded,
        None => {
            debug!("Not a postcard, skipping frame");
            return None;
        }
    };
    if outport >= port::MAX {
        warn!("Outport {:#06x} is reserved, probably sent to controller, skipping frame", outport);
        return None;
    }

    let ip = match &sliced.ip {
        Some(InternetSlice::Ipv4(s)) => s.to_header(),
        _ => {
            debug!("Postcard without an IPv4 header, skipping frame");
            return None;
        }
    };

    let (proto, id, checksum) = match &sliced.transport {
        Some(TransportSlice::Udp(u)) => {
            let h = u.to_header();
            (ProbeProtocol::Udp, h.source_port, h.checksum)
        }
        Some(TransportSlice::Tcp(t)) => {
            let h = t.to_header();
            (ProbeProtocol::Tcp, h.source_port, h.checksum)
        }
        // ICMP is no transport protocol to the slicer, take the echo header apart by hand
        None if ip.protocol == 1 => {
            let echo = sliced.payload;
            if echo.len() < 8 {
                warn!("Truncated ICMP postcard, skipping frame");
                return None;
            }
            (
                ProbeProtocol::Icmp,
                u16::from_be_bytes([echo[6], echo[7]]),
                u16::from_be_bytes([echo[2], echo[3]]),
            )
        }
        _ => {
            warn!("Unknown protocol {} in postcard, skipping frame", ip.protocol);
            return None;
        }
    };

    if checksum != MAGIC_CHECKSUM {
        warn!("Checksum {:#06x} does not match the magic value, skipping frame", checksum);
        return None;
    }

    Some(PostcardRecord {
        id,
        ts,
        src: Ipv4Addr::from(ip.source),
        dst: Ipv4Addr::from(ip.destination),
        gcid: ip.identification,
        proto,
        switch,
        outport,
    })
}
