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

//! The reconstructed forwarding record of a single probe packet.

use crate::NodeId;

use std::fmt;
use std::net::Ipv4Addr;

/// All postcards of one probe, reassembled into a forwarding path.
///
/// The path holds the switch ids in the order their postcards were captured; `ts` accumulates
/// the inter-postcard time differences, and `delay` is the same value converted to
/// milliseconds. Two traces are considered equal when source, destination, group-condition id
/// and probe id all match.
#[derive(Debug, Clone)]
pub struct TraceData {
    /// Probe id (the random L4 source port or ICMP sequence number)
    pub pktid: u16,
    /// Source IP address of the probe
    pub src: Ipv4Addr,
    /// Destination IP address of the probe
    pub dst: Ipv4Addr,
    /// Group-condition id carried in `ip.id`
    pub gcid: u16,
    /// Switch ids in postcard capture order
    pub path: Vec<NodeId>,
    /// Capture timestamp of the most recent postcard, in seconds
    pub lastts: f64,
    /// Accumulated time between postcards, in seconds
    pub ts: f64,
    /// Accumulated delay in milliseconds
    pub delay: f64,
}

impl TraceData {
    /// Create a fresh trace for a probe, before its first postcard is recorded.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, gcid: u16, pktid: u16) -> Self {
        Self { pktid, src, dst, gcid, path: Vec::new(), lastts: 0.0, ts: 0.0, delay: 0.0 }
    }
}

impl PartialEq for TraceData {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src
            && self.dst == other.dst
            && self.gcid == other.gcid
            && self.pktid == other.pktid
    }
}

impl fmt::Display for TraceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} path {:?} delay {}",
            self.gcid, self.src, self.dst, self.path, self.delay
        )
    }
}
