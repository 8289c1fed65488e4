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

//! # Mapping
//!
//! The static node mapping, read from a file with one line per node:
//!
//! ```text
//! 1 10.0.0.101 x 6634
//! 4 10.0.0.1 00:00:00:00:00:04 0
//! ```
//!
//! Each node maps to its IP address, MAC address and OpenFlow control port. Hosts carry a
//! meaningful MAC address and an OpenFlow port of 0; switches carry the placeholder `x` instead
//! of a MAC address and the TCP port of their OpenFlow listener.

use crate::NodeId;

use std::collections::HashMap;
use std::fs::read_to_string;
use std::net::Ipv4Addr;
use thiserror::Error;

/// The data stored for a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// IP address of the node
    pub ip: Ipv4Addr,
    /// MAC address of the node, `None` for switches (placeholder `x` in the file)
    pub mac: Option<[u8; 6]>,
    /// TCP port of the OpenFlow listener, 0 for hosts
    pub ofport: u16,
}

/// Total mapping from node id to [`NodeInfo`].
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    mapping: HashMap<NodeId, NodeInfo>,
}

impl Mapping {
    /// Read and parse a mapping file.
    pub fn from_file(filename: impl AsRef<str>) -> Result<Self, MappingError> {
        Self::from_str(&read_to_string(filename.as_ref())?)
    }

    /// Parse a mapping from its textual representation.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(data: &str) -> Result<Self, MappingError> {
        let mut mapping = HashMap::new();

        for (i, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(MappingError::WrongFieldCount { line: i, count: fields.len() });
            }

            let node: NodeId = fields[0]
                .parse()
                .map_err(|_| MappingError::invalid(i, "node id", fields[0]))?;
            let ip: Ipv4Addr = fields[1]
                .parse()
                .map_err(|_| MappingError::invalid(i, "IP address", fields[1]))?;
            let mac = match fields[2] {
                "x" => None,
                m => Some(parse_mac(m).ok_or_else(|| MappingError::invalid(i, "MAC address", m))?),
            };
            let ofport: u16 = fields[3]
                .parse()
                .map_err(|_| MappingError::invalid(i, "OpenFlow port", fields[3]))?;

            mapping.insert(node, NodeInfo { ip, mac, ofport });
        }

        Ok(Self { mapping })
    }

    /// The full record for a node.
    pub fn get(&self, node: NodeId) -> Option<&NodeInfo> {
        self.mapping.get(&node)
    }

    /// IP address of a node.
    pub fn ip(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.mapping.get(&node).map(|m| m.ip)
    }

    /// MAC address of a node (`None` for switches and unknown nodes).
    pub fn mac(&self, node: NodeId) -> Option<[u8; 6]> {
        self.mapping.get(&node).and_then(|m| m.mac)
    }

    /// OpenFlow control port of a node (0 for hosts).
    pub fn ofport(&self, node: NodeId) -> Option<u16> {
        self.mapping.get(&node).map(|m| m.ofport)
    }

    /// Reverse lookup of a node by its IP address.
    pub fn node_by_ip(&self, ip: Ipv4Addr) -> Option<NodeId> {
        self.mapping.iter().find(|(_, m)| m.ip == ip).map(|(n, _)| *n)
    }

    /// Reverse lookup of a node by its MAC address.
    pub fn node_by_mac(&self, mac: [u8; 6]) -> Option<NodeId> {
        self.mapping.iter().find(|(_, m)| m.mac == Some(mac)).map(|(n, _)| *n)
    }
}

/// Parse a MAC address of the form `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut fields = s.split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(fields.next()?, 16).ok()?;
    }
    match fields.next() {
        None => Some(mac),
        Some(_) => None,
    }
}

/// Errors raised while parsing a mapping file. All of them are fatal configuration errors.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Io Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The line does not have exactly four fields
    #[error("Line {line} has {count} fields, expected 4!")]
    WrongFieldCount {
        /// Line number of the offending line
        line: usize,
        /// Number of fields found
        count: usize,
    },
    /// A field cannot be parsed
    #[error("Invalid {what} on line {line}: {token}")]
    InvalidField {
        /// Line number of the offending line
        line: usize,
        /// Description of the expected field
        what: &'static str,
        /// The offending token
        token: String,
    },
}

impl MappingError {
    fn invalid(line: usize, what: &'static str, token: &str) -> Self {
        Self::InvalidField { line, what, token: token.to_string() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MAPPING: &str = "\
1 10.0.0.101 x 6634
2 10.0.0.102 x 6635
4 10.0.0.1 00:00:00:00:00:04 0
5 10.0.0.2 00:00:00:00:00:05 0
";

    #[test]
    fn parse_simple() {
        let mapping = Mapping::from_str(MAPPING).unwrap();
        assert_eq!(mapping.ip(1), Some(Ipv4Addr::new(10, 0, 0, 101)));
        assert_eq!(mapping.mac(1), None);
        assert_eq!(mapping.ofport(1), Some(6634));
        assert_eq!(mapping.mac(4), Some([0, 0, 0, 0, 0, 4]));
        assert_eq!(mapping.ofport(4), Some(0));
        assert_eq!(mapping.get(3), None);
    }

    #[test]
    fn reverse_lookup() {
        let mapping = Mapping::from_str(MAPPING).unwrap();
        assert_eq!(mapping.node_by_ip(Ipv4Addr::new(10, 0, 0, 2)), Some(5));
        assert_eq!(mapping.node_by_ip(Ipv4Addr::new(10, 0, 0, 99)), None);
        assert_eq!(mapping.node_by_mac([0, 0, 0, 0, 0, 5]), Some(5));
        assert_eq!(mapping.node_by_mac([0, 0, 0, 0, 0, 9]), None);
    }

    #[test]
    fn macs() {
        assert_eq!(parse_mac("00:01:02:0a:0b:ff"), Some([0, 1, 2, 10, 11, 255]));
        assert_eq!(parse_mac("00:01:02:0a:0b"), None);
        assert_eq!(parse_mac("00:01:02:0a:0b:ff:00"), None);
        assert_eq!(parse_mac("zz:01:02:0a:0b:ff"), None);
    }

    #[test]
    fn reject_garbage() {
        assert!(Mapping::from_str("1 10.0.0.1 x").is_err());
        assert!(Mapping::from_str("a 10.0.0.1 x 0").is_err());
        assert!(Mapping::from_str("1 10.0.0.300 x 0").is_err());
        assert!(Mapping::from_str("1 10.0.0.1 nomac 0").is_err());
    }
}
