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

//! # Protocol plugins
//!
//! Each plugin builds the L2-L4 header stack of a probe packet for one protocol. Every probe
//! carries the group-condition id in `ip.id`, the magic value `0x4242` in its L4 checksum
//! field, and the probe id in its L4 source port (for ICMP, in the echo id and sequence
//! fields). The sentinel checksum is what lets the collector tell probes from background
//! traffic.
//!
//! The registry is a closed list: `default` (UDP), `icmp`, `http`, `ssh` and `mail`. Note that
//! `mail` fans out into one probe frame per well-known mail port.

use etherparse::{Ethernet2Header, IpTrafficClass, Ipv4Header, TcpHeader, UdpHeader};
use std::error::Error;
use std::net::Ipv4Addr;

/// Sentinel value carried in the L4 checksum field of every probe.
pub const MAGIC_CHECKSUM: u16 = 0x4242;

/// UDP destination port of probes built by the default protocol.
pub const DEFAULT_UDP_PORT: u16 = 64242;

/// TCP destination ports probed by the `mail` protocol: smtp, imap, imap3, smtps, submission
/// and imaps.
pub const MAIL_PORTS: [u16; 6] = [25, 143, 220, 465, 587, 993];

/// Ethertype of IPv4.
const ETHERTYPE_IPV4: u16 = 0x0800;

/// Addresses of one end of a probe flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeEndpoint {
    /// MAC address of the host
    pub mac: [u8; 6],
    /// IP address of the host
    pub ip: Ipv4Addr,
}

/// A protocol plugin builds the probe frames of its protocol for one `(source, destination)`
/// pair. Most protocols build exactly one frame.
pub trait ProtocolPlugin: Sync {
    /// Name of the protocol, as referenced by `Prot =` conditions.
    fn name(&self) -> &'static str;

    /// Build the probe frames, tagged with the group-condition id and the probe id.
    fn build(
        &self,
        src: &ProbeEndpoint,
        dst: &ProbeEndpoint,
        gcid: u16,
        probe_id: u16,
    ) -> Result<Vec<Vec<u8>>, Box<dyn Error>>;
}

/// Look up a plugin by protocol name. The registry is the closed list
/// `{default, icmp, http, ssh, mail}`.
pub fn plugin(name: &str) -> Option<&'static dyn ProtocolPlugin> {
    match name {
        "default" => Some(&DefaultProtocol),
        "icmp" => Some(&IcmpProtocol),
        "http" => Some(&HttpProtocol),
        "ssh" => Some(&SshProtocol),
        "mail" => Some(&MailProtocol),
        _ => None,
    }
}

/// Assemble Ethernet and IPv4 headers around an L4 payload.
fn frame(
    src: &ProbeEndpoint,
    dst: &ProbeEndpoint,
    gcid: u16,
    protocol: IpTrafficClass,
    l4: &[u8],
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut buf = Vec::with_capacity(14 + 20 + l4.len());

    Ethernet2Header { source: src.mac, destination: dst.mac, ether_type: ETHERTYPE_IPV4 }
        .write(&mut buf)?;

    let mut ip =
        Ipv4Header::new(l4.len() as u16, 64, protocol, src.ip.octets(), dst.ip.octets());
    ip.identification = gcid;
    ip.write(&mut buf)?;

    buf.extend_from_slice(l4);
    Ok(buf)
}

/// Build a TCP probe with the magic checksum in place of a real one.
fn tcp_probe(
    src: &ProbeEndpoint,
    dst: &ProbeEndpoint,
    gcid: u16,
    probe_id: u16,
    dport: u16,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut tcp = TcpHeader::new(probe_id, dport, 0, 8192);
    tcp.checksum = MAGIC_CHECKSUM;
    let mut l4 = Vec::with_capacity(20);
    tcp.write(&mut l4)?;
    frame(src, dst, gcid, IpTrafficClass::Tcp, &l4)
}

/// Default protocol used when no condition constrains the protocol: a UDP probe towards port
/// 64242.
#[derive(Debug, Clone, Copy)]
pub struct DefaultProtocol;

impl ProtocolPlugin for DefaultProtocol {
    fn name(&self) -> &'static str {
        "default"
    }

    fn build(
        &self,
        src: &ProbeEndpoint,
        dst: &ProbeEndpoint,
        gcid: u16,
        probe_id: u16,
    ) -> Result<Vec<Vec<u8>>, Box<dyn Error>> {
        let udp = UdpHeader {
            source_port: probe_id,
            destination_port: DEFAULT_UDP_PORT,
            length: 8,
            checksum: MAGIC_CHECKSUM,
        };
        let mut l4 = Vec::with_capacity(8);
        udp.write(&mut l4)?;
        Ok(vec![frame(src, dst, gcid, IpTrafficClass::Udp, &l4)?])
    }
}

/// ICMP echo request probe. The probe id is carried in both the echo id and the echo sequence
/// number, since the collector extracts the sequence field.
#[derive(Debug, Clone, Copy)]
pub struct IcmpProtocol;

impl ProtocolPlugin for IcmpProtocol {
    fn name(&self) -> &'static str {
        "icmp"
    }

    fn build(
        &self,
        src: &ProbeEndpoint,
        dst: &ProbeEndpoint,
        gcid: u16,
        probe_id: u16,
    ) -> Result<Vec<Vec<u8>>, Box<dyn Error>> {
        // echo request: type 8, code 0, then checksum, id and sequence
        let mut l4 = vec![8u8, 0];
        l4.extend_from_slice(&MAGIC_CHECKSUM.to_be_bytes());
        l4.extend_from_slice(&probe_id.to_be_bytes());
        l4.extend_from_slice(&probe_id.to_be_bytes());
        Ok(vec![frame(src, dst, gcid, IpTrafficClass::Icmp, &l4)?])
    }
}

/// HTTP probe: TCP towards port 80.
#[derive(Debug, Clone, Copy)]
pub struct HttpProtocol;

impl ProtocolPlugin for HttpProtocol {
    fn name(&self) -> &'static str {
        "http"
    }

    fn build(
        &self,
        src: &ProbeEndpoint,
        dst: &ProbeEndpoint,
        gcid: u16,
        probe_id: u16,
    ) -> Result<Vec<Vec<u8>>, Box<dyn Error>> {
        Ok(vec![tcp_probe(src, dst, gcid, probe_id, 80)?])
    }
}

/// SSH probe: TCP towards port 22.
#[derive(Debug, Clone, Copy)]
pub struct SshProtocol;

impl ProtocolPlugin for SshProtocol {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn build(
        &self,
        src: &ProbeEndpoint,
        dst: &ProbeEndpoint,
        gcid: u16,
        probe_id: u16,
    ) -> Result<Vec<Vec<u8>>, Box<dyn Error>> {
        Ok(vec![tcp_probe(src, dst, gcid, probe_id, 22)?])
    }
}

/// Mail probe: one TCP frame per port in [`MAIL_PORTS`], all sharing the same probe id.
#[derive(Debug, Clone, Copy)]
pub struct MailProtocol;

impl ProtocolPlugin for MailProtocol {
    fn name(&self) -> &'static str {
        "mail"
    }

    fn build(
        &self,
        src: &ProbeEndpoint,
        dst: &ProbeEndpoint,
        gcid: u16,
        probe_id: u16,
    ) -> Result<Vec<Vec<u8>>, Box<dyn Error>> {
        MAIL_PORTS
            .iter()
            .map(|dport| tcp_probe(src, dst, gcid, probe_id, *dport))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::{InternetSlice, SlicedPacket, TransportSlice};

    fn endpoints() -> (ProbeEndpoint, ProbeEndpoint) {
        (
            ProbeEndpoint { mac: [0, 0, 0, 0, 0, 4], ip: Ipv4Addr::new(10, 0, 0, 1) },
            ProbeEndpoint { mac: [0, 0, 0, 0, 0, 5], ip: Ipv4Addr::new(10, 0, 0, 2) },
        )
    }

    #[test]
    fn default_probe_is_tagged() {
        let (src, dst) = endpoints();
        let frames = DefaultProtocol.build(&src, &dst, 7, 4242).unwrap();
        assert_eq!(frames.len(), 1);

        let sliced = SlicedPacket::from_ethernet(&frames[0]).unwrap();
        let ip = match sliced.ip {
            Some(InternetSlice::Ipv4(s)) => s.to_header(),
            _ => panic!("expected an IPv4 packet"),
        };
        assert_eq!(ip.identification, 7);
        assert_eq!(ip.source, [10, 0, 0, 1]);
        assert_eq!(ip.destination, [10, 0, 0, 2]);

        let udp = match sliced.transport {
            Some(TransportSlice::Udp(u)) => u.to_header(),
            _ => panic!("expected a UDP packet"),
        };
        assert_eq!(udp.source_port, 4242);
        assert_eq!(udp.destination_port, DEFAULT_UDP_PORT);
        assert_eq!(udp.checksum, MAGIC_CHECKSUM);
    }

    #[test]
    fn tcp_probes_carry_the_magic_checksum() {
        let (src, dst) = endpoints();
        for (plugin_name, dport) in &[("http", 80u16), ("ssh", 22)] {
            let frames = plugin(plugin_name).unwrap().build(&src, &dst, 3, 99).unwrap();
            assert_eq!(frames.len(), 1);
            let sliced = SlicedPacket::from_ethernet(&frames[0]).unwrap();
            let tcp = match sliced.transport {
                Some(TransportSlice::Tcp(t)) => t.to_header(),
                _ => panic!("expected a TCP packet"),
            };
            assert_eq!(tcp.source_port, 99);
            assert_eq!(tcp.destination_port, *dport);
            assert_eq!(tcp.checksum, MAGIC_CHECKSUM);
        }
    }

    #[test]
    fn mail_fans_out_over_all_ports() {
        let (src, dst) = endpoints();
        let frames = MailProtocol.build(&src, &dst, 3, 99).unwrap();
        assert_eq!(frames.len(), MAIL_PORTS.len());
        for (frame, dport) in frames.iter().zip(MAIL_PORTS.iter()) {
            let sliced = SlicedPacket::from_ethernet(frame).unwrap();
            match sliced.transport {
                Some(TransportSlice::Tcp(t)) => {
                    assert_eq!(t.to_header().destination_port, *dport)
                }
                _ => panic!("expected a TCP packet"),
            }
        }
    }

    #[test]
    fn icmp_probe_layout() {
        let (src, dst) = endpoints();
        let frames = IcmpProtocol.build(&src, &dst, 5, 0x0102).unwrap();
        let sliced = SlicedPacket::from_ethernet(&frames[0]).unwrap();
        let ip = match sliced.ip {
            Some(InternetSlice::Ipv4(s)) => s.to_header(),
            _ => panic!("expected an IPv4 packet"),
        };
        assert_eq!(ip.protocol, 1);
        // icmp is not a transport etherparse knows, the payload is the raw echo header
        let echo = sliced.payload;
        assert_eq!(echo[0], 8);
        assert_eq!(&echo[2..4], &MAGIC_CHECKSUM.to_be_bytes());
        assert_eq!(&echo[6..8], &[0x01, 0x02]);
    }

    #[test]
    fn unknown_protocol_is_absent() {
        assert!(plugin("default").is_some());
        assert!(plugin("mail").is_some());
        assert!(plugin("quic").is_none());
    }
}
