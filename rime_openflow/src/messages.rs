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

//! The OpenFlow 1.0 wire format: message framing, match and action structures.
//!
//! All integers are in network byte order. Every message starts with the common 8-byte header
//! `{version, type, length, xid}`; [`Frame`] pairs a decoded message with its transaction id.
//! Unknown messages and unknown actions are carried verbatim, so whatever a switch sends
//! survives a decode/encode round trip untouched.

use byteorder::{ByteOrder, NetworkEndian};
use thiserror::Error;

/// The OpenFlow protocol version implemented by this crate.
pub const OFP_VERSION: u8 = 1;

/// Length of the common message header.
pub const HEADER_LENGTH: usize = 8;

/// `buffer_id` value meaning "the full packet is included, nothing is buffered".
pub const NO_BUFFER: u32 = 0xffff_ffff;

/// OpenFlow 1.0 message type codes.
pub mod msg_type {
    /// Symmetric hello, sent by both sides on connect
    pub const HELLO: u8 = 0;
    /// Error report
    pub const ERROR: u8 = 1;
    /// Echo request, must be answered with an echo reply
    pub const ECHO_REQUEST: u8 = 2;
    /// Echo reply
    pub const ECHO_REPLY: u8 = 3;
    /// Packet injection
    pub const PACKET_OUT: u8 = 13;
    /// Flow table modification
    pub const FLOW_MOD: u8 = 14;
    /// Statistics request
    pub const STATS_REQUEST: u8 = 16;
    /// Statistics reply
    pub const STATS_REPLY: u8 = 17;
}

/// Reserved OpenFlow 1.0 port numbers.
pub mod port {
    /// Highest usable physical port; everything at or above this value is reserved
    pub const MAX: u16 = 0xff00;
    /// Send the packet back out of its input port
    pub const IN_PORT: u16 = 0xfff8;
    /// Submit the packet to the flow table
    pub const TABLE: u16 = 0xfff9;
    /// Process with normal L2/L3 switching
    pub const NORMAL: u16 = 0xfffa;
    /// Flood along the spanning tree
    pub const FLOOD: u16 = 0xfffb;
    /// Send out all ports but the input port
    pub const ALL: u16 = 0xfffc;
    /// Forward to the controller
    pub const CONTROLLER: u16 = 0xfffd;
    /// The local networking stack of the switch
    pub const LOCAL: u16 = 0xfffe;
    /// No port (used in requests to mean "any")
    pub const NONE: u16 = 0xffff;
}

/// Action type codes.
pub mod action_type {
    /// Output the packet on a port
    pub const OUTPUT: u16 = 0;
    /// Rewrite the destination MAC address
    pub const SET_DL_DST: u16 = 5;
}

/// `ofp_flow_mod` command codes.
pub mod flow_mod_command {
    /// Add a new flow
    pub const ADD: u16 = 0;
    /// Modify all matching flows
    pub const MODIFY: u16 = 1;
    /// Modify flows strictly matching wildcards and priority
    pub const MODIFY_STRICT: u16 = 2;
    /// Delete all matching flows
    pub const DELETE: u16 = 3;
    /// Delete flows strictly matching wildcards and priority
    pub const DELETE_STRICT: u16 = 4;
}

/// Statistics body type codes.
pub mod stats_type {
    /// Per-flow statistics
    pub const FLOW: u16 = 1;
}

/// `ofp_match` wildcard bits.
pub mod wildcards {
    /// Wildcard every match field
    pub const ALL: u32 = (1 << 22) - 1;
}

/// The 40-byte `ofp_match` structure. Pad bytes are implicit and always encoded as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    /// Wildcard bits (see [`wildcards`])
    pub wildcards: u32,
    /// Input port
    pub in_port: u16,
    /// Source MAC address
    pub dl_src: [u8; 6],
    /// Destination MAC address
    pub dl_dst: [u8; 6],
    /// VLAN id
    pub dl_vlan: u16,
    /// VLAN priority
    pub dl_vlan_pcp: u8,
    /// Ethernet frame type
    pub dl_type: u16,
    /// IP ToS
    pub nw_tos: u8,
    /// IP protocol
    pub nw_proto: u8,
    /// IP source address
    pub nw_src: u32,
    /// IP destination address
    pub nw_dst: u32,
    /// TCP/UDP source port
    pub tp_src: u16,
    /// TCP/UDP destination port
    pub tp_dst: u16,
}

impl Match {
    /// Encoded length of the structure.
    pub const LENGTH: usize = 40;

    /// A match with every field wildcarded.
    pub fn wildcard_all() -> Self {
        Self { wildcards: wildcards::ALL, ..Default::default() }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        let mut b = [0u8; Self::LENGTH];
        NetworkEndian::write_u32(&mut b[0..4], self.wildcards);
        NetworkEndian::write_u16(&mut b[4..6], self.in_port);
        b[6..12].copy_from_slice(&self.dl_src);
        b[12..18].copy_from_slice(&self.dl_dst);
        NetworkEndian::write_u16(&mut b[18..20], self.dl_vlan);
        b[20] = self.dl_vlan_pcp;
        NetworkEndian::write_u16(&mut b[22..24], self.dl_type);
        b[24] = self.nw_tos;
        b[25] = self.nw_proto;
        NetworkEndian::write_u32(&mut b[28..32], self.nw_src);
        NetworkEndian::write_u32(&mut b[32..36], self.nw_dst);
        NetworkEndian::write_u16(&mut b[36..38], self.tp_src);
        NetworkEndian::write_u16(&mut b[38..40], self.tp_dst);
        buf.extend_from_slice(&b);
    }

    fn read(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < Self::LENGTH {
            return Err(CodecError::ShortFrame { what: "ofp_match", len: data.len() });
        }
        let mut dl_src = [0u8; 6];
        let mut dl_dst = [0u8; 6];
        dl_src.copy_from_slice(&data[6..12]);
        dl_dst.copy_from_slice(&data[12..18]);
        Ok(Self {
            wildcards: NetworkEndian::read_u32(&data[0..4]),
            in_port: NetworkEndian::read_u16(&data[4..6]),
            dl_src,
            dl_dst,
            dl_vlan: NetworkEndian::read_u16(&data[18..20]),
            dl_vlan_pcp: data[20],
            dl_type: NetworkEndian::read_u16(&data[22..24]),
            nw_tos: data[24],
            nw_proto: data[25],
            nw_src: NetworkEndian::read_u32(&data[28..32]),
            nw_dst: NetworkEndian::read_u32(&data[32..36]),
            tp_src: NetworkEndian::read_u16(&data[36..38]),
            tp_dst: NetworkEndian::read_u16(&data[38..40]),
        })
    }
}

/// A single entry of an action list.
///
/// Only the two action types the instrumentation needs are decoded; everything else is kept as
/// an opaque payload and re-encoded verbatim when a flow is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `OFPAT_OUTPUT`: send the packet out of a port, forwarding at most `max_len` bytes to
    /// the controller for reserved ports
    Output {
        /// Output port
        port: u16,
        /// Maximum number of bytes to send (only meaningful for the controller port)
        max_len: u16,
    },
    /// `OFPAT_SET_DL_DST`: rewrite the destination MAC address
    SetDlDst {
        /// The new destination MAC address
        dl_dst: [u8; 6],
    },
    /// Any other action, carried verbatim (`body` excludes the 4-byte type/length header)
    Other {
        /// Action type code
        action_type: u16,
        /// Raw payload after the action header
        body: Vec<u8>,
    },
}

impl Action {
    /// Encoded length of the action, including its 4-byte header.
    pub fn wire_len(&self) -> usize {
        match self {
            Self::Output { .. } => 8,
            Self::SetDlDst { .. } => 16,
            Self::Other { body, .. } => 4 + body.len(),
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Output { port, max_len } => {
                let mut b = [0u8; 8];
                NetworkEndian::write_u16(&mut b[0..2], action_type::OUTPUT);
                NetworkEndian::write_u16(&mut b[2..4], 8);
                NetworkEndian::write_u16(&mut b[4..6], *port);
                NetworkEndian::write_u16(&mut b[6..8], *max_len);
                buf.extend_from_slice(&b);
            }
            Self::SetDlDst { dl_dst } => {
                let mut b = [0u8; 16];
                NetworkEndian::write_u16(&mut b[0..2], action_type::SET_DL_DST);
                NetworkEndian::write_u16(&mut b[2..4], 16);
                b[4..10].copy_from_slice(dl_dst);
                buf.extend_from_slice(&b);
            }
            Self::Other { action_type, body } => {
                let mut b = [0u8; 4];
                NetworkEndian::write_u16(&mut b[0..2], *action_type);
                NetworkEndian::write_u16(&mut b[2..4], (4 + body.len()) as u16);
                buf.extend_from_slice(&b);
                buf.extend_from_slice(body);
            }
        }
    }

    fn write_list(actions: &[Action], buf: &mut Vec<u8>) {
        for action in actions {
            action.write(buf);
        }
    }

    /// Total encoded length of an action list.
    pub fn list_len(actions: &[Action]) -> usize {
        actions.iter().map(|a| a.wire_len()).sum()
    }

    fn read_list(data: &[u8]) -> Result<Vec<Action>, CodecError> {
        let mut actions = Vec::new();
        let mut offset = 0usize;

        while offset < data.len() {
            if data.len() - offset < 4 {
                return Err(CodecError::BadActionList);
            }
            let action_type = NetworkEndian::read_u16(&data[offset..offset + 2]);
            let len = NetworkEndian::read_u16(&data[offset + 2..offset + 4]) as usize;
            if len < 4 || offset + len > data.len() {
                return Err(CodecError::BadActionList);
            }
            let body = &data[offset + 4..offset + len];

            actions.push(match action_type {
                self::action_type::OUTPUT if len == 8 => Action::Output {
                    port: NetworkEndian::read_u16(&body[0..2]),
                    max_len: NetworkEndian::read_u16(&body[2..4]),
                },
                self::action_type::SET_DL_DST if len == 16 => {
                    let mut dl_dst = [0u8; 6];
                    dl_dst.copy_from_slice(&body[0..6]);
                    Action::SetDlDst { dl_dst }
                }
                _ => Action::Other { action_type, body: body.to_vec() },
            });

            offset += len;
        }

        Ok(actions)
    }
}

/// One entry of a flow statistics reply: the flow's match, counters and action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStats {
    /// Table the flow lives in
    pub table_id: u8,
    /// The flow's match
    pub mat: Match,
    /// Seconds the flow has been alive
    pub duration_sec: u32,
    /// Nanosecond remainder of the duration
    pub duration_nsec: u32,
    /// Flow priority
    pub priority: u16,
    /// Idle timeout in seconds
    pub idle_timeout: u16,
    /// Hard timeout in seconds
    pub hard_timeout: u16,
    /// Opaque controller cookie
    pub cookie: u64,
    /// Number of packets matched
    pub packet_count: u64,
    /// Number of bytes matched
    pub byte_count: u64,
    /// The flow's action list
    pub actions: Vec<Action>,
}

impl FlowStats {
    /// Encoded length of the fixed part, before the action list.
    const FIXED_LENGTH: usize = 88;

    fn write(&self, buf: &mut Vec<u8>) {
        let mut b = [0u8; 4];
        let total = Self::FIXED_LENGTH + Action::list_len(&self.actions);
        NetworkEndian::write_u16(&mut b[0..2], total as u16);
        b[2] = self.table_id;
        buf.extend_from_slice(&b);

        self.mat.write(buf);

        let mut b = [0u8; 44];
        NetworkEndian::write_u32(&mut b[0..4], self.duration_sec);
        NetworkEndian::write_u32(&mut b[4..8], self.duration_nsec);
        NetworkEndian::write_u16(&mut b[8..10], self.priority);
        NetworkEndian::write_u16(&mut b[10..12], self.idle_timeout);
        NetworkEndian::write_u16(&mut b[12..14], self.hard_timeout);
        NetworkEndian::write_u64(&mut b[20..28], self.cookie);
        NetworkEndian::write_u64(&mut b[28..36], self.packet_count);
        NetworkEndian::write_u64(&mut b[36..44], self.byte_count);
        buf.extend_from_slice(&b);

        Action::write_list(&self.actions, buf);
    }

    /// Parse one entry, returning it together with its total encoded length.
    fn read(data: &[u8]) -> Result<(Self, usize), CodecError> {
        if data.len() < Self::FIXED_LENGTH {
            return Err(CodecError::ShortFrame { what: "ofp_flow_stats", len: data.len() });
        }
        let total = NetworkEndian::read_u16(&data[0..2]) as usize;
        if total < Self::FIXED_LENGTH || total > data.len() {
            return Err(CodecError::ShortFrame { what: "ofp_flow_stats", len: data.len() });
        }
        let table_id = data[2];
        let mat = Match::read(&data[4..44])?;
        let b = &data[44..88];
        let actions = Action::read_list(&data[88..total])?;

        Ok((
            Self {
                table_id,
                mat,
                duration_sec: NetworkEndian::read_u32(&b[0..4]),
                duration_nsec: NetworkEndian::read_u32(&b[4..8]),
                priority: NetworkEndian::read_u16(&b[8..10]),
                idle_timeout: NetworkEndian::read_u16(&b[10..12]),
                hard_timeout: NetworkEndian::read_u16(&b[12..14]),
                cookie: NetworkEndian::read_u64(&b[20..28]),
                packet_count: NetworkEndian::read_u64(&b[28..36]),
                byte_count: NetworkEndian::read_u64(&b[36..44]),
                actions,
            },
            total,
        ))
    }
}

/// A decoded OpenFlow message, without the common header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `OFPT_HELLO`
    Hello,
    /// `OFPT_ECHO_REQUEST` with its opaque payload
    EchoRequest(Vec<u8>),
    /// `OFPT_ECHO_REPLY` with its opaque payload
    EchoReply(Vec<u8>),
    /// `OFPT_ERROR`
    Error {
        /// `ofp_error_msg` type
        err_type: u16,
        /// `ofp_error_msg` code
        code: u16,
        /// The offending request data
        data: Vec<u8>,
    },
    /// `OFPT_STATS_REQUEST` with body type `OFPST_FLOW`
    FlowStatsRequest {
        /// Match selecting the flows to report
        mat: Match,
        /// Table to read, `0xff` for all tables
        table_id: u8,
        /// Require flows to output on this port, [`port::NONE`] for any
        out_port: u16,
    },
    /// `OFPT_STATS_REPLY` with body type `OFPST_FLOW`
    FlowStatsReply {
        /// Reply flags (bit 0: more replies follow)
        flags: u16,
        /// The reported flows
        flows: Vec<FlowStats>,
    },
    /// `OFPT_FLOW_MOD`
    FlowMod {
        /// Match selecting the flows to modify
        mat: Match,
        /// Opaque controller cookie
        cookie: u64,
        /// One of [`flow_mod_command`]
        command: u16,
        /// Idle timeout in seconds
        idle_timeout: u16,
        /// Hard timeout in seconds
        hard_timeout: u16,
        /// Flow priority
        priority: u16,
        /// Buffered packet to apply the flow to, [`NO_BUFFER`] for none
        buffer_id: u32,
        /// Output-port filter for delete commands, [`port::NONE`] otherwise
        out_port: u16,
        /// Flow-mod flags
        flags: u16,
        /// The new action list
        actions: Vec<Action>,
    },
    /// `OFPT_PACKET_OUT`
    PacketOut {
        /// Buffered packet to send, [`NO_BUFFER`] when raw data is attached
        buffer_id: u32,
        /// Port the packet is considered to have arrived on
        in_port: u16,
        /// Actions applied to the packet
        actions: Vec<Action>,
        /// The raw packet bytes
        data: Vec<u8>,
    },
    /// Every other message, carried verbatim
    Other {
        /// Message type code
        msg_type: u8,
        /// Raw body after the common header
        body: Vec<u8>,
    },
}

impl Message {
    /// The message type code of this message.
    pub fn msg_type(&self) -> u8 {
        match self {
            Self::Hello => msg_type::HELLO,
            Self::EchoRequest(_) => msg_type::ECHO_REQUEST,
            Self::EchoReply(_) => msg_type::ECHO_REPLY,
            Self::Error { .. } => msg_type::ERROR,
            Self::FlowStatsRequest { .. } => msg_type::STATS_REQUEST,
            Self::FlowStatsReply { .. } => msg_type::STATS_REPLY,
            Self::FlowMod { .. } => msg_type::FLOW_MOD,
            Self::PacketOut { .. } => msg_type::PACKET_OUT,
            Self::Other { msg_type, .. } => *msg_type,
        }
    }

    /// Encode the message body (everything after the common header).
    pub fn write_body(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Hello => {}
            Self::EchoRequest(payload) | Self::EchoReply(payload) => {
                buf.extend_from_slice(payload)
            }
            Self::Error { err_type, code, data } => {
                let mut b = [0u8; 4];
                NetworkEndian::write_u16(&mut b[0..2], *err_type);
                NetworkEndian::write_u16(&mut b[2..4], *code);
                buf.extend_from_slice(&b);
                buf.extend_from_slice(data);
            }
            Self::FlowStatsRequest { mat, table_id, out_port } => {
                let mut b = [0u8; 4];
                NetworkEndian::write_u16(&mut b[0..2], stats_type::FLOW);
                buf.extend_from_slice(&b);
                mat.write(buf);
                let mut b = [0u8; 4];
                b[0] = *table_id;
                NetworkEndian::write_u16(&mut b[2..4], *out_port);
                buf.extend_from_slice(&b);
            }
            Self::FlowStatsReply { flags, flows } => {
                let mut b = [0u8; 4];
                NetworkEndian::write_u16(&mut b[0..2], stats_type::FLOW);
                NetworkEndian::write_u16(&mut b[2..4], *flags);
                buf.extend_from_slice(&b);
                for flow in flows {
                    flow.write(buf);
                }
            }
            Self::FlowMod {
                mat,
                cookie,
                command,
                idle_timeout,
                hard_timeout,
                priority,
                buffer_id,
                out_port,
                flags,
                actions,
            } => {
                mat.write(buf);
                let mut b = [0u8; 24];
                NetworkEndian::write_u64(&mut b[0..8], *cookie);
                NetworkEndian::write_u16(&mut b[8..10], *command);
                NetworkEndian::write_u16(&mut b[10..12], *idle_timeout);
                NetworkEndian::write_u16(&mut b[12..14], *hard_timeout);
                NetworkEndian::write_u16(&mut b[14..16], *priority);
                NetworkEndian::write_u32(&mut b[16..20], *buffer_id);
                NetworkEndian::write_u16(&mut b[20..22], *out_port);
                NetworkEndian::write_u16(&mut b[22..24], *flags);
                buf.extend_from_slice(&b);
                Action::write_list(actions, buf);
            }
            Self::PacketOut { buffer_id, in_port, actions, data } => {
                let mut b = [0u8; 8];
                NetworkEndian::write_u32(&mut b[0..4], *buffer_id);
                NetworkEndian::write_u16(&mut b[4..6], *in_port);
                NetworkEndian::write_u16(&mut b[6..8], Action::list_len(actions) as u16);
                buf.extend_from_slice(&b);
                Action::write_list(actions, buf);
                buf.extend_from_slice(data);
            }
            Self::Other { body, .. } => buf.extend_from_slice(body),
        }
    }

    /// Decode a message body of the given type.
    pub fn read_body(msg_type: u8, body: &[u8]) -> Result<Self, CodecError> {
        Ok(match msg_type {
            self::msg_type::HELLO => Self::Hello,
            self::msg_type::ECHO_REQUEST => Self::EchoRequest(body.to_vec()),
            self::msg_type::ECHO_REPLY => Self::EchoReply(body.to_vec()),
            self::msg_type::ERROR => {
                if body.len() < 4 {
                    return Err(CodecError::ShortFrame { what: "ofp_error_msg", len: body.len() });
                }
                Self::Error {
                    err_type: NetworkEndian::read_u16(&body[0..2]),
                    code: NetworkEndian::read_u16(&body[2..4]),
                    data: body[4..].to_vec(),
                }
            }
            self::msg_type::STATS_REQUEST => {
                if body.len() < 4 {
                    return Err(CodecError::ShortFrame {
                        what: "ofp_stats_request",
                        len: body.len(),
                    });
                }
                match NetworkEndian::read_u16(&body[0..2]) {
                    self::stats_type::FLOW => {
                        let mat = Match::read(&body[4..])?;
                        let rest = &body[4 + Match::LENGTH..];
                        if rest.len() < 4 {
                            return Err(CodecError::ShortFrame {
                                what: "ofp_flow_stats_request",
                                len: rest.len(),
                            });
                        }
                        Self::FlowStatsRequest {
                            mat,
                            table_id: rest[0],
                            out_port: NetworkEndian::read_u16(&rest[2..4]),
                        }
                    }
                    _ => Self::Other { msg_type, body: body.to_vec() },
                }
            }
            self::msg_type::STATS_REPLY => {
                if body.len() < 4 {
                    return Err(CodecError::ShortFrame {
                        what: "ofp_stats_reply",
                        len: body.len(),
                    });
                }
                match NetworkEndian::read_u16(&body[0..2]) {
                    self::stats_type::FLOW => {
                        let flags = NetworkEndian::read_u16(&body[2..4]);
                        let mut flows = Vec::new();
                        let mut offset = 4usize;
                        while offset < body.len() {
                            let (flow, len) = FlowStats::read(&body[offset..])?;
                            flows.push(flow);
                            offset += len;
                        }
                        Self::FlowStatsReply { flags, flows }
                    }
                    _ => Self::Other { msg_type, body: body.to_vec() },
                }
            }
            self::msg_type::FLOW_MOD => {
                let mat = Match::read(body)?;
                let rest = &body[Match::LENGTH..];
                if rest.len() < 24 {
                    return Err(CodecError::ShortFrame { what: "ofp_flow_mod", len: rest.len() });
                }
                Self::FlowMod {
                    mat,
                    cookie: NetworkEndian::read_u64(&rest[0..8]),
                    command: NetworkEndian::read_u16(&rest[8..10]),
                    idle_timeout: NetworkEndian::read_u16(&rest[10..12]),
                    hard_timeout: NetworkEndian::read_u16(&rest[12..14]),
                    priority: NetworkEndian::read_u16(&rest[14..16]),
                    buffer_id: NetworkEndian::read_u32(&rest[16..20]),
                    out_port: NetworkEndian::read_u16(&rest[20..22]),
                    flags: NetworkEndian::read_u16(&rest[22..24]),
                    actions: Action::read_list(&rest[24..])?,
                }
            }
            self::msg_type::PACKET_OUT => {
                if body.len() < 8 {
                    return Err(CodecError::ShortFrame {
                        what: "ofp_packet_out",
                        len: body.len(),
                    });
                }
                let buffer_id = NetworkEndian::read_u32(&body[0..4]);
                let in_port = NetworkEndian::read_u16(&body[4..6]);
                let actions_len = NetworkEndian::read_u16(&body[6..8]) as usize;
                if 8 + actions_len > body.len() {
                    return Err(CodecError::BadActionList);
                }
                Self::PacketOut {
                    buffer_id,
                    in_port,
                    actions: Action::read_list(&body[8..8 + actions_len])?,
                    data: body[8 + actions_len..].to_vec(),
                }
            }
            _ => Self::Other { msg_type, body: body.to_vec() },
        })
    }
}

/// A full OpenFlow frame: a message together with its transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Transaction id of the message
    pub xid: u32,
    /// The message itself
    pub message: Message,
}

impl Frame {
    /// Create a frame with a fresh random transaction id.
    pub fn new(message: Message) -> Self {
        Self { xid: rand::random(), message }
    }

    /// Encode the frame, including the common header.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.message.write_body(&mut body);

        let mut buf = Vec::with_capacity(HEADER_LENGTH + body.len());
        buf.push(OFP_VERSION);
        buf.push(self.message.msg_type());
        let mut b = [0u8; 6];
        NetworkEndian::write_u16(&mut b[0..2], (HEADER_LENGTH + body.len()) as u16);
        NetworkEndian::write_u32(&mut b[2..6], self.xid);
        buf.extend_from_slice(&b);
        buf.extend_from_slice(&body);
        buf
    }

    /// Decode one complete frame from a byte buffer.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LENGTH {
            return Err(CodecError::ShortFrame { what: "ofp_header", len: data.len() });
        }
        if data[0] != OFP_VERSION {
            return Err(CodecError::BadVersion(data[0]));
        }
        let length = NetworkEndian::read_u16(&data[2..4]) as usize;
        if length < HEADER_LENGTH || length > data.len() {
            return Err(CodecError::ShortFrame { what: "ofp message", len: data.len() });
        }
        let xid = NetworkEndian::read_u32(&data[4..8]);
        let message = Message::read_body(data[1], &data[HEADER_LENGTH..length])?;
        Ok(Self { xid, message })
    }
}

/// Errors raised while decoding a frame. They indicate a protocol violation by the peer and
/// abort the current switch session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The frame carries a version other than 1
    #[error("Unsupported OpenFlow version {0}")]
    BadVersion(u8),
    /// The frame or one of its structures is truncated
    #[error("Truncated frame: {len} bytes are too short for {what}")]
    ShortFrame {
        /// Name of the structure that could not be read
        what: &'static str,
        /// Number of bytes that were available
        len: usize,
    },
    /// An action list disagrees with its length fields
    #[error("Malformed action list")]
    BadActionList,
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(message: Message) {
        let frame = Frame { xid: 0x11223344, message };
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
        // canonical encodings survive a decode/encode round trip byte for byte
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn hello_bytes() {
        let frame = Frame { xid: 0xdeadbeef, message: Message::Hello };
        assert_eq!(frame.encode(), vec![1, 0, 0, 8, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn round_trip_symmetric_messages() {
        round_trip(Message::Hello);
        round_trip(Message::EchoRequest(vec![1, 2, 3]));
        round_trip(Message::EchoReply(vec![]));
        round_trip(Message::Error { err_type: 1, code: 5, data: vec![0, 1, 2, 3] });
        round_trip(Message::Other { msg_type: 5, body: vec![] });
    }

    #[test]
    fn round_trip_flow_stats_request() {
        round_trip(Message::FlowStatsRequest {
            mat: Match::wildcard_all(),
            table_id: 0xff,
            out_port: port::NONE,
        });
    }

    #[test]
    fn round_trip_flow_stats_reply() {
        let flow = FlowStats {
            table_id: 0,
            mat: Match { wildcards: 0x3820e0, dl_dst: [0, 0, 0, 0, 0, 5], ..Default::default() },
            duration_sec: 17,
            duration_nsec: 5000,
            priority: 0x8000,
            idle_timeout: 60,
            hard_timeout: 0,
            cookie: 0x1234567890abcdef,
            packet_count: 42,
            byte_count: 4242,
            actions: vec![
                Action::Output { port: 2, max_len: 0 },
                Action::Other { action_type: 1, body: vec![0, 100, 0, 0] },
            ],
        };
        round_trip(Message::FlowStatsReply { flags: 0, flows: vec![flow.clone(), flow] });
    }

    #[test]
    fn round_trip_flow_mod() {
        round_trip(Message::FlowMod {
            mat: Match { wildcards: 0, nw_src: 0x0a000001, ..Default::default() },
            cookie: 99,
            command: flow_mod_command::MODIFY_STRICT,
            idle_timeout: 60,
            hard_timeout: 120,
            priority: 0x8000,
            buffer_id: NO_BUFFER,
            out_port: port::NONE,
            flags: 0,
            actions: vec![
                Action::Output { port: 1, max_len: 0 },
                Action::SetDlDst { dl_dst: [0x42, 0x42, 0, 1, 0, 2] },
                Action::Output { port: 3, max_len: 256 },
            ],
        });
    }

    #[test]
    fn round_trip_packet_out() {
        round_trip(Message::PacketOut {
            buffer_id: NO_BUFFER,
            in_port: 0,
            actions: vec![Action::Output { port: port::TABLE, max_len: 256 }],
            data: vec![0xaa; 60],
        });
    }

    #[test]
    fn unknown_actions_survive_rewrites() {
        let actions = vec![
            Action::Other { action_type: 2, body: vec![0, 7, 0, 0] },
            Action::Output { port: 4, max_len: 0 },
            Action::Other { action_type: 0xffff, body: vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12] },
        ];
        let mut buf = Vec::new();
        Action::write_list(&actions, &mut buf);
        assert_eq!(Action::read_list(&buf).unwrap(), actions);
    }

    #[test]
    fn reject_bad_version() {
        let mut bytes = Frame { xid: 1, message: Message::Hello }.encode();
        bytes[0] = 4;
        assert_eq!(Frame::decode(&bytes), Err(CodecError::BadVersion(4)));
    }

    #[test]
    fn reject_truncated_frames() {
        let bytes = Frame { xid: 1, message: Message::EchoRequest(vec![1, 2, 3]) }.encode();
        assert!(matches!(
            Frame::decode(&bytes[..4]),
            Err(CodecError::ShortFrame { .. })
        ));
        assert!(matches!(
            Frame::decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::ShortFrame { .. })
        ));
    }

    #[test]
    fn reject_malformed_action_list() {
        // length field of 3 is below the action header size
        let bytes = [0u8, 0, 0, 3];
        assert_eq!(Action::read_list(&bytes), Err(CodecError::BadActionList));
        // length field overruns the buffer
        let bytes = [0u8, 0, 0, 16, 0, 0, 0, 0];
        assert_eq!(Action::read_list(&bytes), Err(CodecError::BadActionList));
    }
}
