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

//! A synchronous request/response dialogue with one OpenFlow switch.

use crate::messages::{
    msg_type, port, Action, CodecError, Frame, Match, Message, FlowStats, HEADER_LENGTH,
    NO_BUFFER, OFP_VERSION,
};
use crate::Error;

use byteorder::{ByteOrder, NetworkEndian};
use log::*;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpStream};

/// # Connection to an OpenFlow switch
///
/// One TCP session per switch. On connect, the switch sends a `HELLO` which
/// [`handshake`](Session::handshake) answers with a matching `HELLO` carrying the same
/// transaction id. Afterwards the switch may send an `ECHO_REQUEST` at any time, which the
/// [`run`](Session::run) loop answers with an echoing `ECHO_REPLY`.
///
/// All operations are synchronous and blocking; a session is created, used for one
/// request/response exchange, and disposed. The codec state is tied to the stream, so a
/// session must never be shared between switches.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    /// Flow-table entries collected from flow statistics replies
    pub flows: Vec<FlowStats>,
}

impl Session {
    /// Open a TCP connection to the OpenFlow listener of a switch.
    pub fn connect(ip: Ipv4Addr, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((ip, port))?;
        Ok(Self { stream, flows: Vec::new() })
    }

    /// Send a frame as is.
    pub fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        self.stream.write_all(&frame.encode())?;
        Ok(())
    }

    /// Send a message with a fresh random transaction id.
    pub fn send_message(&mut self, message: Message) -> Result<(), Error> {
        self.send(&Frame::new(message))
    }

    /// Receive one complete frame.
    pub fn recv(&mut self) -> Result<Frame, Error> {
        let mut header = [0u8; HEADER_LENGTH];
        self.stream.read_exact(&mut header)?;

        if header[0] != OFP_VERSION {
            return Err(CodecError::BadVersion(header[0]).into());
        }
        let length = NetworkEndian::read_u16(&header[2..4]) as usize;
        if length < HEADER_LENGTH {
            return Err(CodecError::ShortFrame { what: "ofp_header", len: length }.into());
        }

        let mut body = vec![0u8; length - HEADER_LENGTH];
        self.stream.read_exact(&mut body)?;

        let xid = NetworkEndian::read_u32(&header[4..8]);
        Ok(Frame { xid, message: Message::read_body(header[1], &body)? })
    }

    /// Wait for the switch's `HELLO` and answer it with a matching `HELLO`.
    pub fn handshake(&mut self) -> Result<(), Error> {
        let frame = self.recv()?;
        match frame.message {
            Message::Hello => self.send(&Frame { xid: frame.xid, message: Message::Hello }),
            other => {
                Err(Error::UnexpectedMessage { expected: msg_type::HELLO, got: other.msg_type() })
            }
        }
    }

    /// Read and dispatch frames until a frame of the requested type was processed.
    ///
    /// Hellos and echo requests are answered, flow statistics replies are collected into
    /// [`flows`](Session::flows), and an `OFPT_ERROR` from the switch aborts the session with
    /// [`Error::Peer`].
    pub fn run(&mut self, until: u8) -> Result<(), Error> {
        loop {
            let frame = self.recv()?;
            let received = frame.message.msg_type();

            match frame.message {
                Message::Hello => {
                    self.send(&Frame { xid: frame.xid, message: Message::Hello })?
                }
                Message::EchoRequest(payload) => {
                    debug!("Ping");
                    self.send(&Frame { xid: frame.xid, message: Message::EchoReply(payload) })?
                }
                Message::FlowStatsReply { flows, .. } => self.flows.extend(flows),
                Message::Error { err_type, code, .. } => {
                    return Err(Error::Peer { err_type, code })
                }
                other => debug!("Ignoring message type {}", other.msg_type()),
            }

            if received == until {
                return Ok(());
            }
        }
    }

    /// Request the full flow table: all tables, any output port, every field wildcarded.
    pub fn dump_flows(&mut self) -> Result<(), Error> {
        self.send_message(Message::FlowStatsRequest {
            mat: Match::wildcard_all(),
            table_id: 0xff,
            out_port: port::NONE,
        })
    }

    /// Inject a raw packet. The packet is handed to `out_port`, usually [`port::TABLE`] so
    /// that the switch consults its own flow table.
    pub fn packet_out(&mut self, in_port: u16, data: &[u8], out_port: u16) -> Result<(), Error> {
        self.send_message(Message::PacketOut {
            buffer_id: NO_BUFFER,
            in_port,
            actions: vec![Action::Output { port: out_port, max_len: 256 }],
            data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn write_frame(stream: &mut TcpStream, frame: &Frame) {
        stream.write_all(&frame.encode()).unwrap();
    }

    fn read_frame(stream: &mut TcpStream) -> Frame {
        let mut header = [0u8; HEADER_LENGTH];
        stream.read_exact(&mut header).unwrap();
        let length = NetworkEndian::read_u16(&header[2..4]) as usize;
        let mut buf = header.to_vec();
        buf.resize(length, 0);
        stream.read_exact(&mut buf[HEADER_LENGTH..]).unwrap();
        Frame::decode(&buf).unwrap()
    }

    fn test_flow() -> FlowStats {
        FlowStats {
            table_id: 0,
            mat: Match { wildcards: 0, dl_dst: [0, 0, 0, 0, 0, 5], ..Default::default() },
            duration_sec: 1,
            duration_nsec: 0,
            priority: 0x8000,
            idle_timeout: 60,
            hard_timeout: 0,
            cookie: 1,
            packet_count: 0,
            byte_count: 0,
            actions: vec![Action::Output { port: 2, max_len: 0 }],
        }
    }

    #[test]
    fn handshake_echo_and_flow_dump() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let switch = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            // the switch opens the dialogue
            write_frame(&mut s, &Frame { xid: 7, message: Message::Hello });
            assert_eq!(read_frame(&mut s), Frame { xid: 7, message: Message::Hello });
            // ping in the middle of the exchange
            write_frame(&mut s, &Frame { xid: 8, message: Message::EchoRequest(vec![1, 2, 3]) });
            let request = read_frame(&mut s);
            assert!(matches!(request.message, Message::FlowStatsRequest { table_id: 0xff, .. }));
            assert_eq!(read_frame(&mut s), Frame { xid: 8, message: Message::EchoReply(vec![1, 2, 3]) });
            write_frame(
                &mut s,
                &Frame {
                    xid: request.xid,
                    message: Message::FlowStatsReply { flags: 0, flows: vec![test_flow()] },
                },
            );
        });

        let mut session = Session::connect(Ipv4Addr::LOCALHOST, port).unwrap();
        session.handshake().unwrap();
        session.dump_flows().unwrap();
        session.run(msg_type::STATS_REPLY).unwrap();
        assert_eq!(session.flows, vec![test_flow()]);

        switch.join().unwrap();
    }

    #[test]
    fn peer_error_aborts_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let switch = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            write_frame(&mut s, &Frame { xid: 1, message: Message::Hello });
            assert_eq!(read_frame(&mut s), Frame { xid: 1, message: Message::Hello });
            write_frame(
                &mut s,
                &Frame {
                    xid: 2,
                    message: Message::Error { err_type: 1, code: 5, data: vec![] },
                },
            );
        });

        let mut session = Session::connect(Ipv4Addr::LOCALHOST, port).unwrap();
        session.handshake().unwrap();
        match session.run(msg_type::STATS_REPLY) {
            Err(Error::Peer { err_type: 1, code: 5 }) => {}
            other => panic!("expected peer error, got {:?}", other),
        }

        switch.join().unwrap();
    }

    #[test]
    fn eof_mid_frame_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let switch = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            // half a header, then the connection dies
            s.write_all(&[1, 0, 0]).unwrap();
        });

        let mut session = Session::connect(Ipv4Addr::LOCALHOST, port).unwrap();
        match session.handshake() {
            Err(Error::Io(_)) => {}
            other => panic!("expected transport error, got {:?}", other),
        }

        switch.join().unwrap();
    }

    #[test]
    fn wrong_version_is_a_protocol_violation() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let switch = thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            let mut bytes = Frame { xid: 1, message: Message::Hello }.encode();
            bytes[0] = 4;
            s.write_all(&bytes).unwrap();
        });

        let mut session = Session::connect(Ipv4Addr::LOCALHOST, port).unwrap();
        match session.handshake() {
            Err(Error::Codec(CodecError::BadVersion(4))) => {}
            other => panic!("expected version error, got {:?}", other),
        }

        switch.join().unwrap();
    }
}
