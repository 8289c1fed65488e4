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

//! # OpenFlow 1.0 codec and switch session
//!
//! This is a small crate to talk to OpenFlow 1.0 switches directly over TCP. It implements the
//! subset of the protocol needed to instrument a network for postcard collection: the hello
//! handshake, echo keepalives, flow-table dumps, strict flow modifications, and packet
//! injection.
//!
//! ```no_run
//! use rime_openflow::{port, Session};
//!
//! fn main() -> Result<(), rime_openflow::Error> {
//!     // connect to the switch and be polite
//!     let mut session = Session::connect("127.0.0.1".parse().unwrap(), 6634)?;
//!     session.handshake()?;
//!
//!     // dump the flow table
//!     session.dump_flows()?;
//!     session.run(rime_openflow::msg_type::STATS_REPLY)?;
//!     for flow in &session.flows {
//!         println!("{:?}", flow);
//!     }
//!
//!     // inject a packet through the flow table
//!     session.packet_out(0, &[0u8; 64], port::TABLE)?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

mod messages;
mod session;

pub use messages::*;
pub use session::Session;

use thiserror::Error;

/// # OpenFlow session error type
///
/// Transport failures ([`Error::Io`] and [`Error::Peer`]) abort the current switch only; the
/// caller is expected to log them and continue with the next switch. Protocol violations
/// ([`Error::Codec`] and [`Error::UnexpectedMessage`]) are treated the same way.
#[derive(Debug, Error)]
pub enum Error {
    /// Error on the underlying TCP stream (including EOF in the middle of a frame)
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// A received frame violates the protocol
    #[error("Protocol violation: {0}")]
    Codec(#[from] CodecError),
    /// The switch reported an error
    #[error("Switch reported error type {err_type} code {code}")]
    Peer {
        /// `ofp_error_msg` type
        err_type: u16,
        /// `ofp_error_msg` code
        code: u16,
    },
    /// A message of an unexpected type arrived during the handshake
    #[error("Expected message type {expected}, got {got}")]
    UnexpectedMessage {
        /// The expected message type
        expected: u8,
        /// The received message type
        got: u8,
    },
}
