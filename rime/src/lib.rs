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

#![deny(missing_docs)]

//! # Rime: Runtime Verification of OpenFlow Forwarding Policies
//!
//! This library checks that an OpenFlow-controlled network forwards traffic the way its
//! high-level policy prescribes. A policy is a set of constraints over flows: allow or deny
//! reachability, bound the end-to-end delay, or require the forwarding path to match a regular
//! expression over switch identifiers. Probe packets are generated for each policy predicate,
//! every switch is instrumented to emit a truncated "postcard" copy of each forwarded packet
//! towards a collector, and the per-packet paths reconstructed from the postcards are evaluated
//! against the policy.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`Topology`](topology::Topology)** and **[`Mapping`](mapping::Mapping)**: The managed
//!   network, parsed from the topology and mapping files. The topology knows which nodes are
//!   switches, which links exist, and on which local port each neighbor is reached. The mapping
//!   assigns each node its IP address, MAC address and OpenFlow control port.
//!
//! - **[`fsm`]**: The path-regex engine. It compiles a regular path expression into a
//!   deterministic finite automaton ([`Fsm`](fsm::Fsm)) via Thompson's construction,
//!   epsilon-removal by loop reduction, and Rabin-Scott subset construction. The automaton is
//!   then run over the observed switch sequence of a probe.
//!
//! - **[`rules`]**: The parser for the constraints DSL, producing a
//!   [`Requirements`](rules::Requirements) structure holding atoms, sets, aliases, single and
//!   grouped constraints, and the deduplicated group conditions that later tag the probes.
//!
//! - **[`constraints`]**: One handler per constraint kind (`allow`, `deny`, `delay`, `path`),
//!   each able to parse its own argument string and to score a set of observed traces.
//!
//! - **[`trace`]**: The reconstructed per-probe forwarding record
//!   ([`TraceData`](trace::TraceData)), consumed by the constraint handlers.
//!
//! The OpenFlow codec and switch session live in the separate `rime_openflow` crate; probe
//! generation, postcard collection and trace checking live in `rime_runtime`.

pub mod constraints;
pub mod fsm;
pub mod mapping;
pub mod rules;
pub mod topology;
pub mod trace;

mod error;
pub use error::Error;

/// Node identification. Switch identifiers must fit into the 16-bit field of the postcard MAC
/// encoding, so the whole node-id namespace is 16 bits wide.
pub type NodeId = u16;
