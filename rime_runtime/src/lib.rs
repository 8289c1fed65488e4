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

//! # Runtime System
//!
//! This crate connects the policy library to the real network. The
//! [`Generator`](generator::Generator) instruments every switch with postcard tee actions and
//! injects the probe packets derived from the policy; the [collector](collector) sniffs the
//! postcards and writes them out as a JSON trace; the [`Checker`](checker::Checker) reads the
//! trace back, reassembles the per-probe forwarding paths and evaluates every constraint.
//!
//! The three phases are independent programs in practice (see the `rime_main` crate): probes
//! are generated on the controller host while the collector captures on its own machine, and
//! checking happens offline once the capture interval is over.

#![deny(missing_docs, missing_debug_implementations)]

pub mod checker;
pub mod collector;
pub mod generator;
pub mod postcard;
pub mod protocols;
