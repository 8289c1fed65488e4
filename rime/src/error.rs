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

//! Module containing all error types

use crate::fsm::RegexError;
use crate::mapping::MappingError;
use crate::rules::RulesError;
use crate::topology::TopologyError;
use thiserror::Error;

/// Main error type. All variants are configuration errors: they are raised while loading the
/// input files and are fatal. Per-switch and per-packet problems at runtime are logged and
/// skipped instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Error while parsing the topology file
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    /// Error while parsing the mapping file
    #[error("Mapping Error: {0}")]
    Mapping(#[from] MappingError),
    /// Error while parsing the rules file
    #[error("Rules Error: {0}")]
    Rules(#[from] RulesError),
    /// Error while compiling a regular path expression
    #[error("Path Expression Error: {0}")]
    Regex(#[from] RegexError),
}
