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

//! # Constraint Handlers
//!
//! One handler per constraint kind. Every handler can parse its own argument string into a
//! [`ConstraintData`] payload and score a list of observed [`TraceData`] records against a
//! constraint, setting its observed rate and verdict.
//!
//! The set of kinds is closed: handlers are plain static values behind the
//! [`ConstraintHandler`] trait, looked up through [`ConstraintKind::handler`]. The keyword
//! string doubles as the stable identifier of each kind.

mod allow;
mod delay;
mod deny;
mod path;

pub use allow::AllowConstraint;
pub use delay::DelayConstraint;
pub use deny::DenyConstraint;
pub use path::PathConstraint;

use crate::mapping::Mapping;
use crate::rules::{RulesError, SingleConstraint};
use crate::topology::Topology;
use crate::trace::TraceData;

use std::fmt;

/// The closed set of constraint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// The flow must reach its destination
    Allow,
    /// The flow must not reach its destination
    Deny,
    /// The accumulated forwarding delay must stay below a threshold
    Delay,
    /// The forwarding path must match a regular path expression
    Path,
}

impl ConstraintKind {
    /// Look up a kind by its DSL keyword.
    pub fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            "delay" => Some(Self::Delay),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    /// The DSL keyword of this kind. This string is the stable identifier used wherever
    /// constraints are rendered or serialized.
    pub fn keyword(&self) -> &'static str {
        self.handler().keyword()
    }

    /// The handler implementing this kind.
    pub fn handler(&self) -> &'static dyn ConstraintHandler {
        match self {
            Self::Allow => &AllowConstraint,
            Self::Deny => &DenyConstraint,
            Self::Delay => &DelayConstraint,
            Self::Path => &PathConstraint,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// The kind-specific payload parsed from a constraint's argument string.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintData {
    /// `allow` and `deny` take only the flow placeholder `F`
    Flow,
    /// `delay` carries its threshold in milliseconds
    Delay {
        /// Maximum allowed accumulated delay in milliseconds
        threshold_ms: f64,
    },
    /// `path` carries the regular path expression, the required success rate, and an optional
    /// probe multiplicity requested at generation time
    Path {
        /// The regular path expression
        expr: String,
        /// Required fraction of traces matching the expression
        rate: f64,
        /// Number of probe samples requested by the handler (set when `0 < rate < 1`)
        samples: Option<usize>,
    },
}

/// Capability set of a constraint kind: parse the argument string, verify a constraint against
/// observed traces, and render the argument string back.
pub trait ConstraintHandler: Sync {
    /// The DSL keyword of the handler.
    fn keyword(&self) -> &'static str;

    /// Parse the argument string (the part between the parentheses) into the kind-specific
    /// payload. Failures are configuration errors.
    fn parse(&self, args: &str) -> Result<ConstraintData, RulesError>;

    /// Score the given traces against the constraint. Sets `observed_rate` to the fraction of
    /// satisfying traces in `[0, 1]`, and `verified` to whether the observed rate reaches the
    /// required success rate.
    fn verify(
        &self,
        constr: &mut SingleConstraint,
        traces: &[TraceData],
        mapping: &Mapping,
        topo: &Topology,
    );

    /// Render the payload back into an argument string.
    fn repr(&self, data: &ConstraintData) -> String;
}

/// Check whether the trace entered the network at a switch next to its source host and left it
/// at a switch next to its destination host. Shared by the allow and deny handlers; traces
/// with unmapped addresses return `None`.
fn trace_delivered(td: &TraceData, mapping: &Mapping, topo: &Topology) -> Option<bool> {
    let snode = mapping.node_by_ip(td.src)?;
    let dnode = mapping.node_by_ip(td.dst)?;
    let first = *td.path.first()?;
    let last = *td.path.last()?;
    Some(topo.is_connected(snode, first) && topo.is_connected(dnode, last))
}
