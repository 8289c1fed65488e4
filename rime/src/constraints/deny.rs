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

//! The `deny` constraint: the flow must not be delivered.

use super::{trace_delivered, ConstraintData, ConstraintHandler};
use crate::mapping::Mapping;
use crate::rules::{RulesError, SingleConstraint};
use crate::topology::Topology;
use crate::trace::TraceData;

use log::*;

/// Handler for the `deny` constraint, the inverse of `allow`.
///
/// The absence of any trace is proof that the flow was dropped: an empty trace list verifies
/// with an observed rate of 1. Otherwise the observed rate is one minus the delivered
/// fraction.
#[derive(Debug, Clone, Copy)]
pub struct DenyConstraint;

impl ConstraintHandler for DenyConstraint {
    fn keyword(&self) -> &'static str {
        "deny"
    }

    fn parse(&self, args: &str) -> Result<ConstraintData, RulesError> {
        match args.trim() {
            "F" => Ok(ConstraintData::Flow),
            _ => Err(RulesError::InvalidArguments { keyword: "deny", args: args.to_string() }),
        }
    }

    fn verify(
        &self,
        constr: &mut SingleConstraint,
        traces: &[TraceData],
        mapping: &Mapping,
        topo: &Topology,
    ) {
        // no trace means no flow: the constraint is verified
        if traces.is_empty() {
            constr.observed_rate = 1.0;
            constr.verified = true;
            return;
        }

        let mut cnt = 0usize;
        for td in traces {
            match trace_delivered(td, mapping, topo) {
                Some(true) => cnt += 1,
                Some(false) => {}
                None => warn!("Source or destination of trace [{}] is not mapped, skipping", td),
            }
        }

        constr.observed_rate = 1.0 - (cnt as f64 / traces.len() as f64);
        constr.verified = constr.check();
    }

    fn repr(&self, _data: &ConstraintData) -> String {
        String::from("F")
    }
}
