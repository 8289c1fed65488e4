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

//! The `allow` constraint: the flow must actually be delivered.

use super::{trace_delivered, ConstraintData, ConstraintHandler};
use crate::mapping::Mapping;
use crate::rules::{RulesError, SingleConstraint};
use crate::topology::Topology;
use crate::trace::TraceData;

use log::*;

/// Handler for the `allow` constraint.
///
/// A trace satisfies the constraint iff its source host is connected to the first switch of
/// the path and its destination host is connected to the last one. Without any trace the
/// constraint cannot verify.
#[derive(Debug, Clone, Copy)]
pub struct AllowConstraint;

impl ConstraintHandler for AllowConstraint {
    fn keyword(&self) -> &'static str {
        "allow"
    }

    fn parse(&self, args: &str) -> Result<ConstraintData, RulesError> {
        match args.trim() {
            "F" => Ok(ConstraintData::Flow),
            _ => Err(RulesError::InvalidArguments { keyword: "allow", args: args.to_string() }),
        }
    }

    fn verify(
        &self,
        constr: &mut SingleConstraint,
        traces: &[TraceData],
        mapping: &Mapping,
        topo: &Topology,
    ) {
        // without any trace, the constraint cannot verify
        if traces.is_empty() {
            constr.observed_rate = 0.0;
            constr.verified = false;
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

        constr.observed_rate = cnt as f64 / traces.len() as f64;
        debug!("allow: {} of {} traces delivered", cnt, traces.len());
        constr.verified = constr.check();
    }

    fn repr(&self, _data: &ConstraintData) -> String {
        String::from("F")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraints::test_util::*;

    #[test]
    fn parse_args() {
        assert_eq!(AllowConstraint.parse("F").unwrap(), ConstraintData::Flow);
        assert_eq!(AllowConstraint.parse(" F ").unwrap(), ConstraintData::Flow);
        assert!(AllowConstraint.parse("F, 3").is_err());
    }

    #[test]
    fn all_delivered() {
        let (topo, mapping) = small_net();
        let mut constr = flow_constraint(crate::constraints::ConstraintKind::Allow);
        let traces = vec![trace(1, &[1, 2]), trace(2, &[1, 2])];
        AllowConstraint.verify(&mut constr, &traces, &mapping, &topo);
        assert!((constr.observed_rate - 1.0).abs() < 1e-9);
        assert!(constr.verified);
    }

    #[test]
    fn half_delivered() {
        let (topo, mapping) = small_net();
        let mut constr = flow_constraint(crate::constraints::ConstraintKind::Allow);
        // the second probe never left s1, so the destination is not connected to the last hop
        let traces = vec![trace(1, &[1, 2]), trace(2, &[1])];
        AllowConstraint.verify(&mut constr, &traces, &mapping, &topo);
        assert!((constr.observed_rate - 0.5).abs() < 1e-9);
        assert!(!constr.verified);
    }

    #[test]
    fn no_traces_fail() {
        let (topo, mapping) = small_net();
        let mut constr = flow_constraint(crate::constraints::ConstraintKind::Allow);
        AllowConstraint.verify(&mut constr, &[], &mapping, &topo);
        assert_eq!(constr.observed_rate, 0.0);
        assert!(!constr.verified);
    }
}
