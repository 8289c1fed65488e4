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

//! The `delay` constraint: the accumulated forwarding delay must stay below a threshold.

use super::{ConstraintData, ConstraintHandler};
use crate::mapping::Mapping;
use crate::rules::{RulesError, SingleConstraint};
use crate::topology::Topology;
use crate::trace::TraceData;

use regex::Regex;

/// Handler for the `delay` constraint. Argument form: `F, <threshold in ms>`.
#[derive(Debug, Clone, Copy)]
pub struct DelayConstraint;

impl ConstraintHandler for DelayConstraint {
    fn keyword(&self) -> &'static str {
        "delay"
    }

    fn parse(&self, args: &str) -> Result<ConstraintData, RulesError> {
        let re = Regex::new(r"^F, ([0-9.]+)$").unwrap();
        let threshold_ms = re
            .captures(args.trim())
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| RulesError::InvalidArguments {
                keyword: "delay",
                args: args.to_string(),
            })?;
        Ok(ConstraintData::Delay { threshold_ms })
    }

    fn verify(
        &self,
        constr: &mut SingleConstraint,
        traces: &[TraceData],
        _mapping: &Mapping,
        _topo: &Topology,
    ) {
        if traces.is_empty() {
            constr.observed_rate = 0.0;
            constr.verified = false;
            return;
        }

        let threshold_ms = match constr.data {
            ConstraintData::Delay { threshold_ms } => threshold_ms,
            _ => unreachable!("delay handler invoked with foreign constraint data"),
        };

        let cnt = traces.iter().filter(|td| td.delay <= threshold_ms).count();
        constr.observed_rate = cnt as f64 / traces.len() as f64;
        constr.verified = constr.check();
    }

    fn repr(&self, data: &ConstraintData) -> String {
        match data {
            ConstraintData::Delay { threshold_ms } => format!("F, {}", threshold_ms),
            _ => String::from("F"),
        }
    }
}
