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

//! The `path` constraint: the forwarding path must match a regular path expression.

use super::{ConstraintData, ConstraintHandler};
use crate::fsm;
use crate::mapping::Mapping;
use crate::rules::{RulesError, SingleConstraint};
use crate::topology::Topology;
use crate::trace::TraceData;

use log::*;
use regex::Regex;

/// Number of probe samples requested when the constraint declares a partial success rate. A
/// rate below 1 means the path is only one of several load-balanced alternatives, so a single
/// probe cannot measure the split.
const LOAD_BALANCE_SAMPLES: usize = 10;

/// Handler for the `path` constraint. Argument form: `F, '<expression>'[, <rate>]`.
///
/// The optional trailing rate overrides the required success rate of the constraint; a rate
/// strictly between 0 and 1 additionally requests [`LOAD_BALANCE_SAMPLES`] probe samples at
/// generation time.
#[derive(Debug, Clone, Copy)]
pub struct PathConstraint;

impl ConstraintHandler for PathConstraint {
    fn keyword(&self) -> &'static str {
        "path"
    }

    fn parse(&self, args: &str) -> Result<ConstraintData, RulesError> {
        let re = Regex::new(r"^F, '(.*)'(?:, )?([0-9.]+)?$").unwrap();
        let caps = re.captures(args.trim()).ok_or_else(|| RulesError::InvalidArguments {
            keyword: "path",
            args: args.to_string(),
        })?;

        let expr = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let rate = match caps.get(2) {
            Some(m) => m.as_str().parse::<f64>().map_err(|_| RulesError::InvalidArguments {
                keyword: "path",
                args: args.to_string(),
            })?,
            None => 1.0,
        };

        // reject broken expressions at load time, not at verification time
        fsm::parse(&expr).map_err(RulesError::PathExpression)?;

        let samples =
            if rate > 0.0 && rate < 1.0 { Some(LOAD_BALANCE_SAMPLES) } else { None };

        Ok(ConstraintData::Path { expr, rate, samples })
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

        let expr = match &constr.data {
            ConstraintData::Path { expr, .. } => expr,
            _ => unreachable!("path handler invoked with foreign constraint data"),
        };

        let dfa = match fsm::compile(expr) {
            Ok(dfa) => dfa,
            Err(e) => {
                // cannot happen for expressions that passed `parse`
                error!("Cannot compile path expression '{}': {}", expr, e);
                constr.observed_rate = 0.0;
                constr.verified = false;
                return;
            }
        };

        let cnt = traces.iter().filter(|td| dfa.accepts(&td.path)).count();
        constr.observed_rate = cnt as f64 / traces.len() as f64;
        constr.verified = constr.check();
    }

    fn repr(&self, data: &ConstraintData) -> String {
        match data {
            ConstraintData::Path { expr, rate, .. } => format!("F, '{}', {}", expr, rate),
            _ => String::from("F"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraints::test_util::*;
    use crate::constraints::ConstraintKind;

    #[test]
    fn parse_args() {
        assert_eq!(
            PathConstraint.parse("F, 's1,s2'").unwrap(),
            ConstraintData::Path { expr: "s1,s2".to_string(), rate: 1.0, samples: None }
        );
        assert_eq!(
            PathConstraint.parse("F, 's1,s2,s4', 0.5").unwrap(),
            ConstraintData::Path {
                expr: "s1,s2,s4".to_string(),
                rate: 0.5,
                samples: Some(LOAD_BALANCE_SAMPLES)
            }
        );
        assert!(PathConstraint.parse("F").is_err());
        assert!(PathConstraint.parse("F, s1,s2").is_err());
        // broken expression inside the quotes is a configuration error
        assert!(PathConstraint.parse("F, 's1|'").is_err());
    }

    #[test]
    fn matching_paths_verify() {
        let (topo, mapping) = small_net();
        let mut constr = constraint(
            ConstraintKind::Path,
            PathConstraint.parse("F, 's1,s2'").unwrap(),
        );
        let traces = vec![trace(1, &[1, 2]), trace(2, &[1, 2])];
        PathConstraint.verify(&mut constr, &traces, &mapping, &topo);
        assert_eq!(constr.observed_rate, 1.0);
        assert!(constr.verified);
    }

    #[test]
    fn wildcard_detour() {
        let (topo, mapping) = small_net();
        let mut constr = constraint(
            ConstraintKind::Path,
            PathConstraint.parse("F, 's1,.,s2'").unwrap(),
        );
        let traces = vec![trace(1, &[1, 3, 2])];
        PathConstraint.verify(&mut constr, &traces, &mapping, &topo);
        assert_eq!(constr.observed_rate, 1.0);
        assert!(constr.verified);
    }

    #[test]
    fn load_balanced_split() {
        let (topo, mapping) = small_net();
        let mut constr = constraint(
            ConstraintKind::Path,
            PathConstraint.parse("F, 's1,s2,s4', 0.5").unwrap(),
        );
        assert!((constr.srate - 0.5).abs() < 1e-9);
        // five of ten probes took this path, the others took the alternative
        let mut traces = Vec::new();
        for i in 0..5 {
            traces.push(trace(i, &[1, 2, 4]));
        }
        for i in 5..10 {
            traces.push(trace(i, &[1, 3, 4]));
        }
        PathConstraint.verify(&mut constr, &traces, &mapping, &topo);
        assert!((constr.observed_rate - 0.5).abs() < 1e-9);
        assert!(constr.verified);
    }

    #[test]
    fn no_traces_fail() {
        let (topo, mapping) = small_net();
        let mut constr = constraint(
            ConstraintKind::Path,
            PathConstraint.parse("F, 's1,s2'").unwrap(),
        );
        PathConstraint.verify(&mut constr, &[], &mapping, &topo);
        assert_eq!(constr.observed_rate, 0.0);
        assert!(!constr.verified);
    }
}
