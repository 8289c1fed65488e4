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

//! # Trace checker
//!
//! The offline half of a verification run. The checker loads the JSON trace written by the
//! collector, reassembles the postcards of every probe into a forwarding path, dispatches each
//! constraint to its handler, evaluates the group constraints, and reports the number of
//! unsatisfied top-level constraints.

use crate::postcard::PostcardRecord;
use rime::mapping::Mapping;
use rime::rules::{parse_rules_file, Requirements};
use rime::topology::Topology;
use rime::trace::TraceData;

use log::*;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::error::Error;
use std::fs::read_to_string;

/// Read a JSON trace file into postcard records.
pub fn load_trace_file(filename: impl AsRef<str>) -> Result<Vec<PostcardRecord>, Box<dyn Error>> {
    Ok(serde_json::from_str(&read_to_string(filename.as_ref())?)?)
}

/// The trace checker. Call [`reassemble`](Checker::reassemble) once, then
/// [`verify`](Checker::verify).
#[derive(Debug)]
pub struct Checker {
    /// The parsed policy; verdicts are written into its constraints
    pub reqs: Requirements,
    topo: Topology,
    mapping: Mapping,
    records: Vec<PostcardRecord>,
    traces: HashMap<u16, TraceData>,
    by_gcid: HashMap<u16, Vec<TraceData>>,
}

impl Checker {
    /// Create a checker from already-parsed inputs.
    pub fn new(
        reqs: Requirements,
        topo: Topology,
        mapping: Mapping,
        records: Vec<PostcardRecord>,
    ) -> Self {
        Self {
            reqs,
            topo,
            mapping,
            records,
            traces: HashMap::new(),
            by_gcid: HashMap::new(),
        }
    }

    /// Create a checker by parsing the rules, topology, mapping and trace files.
    pub fn from_files(
        rules: &str,
        topo: &str,
        mapping: &str,
        trace: &str,
    ) -> Result<Self, Box<dyn Error>> {
        Ok(Self::new(
            parse_rules_file(rules)?,
            Topology::from_file(topo)?,
            Mapping::from_file(mapping)?,
            load_trace_file(trace)?,
        ))
    }

    /// The reassembled traces, one per probe id.
    pub fn traces(&self) -> impl Iterator<Item = &TraceData> {
        self.traces.values()
    }

    /// Reconstruct the forwarding path of every probe from its postcards.
    ///
    /// Postcards are ordered by capture timestamp. The first postcard of a probe seeds its
    /// trace; every further one appends the switch to the path and accumulates the time since
    /// the previous postcard. The accumulated seconds are converted to the millisecond delay
    /// once all postcards are processed.
    pub fn reassemble(&mut self) {
        let mut records = self.records.clone();
        records.sort_by(|a, b| a.ts.partial_cmp(&b.ts).unwrap_or(Ordering::Equal));

        for pkt in records {
            debug!("Processing postcard {:?}", pkt);
            match self.traces.entry(pkt.id) {
                Entry::Vacant(e) => {
                    let mut td = TraceData::new(pkt.src, pkt.dst, pkt.gcid, pkt.id);
                    td.path.push(pkt.switch);
                    td.ts = 0.0;
                    td.lastts = pkt.ts;
                    e.insert(td);
                }
                Entry::Occupied(mut e) => {
                    let td = e.get_mut();
                    td.path.push(pkt.switch);
                    td.ts += pkt.ts - td.lastts;
                    td.lastts = pkt.ts;
                }
            }
        }

        let by_gcid = &mut self.by_gcid;
        for td in self.traces.values_mut() {
            td.delay = td.ts * 1000.0;
            by_gcid.entry(td.gcid).or_default().push(td.clone());
        }
    }

    /// Verify all constraints and evaluate the groups. Returns the number of unsatisfied
    /// top-level constraints (unverified ungrouped constraints plus unverified groups).
    pub fn verify(&mut self) -> usize {
        let empty = Vec::new();
        let conditions = self.reqs.conditions.clone();

        for gc in &conditions {
            let traces = self.by_gcid.get(&gc.iid).unwrap_or(&empty);
            for idx in &gc.members {
                let handler = self.reqs.constraints[*idx].kind.handler();
                handler.verify(
                    &mut self.reqs.constraints[*idx],
                    traces,
                    &self.mapping,
                    &self.topo,
                );
            }
        }

        self.reqs.evaluate_groups();
        self.reqs.unsatisfied_count()
    }
}
