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

//! # Probe generator and switch instrumentation
//!
//! The generator performs the two active phases of a verification run. First it rewrites the
//! flow table of every switch so that each forwarded packet additionally emits a postcard:
//! after every output action, a tee is inserted that rewrites the destination MAC to the
//! postcard stamp and outputs a truncated copy towards the collector. Then it materializes
//! probe packets from the policy's group conditions and injects them at every switch next to
//! their source host.
//!
//! Both phases walk the switches one at a time, each over its own short-lived
//! [`Session`]; a failing switch is logged and skipped so that one dead device cannot spoil
//! the whole run.

use crate::postcard::encode_mac;
use crate::protocols::{self, ProbeEndpoint};
use rime::mapping::Mapping;
use rime::rules::{CondKind, CondSource, GroupCondition, Requirements};
use rime::topology::Topology;
use rime::NodeId;
use rime_openflow::{
    flow_mod_command, msg_type, port, Action, Message, Session, NO_BUFFER,
};

use itertools::{iproduct, Itertools};
use log::*;
use std::error::Error;
use std::net::Ipv4Addr;

/// A probe packet, ready for injection at the switches neighboring its source host.
#[derive(Debug, Clone)]
pub struct ProbePacket {
    /// The host the probe pretends to originate from
    pub src: NodeId,
    /// The raw Ethernet frame
    pub data: Vec<u8>,
}

/// The probe generator. See the [module documentation](self) for the two phases it drives.
#[derive(Debug)]
pub struct Generator {
    reqs: Requirements,
    topo: Topology,
    mapping: Mapping,
    collector: NodeId,
    samples: Option<usize>,
    packets: Vec<ProbePacket>,
}

impl Generator {
    /// Create a generator from already-parsed inputs.
    pub fn new(
        reqs: Requirements,
        topo: Topology,
        mapping: Mapping,
        collector: NodeId,
        samples: Option<usize>,
    ) -> Self {
        Self { reqs, topo, mapping, collector, samples, packets: Vec::new() }
    }

    /// Create a generator by parsing the three input files.
    pub fn from_files(
        rules: &str,
        topo: &str,
        mapping: &str,
        collector: NodeId,
        samples: Option<usize>,
    ) -> Result<Self, rime::Error> {
        Ok(Self::new(
            rime::rules::parse_rules_file(rules)?,
            Topology::from_file(topo)?,
            Mapping::from_file(mapping)?,
            collector,
            samples,
        ))
    }

    /// The generated probe packets.
    pub fn packets(&self) -> &[ProbePacket] {
        &self.packets
    }

    /// Instrument every switch in the topology with postcard tee actions.
    ///
    /// For each switch, the flow table is dumped and every flow is rewritten with
    /// `OFPFC_MODIFY_STRICT`, preserving its match, timeouts and priority, with the tee pair
    /// inserted after each output action. Switches that are unmapped, have no OpenFlow port,
    /// have no link towards the collector, or fail at the transport level are skipped with a
    /// warning.
    pub fn hook_switches(&self) -> Result<(), Box<dyn Error>> {
        for switch in self.topo.switches() {
            let info = match self.mapping.get(switch) {
                Some(info) => info.clone(),
                None => {
                    warn!("Switch s{} is not mapped, skipping switch", switch);
                    continue;
                }
            };
            if info.ofport == 0 {
                warn!("OpenFlow port for s{} is zero, skipping switch", switch);
                continue;
            }
            let collector_port = match self.topo.port(switch, self.collector) {
                Some(port) => port,
                None => {
                    warn!("Switch s{} has no link towards the collector, skipping switch", switch);
                    continue;
                }
            };

            if let Err(e) = self.hook_switch(switch, info.ip, info.ofport, collector_port) {
                warn!("Cannot instrument switch s{}: {}", switch, e);
            }
        }
        Ok(())
    }

    fn hook_switch(
        &self,
        switch: NodeId,
        ip: Ipv4Addr,
        ofport: u16,
        collector_port: u16,
    ) -> Result<(), rime_openflow::Error> {
        let mut session = Session::connect(ip, ofport)?;
        session.handshake()?;
        session.dump_flows()?;
        session.run(msg_type::STATS_REPLY)?;
        info!("Instrumenting s{}: {} flows", switch, session.flows.len());

        let flows = std::mem::take(&mut session.flows);
        for flow in flows {
            session.send_message(Message::FlowMod {
                mat: flow.mat,
                cookie: rand::random(),
                command: flow_mod_command::MODIFY_STRICT,
                idle_timeout: flow.idle_timeout,
                hard_timeout: flow.hard_timeout,
                priority: flow.priority,
                buffer_id: NO_BUFFER,
                out_port: port::NONE,
                flags: 0,
                actions: tee_actions(switch, collector_port, &flow.actions),
            })?;
        }
        Ok(())
    }

    /// Materialize the probe packets for every group condition.
    ///
    /// Source and target host sets are resolved from the equality and atom conditions; the
    /// protocol defaults to `default`. The sample count is the command-line override if set,
    /// the handler-requested count otherwise, and 1 as a fallback.
    pub fn generate_packets(&mut self) -> Result<(), Box<dyn Error>> {
        let conditions = self.reqs.conditions.clone();
        for gc in &conditions {
            let (src_hosts, dst_hosts, proto) = self.resolve_condition(gc)?;
            let samples = self.sample_count(gc);

            let proto_name = proto.unwrap_or_else(|| String::from("default"));
            let plugin = protocols::plugin(&proto_name)
                .ok_or_else(|| format!("Unknown protocol: {}", proto_name))?;

            for (snode, dnode) in iproduct!(src_hosts.iter(), dst_hosts.iter()) {
                let src = self.endpoint(*snode)?;
                let dst = self.endpoint(*dnode)?;
                for _ in 0..samples {
                    let probe_id: u16 = rand::random();
                    debug!(
                        "Building probe {} for condition {}: h{} -> h{}",
                        probe_id, gc.iid, snode, dnode
                    );
                    for data in plugin.build(&src, &dst, gc.iid, probe_id)? {
                        self.packets.push(ProbePacket { src: *snode, data });
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve the host sets and the protocol of one group condition.
    fn resolve_condition(
        &self,
        gc: &GroupCondition,
    ) -> Result<(Vec<NodeId>, Vec<NodeId>, Option<String>), Box<dyn Error>> {
        let mut src_hosts = Vec::new();
        let mut dst_hosts = Vec::new();
        let mut proto = None;

        for cond in &gc.conds {
            let hosts = match cond.source {
                CondSource::SourceHost => &mut src_hosts,
                CondSource::TargetHost => &mut dst_hosts,
                CondSource::Protocol => {
                    match cond.kind {
                        CondKind::Equal => proto = Some(cond.target.to_lowercase()),
                        CondKind::Atom => {
                            warn!("Unsupported atom condition on the protocol, skipping")
                        }
                    }
                    continue;
                }
            };
            match cond.kind {
                CondKind::Equal => hosts.push(self.host_node(&cond.target)?),
                CondKind::Atom => {
                    let members = self
                        .reqs
                        .atoms
                        .get(&cond.target)
                        .ok_or_else(|| format!("Unknown atom: {}", cond.target))?;
                    for host in members {
                        hosts.push(self.host_node(host)?);
                    }
                }
            }
        }

        Ok((src_hosts, dst_hosts, proto))
    }

    /// Decide the sample count for a group condition: command line, constraint handler,
    /// default of 1.
    fn sample_count(&self, gc: &GroupCondition) -> usize {
        if let Some(samples) = self.samples {
            return samples;
        }
        let requests: Vec<usize> = gc
            .members
            .iter()
            .filter_map(|idx| self.reqs.constraints[*idx].requested_samples())
            .unique()
            .collect();
        if requests.len() > 1 {
            warn!(
                "Condition {} is shared by constraints requesting different sample counts, \
                 using the first request",
                gc.iid
            );
        }
        requests.first().copied().unwrap_or(1)
    }

    fn host_node(&self, host: &str) -> Result<NodeId, Box<dyn Error>> {
        self.reqs
            .host_to_node(host)
            .ok_or_else(|| format!("Not a host literal: {}", host).into())
    }

    fn endpoint(&self, node: NodeId) -> Result<ProbeEndpoint, Box<dyn Error>> {
        let info = self
            .mapping
            .get(node)
            .ok_or_else(|| format!("Host h{} is not mapped", node))?;
        let mac = info.mac.ok_or_else(|| format!("Host h{} has no MAC address", node))?;
        Ok(ProbeEndpoint { mac, ip: info.ip })
    }

    /// Inject all generated probes. Each probe is sent via `PACKET_OUT` on every switch that
    /// neighbors its source host; the switch then runs the packet through its own flow table
    /// (or forwards it to the controller when `to_controller` is set, for debugging).
    pub fn send_packets(&self, to_controller: bool) -> Result<(), Box<dyn Error>> {
        let out_port = if to_controller { port::CONTROLLER } else { port::TABLE };

        for packet in &self.packets {
            for switch in self.topo.switch_neighbors(packet.src) {
                let info = match self.mapping.get(switch) {
                    Some(info) => info,
                    None => {
                        warn!("Switch s{} is not mapped, skipping packet out", switch);
                        continue;
                    }
                };
                if info.ofport == 0 {
                    warn!("OpenFlow port for s{} is zero, skipping packet out", switch);
                    continue;
                }

                info!(
                    "Sending probe from h{} at s{} ({}:{})",
                    packet.src, switch, info.ip, info.ofport
                );
                let result = Session::connect(info.ip, info.ofport).and_then(|mut session| {
                    session.handshake()?;
                    session.packet_out(0, &packet.data, out_port)
                });
                if let Err(e) = result {
                    warn!("Cannot inject probe at s{}: {}", switch, e);
                }
            }
        }
        Ok(())
    }
}

/// Insert the postcard tee after every output action of a flow's action list.
///
/// Each `OFPAT_OUTPUT` is followed by an `OFPAT_SET_DL_DST` stamping `(switch, outport)` into
/// the destination MAC and an `OFPAT_OUTPUT` towards the collector, truncated to 256 bytes.
/// All other actions are preserved verbatim in their original positions.
pub fn tee_actions(switch: NodeId, collector_port: u16, actions: &[Action]) -> Vec<Action> {
    let mut result = Vec::with_capacity(actions.len() * 3);
    for action in actions {
        result.push(action.clone());
        if let Action::Output { port: outport, .. } = action {
            result.push(Action::SetDlDst { dl_dst: encode_mac(switch, *outport) });
            result.push(Action::Output { port: collector_port, max_len: 256 });
        }
    }
    result
}
