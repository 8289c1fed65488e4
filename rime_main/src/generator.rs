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

use rime_runtime::generator::Generator;

use clap::Clap;
use log::*;
use std::error::Error;
use std::process;

/// Instrument all switches with postcard tee actions, then generate and inject the probe
/// packets derived from the policy.
#[derive(Clap, Debug)]
#[clap(name = "rime-generator", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Node id of the collector
    #[clap(short = 'c', long = "collector")]
    collector: Option<u16>,
    /// Constraints file
    #[clap(short = 'r', long = "rules")]
    rules: Option<String>,
    /// Topology file
    #[clap(short = 't', long = "topology")]
    topology: Option<String>,
    /// Mapping file
    #[clap(short = 'm', long = "mapping")]
    mapping: Option<String>,
    /// Disable the flow table modifications
    #[clap(short = 'k', long = "no-hook")]
    no_hook: bool,
    /// Make the switches send the probes to the controller (for debugging)
    #[clap(short = 'o', long = "out-controller")]
    out_controller: bool,
    /// Samples per test packet, overriding the constraint handlers
    #[clap(short = 's', long = "samples")]
    samples: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();
    // run clap
    let args = CommandLineArguments::parse();

    let (collector, rules, topology, mapping) =
        match (args.collector, args.rules, args.topology, args.mapping) {
            (Some(c), Some(r), Some(t), Some(m)) => (c, r, t, m),
            _ => {
                eprintln!("Missing argument. All files and the collector id must be provided, see --help");
                process::exit(-1);
            }
        };

    let mut generator =
        Generator::from_files(&rules, &topology, &mapping, collector, args.samples)?;

    if !args.no_hook {
        info!("Instrumenting all switches");
        generator.hook_switches()?;
    }

    info!("Generating probe packets");
    generator.generate_packets()?;
    info!("Injecting {} probe packets", generator.packets().len());
    generator.send_packets(args.out_controller)?;

    Ok(())
}
