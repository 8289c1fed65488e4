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

use rime::rules::SingleConstraint;
use rime_runtime::checker::Checker;

use clap::Clap;
use log::*;
use std::error::Error;
use std::process;

/// Reassemble the captured trace and verify every policy constraint against it.
#[derive(Clap, Debug)]
#[clap(name = "rime-checker", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Constraints file
    rules: Option<String>,
    /// Topology file
    topology: Option<String>,
    /// Mapping file
    mapping: Option<String>,
    /// JSON trace file written by the collector
    trace: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();
    // run clap
    let args = CommandLineArguments::parse();

    let (rules, topology, mapping, trace) =
        match (args.rules, args.topology, args.mapping, args.trace) {
            (Some(r), Some(t), Some(m), Some(tr)) => (r, t, m, tr),
            _ => {
                eprintln!("Usage: rime-checker <rules file> <topology file> <mapping file> <trace file>");
                process::exit(-1);
            }
        };

    let mut checker = Checker::from_files(&rules, &topology, &mapping, &trace)?;
    checker.reassemble();

    for trace in checker.traces() {
        info!("{}", trace);
    }

    let unsatisfied = checker.verify();
    println!("There are {} unmatched constraints.", unsatisfied);

    for constr in &checker.reqs.constraints {
        dump_constr(constr);
    }
    for grp in checker.reqs.groups.values() {
        let verdict = if grp.verified { "MATCHED" } else { "UNMATCHED" };
        println!("group :{}: ----> {}", grp.id, verdict);
    }

    Ok(())
}

fn dump_constr(constr: &SingleConstraint) {
    let verdict = if constr.verified { "MATCHED" } else { "UNMATCHED" };
    println!(
        "{} ----> {} (success: {}, threshold: {})",
        constr, verdict, constr.observed_rate, constr.srate
    );
}
