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

use rime_runtime::collector;

use clap::Clap;
use std::error::Error;

/// Capture all postcards for a fixed interval and print them as a JSON trace on stdout.
#[derive(Clap, Debug)]
#[clap(name = "rime-collector", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Collection timeout in seconds
    #[clap(short = 't', long = "timeout", default_value = "5")]
    timeout: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();
    // run clap
    let args = CommandLineArguments::parse();

    let records = collector::collect(args.timeout)?;
    println!("{}", collector::to_json(&records)?);

    Ok(())
}
