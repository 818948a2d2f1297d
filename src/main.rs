// LabSim: Switched Network Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
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

use std::{fs, net::Ipv4Addr, path::PathBuf};

use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::*;

use labsim::prelude::*;

/// Load a lab scenario and query the simulated network.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Scenario file, as exported by `Network::as_json_str`.
    scenario: PathBuf,
    /// What to do with the network.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send 5 echo requests from a device to an address.
    Ping {
        /// Name of the source device
        source: String,
        /// Destination address
        destination: Ipv4Addr,
        /// Number of pings to send in sequence
        #[arg(long, short = 'n', default_value_t = 1)]
        repeat: usize,
    },
    /// Show the devices traversed by a packet.
    Traceroute {
        /// Name of the source device
        source: String,
        /// Destination address
        destination: Ipv4Addr,
    },
    /// Show the routing table of a layer-3 switch.
    Routes {
        /// Name of the device
        device: String,
    },
    /// Show the spanning tree of a switch in a VLAN.
    Stp {
        /// Name of the device
        device: String,
        /// VLAN
        #[arg(default_value_t = 1)]
        vlan: VlanId,
    },
    /// Show the roles of all router interfaces in an HSRP group.
    Hsrp {
        /// HSRP group number (0 to 255)
        group: u8,
    },
    /// Show the running configuration of all devices.
    Config,
    /// Re-export the scenario, with all derived state recomputed.
    Export {
        /// Write a compact json file instead of a pretty-printed one.
        #[arg(long)]
        compact: bool,
        /// Output file
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();

    let args = Cli::parse();

    let mut net = Network::from_json_str(&fs::read_to_string(&args.scenario)?)?;
    info!(
        "Loaded {} devices from {}",
        net.num_devices(),
        args.scenario.display()
    );

    match args.command {
        Command::Ping {
            source,
            destination,
            repeat,
        } => {
            let source = net.get_device_id(&source)?;
            for _ in 0..repeat {
                let result = net.ping(source, destination)?;
                println!("{}", result.fmt(&net));
            }
        }
        Command::Traceroute {
            source,
            destination,
        } => {
            let source = net.get_device_id(&source)?;
            let path = net.traceroute(source, destination)?;
            if path.is_empty() {
                println!("{} is unreachable", destination);
            } else {
                println!("{}", path.fmt(&net));
            }
        }
        Command::Routes { device } => {
            let device = net.get_device_id(&device)?;
            println!("{}", net.routing_table(device)?.iter().map(|e| e.fmt(&net)).join("\n"));
        }
        Command::Stp { device, vlan } => {
            let device = net.get_device_id(&device)?;
            println!("{}", net.spanning_tree(device, vlan)?.fmt(&net));
        }
        Command::Hsrp { group } => {
            println!("{}", net.hsrp_roles(group)?.fmt(&net));
        }
        Command::Config => {
            println!("{}", net.get_config()?.fmt(&net));
        }
        Command::Export { compact, output } => {
            let json = if compact {
                net.as_json_str_compact()
            } else {
                net.as_json_str()
            };
            fs::write(&output, json)?;
            info!("Exported the network to {}", output.display());
        }
    }

    Ok(())
}
