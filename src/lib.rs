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

//! # LabSim: Switched Network Simulator
//!
//! This is a library for simulating the behavior of a small campus network made of PCs, layer-2
//! switches and multilayer switches, as configured in a networking lab. The simulator does not
//! model time or individual messages. Instead, every protocol is evaluated as a whole after each
//! change, and the resulting derived state (negotiated trunks, spanning tree, HSRP roles, routing
//! tables) replaces the previous one.
//!
//! ## Main Concepts
//!
//! The [`network::Network`] is the main datastructure to operate on. It allows you to add and
//! remove devices, plug cables between ports, and change the configuration of every device. On
//! every change, the derived state is recomputed:
//!
//! - [`dtp`]: Negotiation of the operational mode (access or trunk) of both ends of a cable.
//! - [`stp`]: Per-VLAN spanning tree, electing a root bridge and blocking redundant ports.
//! - [`hsrp`]: Election of the active and standby router of every HSRP group.
//! - [`routing`]: Propagation of connected, static, OSPF and BGP routes between layer-3
//!   switches, including redistribution.
//!
//! Connectivity is resolved by [`forwarding`], which searches a path for an echo request through
//! the layer-2 domains (VLAN tagging, spanning tree and access lists) and the routing tables.
//!
//! The configuration of all devices can be read as a [`config::Config`], compared and modified
//! using the [`config::NetworkConfig`] trait. The network can be exported to json and restored
//! using [`network::Network::as_json_str`] and [`network::Network::from_json_str`].
//!
//! ## Example usage
//!
//! ```rust
//! use labsim::prelude::*;
//!
//! fn main() -> Result<(), NetworkError> {
//!     let mut net = Network::default();
//!
//!     let pc1 = net.add_pc("PC1");
//!     let pc2 = net.add_pc("PC2");
//!     let r = net.add_l3_switch("R1");
//!     net.connect(PortRef::new(pc1, 0), PortRef::new(r, 0))?;
//!     net.connect(PortRef::new(pc2, 0), PortRef::new(r, 1))?;
//!
//!     // route between the two PCs
//!     for (p, addr) in [(0, "10.1.1.254/24"), (1, "10.2.2.254/24")] {
//!         let port = PortRef::new(r, p);
//!         net.set_port_mode(port, PortMode::Routed, DtpMode::None)?;
//!         net.set_port_address(port, Some(addr.parse().unwrap()))?;
//!     }
//!     net.set_host_address(pc1, Some("10.1.1.1/24".parse().unwrap()))?;
//!     net.set_default_gateway(pc1, Some("10.1.1.254".parse().unwrap()))?;
//!     net.set_host_address(pc2, Some("10.2.2.1/24".parse().unwrap()))?;
//!     net.set_default_gateway(pc2, Some("10.2.2.254".parse().unwrap()))?;
//!
//!     let result = net.ping(pc1, "10.2.2.1".parse().unwrap())?;
//!     assert!(result.reachable);
//!     assert_eq!(result.hops, vec![pc1, r, pc2]);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod acl;
pub mod config;
pub mod device;
pub mod dtp;
pub mod formatter;
pub mod forwarding;
pub mod hsrp;
pub mod l2;
pub mod network;
pub mod port;
pub mod prelude;
pub mod router;
pub mod routing;
mod serde;
pub mod stp;
pub mod types;

#[cfg(test)]
mod test;
