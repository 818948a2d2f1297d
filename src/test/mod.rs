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

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::{
    network::Network,
    port::{DtpMode, PortMode},
    types::{DeviceId, PortRef},
};

mod test_connectivity;
mod test_network_config;
mod test_switching;

pub(crate) fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

pub(crate) fn prefix(s: &str) -> Ipv4Net {
    s.parse().unwrap()
}

/// Add a PC with an address (and optionally a default gateway), and plug it into `port`.
pub(crate) fn add_host(
    net: &mut Network,
    name: &str,
    port: PortRef,
    address: &str,
    gateway: Option<&str>,
) -> DeviceId {
    let pc = net.add_pc(name);
    net.connect(PortRef::new(pc, 0), port).unwrap();
    net.set_host_address(pc, Some(prefix(address))).unwrap();
    net.set_default_gateway(pc, gateway.map(ip)).unwrap();
    pc
}

/// Turn a port of a layer-3 switch into a routed port with an address.
pub(crate) fn routed(net: &mut Network, port: PortRef, address: &str) {
    net.set_port_mode(port, PortMode::Routed, DtpMode::None)
        .unwrap();
    net.set_port_address(port, Some(prefix(address))).unwrap();
}

/// Chain of three layer-3 switches connected by routed ports, with a PC behind the first and the
/// last one:
///
/// ```text
/// PC1 -- R1 -- R2 -- R3 -- PC3
/// ```
///
/// No routing protocol is configured.
pub(crate) fn routed_chain() -> (Network, [DeviceId; 5]) {
    let mut net = Network::default();
    let r1 = net.add_l3_switch("R1");
    let r2 = net.add_l3_switch("R2");
    let r3 = net.add_l3_switch("R3");

    net.connect(PortRef::new(r1, 0), PortRef::new(r2, 0)).unwrap();
    net.connect(PortRef::new(r2, 1), PortRef::new(r3, 0)).unwrap();
    routed(&mut net, PortRef::new(r1, 0), "10.0.12.1/24");
    routed(&mut net, PortRef::new(r2, 0), "10.0.12.2/24");
    routed(&mut net, PortRef::new(r2, 1), "10.0.23.2/24");
    routed(&mut net, PortRef::new(r3, 0), "10.0.23.3/24");

    let pc1 = add_host(
        &mut net,
        "PC1",
        PortRef::new(r1, 1),
        "192.168.1.1/24",
        Some("192.168.1.254"),
    );
    let pc3 = add_host(
        &mut net,
        "PC3",
        PortRef::new(r3, 1),
        "192.168.3.1/24",
        Some("192.168.3.254"),
    );
    routed(&mut net, PortRef::new(r1, 1), "192.168.1.254/24");
    routed(&mut net, PortRef::new(r3, 1), "192.168.3.254/24");

    (net, [pc1, r1, r2, r3, pc3])
}
