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

//! # Connectivity Resolver
//!
//! Answers whether a packet sent by a device towards an IP address arrives, and through which
//! devices it travels. The resolver is a breadth-first search over frontier states
//! `(device, vlan context)`. A VLAN context of `None` means that the device processes the packet
//! at layer 3 (host, routed port, or a layer-3 switch after receiving the frame on an SVI).
//!
//! Every routed leg of the path is a separate layer-2 flood towards the next-hop address. The
//! visited set is therefore keyed by `(device, vlan context, next-hop address)`, which allows a
//! switch to be crossed once per leg in the same VLAN.
//!
//! A layer-3 switch receiving an ARP request for an address outside the subnet of the receiving
//! interface answers on behalf of that address if it has a route towards it (proxy ARP). Hosts
//! with a mask wider than their actual network can thereby still reach other networks.
//!
//! Nothing in this module modifies the network. Learned MAC and ARP entries are reported as side
//! effects in [`ConnectivityResult`], and applied by [`Network::ping`].

use std::{
    collections::{HashSet, VecDeque},
    net::Ipv4Addr,
};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    acl::Packet,
    device::{Device, MacEntry},
    hsrp::HsrpRole,
    l2::{acl_permits, traverse, Gates, Pruned},
    network::Network,
    router::{resolve, ArpEntry},
    types::{DeviceId, InterfaceId, MacAddr, NetworkError, PortId, PortRef, SimError, VlanId},
};

/// Number of echo requests sent by a ping.
pub const PING_COUNT: usize = 5;

/// Outcome of a connectivity query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityResult {
    /// The destination was reached.
    pub reachable: bool,
    /// Devices traversed, starting with the source and ending with the destination.
    pub hops: Vec<DeviceId>,
    /// Round-trip time in milliseconds of each echo request. `None` is a timeout.
    pub rtt_samples: Vec<Option<u32>>,
    /// Reported failures. Empty if the destination was reached.
    pub errors: Vec<SimError>,
    /// ARP entries learned by the source router.
    pub arp_side_effects: Vec<(DeviceId, ArpEntry)>,
    /// MAC addresses learned by switches along the path.
    pub mac_side_effects: Vec<(DeviceId, MacEntry)>,
}

impl ConnectivityResult {
    fn failed(errors: Vec<SimError>) -> Self {
        Self {
            reachable: false,
            rtt_samples: vec![None; PING_COUNT],
            errors,
            ..Default::default()
        }
    }

    fn reached(hops: Vec<DeviceId>) -> Self {
        let rtt = (hops.len() as u32).max(1);
        Self {
            reachable: true,
            hops,
            rtt_samples: vec![Some(rtt); PING_COUNT],
            ..Default::default()
        }
    }

    /// Number of echo requests that were answered.
    pub fn successes(&self) -> usize {
        self.rtt_samples.iter().filter(|s| s.is_some()).count()
    }

    /// Success rate in percent.
    pub fn success_rate(&self) -> usize {
        if self.rtt_samples.is_empty() {
            0
        } else {
            self.successes() * 100 / self.rtt_samples.len()
        }
    }
}

/// Resolve the connectivity from `source` towards `dst`.
pub fn resolve_connectivity(
    net: &Network,
    source: DeviceId,
    dst: Ipv4Addr,
) -> Result<ConnectivityResult, NetworkError> {
    let device = net.get_device(source)?;
    let result = if device.is_pc() {
        from_host(net, device, dst)
    } else if device.is_router() {
        from_router(net, device, dst)
    } else {
        // layer-2 switches have no address to send from
        ConnectivityResult::failed(vec![SimError::NoIpAddress])
    };
    debug!(
        "Connectivity {} -> {dst}: reachable = {}, errors = {:?}",
        device.name, result.reachable, result.errors
    );
    Ok(result)
}

/// Find the device that answers for an IP address. PCs are matched first, then active HSRP
/// virtual addresses, and finally the interface addresses of layer-3 switches.
pub fn locate(net: &Network, ip: Ipv4Addr) -> Option<DeviceId> {
    net.devices()
        .find(|d| d.host().and_then(|h| h.address).map(|a| a.addr()) == Some(ip))
        .or_else(|| net.devices().find(|d| active_vip(d, ip)))
        .or_else(|| net.devices().find(|d| d.is_router() && d.owns_address(ip)))
        .map(|d| d.id)
}

/// Returns `true` if the device is the active router of an HSRP group with that virtual address.
fn active_vip(device: &Device, ip: Ipv4Addr) -> bool {
    device
        .router()
        .map(|r| {
            r.hsrp
                .values()
                .any(|g| g.virtual_ip == Some(ip) && g.role == HsrpRole::Active)
        })
        .unwrap_or(false)
}

/// Returns `true` if the device processes packets sent to that address at layer 3.
fn accepts(device: &Device, ip: Ipv4Addr) -> bool {
    device.owns_address(ip) || active_vip(device, ip)
}

/// Returns `true` if a layer-3 switch answers ARP requests for `ip` received on `iface` on behalf
/// of another network (proxy ARP). The address must be outside the subnet of the interface, and
/// routed out of another interface.
fn proxies(device: &Device, iface: InterfaceId, ip: Ipv4Addr) -> bool {
    let router = match device.router() {
        Some(r) => r,
        None => return false,
    };
    match device.interface_address(iface) {
        Some(addr) if !addr.contains(&ip) => resolve(&router.routing_table, ip)
            .map(|nh| nh.interface != iface)
            .unwrap_or(false),
        _ => false,
    }
}

/// MAC address under which `device` answers ARP requests for `ip`.
fn answering_mac(device: &Device, ip: Ipv4Addr) -> MacAddr {
    if let Some(group) = device.router().and_then(|r| {
        r.hsrp
            .values()
            .find(|g| g.virtual_ip == Some(ip) && g.role == HsrpRole::Active)
    }) {
        return MacAddr::hsrp(group.group);
    }
    device
        .addressed_interfaces()
        .into_iter()
        .find(|(_, a)| a.addr() == ip)
        .map(|(iface, _)| device.mac(iface))
        .unwrap_or_else(|| MacAddr::of_device(device.id))
}

fn from_host(net: &Network, pc: &Device, dst: Ipv4Addr) -> ConnectivityResult {
    let host = match pc.host() {
        Some(h) => h,
        None => return ConnectivityResult::failed(vec![SimError::NoIpAddress]),
    };
    let address = match host.address {
        Some(a) => a,
        None => return ConnectivityResult::failed(vec![SimError::NoIpAddress]),
    };
    if address.addr() == dst {
        return ConnectivityResult::reached(vec![pc.id]);
    }
    let packet = Packet::icmp(address.addr(), dst);
    let start = Node::start(pc.id, None, dst, pc.mac(InterfaceId::Port(PortId::new(0))));

    if address.contains(&dst) {
        let target = match locate(net, dst) {
            Some(t) => t,
            None => return ConnectivityResult::failed(vec![SimError::DestinationUnreachable]),
        };
        let leg = Search::new(net, &packet, dst, target).run(start);
        return match leg.path {
            Some(path) => finish(net, vec![path]),
            None => ConnectivityResult::failed(failure(SimError::DestinationUnreachable, leg)),
        };
    }

    let gateway = match host.gateway {
        Some(gw) => gw,
        None => return ConnectivityResult::failed(vec![SimError::NoGateway]),
    };
    let gw_device = match locate(net, gateway) {
        Some(d) if address.contains(&gateway) => d,
        _ => return ConnectivityResult::failed(vec![SimError::GatewayUnreachable]),
    };
    let first = Search::new(net, &packet, gateway, gw_device).run(Node { target: gateway, ..start });
    let first = match first.path {
        Some(path) => path,
        None => return ConnectivityResult::failed(failure(SimError::GatewayUnreachable, first)),
    };

    let target = match locate(net, dst) {
        Some(t) => t,
        None => return ConnectivityResult::failed(vec![SimError::DestinationUnreachable]),
    };
    let gw_mac = net
        .get_device(gw_device)
        .map(|d| answering_mac(d, gateway))
        .unwrap_or_else(|_| MacAddr::of_device(gw_device));
    let second = Search::new(net, &packet, dst, target).run(Node::start(gw_device, None, dst, gw_mac));
    match second.path {
        Some(path) => finish(net, vec![first, path]),
        None => ConnectivityResult::failed(failure(SimError::DestinationUnreachable, second)),
    }
}

fn from_router(net: &Network, device: &Device, dst: Ipv4Addr) -> ConnectivityResult {
    let router = match device.router() {
        Some(r) => r,
        None => return ConnectivityResult::failed(vec![SimError::NoIpAddress]),
    };
    let addresses = device.addressed_interfaces();
    if addresses.is_empty() {
        return ConnectivityResult::failed(vec![SimError::NoIpAddress]);
    }
    if accepts(device, dst) {
        return ConnectivityResult::reached(vec![device.id]);
    }
    let next_hop = match resolve(&router.routing_table, dst) {
        Some(nh) => nh,
        None => return ConnectivityResult::failed(vec![SimError::DestinationUnreachable]),
    };
    let src = device
        .interface_address(next_hop.interface)
        .or_else(|| addresses.first().map(|(_, a)| *a))
        .map(|a| a.addr());
    let src = match src {
        Some(src) => src,
        None => return ConnectivityResult::failed(vec![SimError::NoIpAddress]),
    };
    let target = match locate(net, dst) {
        Some(t) => t,
        None => return ConnectivityResult::failed(vec![SimError::DestinationUnreachable]),
    };

    let packet = Packet::icmp(src, dst);
    let start = Node::start(device.id, None, dst, device.mac(next_hop.interface));
    let leg = Search::new(net, &packet, dst, target).run(start);
    let path = match leg.path {
        Some(path) => path,
        None => return ConnectivityResult::failed(failure(SimError::DestinationUnreachable, leg)),
    };
    let mut result = finish(net, vec![path]);

    if next_hop.connected && !router.arp_cache.contains_key(&dst) {
        // the first echo request times out while the address is resolved
        if let Some(first) = result.rtt_samples.first_mut() {
            *first = None;
        }
        let mac = net
            .get_device(target)
            .map(|t| answering_mac(t, dst))
            .unwrap_or_else(|_| MacAddr::of_device(target));
        result.arp_side_effects.push((
            device.id,
            ArpEntry {
                ip: dst,
                mac,
                interface: next_hop.interface,
                age: 0,
            },
        ));
    }
    result
}

fn failure(error: SimError, leg: Leg) -> Vec<SimError> {
    if leg.acl_denied {
        vec![error, SimError::AclDenied]
    } else {
        vec![error]
    }
}

/// Build the result of a successful query from the legs of the path.
fn finish(net: &Network, legs: Vec<Vec<Node>>) -> ConnectivityResult {
    let mut hops: Vec<DeviceId> = Vec::new();
    let mut learned: Vec<(DeviceId, MacEntry)> = Vec::new();
    for node in legs.iter().flatten() {
        if hops.last() != Some(&node.device) {
            hops.push(node.device);
        }
        if let (Some(vlan), Some(ingress)) = (node.ctx, node.ingress) {
            let is_bridge = net
                .get_device(node.device)
                .map(|d| d.bridge().is_some())
                .unwrap_or(false);
            let entry = (
                node.device,
                MacEntry {
                    vlan,
                    mac: node.src_mac,
                    port: ingress.port,
                },
            );
            if is_bridge && !learned.contains(&entry) {
                learned.push(entry);
            }
        }
    }
    let mut result = ConnectivityResult::reached(hops);
    result.mac_side_effects = learned;
    result
}

/// A frontier state of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
    device: DeviceId,
    ctx: Option<VlanId>,
    /// IP address the frame is currently sent to (the next hop)
    target: Ipv4Addr,
    /// Source MAC address of the frame on the current leg
    src_mac: MacAddr,
    ingress: Option<PortRef>,
    parent: Option<usize>,
}

impl Node {
    fn start(device: DeviceId, ctx: Option<VlanId>, target: Ipv4Addr, src_mac: MacAddr) -> Self {
        Self {
            device,
            ctx,
            target,
            src_mac,
            ingress: None,
            parent: None,
        }
    }
}

/// Result of a single search.
#[derive(Debug)]
struct Leg {
    path: Option<Vec<Node>>,
    acl_denied: bool,
}

/// Breadth-first search state.
struct Search<'n, 'p> {
    net: &'n Network,
    packet: &'p Packet,
    dst: Ipv4Addr,
    goal: DeviceId,
    arena: Vec<Node>,
    queue: VecDeque<usize>,
    visited: HashSet<(DeviceId, Option<VlanId>, Ipv4Addr)>,
    acl_denied: bool,
}

impl<'n, 'p> Search<'n, 'p> {
    fn new(net: &'n Network, packet: &'p Packet, dst: Ipv4Addr, goal: DeviceId) -> Self {
        Self {
            net,
            packet,
            dst,
            goal,
            arena: Vec::new(),
            queue: VecDeque::new(),
            visited: HashSet::new(),
            acl_denied: false,
        }
    }

    fn run(mut self, start: Node) -> Leg {
        self.push(start);
        while let Some(idx) = self.queue.pop_front() {
            let node = self.arena[idx];
            let device = match self.net.get_device(node.device) {
                Ok(d) => d,
                Err(_) => continue,
            };
            match node.ctx {
                None => {
                    if device.id == self.goal && accepts(device, self.dst) {
                        return Leg {
                            path: Some(self.path(idx)),
                            acl_denied: self.acl_denied,
                        };
                    }
                    if device.is_pc() {
                        // hosts only send, they never forward
                        if node.parent.is_none() {
                            for p in device.port_ids() {
                                self.send(idx, device, p, None, node.target, node.src_mac);
                            }
                        }
                    } else if device.is_router() {
                        self.route(idx, device);
                    }
                }
                Some(vlan) => self.switch(idx, device, vlan),
            }
        }
        trace!("No path towards {} found", self.dst);
        Leg {
            path: None,
            acl_denied: self.acl_denied,
        }
    }

    /// Flood a frame in a VLAN, and hand it to the SVI if the device is its recipient.
    fn switch(&mut self, idx: usize, device: &Device, vlan: VlanId) {
        let node = self.arena[idx];
        let recipient = accepts(device, node.target)
            || proxies(device, InterfaceId::Svi(vlan), node.target);
        if device.is_router() && device.svi_up(vlan) && recipient {
            let acl = device
                .router()
                .and_then(|r| r.svis.get(&vlan))
                .and_then(|s| s.acl_in.as_deref());
            if acl_permits(device, acl, self.packet) {
                self.push(Node {
                    ctx: None,
                    parent: Some(idx),
                    ..node
                });
            } else {
                trace!("{}: Vlan{vlan} denies {:?} inbound", device.name, self.packet);
                self.acl_denied = true;
            }
        }
        let ingress = node.ingress.filter(|i| i.device == device.id).map(|i| i.port);
        for p in device.port_ids() {
            if Some(p) == ingress {
                continue;
            }
            self.send(idx, device, p, Some(vlan), node.target, node.src_mac);
        }
    }

    /// Forward a packet at layer 3 towards the final destination.
    fn route(&mut self, idx: usize, device: &Device) {
        let router = match device.router() {
            Some(r) => r,
            None => return,
        };
        let next_hop = match resolve(&router.routing_table, self.dst) {
            Some(nh) => nh,
            None => {
                trace!("{}: no route towards {}", device.name, self.dst);
                return;
            }
        };
        let src_mac = device.mac(next_hop.interface);
        match next_hop.interface {
            InterfaceId::Svi(vlan) => {
                if !device.svi_up(vlan) {
                    return;
                }
                let acl = router.svis.get(&vlan).and_then(|s| s.acl_out.as_deref());
                if !acl_permits(device, acl, self.packet) {
                    trace!("{}: Vlan{vlan} denies {:?} outbound", device.name, self.packet);
                    self.acl_denied = true;
                    return;
                }
                self.push(Node {
                    device: device.id,
                    ctx: Some(vlan),
                    target: next_hop.address,
                    src_mac,
                    ingress: None,
                    parent: Some(idx),
                });
            }
            iface => {
                for p in device.member_ports(iface) {
                    self.send(idx, device, p, None, next_hop.address, src_mac);
                }
            }
        }
    }

    /// Send a frame out of a port, and enqueue the state on the receiving device.
    fn send(
        &mut self,
        idx: usize,
        device: &Device,
        port: PortId,
        ctx: Option<VlanId>,
        target: Ipv4Addr,
        src_mac: MacAddr,
    ) {
        match traverse(self.net, device, port, ctx, Gates::all(self.packet)) {
            Ok(hop) => {
                if hop.ctx.is_none() {
                    let accepted = self
                        .net
                        .get_device(hop.ingress.device)
                        .map(|d| {
                            accepts(d, target)
                                || proxies(d, d.l3_interface(hop.ingress.port), target)
                        })
                        .unwrap_or(false);
                    if !accepted {
                        return;
                    }
                }
                self.push(Node {
                    device: hop.ingress.device,
                    ctx: hop.ctx,
                    target,
                    src_mac,
                    ingress: Some(hop.ingress),
                    parent: Some(idx),
                });
            }
            Err(Pruned::Acl) => {
                trace!("{}: {:?} denied by an access list", device.name, port);
                self.acl_denied = true;
            }
            Err(reason) => trace!("{}: {:?} pruned ({reason:?})", device.name, port),
        }
    }

    fn push(&mut self, node: Node) {
        if self.visited.insert((node.device, node.ctx, node.target)) {
            self.arena.push(node);
            self.queue.push_back(self.arena.len() - 1);
        }
    }

    fn path(&self, mut idx: usize) -> Vec<Node> {
        let mut path = vec![self.arena[idx]];
        while let Some(parent) = self.arena[idx].parent {
            path.push(self.arena[parent]);
            idx = parent;
        }
        path.reverse();
        path
    }
}
