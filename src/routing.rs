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

//! # Route Propagation
//!
//! This module computes the routing tables of all layer-3 switches. Just like the OSPF module of a
//! full routing simulator, it does not exchange messages. Instead, it iterates to a fixed point:
//!
//! 1. Every table is seeded with the connected networks of all interfaces that are up and carry
//!    an address, and with all configured static routes.
//! 2. In every round, each router imports routes from the tables of its OSPF neighbors and BGP
//!    peers of the previous round. A route is exported by a neighbor if it was learned by the same
//!    protocol, if it is a connected network covered by a network statement, or if its origin is
//!    redistributed into that protocol.
//! 3. The iteration stops once no table changes, or after [`MAX_ROUNDS`] rounds.
//!
//! The round cap is the only protection against redistribution loops (together with split
//! horizon). Hitting it is not an error: the last computed tables are used.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use log::*;

use crate::{
    device::Device,
    l2::attached_interfaces,
    network::Network,
    router::{resolve, RouteEntry, RouteOrigin},
    types::{DeviceId, InterfaceId, SimError},
};

/// Maximum number of propagation rounds.
pub const MAX_ROUNDS: usize = 10;

/// Result of a route propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOutcome {
    /// Routing table of every layer-3 switch
    pub tables: HashMap<DeviceId, Vec<RouteEntry>>,
    /// Number of rounds performed
    pub rounds: usize,
    /// `false` if the round cap was hit before reaching a fixed point
    pub converged: bool,
}

impl RoutingOutcome {
    /// Returns the reported outcome if the round cap was hit.
    pub fn error(&self) -> Option<SimError> {
        (!self.converged).then_some(SimError::RoutingConvergenceLimitReached(self.rounds))
    }
}

/// A neighbor from which routes are imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Adjacency {
    neighbor: DeviceId,
    protocol: RouteOrigin,
    /// Address of the neighbor, used as next hop
    next_hop: Ipv4Addr,
    /// Local interface towards the neighbor. `None` for BGP peers, whose interface is resolved
    /// using the routing table.
    interface: Option<InterfaceId>,
}

/// Compute the routing tables of all layer-3 switches.
pub fn compute(net: &Network) -> RoutingOutcome {
    let routers: Vec<&Device> = net.devices().filter(|d| d.is_router()).collect();

    let seeds: HashMap<DeviceId, Vec<RouteEntry>> =
        routers.iter().map(|d| (d.id, seed(d))).collect();
    let adjacencies: HashMap<DeviceId, Vec<Adjacency>> = routers
        .iter()
        .map(|d| (d.id, adjacencies(net, d)))
        .collect();

    let mut tables = seeds.clone();
    let mut rounds = 0;
    let mut converged = false;
    while rounds < MAX_ROUNDS {
        rounds += 1;
        let next: HashMap<DeviceId, Vec<RouteEntry>> = routers
            .iter()
            .map(|d| (d.id, import(net, d, &seeds[&d.id], &adjacencies[&d.id], &tables)))
            .collect();
        let done = next == tables;
        tables = next;
        if done {
            converged = true;
            break;
        }
    }

    if converged {
        debug!("Routing converged after {rounds} rounds");
    } else {
        warn!("Routing did not converge within {MAX_ROUNDS} rounds. Using the last tables.");
    }

    RoutingOutcome {
        tables,
        rounds,
        converged,
    }
}

/// Connected and static routes of a router.
fn seed(device: &Device) -> Vec<RouteEntry> {
    let mut table: Vec<RouteEntry> = device
        .addressed_interfaces()
        .into_iter()
        .map(|(iface, addr)| RouteEntry::connected(addr, iface))
        .collect();
    if let Some(r) = device.router() {
        table.extend(r.static_routes.iter().map(|s| s.entry()));
    }
    table.sort();
    table.dedup();
    table
}

/// All OSPF neighbors and configured BGP peers of a router.
fn adjacencies(net: &Network, device: &Device) -> Vec<Adjacency> {
    let mut result = Vec::new();
    let router = match device.router() {
        Some(r) => r,
        None => return result,
    };

    if let Some(ospf) = router.ospf.as_ref() {
        for (iface, addr) in device.addressed_interfaces() {
            if !ospf.enabled_on(addr.addr()) {
                continue;
            }
            for (n, n_iface) in attached_interfaces(net, device.id, iface) {
                let neighbor = match net.get_device(n) {
                    Ok(d) if d.id != device.id => d,
                    _ => continue,
                };
                let n_ospf = match neighbor.router().and_then(|r| r.ospf.as_ref()) {
                    Some(o) => o,
                    None => continue,
                };
                let n_addr = match neighbor.interface_address(n_iface) {
                    Some(a) if neighbor.interface_up(n_iface) => a,
                    _ => continue,
                };
                if n_addr.trunc() == addr.trunc() && n_ospf.enabled_on(n_addr.addr()) {
                    result.push(Adjacency {
                        neighbor: n,
                        protocol: RouteOrigin::Ospf,
                        next_hop: n_addr.addr(),
                        interface: Some(iface),
                    });
                }
            }
        }
    }

    if let Some(bgp) = router.bgp.as_ref() {
        let own: HashSet<Ipv4Addr> = device
            .addressed_interfaces()
            .iter()
            .map(|(_, a)| a.addr())
            .collect();
        for stmt in bgp.neighbors.iter() {
            let peer = match net.devices().find(|d| d.is_router() && d.owns_address(stmt.address)) {
                Some(p) if p.id != device.id => p,
                _ => continue,
            };
            let peer_bgp = match peer.router().and_then(|r| r.bgp.as_ref()) {
                Some(b) if b.asn == stmt.remote_as => b,
                _ => continue,
            };
            let mutual = peer_bgp
                .neighbors
                .iter()
                .any(|n| own.contains(&n.address) && n.remote_as == bgp.asn);
            if mutual {
                result.push(Adjacency {
                    neighbor: peer.id,
                    protocol: RouteOrigin::Bgp,
                    next_hop: stmt.address,
                    interface: None,
                });
            }
        }
    }

    result.sort();
    result.dedup();
    result
}

/// Returns `true` if `neighbor` exports `entry` into `protocol`.
fn exports(neighbor: &Device, entry: &RouteEntry, protocol: RouteOrigin) -> bool {
    let router = match neighbor.router() {
        Some(r) => r,
        None => return false,
    };
    let redistribute = match protocol {
        RouteOrigin::Ospf => router.ospf.as_ref().map(|o| &o.redistribute),
        RouteOrigin::Bgp => router.bgp.as_ref().map(|b| &b.redistribute),
        RouteOrigin::Connected | RouteOrigin::Static => None,
    };
    let redistribute = match redistribute {
        Some(r) => r,
        None => return false,
    };

    if entry.origin == protocol {
        return true;
    }
    if entry.origin == RouteOrigin::Connected {
        let covered = match protocol {
            RouteOrigin::Ospf => entry
                .interface
                .and_then(|i| neighbor.interface_address(i))
                .zip(router.ospf.as_ref())
                .map(|(addr, ospf)| ospf.enabled_on(addr.addr()))
                .unwrap_or(false),
            RouteOrigin::Bgp => router
                .bgp
                .as_ref()
                .map(|b| b.advertises(entry.network))
                .unwrap_or(false),
            RouteOrigin::Connected | RouteOrigin::Static => false,
        };
        if covered {
            return true;
        }
    }
    redistribute.contains(&entry.origin)
}

/// One propagation round for a single router.
fn import(
    net: &Network,
    device: &Device,
    seed: &[RouteEntry],
    adjacencies: &[Adjacency],
    previous: &HashMap<DeviceId, Vec<RouteEntry>>,
) -> Vec<RouteEntry> {
    let own: HashSet<Ipv4Addr> = device
        .addressed_interfaces()
        .iter()
        .map(|(_, a)| a.addr())
        .collect();
    let present: HashSet<Ipv4Net> = seed.iter().map(|e| e.network).collect();
    let own_table = previous.get(&device.id).map(|t| t.as_slice()).unwrap_or(seed);

    let mut candidates: BTreeMap<Ipv4Net, RouteEntry> = BTreeMap::new();
    for adj in adjacencies {
        let interface = match adj.interface {
            Some(i) => i,
            None => match resolve(own_table, adj.next_hop) {
                Some(nh) => nh.interface,
                None => {
                    trace!("BGP peer {} is not reachable", adj.next_hop);
                    continue;
                }
            },
        };
        let neighbor = match net.get_device(adj.neighbor) {
            Ok(n) => n,
            Err(_) => continue,
        };
        let table = match previous.get(&adj.neighbor) {
            Some(t) => t,
            None => continue,
        };
        for entry in table {
            if present.contains(&entry.network) {
                continue;
            }
            // split horizon
            if entry.next_hop.map(|nh| own.contains(&nh)).unwrap_or(false) {
                continue;
            }
            if !exports(neighbor, entry, adj.protocol) {
                continue;
            }
            let new = RouteEntry {
                network: entry.network,
                next_hop: Some(adj.next_hop),
                interface: Some(interface),
                metric: entry.metric.saturating_add(1),
                origin: adj.protocol,
            };
            let better = match candidates.get(&entry.network) {
                Some(old) => rank(&new) < rank(old),
                None => true,
            };
            if better {
                candidates.insert(entry.network, new);
            }
        }
    }

    let mut table = seed.to_vec();
    table.extend(candidates.into_values());
    table.sort();
    table
}

fn rank(e: &RouteEntry) -> (u32, u8, Option<Ipv4Addr>) {
    (e.metric, e.origin.admin_distance(), e.next_hop)
}
