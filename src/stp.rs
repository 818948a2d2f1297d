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

//! # Spanning Tree
//!
//! This module computes the converged per-VLAN spanning tree (PVST) of the network. Just like
//! OSPF in this simulator, the protocol is not simulated with BPDUs. Instead, the final state is
//! computed directly from the topology: every connected set of bridges elects the bridge with the
//! lowest bridge id as root, every other bridge picks the port with the lowest cost towards the
//! root, and every segment has exactly one designated port. All other ports are blocking.
//!
//! The members of an EtherChannel form a single logical port and share their state. A bundle whose
//! members are not bundled the same way on the other side is err-disabled, and all its members are
//! reported as disabled.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::*;
use petgraph::{algo::dijkstra, graph::DiGraph, prelude::NodeIndex};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Same};

use crate::{
    l2::{traverse, Gates},
    network::Network,
    types::{DeviceId, InterfaceId, MacAddr, PortId, SimError, VlanId},
};

/// Default bridge priority
pub const DEFAULT_BRIDGE_PRIORITY: u16 = 32768;

/// Per-VLAN bridge priority override (`spanning-tree vlan <v> {root primary|root secondary|priority <p>}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StpPriority {
    /// `root primary`
    RootPrimary,
    /// `root secondary`
    RootSecondary,
    /// `priority <p>`
    Manual(u16),
}

impl StpPriority {
    /// Configured priority, without the VLAN id.
    pub fn base(&self) -> u16 {
        match self {
            Self::RootPrimary => 24576,
            Self::RootSecondary => 28672,
            Self::Manual(p) => *p,
        }
    }
}

/// Bridge identifier. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BridgeId {
    /// Priority, including the VLAN id (extended system id)
    pub priority: u16,
    /// Bridge address
    pub mac: MacAddr,
}

/// State of a port in spanning tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StpPortState {
    /// Forwarding frames
    Forwarding,
    /// Learning addresses (transient)
    Learning,
    /// Listening for BPDUs (transient)
    Listening,
    /// Discarding frames on a redundant path
    Blocking,
    /// The port is down
    Disabled,
}

/// Role of a port in spanning tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StpPortRole {
    /// Best port towards the root
    Root,
    /// Port forwarding on behalf of the segment
    Designated,
    /// Redundant path towards the root
    Alternate,
    /// Redundant port on a segment where this bridge is already designated
    Backup,
    /// The port is down
    Disabled,
}

/// Spanning-tree state of a single port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StpPort {
    /// Forwarding state
    pub state: StpPortState,
    /// Role
    pub role: StpPortRole,
    /// Path cost of the port
    pub cost: u32,
}

/// Spanning-tree instance of a single VLAN on a bridge
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StpInstance {
    /// VLAN of the instance
    pub vlan: VlanId,
    /// Elected root bridge
    pub root: BridgeId,
    /// Own bridge id
    pub bridge: BridgeId,
    /// Cost towards the root
    pub root_cost: u32,
    /// Root port. `None` on the root bridge.
    pub root_port: Option<PortId>,
    /// State of all ports carrying the VLAN
    #[serde_as(as = "Vec<(Same, Same)>")]
    pub ports: BTreeMap<PortId, StpPort>,
}

impl StpInstance {
    /// Returns `true` if this bridge is the root.
    pub fn is_root(&self) -> bool {
        self.root == self.bridge
    }

    /// Ports that are forwarding
    pub fn forwarding_ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.ports
            .iter()
            .filter(|(_, p)| p.state == StpPortState::Forwarding)
            .map(|(p, _)| *p)
    }
}

/// Spanning-tree state of a bridge. The priorities are configuration, while the instances are
/// derived and replaced as a whole on every recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanningTreeState {
    /// Per-VLAN priority overrides
    pub priorities: BTreeMap<VlanId, StpPriority>,
    /// Per-VLAN instances
    pub instances: BTreeMap<VlanId, StpInstance>,
}

impl SpanningTreeState {
    /// Get the instance of a VLAN.
    pub fn instance(&self, vlan: VlanId) -> Result<&StpInstance, SimError> {
        self.instances
            .get(&vlan)
            .ok_or(SimError::NoSpanningTreeInstance(vlan))
    }

    /// Effective bridge priority in a VLAN (configured priority plus the VLAN id).
    pub fn priority(&self, vlan: VlanId) -> u16 {
        self.priorities
            .get(&vlan)
            .map(|p| p.base())
            .unwrap_or(DEFAULT_BRIDGE_PRIORITY)
            .saturating_add(vlan)
    }

    /// Bridge id of `device` in a VLAN.
    pub fn bridge_id(&self, device: DeviceId, vlan: VlanId) -> BridgeId {
        BridgeId {
            priority: self.priority(vlan),
            mac: MacAddr::of_device(device),
        }
    }
}

/// A logical port: a single port, or all members of an EtherChannel.
#[derive(Debug, Clone)]
struct LogicalPort {
    members: Vec<PortId>,
    cost: u32,
    peer: Option<(DeviceId, InterfaceId)>,
}

impl LogicalPort {
    /// Representative port id, used for tie-breaking and as the root port.
    fn repr(&self) -> PortId {
        self.members.first().copied().unwrap_or_default()
    }
}

type Key = (DeviceId, InterfaceId);

/// Compute the spanning-tree instances of every bridge in the network. Bridges without any
/// up port in a VLAN have no instance for that VLAN.
pub fn compute(net: &Network) -> HashMap<DeviceId, BTreeMap<VlanId, StpInstance>> {
    let mut result: HashMap<DeviceId, BTreeMap<VlanId, StpInstance>> = net
        .device_ids()
        .into_iter()
        .filter(|d| net.get_device(*d).map(|d| d.bridge().is_some()).unwrap_or(false))
        .map(|d| (d, BTreeMap::new()))
        .collect();

    let vlans = net
        .devices()
        .filter_map(|d| d.bridge())
        .flat_map(|b| b.active_vlans())
        .collect::<BTreeSet<_>>();

    for vlan in vlans {
        compute_vlan(net, vlan, &mut result);
    }
    result
}

fn compute_vlan(
    net: &Network,
    vlan: VlanId,
    result: &mut HashMap<DeviceId, BTreeMap<VlanId, StpInstance>>,
) {
    // collect all logical ports carrying the VLAN, and all down ports
    let mut lports: BTreeMap<Key, LogicalPort> = BTreeMap::new();
    let mut disabled: BTreeMap<DeviceId, Vec<(PortId, u32)>> = BTreeMap::new();
    let mut bids: BTreeMap<DeviceId, BridgeId> = BTreeMap::new();

    for device in net.devices() {
        let bridge = match device.bridge() {
            Some(b) if b.vlan_active(vlan) => b,
            _ => continue,
        };
        let mut any_up = false;
        for p in device.port_ids() {
            let eff = match device.effective_port(p) {
                Some(e) if e.mode.is_switched() && e.carries(vlan) => e,
                _ => continue,
            };
            if !eff.up {
                disabled.entry(device.id).or_default().push((p, eff.cost));
                continue;
            }
            any_up = true;
            lports
                .entry((device.id, eff.logical()))
                .or_insert_with(|| LogicalPort {
                    members: Vec::new(),
                    cost: eff.cost,
                    peer: None,
                })
                .members
                .push(p);
        }
        if any_up {
            bids.insert(device.id, bridge.stp.bridge_id(device.id, vlan));
        } else {
            disabled.remove(&device.id);
        }
    }

    // find the logical ports reached by the members of every logical port
    let logical_of = |d: DeviceId, p: PortId| -> Option<Key> {
        let dev = net.get_device(d).ok()?;
        let key = (d, dev.effective_port(p)?.logical());
        lports.contains_key(&key).then_some(key)
    };
    let mut reach: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
    for (key, lp) in lports.iter() {
        let dev = match net.get_device(key.0) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let peers = reach.entry(*key).or_default();
        for m in lp.members.iter() {
            match traverse(net, dev, *m, Some(vlan), Gates::NONE) {
                Ok(hop) if hop.ctx == Some(vlan) => {
                    peers.extend(logical_of(hop.ingress.device, hop.ingress.port));
                }
                _ => {}
            }
        }
    }

    // a link is only formed if both sides agree on it. Members of both sides must reach the same
    // logical port on the other side.
    let agreed = |key: &Key| -> Option<Key> {
        let peers = reach.get(key)?;
        let peer = *peers.iter().next()?;
        let back = reach.get(&peer)?;
        (peers.len() == 1 && back.len() == 1 && back.contains(key)).then_some(peer)
    };

    // a bundle whose members lead to different logical ports is err-disabled
    let err_disabled: Vec<Key> = lports
        .keys()
        .filter(|k| matches!(k.1, InterfaceId::Channel(_)))
        .filter(|k| reach.get(k).map(|r| !r.is_empty()).unwrap_or(false))
        .filter(|k| agreed(k).is_none())
        .copied()
        .collect();
    let peers: BTreeMap<Key, Key> = lports
        .keys()
        .filter_map(|k| agreed(k).map(|peer| (*k, peer)))
        .filter(|(k, peer)| !err_disabled.contains(k) && !err_disabled.contains(peer))
        .collect();
    for key in err_disabled {
        if let Some(lp) = lports.remove(&key) {
            warn!(
                "STP VLAN {vlan}: {:?} {:?} does not match its peers, members are disabled",
                key.0, key.1
            );
            let entry = disabled.entry(key.0).or_default();
            entry.extend(lp.members.iter().map(|m| (*m, lp.cost)));
        }
    }
    for (key, lp) in lports.iter_mut() {
        lp.peer = peers.get(key).copied();
    }

    // build the cost graph: an edge n -> d is weighted with the cost of the port on d.
    let mut graph: DiGraph<DeviceId, u32> = DiGraph::new();
    let nodes: BTreeMap<DeviceId, NodeIndex> =
        bids.keys().map(|d| (*d, graph.add_node(*d))).collect();
    for ((d, _), lp) in lports.iter() {
        if let Some((n, _)) = lp.peer {
            if n != *d {
                graph.add_edge(nodes[&n], nodes[d], lp.cost);
            }
        }
    }

    // elect the root of every connected component, and compute the root path costs.
    let mut root_of: BTreeMap<DeviceId, BridgeId> = BTreeMap::new();
    let mut cost_of: BTreeMap<DeviceId, u32> = BTreeMap::new();
    let mut order: Vec<(BridgeId, DeviceId)> = bids.iter().map(|(d, b)| (*b, *d)).collect();
    order.sort();
    for (bid, d) in order {
        if root_of.contains_key(&d) {
            continue;
        }
        for (node, cost) in dijkstra(&graph, nodes[&d], None, |e| *e.weight()) {
            let x = graph[node];
            root_of.insert(x, bid);
            cost_of.insert(x, cost);
        }
        debug!("STP VLAN {vlan}: root bridge {:?}", d);
    }

    let cost = |d: &DeviceId| cost_of.get(d).copied().unwrap_or(0);
    // priority vector offered by a logical port on its segment
    let vector = |key: &Key| (cost(&key.0), bids[&key.0], lports[key].repr());

    // select the root port of every non-root bridge
    let mut root_ports: BTreeMap<DeviceId, Key> = BTreeMap::new();
    for (key, lp) in lports.iter() {
        match lp.peer {
            Some(peer) if peer.0 != key.0 => {}
            _ => continue,
        }
        if root_of.get(&key.0) == Some(&bids[&key.0]) {
            continue;
        }
        let candidate = |k: &Key| {
            let lp = &lports[k];
            let peer = lp.peer.unwrap_or(*k);
            (
                cost(&peer.0) + lp.cost,
                bids[&peer.0],
                lports[&peer].repr(),
                lp.repr(),
            )
        };
        match root_ports.get(&key.0) {
            Some(best) if candidate(best) <= candidate(key) => {}
            _ => {
                root_ports.insert(key.0, *key);
            }
        }
    }

    // assign roles
    let mut instances: BTreeMap<DeviceId, StpInstance> = BTreeMap::new();
    for (d, bid) in bids.iter() {
        let root = root_of.get(d).copied().unwrap_or(*bid);
        let mut ports = BTreeMap::new();
        for (p, c) in disabled.get(d).into_iter().flatten() {
            ports.insert(
                *p,
                StpPort {
                    state: StpPortState::Disabled,
                    role: StpPortRole::Disabled,
                    cost: *c,
                },
            );
        }
        instances.insert(
            *d,
            StpInstance {
                vlan,
                root,
                bridge: *bid,
                root_cost: cost(d),
                root_port: root_ports.get(d).map(|k| lports[k].repr()),
                ports,
            },
        );
    }

    for (key, lp) in lports.iter() {
        let role = match lp.peer {
            None => StpPortRole::Designated,
            Some(_) if root_ports.get(&key.0) == Some(key) => StpPortRole::Root,
            Some(peer) if vector(key) < vector(&peer) => StpPortRole::Designated,
            Some(peer) if peer.0 == key.0 => StpPortRole::Backup,
            Some(_) => StpPortRole::Alternate,
        };
        let state = match role {
            StpPortRole::Root | StpPortRole::Designated => StpPortState::Forwarding,
            StpPortRole::Disabled => StpPortState::Disabled,
            StpPortRole::Alternate | StpPortRole::Backup => StpPortState::Blocking,
        };
        if let Some(instance) = instances.get_mut(&key.0) {
            for m in lp.members.iter() {
                instance.ports.insert(
                    *m,
                    StpPort {
                        state,
                        role,
                        cost: lp.cost,
                    },
                );
            }
        }
    }

    for (d, instance) in instances {
        trace!(
            "STP VLAN {vlan} on {:?}: root cost {}, root port {:?}",
            d,
            instance.root_cost,
            instance.root_port
        );
        if let Some(map) = result.get_mut(&d) {
            map.insert(vlan, instance);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn effective_priority() {
        let mut s = SpanningTreeState::default();
        assert_eq!(s.priority(10), 32778);
        s.priorities.insert(10, StpPriority::RootPrimary);
        assert_eq!(s.priority(10), 24586);
        assert_eq!(s.priority(1), 32769);
        s.priorities.insert(20, StpPriority::Manual(4096));
        assert_eq!(s.priority(20), 4116);
    }

    #[test]
    fn bridge_id_ordering() {
        let s = SpanningTreeState::default();
        let a = s.bridge_id(0.into(), 1);
        let b = s.bridge_id(1.into(), 1);
        assert!(a < b);
        let mut low = SpanningTreeState::default();
        low.priorities.insert(1, StpPriority::RootSecondary);
        assert!(low.bridge_id(5.into(), 1) < a);
    }

    #[test]
    fn missing_instance() {
        let s = SpanningTreeState::default();
        assert_eq!(s.instance(7), Err(SimError::NoSpanningTreeInstance(7)));
    }
}
