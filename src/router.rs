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

//! Module defining the routing state of a layer-3 switch.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Same};

use crate::{
    hsrp::HsrpGroup,
    types::{wildcard_match, HsrpGroupId, InterfaceId, MacAddr, VlanId},
};

/// Maximum depth of recursive next-hop resolution.
const MAX_RECURSION: usize = 8;

/// Routing state of a layer-3 switch
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    /// Switch virtual interfaces
    pub svis: BTreeMap<VlanId, Svi>,
    /// Routing table, sorted by destination network. This is derived state and is replaced as a
    /// whole on every recomputation.
    pub routing_table: Vec<RouteEntry>,
    /// Configured static routes
    pub static_routes: Vec<StaticRoute>,
    /// ARP cache
    #[serde_as(as = "Vec<(Same, Same)>")]
    pub arp_cache: BTreeMap<Ipv4Addr, ArpEntry>,
    /// HSRP groups, by interface and group number
    #[serde_as(as = "Vec<(Same, Same)>")]
    pub hsrp: BTreeMap<(InterfaceId, HsrpGroupId), HsrpGroup>,
    /// OSPF process
    pub ospf: Option<OspfConfig>,
    /// BGP process
    pub bgp: Option<BgpConfig>,
}

impl Router {
    /// Longest-prefix match in the routing table. Among entries for the same network, the one with
    /// the lowest administrative distance and metric is chosen.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&RouteEntry> {
        lookup(&self.routing_table, dst)
    }

    /// Resolve the interface and the layer-2 next hop towards `dst`. Next hops of routes without
    /// an egress interface are resolved recursively.
    pub fn resolve(&self, dst: Ipv4Addr) -> Option<NextHop> {
        resolve(&self.routing_table, dst)
    }

    /// Get the static route for a network
    pub fn get_static_route(&self, network: Ipv4Net) -> Option<&StaticRoute> {
        self.static_routes.iter().find(|r| r.network == network)
    }

    /// Set or replace a static route. Returns the old route for the same network.
    pub fn set_static_route(&mut self, route: StaticRoute) -> Option<StaticRoute> {
        let old = self.remove_static_route(route.network);
        self.static_routes.push(route);
        self.static_routes.sort_by_key(|r| r.network);
        old
    }

    /// Remove the static route for a network.
    pub fn remove_static_route(&mut self, network: Ipv4Net) -> Option<StaticRoute> {
        let pos = self.static_routes.iter().position(|r| r.network == network)?;
        Some(self.static_routes.remove(pos))
    }

    /// HSRP group configured on an interface.
    pub fn hsrp_group(&self, iface: InterfaceId, group: HsrpGroupId) -> Option<&HsrpGroup> {
        self.hsrp.get(&(iface, group))
    }

    /// Routing table entries learned from a specific origin.
    pub fn routes_from(&self, origin: RouteOrigin) -> impl Iterator<Item = &RouteEntry> {
        self.routing_table.iter().filter(move |e| e.origin == origin)
    }
}

/// Longest-prefix match in a routing table.
pub fn lookup(table: &[RouteEntry], dst: Ipv4Addr) -> Option<&RouteEntry> {
    table
        .iter()
        .filter(|e| e.network.contains(&dst))
        .min_by_key(|e| {
            (
                u8::MAX - e.network.prefix_len(),
                e.origin.admin_distance(),
                e.metric,
            )
        })
}

/// Recursive next-hop resolution in a routing table.
pub fn resolve(table: &[RouteEntry], dst: Ipv4Addr) -> Option<NextHop> {
    let mut target = dst;
    for _ in 0..MAX_RECURSION {
        let entry = lookup(table, target)?;
        match (entry.next_hop, entry.interface) {
            (None, Some(interface)) => {
                return Some(NextHop {
                    address: target,
                    interface,
                    connected: target == dst,
                })
            }
            (Some(nh), Some(interface)) => {
                return Some(NextHop {
                    address: nh,
                    interface,
                    connected: false,
                })
            }
            (Some(nh), None) => target = nh,
            (None, None) => return None,
        }
    }
    None
}

/// Result of a route lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NextHop {
    /// Address to which the frame is sent at layer 2. This is the destination itself if it is
    /// directly connected.
    pub address: Ipv4Addr,
    /// Egress interface
    pub interface: InterfaceId,
    /// The destination is in a directly connected network.
    pub connected: bool,
}

/// Switch virtual interface (`interface Vlan<n>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Svi {
    /// VLAN of the interface
    pub vlan: VlanId,
    /// IP address
    pub address: Option<Ipv4Net>,
    /// Administratively shut down
    pub shutdown: bool,
    /// Inbound access list
    pub acl_in: Option<String>,
    /// Outbound access list
    pub acl_out: Option<String>,
}

impl Svi {
    /// Create an SVI that is not shut down.
    pub fn new(vlan: VlanId, address: Option<Ipv4Net>) -> Self {
        Self {
            vlan,
            address,
            shutdown: false,
            acl_in: None,
            acl_out: None,
        }
    }
}

/// Origin of a routing table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RouteOrigin {
    /// Directly connected network
    Connected,
    /// Static route
    Static,
    /// Learned via OSPF
    Ospf,
    /// Learned via BGP
    Bgp,
}

impl RouteOrigin {
    /// Administrative distance
    pub fn admin_distance(&self) -> u8 {
        match self {
            Self::Connected => 0,
            Self::Static => 1,
            Self::Bgp => 20,
            Self::Ospf => 110,
        }
    }

    /// Code used in `show ip route`
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connected => "C",
            Self::Static => "S",
            Self::Ospf => "O",
            Self::Bgp => "B",
        }
    }
}

impl fmt::Display for RouteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Static => write!(f, "static"),
            Self::Ospf => write!(f, "ospf"),
            Self::Bgp => write!(f, "bgp"),
        }
    }
}

/// Entry of the routing table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Destination network
    pub network: Ipv4Net,
    /// Next hop, `None` for connected networks
    pub next_hop: Option<Ipv4Addr>,
    /// Egress interface. Static routes given only by their next hop have no interface, and are
    /// resolved recursively.
    pub interface: Option<InterfaceId>,
    /// Metric (hop count for learned routes)
    pub metric: u32,
    /// Origin of the route
    pub origin: RouteOrigin,
}

impl RouteEntry {
    /// Create a connected route for an interface address.
    pub fn connected(address: Ipv4Net, interface: InterfaceId) -> Self {
        Self {
            network: address.trunc(),
            next_hop: None,
            interface: Some(interface),
            metric: 0,
            origin: RouteOrigin::Connected,
        }
    }
}

/// Static route (`ip route <network> <mask> {<next-hop> | <interface>}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Destination network
    pub network: Ipv4Net,
    /// Next hop address
    pub next_hop: Option<Ipv4Addr>,
    /// Egress interface
    pub interface: Option<InterfaceId>,
}

impl StaticRoute {
    /// Static route towards a next hop.
    pub fn via(network: Ipv4Net, next_hop: Ipv4Addr) -> Self {
        Self {
            network: network.trunc(),
            next_hop: Some(next_hop),
            interface: None,
        }
    }

    /// Static route out of an interface.
    pub fn out(network: Ipv4Net, interface: InterfaceId) -> Self {
        Self {
            network: network.trunc(),
            next_hop: None,
            interface: Some(interface),
        }
    }

    /// Routing table entry of the static route.
    pub fn entry(&self) -> RouteEntry {
        RouteEntry {
            network: self.network,
            next_hop: self.next_hop,
            interface: self.interface,
            metric: 0,
            origin: RouteOrigin::Static,
        }
    }
}

/// Entry of the ARP cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArpEntry {
    /// Resolved address
    pub ip: Ipv4Addr,
    /// Hardware address
    pub mac: MacAddr,
    /// Interface on which the address was resolved
    pub interface: InterfaceId,
    /// Age in minutes
    pub age: u32,
}

/// `network <address> <wildcard> area <area>` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OspfNetwork {
    /// Address
    pub address: Ipv4Addr,
    /// Wildcard mask
    pub wildcard: Ipv4Addr,
    /// Area
    pub area: u32,
}

impl OspfNetwork {
    /// Statement covering a whole network in an area.
    pub fn new(network: Ipv4Net, area: u32) -> Self {
        Self {
            address: network.network(),
            wildcard: network.hostmask(),
            area,
        }
    }
}

/// OSPF process (`router ospf <id>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfConfig {
    /// Process id
    pub process_id: u16,
    /// Router id
    pub router_id: Option<Ipv4Addr>,
    /// Network statements
    pub networks: Vec<OspfNetwork>,
    /// Redistributed origins
    pub redistribute: BTreeSet<RouteOrigin>,
}

impl OspfConfig {
    /// New OSPF process without network statements.
    pub fn new(process_id: u16) -> Self {
        Self {
            process_id,
            router_id: None,
            networks: Vec::new(),
            redistribute: BTreeSet::new(),
        }
    }

    /// Returns `true` if OSPF runs on an interface with that address.
    pub fn enabled_on(&self, address: Ipv4Addr) -> bool {
        self.networks
            .iter()
            .any(|n| wildcard_match(address, n.address, n.wildcard))
    }
}

/// BGP neighbor statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BgpNeighbor {
    /// Address of the peer
    pub address: Ipv4Addr,
    /// AS number of the peer
    pub remote_as: u32,
}

/// BGP process (`router bgp <asn>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpConfig {
    /// Local AS number
    pub asn: u32,
    /// Router id
    pub router_id: Option<Ipv4Addr>,
    /// Neighbors
    pub neighbors: Vec<BgpNeighbor>,
    /// Advertised networks
    pub networks: Vec<Ipv4Net>,
    /// Redistributed origins
    pub redistribute: BTreeSet<RouteOrigin>,
}

impl BgpConfig {
    /// New BGP process without neighbors.
    pub fn new(asn: u32) -> Self {
        Self {
            asn,
            router_id: None,
            neighbors: Vec::new(),
            networks: Vec::new(),
            redistribute: BTreeSet::new(),
        }
    }

    /// Returns `true` if a network statement covers `network`.
    pub fn advertises(&self, network: Ipv4Net) -> bool {
        self.networks.iter().any(|n| n.contains(&network))
    }

    /// Neighbor statement for an address
    pub fn neighbor(&self, address: Ipv4Addr) -> Option<&BgpNeighbor> {
        self.neighbors.iter().find(|n| n.address == address)
    }
}
