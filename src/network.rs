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

//! # Top-level Network module
//!
//! This module owns the physical topology and all devices, offers the editor operations that
//! create and wire devices, applies configuration changes, and keeps the derived state (link
//! status, negotiated port modes, spanning tree, routing tables, HSRP roles) consistent with the
//! configuration.
//!
//! Derived state is never updated incrementally. After every change, the affected engines are
//! evaluated on the whole network, and their output replaces the previous state as a whole.

use std::{
    collections::{BTreeSet, HashMap},
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use log::*;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Same};

use crate::{
    acl::AccessList,
    device::{Device, Vlan},
    dtp,
    forwarding::{self, ConnectivityResult},
    hsrp::{self, HsrpGroup, HsrpMember, HsrpRole},
    port::{static_mode, AclDirection, DtpMode, EtherChannel, Port, PortMode},
    router::{BgpConfig, OspfConfig, RouteEntry, StaticRoute, Svi},
    routing,
    stp::{self, StpInstance, StpPriority},
    types::{
        Connection, ConnectionId, DeviceId, HsrpGroupId, InterfaceId, LinkStatus, NetworkError,
        PortId, PortRef, SimError, Topology, VlanId, MAX_PORTS, MAX_VLAN, NATIVE_VLAN,
    },
};

/// # Network struct
/// The struct contains the physical topology (devices and the cables between their ports) and
/// all devices with their configuration and derived state.
///
/// ```rust
/// use labsim::prelude::*;
///
/// fn main() -> Result<(), NetworkError> {
///     let mut net = Network::default();
///
///     // two PCs in the same subnet, connected to a switch
///     let pc1 = net.add_pc("PC1");
///     let pc2 = net.add_pc("PC2");
///     let sw = net.add_l2_switch("S1");
///     net.connect(PortRef::new(pc1, 0), PortRef::new(sw, 0))?;
///     net.connect(PortRef::new(pc2, 0), PortRef::new(sw, 1))?;
///     net.set_host_address(pc1, Some("192.168.1.1/24".parse().unwrap()))?;
///     net.set_host_address(pc2, Some("192.168.1.2/24".parse().unwrap()))?;
///
///     let result = net.ping(pc1, "192.168.1.2".parse().unwrap())?;
///     assert!(result.reachable);
///     assert_eq!(result.hops, vec![pc1, sw, pc2]);
///     Ok(())
/// }
/// ```
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub(crate) topology: Topology,
    #[serde_as(as = "Vec<(Same, Same)>")]
    pub(crate) devices: HashMap<DeviceId, Device>,
}

impl PartialEq for Network {
    /// Two networks are equal if they contain the same devices, and the same cables.
    fn eq(&self, other: &Self) -> bool {
        let mut a: Vec<(ConnectionId, Connection)> = self.connections().map(|(i, c)| (i, *c)).collect();
        let mut b: Vec<(ConnectionId, Connection)> =
            other.connections().map(|(i, c)| (i, *c)).collect();
        a.sort_by_key(|(i, _)| *i);
        b.sort_by_key(|(i, _)| *i);
        self.devices == other.devices && a == b
    }
}

impl Network {
    // ********************
    // * Editor functions *
    // ********************

    fn add_device(&mut self, build: impl FnOnce(DeviceId) -> Device) -> DeviceId {
        let id = self.topology.add_node(());
        let device = build(id);
        debug!("Add {:?} {} as {:?}", device.kind(), device.name, id);
        self.devices.insert(id, device);
        id
    }

    /// Add a new PC with a single port `FastEthernet0`.
    pub fn add_pc(&mut self, name: impl Into<String>) -> DeviceId {
        let name = name.into();
        self.add_device(|id| Device::new_pc(id, name))
    }

    /// Add a new layer-2 switch with 24 FastEthernet and 2 GigabitEthernet ports.
    pub fn add_l2_switch(&mut self, name: impl Into<String>) -> DeviceId {
        let name = name.into();
        self.add_device(|id| Device::new_l2_switch(id, name))
    }

    /// Add a new multilayer switch with 24 GigabitEthernet ports.
    pub fn add_l3_switch(&mut self, name: impl Into<String>) -> DeviceId {
        let name = name.into();
        self.add_device(|id| Device::new_l3_switch(id, name))
    }

    /// Add a port to a device, e.g., a module. Switch ports start in `dynamic auto`. A device has
    /// at most [`MAX_PORTS`] ports.
    pub fn add_port(
        &mut self,
        device: DeviceId,
        name: impl Into<String>,
    ) -> Result<PortId, NetworkError> {
        let d = self.get_device_mut(device)?;
        if d.ports.len() >= MAX_PORTS {
            return Err(NetworkError::TooManyPorts(device));
        }
        let port = if d.is_pc() {
            Port::host_port(name)
        } else {
            Port::switch_port(name)
        };
        d.ports.push(port);
        Ok(PortId::from(d.ports.len() - 1))
    }

    /// Remove a device from the network. All its cables are removed, and all state on other
    /// devices that refers to it (learned MAC addresses and ARP entries) is flushed.
    pub fn remove_device(&mut self, device: DeviceId) -> Result<(), NetworkError> {
        let removed = self
            .devices
            .remove(&device)
            .ok_or(NetworkError::DeviceNotFound(device))?;
        debug!("Remove device {}", removed.name);
        self.topology.remove_node(device);

        for d in self.devices.values_mut() {
            if let Some(b) = d.bridge_mut() {
                b.mac_table.retain(|e| !e.mac.belongs_to(device));
            }
            if let Some(r) = d.router_mut() {
                r.arp_cache.retain(|_, e| !e.mac.belongs_to(device));
            }
        }

        self.recompute_topology();
        if let Some(r) = removed.router() {
            let groups: BTreeSet<HsrpGroupId> = r.hsrp.values().map(|g| g.group).collect();
            for group in groups {
                let _ = self.recompute_hsrp(group);
            }
        }
        Ok(())
    }

    /// Plug a cable between two ports. The operational mode of both ports is negotiated, and the
    /// derived state is recomputed.
    pub fn connect(&mut self, a: PortRef, b: PortRef) -> Result<ConnectionId, NetworkError> {
        self.port(a)?;
        self.port(b)?;
        if a == b {
            return Err(NetworkError::SelfConnection(a));
        }
        for end in [a, b] {
            if self.get_connection(end).is_some() {
                return Err(NetworkError::PortAlreadyConnected(end));
            }
        }
        let id = self.topology.add_edge(a.device, b.device, Connection::new(a, b));
        debug!(
            "Connect {} -- {}",
            self.port_name(a).unwrap_or_default(),
            self.port_name(b).unwrap_or_default()
        );
        self.recompute_topology();
        Ok(id)
    }

    /// Unplug the cable of a port. Returns the removed connection.
    pub fn disconnect(&mut self, port: PortRef) -> Result<Connection, NetworkError> {
        let (id, _) = self
            .get_connection(port)
            .ok_or(NetworkError::PortNotConnected(port))?;
        let conn = self
            .topology
            .remove_edge(id)
            .ok_or(NetworkError::ConnectionNotFound(id))?;
        debug!("Disconnect {:?} -- {:?}", conn.a, conn.b);
        self.recompute_topology();
        Ok(conn)
    }

    /// Set the status of a cable (simulating a link failure). Returns the old status.
    pub fn set_connection_status(
        &mut self,
        conn: ConnectionId,
        status: LinkStatus,
    ) -> Result<LinkStatus, NetworkError> {
        let c = self
            .topology
            .edge_weight_mut(conn)
            .ok_or(NetworkError::ConnectionNotFound(conn))?;
        let old = std::mem::replace(&mut c.status, status);
        if old != status {
            debug!("Connection {:?} -- {:?} is now {:?}", c.a, c.b, status);
            self.recompute_topology();
        }
        Ok(old)
    }

    // ********************
    // * Helper Functions *
    // ********************

    /// Returns a reference to the network topology (PetGraph struct)
    pub fn get_topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the number of devices in the topology
    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    /// Returns a reference to a device.
    pub fn get_device(&self, id: DeviceId) -> Result<&Device, NetworkError> {
        self.devices.get(&id).ok_or(NetworkError::DeviceNotFound(id))
    }

    /// Returns a mutable reference to a device.
    pub(crate) fn get_device_mut(&mut self, id: DeviceId) -> Result<&mut Device, NetworkError> {
        self.devices
            .get_mut(&id)
            .ok_or(NetworkError::DeviceNotFound(id))
    }

    /// All device ids, in ascending order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Iterate over all devices, in ascending order of their id.
    pub fn devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.device_ids()
            .into_iter()
            .filter_map(move |id| self.devices.get(&id))
    }

    /// Get the id of the device with the given name. If multiple devices have the same name, the
    /// one with the lowest id is returned.
    pub fn get_device_id(&self, name: impl AsRef<str>) -> Result<DeviceId, NetworkError> {
        self.devices()
            .find(|d| d.name == name.as_ref())
            .map(|d| d.id)
            .ok_or_else(|| NetworkError::DeviceNameNotFound(name.as_ref().to_string()))
    }

    /// Get a port by the names of the device and the port.
    pub fn get_port_ref(
        &self,
        device: impl AsRef<str>,
        port: impl AsRef<str>,
    ) -> Result<PortRef, NetworkError> {
        let id = self.get_device_id(device)?;
        let p = self.get_device(id)?.port_by_name(port.as_ref())?;
        Ok(PortRef::new(id, p))
    }

    /// Get a port
    pub fn port(&self, port: PortRef) -> Result<&Port, NetworkError> {
        self.get_device(port.device)?.port(port.port)
    }

    fn port_mut(&mut self, port: PortRef) -> Result<&mut Port, NetworkError> {
        self.get_device_mut(port.device)?.port_mut(port.port)
    }

    /// Name of a port, as `device:port`.
    pub fn port_name(&self, port: PortRef) -> Result<String, NetworkError> {
        let d = self.get_device(port.device)?;
        Ok(format!("{}:{}", d.name, d.port(port.port)?.name))
    }

    /// Iterate over all cables.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> + '_ {
        self.topology.edge_references().map(|e| (e.id(), e.weight()))
    }

    /// Get the cable plugged into a port, regardless of its status.
    pub fn get_connection(&self, port: PortRef) -> Option<(ConnectionId, &Connection)> {
        self.topology
            .edges(port.device)
            .find(|e| e.weight().peer(port).is_some())
            .map(|e| (e.id(), e.weight()))
    }

    /// Get the port on the other end of a working cable.
    pub fn get_peer(&self, port: PortRef) -> Option<PortRef> {
        self.get_connection(port)
            .filter(|(_, c)| c.is_up())
            .and_then(|(_, c)| c.peer(port))
    }

    // ******************
    // * Derived state  *
    // ******************

    /// Recompute the link flag and the negotiated mode of every port.
    fn refresh_links(&mut self) {
        let mut updates: Vec<(PortRef, bool, PortMode)> = Vec::new();
        for device in self.devices() {
            for p in device.port_ids() {
                let local = PortRef::new(device.id, p);
                let port = &device.ports[p.index()];
                let peer = self.get_peer(local).and_then(|peer| self.port(peer).ok());
                let (link, mode) = match peer {
                    Some(peer) => (!peer.shutdown, dtp::resolve_side(port, peer)),
                    None => (false, static_mode(port.mode)),
                };
                if port.link != link || port.oper_mode != mode {
                    updates.push((local, link, mode));
                }
            }
        }
        for (r, link, mode) in updates {
            if let Ok(port) = self.port_mut(r) {
                trace!("{:?}: link = {link}, mode = {mode:?}", r);
                port.link = link;
                port.oper_mode = mode;
            }
        }
    }

    /// Recompute the spanning tree of all bridges, replacing all instances.
    pub fn recompute_spanning_tree(&mut self) {
        let mut instances = stp::compute(self);
        for device in self.devices.values_mut() {
            let id = device.id;
            if let Some(b) = device.bridge_mut() {
                b.stp.instances = instances.remove(&id).unwrap_or_default();
            }
        }
    }

    /// Recompute the routing tables of all layer-3 switches. Returns the number of rounds, or
    /// [`SimError::RoutingConvergenceLimitReached`] if the round cap was hit. In that case, the
    /// tables of the last round are installed nevertheless.
    pub fn recompute_routes(&mut self) -> Result<usize, SimError> {
        let mut outcome = routing::compute(self);
        for device in self.devices.values_mut() {
            let id = device.id;
            if let Some(r) = device.router_mut() {
                r.routing_table = outcome.tables.remove(&id).unwrap_or_default();
            }
        }
        match outcome.error() {
            Some(e) => Err(e),
            None => Ok(outcome.rounds),
        }
    }

    /// Recompute the roles of all router interfaces in an HSRP group. Returns
    /// [`SimError::NoHsrpConfigured`] if no router has that group configured.
    pub fn recompute_hsrp(
        &mut self,
        group: HsrpGroupId,
    ) -> Result<HashMap<HsrpMember, HsrpRole>, SimError> {
        let roles = hsrp::elect(self.devices(), group);
        let mut configured = false;
        for device in self.devices.values_mut() {
            let id = device.id;
            let router = match device.router_mut() {
                Some(r) => r,
                None => continue,
            };
            for cfg in router.hsrp.values_mut().filter(|g| g.group == group) {
                configured = true;
                cfg.role = roles.get(&(id, cfg.interface)).copied().unwrap_or_default();
            }
        }
        if configured {
            debug!("HSRP group {group}: {:?}", roles);
            Ok(roles)
        } else {
            Err(SimError::NoHsrpConfigured(group))
        }
    }

    /// Recompute everything that depends on the topology: link status, trunk negotiation,
    /// spanning tree and routing.
    fn recompute_topology(&mut self) {
        self.refresh_links();
        self.recompute_spanning_tree();
        let _ = self.recompute_routes();
    }

    /// Recompute all derived state from scratch.
    pub fn recompute_all(&mut self) {
        self.recompute_topology();
        let groups: BTreeSet<HsrpGroupId> = self
            .devices()
            .filter_map(|d| d.router())
            .flat_map(|r| r.hsrp.values().map(|g| g.group))
            .collect();
        for group in groups {
            let _ = self.recompute_hsrp(group);
        }
    }

    // *****************
    // * Configuration *
    // *****************

    /// Set the configured mode and the trunk negotiation intent of a port. Returns the old values.
    pub fn set_port_mode(
        &mut self,
        port: PortRef,
        mode: PortMode,
        dtp: DtpMode,
    ) -> Result<(PortMode, DtpMode), NetworkError> {
        let d = self.get_device(port.device)?;
        if d.is_pc() {
            return Err(NetworkError::DeviceIsNotSwitch(port.device));
        }
        if mode == PortMode::Routed && !d.is_router() {
            return Err(NetworkError::DeviceIsNotRouter(port.device));
        }
        let p = self.port_mut(port)?;
        let old = (p.mode, p.dtp);
        p.mode = mode;
        p.dtp = dtp;
        self.recompute_topology();
        Ok(old)
    }

    /// Set the access VLAN of a port. The VLAN is created if it does not exist yet.
    pub fn set_access_vlan(&mut self, port: PortRef, vlan: VlanId) -> Result<VlanId, NetworkError> {
        check_vlan(vlan)?;
        self.get_device_mut(port.device)?
            .bridge_mut_or_err()?
            .ensure_vlan(vlan);
        let old = std::mem::replace(&mut self.port_mut(port)?.vlan, vlan);
        self.recompute_topology();
        Ok(old)
    }

    /// Set the VLANs allowed on a trunk. `None` allows all VLANs.
    pub fn set_trunk_allowed_vlans(
        &mut self,
        port: PortRef,
        vlans: Option<BTreeSet<VlanId>>,
    ) -> Result<Option<BTreeSet<VlanId>>, NetworkError> {
        if let Some(v) = vlans.iter().flatten().find(|v| check_vlan(**v).is_err()) {
            return Err(NetworkError::InvalidVlan(*v));
        }
        self.get_device(port.device)?.bridge_or_err()?;
        let old = std::mem::replace(&mut self.port_mut(port)?.allowed_vlans, vlans);
        self.recompute_topology();
        Ok(old)
    }

    /// Shut down or enable a port. Returns the old value.
    pub fn set_port_shutdown(&mut self, port: PortRef, shutdown: bool) -> Result<bool, NetworkError> {
        let old = std::mem::replace(&mut self.port_mut(port)?.shutdown, shutdown);
        self.recompute_topology();
        Ok(old)
    }

    /// Keep a port up even without a connected peer. Returns the old value.
    pub fn set_port_forced_up(
        &mut self,
        port: PortRef,
        forced: bool,
    ) -> Result<bool, NetworkError> {
        let old = std::mem::replace(&mut self.port_mut(port)?.forced_up, forced);
        self.recompute_topology();
        Ok(old)
    }

    /// Set the address of a routed port.
    pub fn set_port_address(
        &mut self,
        port: PortRef,
        address: Option<Ipv4Net>,
    ) -> Result<Option<Ipv4Net>, NetworkError> {
        self.get_device(port.device)?.router_or_err()?;
        let old = std::mem::replace(&mut self.port_mut(port)?.address, address);
        let _ = self.recompute_routes();
        Ok(old)
    }

    /// Add a port to an EtherChannel bundle, or remove it with `None`. The logical interface of
    /// the bundle is created if it does not exist yet.
    pub fn set_channel_group(
        &mut self,
        port: PortRef,
        group: Option<u16>,
    ) -> Result<Option<u16>, NetworkError> {
        let d = self.get_device_mut(port.device)?;
        let bridge = d.bridge_mut_or_err()?;
        if let Some(g) = group {
            bridge
                .channels
                .entry(g)
                .or_insert_with(|| EtherChannel::new(g));
        }
        let old = std::mem::replace(&mut d.port_mut(port.port)?.channel_group, group);
        self.recompute_topology();
        Ok(old)
    }

    /// Configure the logical interface of an EtherChannel bundle (`interface Port-channel<id>`).
    pub fn set_ether_channel(
        &mut self,
        device: DeviceId,
        id: u16,
        channel: Option<EtherChannel>,
    ) -> Result<Option<EtherChannel>, NetworkError> {
        let d = self.get_device_mut(device)?;
        if let Some(ch) = channel.as_ref() {
            if ch.mode == PortMode::Routed && !d.is_router() {
                return Err(NetworkError::DeviceIsNotRouter(device));
            }
        }
        let bridge = d.bridge_mut_or_err()?;
        let old = match channel {
            Some(ch) => bridge.channels.insert(id, EtherChannel { id, ..ch }),
            None => bridge.channels.remove(&id),
        };
        self.recompute_topology();
        Ok(old)
    }

    /// Bind an access list to an interface in a direction (`ip access-group`).
    pub fn set_access_group(
        &mut self,
        device: DeviceId,
        iface: InterfaceId,
        direction: AclDirection,
        acl: Option<String>,
    ) -> Result<Option<String>, NetworkError> {
        let d = self.get_device_mut(device)?;
        let slot = match iface {
            InterfaceId::Port(p) => {
                let p = d.port_mut(p)?;
                match direction {
                    AclDirection::In => &mut p.acl_in,
                    AclDirection::Out => &mut p.acl_out,
                }
            }
            InterfaceId::Channel(c) => {
                let ch = d
                    .bridge_mut_or_err()?
                    .channels
                    .get_mut(&c)
                    .ok_or(NetworkError::InterfaceNotFound(device, iface))?;
                match direction {
                    AclDirection::In => &mut ch.acl_in,
                    AclDirection::Out => &mut ch.acl_out,
                }
            }
            InterfaceId::Svi(v) => {
                let svi = d
                    .router_mut_or_err()?
                    .svis
                    .get_mut(&v)
                    .ok_or(NetworkError::InterfaceNotFound(device, iface))?;
                match direction {
                    AclDirection::In => &mut svi.acl_in,
                    AclDirection::Out => &mut svi.acl_out,
                }
            }
        };
        Ok(std::mem::replace(slot, acl))
    }

    /// Define or remove an access list.
    pub fn set_access_list(
        &mut self,
        device: DeviceId,
        name: impl Into<String>,
        acl: Option<AccessList>,
    ) -> Result<Option<AccessList>, NetworkError> {
        let name = name.into();
        let bridge = self.get_device_mut(device)?.bridge_mut_or_err()?;
        Ok(match acl {
            Some(acl) => bridge.acls.insert(name.clone(), acl.renamed(name)),
            None => bridge.acls.remove(&name),
        })
    }

    /// Create, modify (e.g., suspend) or delete a VLAN. VLAN 1 cannot be deleted.
    pub fn set_vlan(
        &mut self,
        device: DeviceId,
        vlan: VlanId,
        entry: Option<Vlan>,
    ) -> Result<Option<Vlan>, NetworkError> {
        check_vlan(vlan)?;
        if vlan == NATIVE_VLAN && entry.is_none() {
            return Err(NetworkError::InvalidVlan(vlan));
        }
        let bridge = self.get_device_mut(device)?.bridge_mut_or_err()?;
        let old = match entry {
            Some(e) => bridge.vlans.insert(vlan, Vlan { id: vlan, ..e }),
            None => bridge.vlans.remove(&vlan),
        };
        self.recompute_topology();
        Ok(old)
    }

    /// Set the spanning-tree priority of a bridge in a VLAN.
    pub fn set_stp_priority(
        &mut self,
        device: DeviceId,
        vlan: VlanId,
        priority: Option<StpPriority>,
    ) -> Result<Option<StpPriority>, NetworkError> {
        check_vlan(vlan)?;
        let stp = &mut self.get_device_mut(device)?.bridge_mut_or_err()?.stp;
        let old = match priority {
            Some(p) => stp.priorities.insert(vlan, p),
            None => stp.priorities.remove(&vlan),
        };
        self.recompute_spanning_tree();
        let _ = self.recompute_routes();
        Ok(old)
    }

    /// Configure or remove a switch virtual interface.
    pub fn set_svi(
        &mut self,
        device: DeviceId,
        vlan: VlanId,
        svi: Option<Svi>,
    ) -> Result<Option<Svi>, NetworkError> {
        check_vlan(vlan)?;
        let router = self.get_device_mut(device)?.router_mut_or_err()?;
        let old = match svi {
            Some(s) => router.svis.insert(vlan, Svi { vlan, ..s }),
            None => router.svis.remove(&vlan),
        };
        let _ = self.recompute_routes();
        Ok(old)
    }

    /// Configure or remove an HSRP group on an interface. The roles of the group are recomputed.
    pub fn set_hsrp_group(
        &mut self,
        device: DeviceId,
        iface: InterfaceId,
        group: HsrpGroupId,
        cfg: Option<HsrpGroup>,
    ) -> Result<Option<HsrpGroup>, NetworkError> {
        let router = self.get_device_mut(device)?.router_mut_or_err()?;
        let old = match cfg {
            Some(c) => router.hsrp.insert(
                (iface, group),
                HsrpGroup {
                    group,
                    interface: iface,
                    ..c
                },
            ),
            None => router.hsrp.remove(&(iface, group)),
        };
        let _ = self.recompute_hsrp(group);
        Ok(old)
    }

    /// Set or remove a static route.
    pub fn set_static_route(
        &mut self,
        device: DeviceId,
        network: Ipv4Net,
        route: Option<StaticRoute>,
    ) -> Result<Option<StaticRoute>, NetworkError> {
        let router = self.get_device_mut(device)?.router_mut_or_err()?;
        let network = network.trunc();
        let old = match route {
            Some(r) => router.set_static_route(StaticRoute { network, ..r }),
            None => router.remove_static_route(network),
        };
        let _ = self.recompute_routes();
        Ok(old)
    }

    /// Configure or remove the OSPF process.
    pub fn set_ospf(
        &mut self,
        device: DeviceId,
        ospf: Option<OspfConfig>,
    ) -> Result<Option<OspfConfig>, NetworkError> {
        let router = self.get_device_mut(device)?.router_mut_or_err()?;
        let old = std::mem::replace(&mut router.ospf, ospf);
        let _ = self.recompute_routes();
        Ok(old)
    }

    /// Configure or remove the BGP process.
    pub fn set_bgp(
        &mut self,
        device: DeviceId,
        bgp: Option<BgpConfig>,
    ) -> Result<Option<BgpConfig>, NetworkError> {
        let router = self.get_device_mut(device)?.router_mut_or_err()?;
        let old = std::mem::replace(&mut router.bgp, bgp);
        let _ = self.recompute_routes();
        Ok(old)
    }

    /// Set the address of a PC.
    pub fn set_host_address(
        &mut self,
        device: DeviceId,
        address: Option<Ipv4Net>,
    ) -> Result<Option<Ipv4Net>, NetworkError> {
        let host = self.get_device_mut(device)?.host_mut_or_err()?;
        Ok(std::mem::replace(&mut host.address, address))
    }

    /// Set the default gateway of a PC.
    pub fn set_default_gateway(
        &mut self,
        device: DeviceId,
        gateway: Option<Ipv4Addr>,
    ) -> Result<Option<Ipv4Addr>, NetworkError> {
        let host = self.get_device_mut(device)?.host_mut_or_err()?;
        Ok(std::mem::replace(&mut host.gateway, gateway))
    }

    // ***********
    // * Queries *
    // ***********

    /// Resolve the connectivity from `source` to `dst` without changing the network.
    pub fn resolve_connectivity(
        &self,
        source: DeviceId,
        dst: Ipv4Addr,
    ) -> Result<ConnectivityResult, NetworkError> {
        forwarding::resolve_connectivity(self, source, dst)
    }

    /// Send 5 echo requests from `source` to `dst`. Learned ARP entries and MAC addresses are
    /// stored on the devices, so a repeated ping does not lose its first request.
    pub fn ping(
        &mut self,
        source: DeviceId,
        dst: Ipv4Addr,
    ) -> Result<ConnectivityResult, NetworkError> {
        let result = forwarding::resolve_connectivity(self, source, dst)?;
        for (d, entry) in result.arp_side_effects.iter() {
            if let Some(r) = self.devices.get_mut(d).and_then(|d| d.router_mut()) {
                r.arp_cache.insert(entry.ip, *entry);
            }
        }
        for (d, entry) in result.mac_side_effects.iter() {
            if let Some(b) = self.devices.get_mut(d).and_then(|d| d.bridge_mut()) {
                b.learn(*entry);
            }
        }
        Ok(result)
    }

    /// Devices traversed by a packet from `source` to `dst`. The list is empty if the destination
    /// is unreachable.
    pub fn traceroute(&self, source: DeviceId, dst: Ipv4Addr) -> Result<Vec<DeviceId>, NetworkError> {
        let result = forwarding::resolve_connectivity(self, source, dst)?;
        Ok(if result.reachable {
            result.hops
        } else {
            Vec::new()
        })
    }

    /// Spanning-tree instance of a bridge in a VLAN.
    pub fn spanning_tree(&self, device: DeviceId, vlan: VlanId) -> Result<&StpInstance, SimError> {
        self.devices
            .get(&device)
            .and_then(|d| d.bridge())
            .ok_or(SimError::NoSpanningTreeInstance(vlan))?
            .stp
            .instance(vlan)
    }

    /// Current roles of all router interfaces in an HSRP group.
    pub fn hsrp_roles(
        &self,
        group: HsrpGroupId,
    ) -> Result<HashMap<HsrpMember, HsrpRole>, SimError> {
        let roles: HashMap<HsrpMember, HsrpRole> = self
            .devices()
            .filter_map(|d| d.router().map(|r| (d.id, r)))
            .flat_map(|(id, r)| {
                r.hsrp
                    .values()
                    .filter(move |g| g.group == group)
                    .map(move |g| ((id, g.interface), g.role))
            })
            .collect();
        if roles.is_empty() {
            Err(SimError::NoHsrpConfigured(group))
        } else {
            Ok(roles)
        }
    }

    /// Routing table of a layer-3 switch.
    pub fn routing_table(&self, device: DeviceId) -> Result<&[RouteEntry], NetworkError> {
        Ok(&self.get_device(device)?.router_or_err()?.routing_table)
    }
}

fn check_vlan(vlan: VlanId) -> Result<(), NetworkError> {
    if (1..=MAX_VLAN).contains(&vlan) {
        Ok(())
    } else {
        Err(NetworkError::InvalidVlan(vlan))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{ConfigExpr, ConfigExprKey, ConfigModifier, NetworkConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn port_limit() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        let existing = net.get_device(s1).unwrap().ports.len();
        for i in existing..MAX_PORTS {
            assert_eq!(net.add_port(s1, format!("Extra{i}")), Ok(PortId::from(i)));
        }
        assert_eq!(
            net.add_port(s1, "OneTooMany"),
            Err(NetworkError::TooManyPorts(s1))
        );
    }

    #[test]
    fn connect_checks_ports() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        let s2 = net.add_l2_switch("S2");
        let a = PortRef::new(s1, 0);
        let b = PortRef::new(s2, 0);
        assert_eq!(net.connect(a, a), Err(NetworkError::SelfConnection(a)));
        assert_eq!(
            net.connect(a, PortRef::new(s2, 99)),
            Err(NetworkError::PortNotFound(s2, PortId::new(99)))
        );
        net.connect(a, b).unwrap();
        assert_eq!(
            net.connect(a, PortRef::new(s2, 1)),
            Err(NetworkError::PortAlreadyConnected(a))
        );
        assert_eq!(net.get_peer(a), Some(b));
        assert!(net.port(a).unwrap().is_up());
    }

    #[test]
    fn link_status_follows_cable() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        let s2 = net.add_l2_switch("S2");
        let a = PortRef::new(s1, 0);
        let b = PortRef::new(s2, 0);
        let c = net.connect(a, b).unwrap();
        assert!(net.port(b).unwrap().is_up());

        net.set_port_shutdown(a, true).unwrap();
        assert_eq!(
            net.port(a).unwrap().status(),
            crate::port::PortStatus::AdminDown
        );
        assert!(!net.port(b).unwrap().is_up());
        net.set_port_shutdown(a, false).unwrap();
        assert!(net.port(b).unwrap().is_up());

        assert_eq!(net.set_connection_status(c, LinkStatus::Down), Ok(LinkStatus::Up));
        assert!(!net.port(a).unwrap().is_up());
        assert_eq!(net.get_peer(a), None);

        net.set_connection_status(c, LinkStatus::Up).unwrap();
        let removed = net.disconnect(b).unwrap();
        assert_eq!(removed.endpoints(), [a, b]);
        assert!(!net.port(a).unwrap().is_up());
        assert_eq!(net.disconnect(b), Err(NetworkError::PortNotConnected(b)));
    }

    #[test]
    fn forced_up_without_cable() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        let a = PortRef::new(s1, 0);
        assert!(!net.port(a).unwrap().is_up());
        assert_eq!(net.set_port_forced_up(a, true), Ok(false));
        assert!(net.port(a).unwrap().is_up());
        assert!(net.spanning_tree(s1, 1).is_ok());

        // shutdown still wins
        net.set_port_shutdown(a, true).unwrap();
        assert_eq!(
            net.port(a).unwrap().status(),
            crate::port::PortStatus::AdminDown
        );
        net.set_port_shutdown(a, false).unwrap();

        let config = net.get_config().unwrap();
        assert_eq!(
            config.get(&ConfigExprKey::ForcedUp { port: a }),
            Some(&ConfigExpr::ForcedUp { port: a })
        );
        net.apply_modifier(&ConfigModifier::Remove(ConfigExpr::ForcedUp { port: a }))
            .unwrap();
        assert!(!net.port(a).unwrap().is_up());
    }

    #[test]
    fn remove_device_retracts_cables() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        let s2 = net.add_l2_switch("S2");
        net.connect(PortRef::new(s1, 0), PortRef::new(s2, 0)).unwrap();
        net.remove_device(s2).unwrap();
        assert_eq!(net.num_devices(), 1);
        assert_eq!(net.connections().count(), 0);
        assert!(!net.port(PortRef::new(s1, 0)).unwrap().is_up());
        assert_eq!(net.remove_device(s2), Err(NetworkError::DeviceNotFound(s2)));
    }

    #[test]
    fn names() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        assert_eq!(net.get_device_id("S1"), Ok(s1));
        assert_eq!(
            net.get_device_id("S2"),
            Err(NetworkError::DeviceNameNotFound("S2".to_string()))
        );
        assert_eq!(
            net.get_port_ref("S1", "GigabitEthernet0/1"),
            Ok(PortRef::new(s1, 24))
        );
        let p = net.add_port(s1, "GigabitEthernet1/1").unwrap();
        assert_eq!(p, PortId::new(26));
        assert_eq!(net.port_name(PortRef::new(s1, p)).unwrap(), "S1:GigabitEthernet1/1");
    }

    #[test]
    fn vlan_validation() {
        let mut net = Network::default();
        let s1 = net.add_l2_switch("S1");
        let pc = net.add_pc("PC");
        let p = PortRef::new(s1, 0);
        assert_eq!(net.set_access_vlan(p, 0), Err(NetworkError::InvalidVlan(0)));
        assert_eq!(net.set_access_vlan(p, 4095), Err(NetworkError::InvalidVlan(4095)));
        assert_eq!(net.set_access_vlan(p, 10), Ok(1));
        assert!(net.get_device(s1).unwrap().bridge().unwrap().vlan_active(10));
        assert_eq!(net.set_vlan(s1, 1, None), Err(NetworkError::InvalidVlan(1)));
        assert_eq!(
            net.set_access_vlan(PortRef::new(pc, 0), 10),
            Err(NetworkError::DeviceIsNotSwitch(pc))
        );
    }
}
