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

//! Module defining the devices of the network: PCs, layer-2 switches and layer-3 switches.

use std::{collections::BTreeMap, net::Ipv4Addr};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::{
    acl::AccessList,
    port::{allowed, EtherChannel, Port, PortMode},
    router::Router,
    stp::SpanningTreeState,
    types::{DeviceId, InterfaceId, MacAddr, NetworkError, PortId, VlanId, NATIVE_VLAN},
};

/// Kind of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// End host
    Pc,
    /// Layer-2 switch
    L2Switch,
    /// Multilayer switch (switching and routing)
    L3Switch,
}

/// A device in the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Display name (hostname)
    pub name: String,
    /// Identity of the device
    pub id: DeviceId,
    /// Ports, indexed by [`PortId`]
    pub ports: Vec<Port>,
    /// Kind-specific state
    pub role: DeviceRole,
}

/// Kind-specific state of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRole {
    /// End host
    Pc(Host),
    /// Layer-2 switch
    L2Switch(Bridge),
    /// Multilayer switch
    L3Switch(Bridge, Router),
}

impl Device {
    /// Create a PC with a single port `FastEthernet0`.
    pub fn new_pc(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            ports: vec![Port::host_port("FastEthernet0")],
            role: DeviceRole::Pc(Host::default()),
        }
    }

    /// Create a layer-2 switch with 24 FastEthernet ports and 2 GigabitEthernet uplinks.
    pub fn new_l2_switch(id: DeviceId, name: impl Into<String>) -> Self {
        let ports = (1..=24)
            .map(|i| Port::switch_port(format!("FastEthernet0/{i}")))
            .chain((1..=2).map(|i| Port::switch_port(format!("GigabitEthernet0/{i}"))))
            .collect();
        Self {
            name: name.into(),
            id,
            ports,
            role: DeviceRole::L2Switch(Bridge::default()),
        }
    }

    /// Create a multilayer switch with 24 GigabitEthernet ports.
    pub fn new_l3_switch(id: DeviceId, name: impl Into<String>) -> Self {
        let ports = (1..=24)
            .map(|i| Port::switch_port(format!("GigabitEthernet1/0/{i}")))
            .collect();
        Self {
            name: name.into(),
            id,
            ports,
            role: DeviceRole::L3Switch(Bridge::default(), Router::default()),
        }
    }

    /// Kind of the device
    pub fn kind(&self) -> DeviceKind {
        match self.role {
            DeviceRole::Pc(_) => DeviceKind::Pc,
            DeviceRole::L2Switch(_) => DeviceKind::L2Switch,
            DeviceRole::L3Switch(_, _) => DeviceKind::L3Switch,
        }
    }

    /// Returns `true` if the device is a PC
    pub fn is_pc(&self) -> bool {
        self.kind() == DeviceKind::Pc
    }

    /// Returns `true` if the device has routing capabilities
    pub fn is_router(&self) -> bool {
        self.kind() == DeviceKind::L3Switch
    }

    /// Host state, if the device is a PC
    pub fn host(&self) -> Option<&Host> {
        match &self.role {
            DeviceRole::Pc(h) => Some(h),
            _ => None,
        }
    }

    /// Host state, if the device is a PC
    pub fn host_mut(&mut self) -> Option<&mut Host> {
        match &mut self.role {
            DeviceRole::Pc(h) => Some(h),
            _ => None,
        }
    }

    /// Switching state, if the device is a switch
    pub fn bridge(&self) -> Option<&Bridge> {
        match &self.role {
            DeviceRole::L2Switch(b) | DeviceRole::L3Switch(b, _) => Some(b),
            DeviceRole::Pc(_) => None,
        }
    }

    /// Switching state, if the device is a switch
    pub fn bridge_mut(&mut self) -> Option<&mut Bridge> {
        match &mut self.role {
            DeviceRole::L2Switch(b) | DeviceRole::L3Switch(b, _) => Some(b),
            DeviceRole::Pc(_) => None,
        }
    }

    /// Routing state, if the device is a layer-3 switch
    pub fn router(&self) -> Option<&Router> {
        match &self.role {
            DeviceRole::L3Switch(_, r) => Some(r),
            _ => None,
        }
    }

    /// Routing state, if the device is a layer-3 switch
    pub fn router_mut(&mut self) -> Option<&mut Router> {
        match &mut self.role {
            DeviceRole::L3Switch(_, r) => Some(r),
            _ => None,
        }
    }

    /// Host state, or an error if the device is not a PC
    pub fn host_or_err(&self) -> Result<&Host, NetworkError> {
        self.host().ok_or(NetworkError::DeviceIsNotHost(self.id))
    }

    /// Switching state, or an error if the device is not a switch
    pub fn bridge_or_err(&self) -> Result<&Bridge, NetworkError> {
        self.bridge().ok_or(NetworkError::DeviceIsNotSwitch(self.id))
    }

    /// Routing state, or an error if the device is not a layer-3 switch
    pub fn router_or_err(&self) -> Result<&Router, NetworkError> {
        self.router().ok_or(NetworkError::DeviceIsNotRouter(self.id))
    }

    /// Mutable host state, or an error if the device is not a PC
    pub fn host_mut_or_err(&mut self) -> Result<&mut Host, NetworkError> {
        let id = self.id;
        self.host_mut().ok_or(NetworkError::DeviceIsNotHost(id))
    }

    /// Mutable switching state, or an error if the device is not a switch
    pub fn bridge_mut_or_err(&mut self) -> Result<&mut Bridge, NetworkError> {
        let id = self.id;
        self.bridge_mut().ok_or(NetworkError::DeviceIsNotSwitch(id))
    }

    /// Mutable routing state, or an error if the device is not a layer-3 switch
    pub fn router_mut_or_err(&mut self) -> Result<&mut Router, NetworkError> {
        let id = self.id;
        self.router_mut().ok_or(NetworkError::DeviceIsNotRouter(id))
    }

    /// Get a port of the device
    pub fn port(&self, port: PortId) -> Result<&Port, NetworkError> {
        self.ports
            .get(port.index())
            .ok_or(NetworkError::PortNotFound(self.id, port))
    }

    /// Get a mutable port of the device
    pub fn port_mut(&mut self, port: PortId) -> Result<&mut Port, NetworkError> {
        let id = self.id;
        self.ports
            .get_mut(port.index())
            .ok_or(NetworkError::PortNotFound(id, port))
    }

    /// Lookup a port by its name. Abbreviations are not supported.
    pub fn port_by_name(&self, name: &str) -> Result<PortId, NetworkError> {
        self.ports
            .iter()
            .position(|p| p.name == name)
            .map(PortId::from)
            .ok_or_else(|| NetworkError::PortNameNotFound(self.id, name.to_string()))
    }

    /// Iterate over all port ids
    pub fn port_ids(&self) -> impl Iterator<Item = PortId> {
        (0..self.ports.len()).map(PortId::from)
    }

    /// Name of an interface on this device.
    pub fn interface_name(&self, iface: InterfaceId) -> String {
        match iface {
            InterfaceId::Port(p) => self
                .ports
                .get(p.index())
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("{p:?}")),
            InterfaceId::Svi(v) => format!("Vlan{v}"),
            InterfaceId::Channel(c) => format!("Port-channel{c}"),
        }
    }

    /// EtherChannel bundle of a physical port, if the port is a member of a configured bundle.
    pub fn channel_of(&self, port: PortId) -> Option<&EtherChannel> {
        let group = self.ports.get(port.index())?.channel_group?;
        self.bridge()?.channels.get(&group)
    }

    /// View a port the way it is used to forward frames. If the port belongs to an EtherChannel,
    /// its mode, VLANs, address and access lists are taken from the bundle.
    pub fn effective_port(&self, port: PortId) -> Option<EffectivePort<'_>> {
        let p = self.ports.get(port.index())?;
        let view = if let Some(ch) = self.channel_of(port) {
            let mode = match ch.mode {
                PortMode::Dynamic => p.oper_mode,
                m => m,
            };
            EffectivePort {
                port,
                channel: Some(ch.id),
                mode,
                vlan: ch.vlan,
                allowed_vlans: ch.allowed_vlans.as_ref(),
                address: ch.address,
                acl_in: ch.acl_in.as_deref(),
                acl_out: ch.acl_out.as_deref(),
                up: p.is_up(),
                cost: ch.cost(),
            }
        } else {
            EffectivePort {
                port,
                channel: None,
                mode: p.oper_mode,
                vlan: p.vlan,
                allowed_vlans: p.allowed_vlans.as_ref(),
                address: p.address,
                acl_in: p.acl_in.as_deref(),
                acl_out: p.acl_out.as_deref(),
                up: p.is_up(),
                cost: p.cost(),
            }
        };
        Some(view)
    }

    /// The layer-3 interface that a port belongs to: the bundle for channel members, and the port
    /// itself otherwise.
    pub fn l3_interface(&self, port: PortId) -> InterfaceId {
        match self.channel_of(port) {
            Some(ch) => InterfaceId::Channel(ch.id),
            None => InterfaceId::Port(port),
        }
    }

    /// Physical ports that make up an interface. This is empty for SVIs.
    pub fn member_ports(&self, iface: InterfaceId) -> Vec<PortId> {
        match iface {
            InterfaceId::Port(p) if p.index() < self.ports.len() => vec![p],
            InterfaceId::Port(_) | InterfaceId::Svi(_) => Vec::new(),
            InterfaceId::Channel(c) => self
                .port_ids()
                .filter(|p| self.channel_of(*p).map(|ch| ch.id) == Some(c))
                .collect(),
        }
    }

    /// Status of a layer-3 interface (routed port, routed bundle or SVI).
    pub fn interface_up(&self, iface: InterfaceId) -> bool {
        match iface {
            InterfaceId::Svi(v) => self.svi_up(v),
            iface => self
                .member_ports(iface)
                .into_iter()
                .filter_map(|p| self.effective_port(p))
                .any(|p| p.up && p.mode == PortMode::Routed),
        }
    }

    /// Address of a layer-3 interface, regardless of its status.
    pub fn interface_address(&self, iface: InterfaceId) -> Option<Ipv4Net> {
        match iface {
            InterfaceId::Svi(v) => self.router()?.svis.get(&v)?.address,
            InterfaceId::Port(p) => self.effective_port(p)?.address,
            InterfaceId::Channel(c) => self.bridge()?.channels.get(&c)?.address,
        }
    }

    /// All layer-3 interfaces of the device that are up and carry an address. For PCs, this is
    /// the host address on its first port.
    pub fn addressed_interfaces(&self) -> Vec<(InterfaceId, Ipv4Net)> {
        match &self.role {
            DeviceRole::Pc(h) => h
                .address
                .filter(|_| self.ports.first().map(|p| p.is_up()).unwrap_or(false))
                .map(|a| vec![(InterfaceId::Port(PortId::new(0)), a)])
                .unwrap_or_default(),
            DeviceRole::L2Switch(_) => Vec::new(),
            DeviceRole::L3Switch(bridge, router) => {
                let mut ifaces: Vec<(InterfaceId, Ipv4Net)> = Vec::new();
                for p in self.port_ids() {
                    if self.channel_of(p).is_some() {
                        continue;
                    }
                    if let Some(addr) = self.ports[p.index()].address {
                        let iface = InterfaceId::Port(p);
                        if self.interface_up(iface) {
                            ifaces.push((iface, addr));
                        }
                    }
                }
                for (id, ch) in bridge.channels.iter() {
                    if let Some(addr) = ch.address {
                        let iface = InterfaceId::Channel(*id);
                        if self.interface_up(iface) {
                            ifaces.push((iface, addr));
                        }
                    }
                }
                for (vlan, svi) in router.svis.iter() {
                    if let Some(addr) = svi.address {
                        if self.svi_up(*vlan) {
                            ifaces.push((InterfaceId::Svi(*vlan), addr));
                        }
                    }
                }
                ifaces
            }
        }
    }

    /// Returns `true` if an interface of the device that is up uses that address.
    pub fn owns_address(&self, ip: Ipv4Addr) -> bool {
        match &self.role {
            DeviceRole::Pc(h) => h.address.map(|a| a.addr() == ip).unwrap_or(false),
            DeviceRole::L2Switch(_) => false,
            DeviceRole::L3Switch(_, _) => self
                .addressed_interfaces()
                .iter()
                .any(|(_, a)| a.addr() == ip),
        }
    }

    /// An SVI is up if it is not shut down, its VLAN is active, and at least one up switch port
    /// carries that VLAN.
    pub fn svi_up(&self, vlan: VlanId) -> bool {
        let (bridge, router) = match &self.role {
            DeviceRole::L3Switch(b, r) => (b, r),
            _ => return false,
        };
        match router.svis.get(&vlan) {
            Some(svi) if !svi.shutdown => {}
            _ => return false,
        }
        if !bridge.vlan_active(vlan) {
            return false;
        }
        self.port_ids()
            .filter_map(|p| self.effective_port(p))
            .any(|p| p.up && p.carries(vlan))
    }

    /// MAC address of an interface
    pub fn mac(&self, iface: InterfaceId) -> MacAddr {
        MacAddr::of_interface(self.id, iface)
    }
}

/// A port viewed through its EtherChannel bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePort<'a> {
    /// Physical port
    pub port: PortId,
    /// Bundle, if the port is a member of one
    pub channel: Option<u16>,
    /// Operational mode
    pub mode: PortMode,
    /// Access VLAN
    pub vlan: VlanId,
    /// Allowed VLANs on a trunk (`None` means all)
    pub allowed_vlans: Option<&'a std::collections::BTreeSet<VlanId>>,
    /// Routed address
    pub address: Option<Ipv4Net>,
    /// Inbound access list
    pub acl_in: Option<&'a str>,
    /// Outbound access list
    pub acl_out: Option<&'a str>,
    /// Status of the physical port
    pub up: bool,
    /// Spanning-tree cost
    pub cost: u32,
}

impl<'a> EffectivePort<'a> {
    /// Returns `true` if the port forwards frames of that VLAN.
    pub fn carries(&self, vlan: VlanId) -> bool {
        match self.mode {
            PortMode::Access | PortMode::Dynamic => self.vlan == vlan,
            PortMode::Trunk => allowed(self.allowed_vlans, vlan),
            PortMode::Routed => false,
        }
    }

    /// Identifier of the logical port, shared by all members of a bundle.
    pub fn logical(&self) -> InterfaceId {
        match self.channel {
            Some(c) => InterfaceId::Channel(c),
            None => InterfaceId::Port(self.port),
        }
    }
}

/// State of an end host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// IP address and mask
    pub address: Option<Ipv4Net>,
    /// Default gateway
    pub gateway: Option<Ipv4Addr>,
}

/// State of a VLAN in the VLAN database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VlanState {
    /// The VLAN forwards frames
    #[default]
    Active,
    /// The VLAN exists, but does not forward any frames.
    Suspended,
}

/// VLAN database entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vlan {
    /// VLAN number
    pub id: VlanId,
    /// VLAN name
    pub name: String,
    /// Active or suspended
    pub state: VlanState,
}

impl Vlan {
    /// Create an active VLAN with the default name `VLAN0010`.
    pub fn new(id: VlanId) -> Self {
        Self {
            id,
            name: format!("VLAN{id:04}"),
            state: VlanState::Active,
        }
    }

    /// Create an active VLAN with a name.
    pub fn named(id: VlanId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: VlanState::Active,
        }
    }

    pub(crate) fn default_vlan() -> Self {
        Self::named(NATIVE_VLAN, "default")
    }
}

/// Entry in the MAC address table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacEntry {
    /// VLAN in which the address was learned
    pub vlan: VlanId,
    /// Learned address
    pub mac: MacAddr,
    /// Port on which the address was learned
    pub port: PortId,
}

/// Switching state of a layer-2 or layer-3 switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    /// VLAN database
    pub vlans: BTreeMap<VlanId, Vlan>,
    /// MAC address table
    pub mac_table: Vec<MacEntry>,
    /// Spanning tree state
    pub stp: SpanningTreeState,
    /// EtherChannel bundles
    pub channels: BTreeMap<u16, EtherChannel>,
    /// Access lists, by name
    pub acls: BTreeMap<String, AccessList>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            vlans: std::iter::once((NATIVE_VLAN, Vlan::default_vlan())).collect(),
            mac_table: Vec::new(),
            stp: SpanningTreeState::default(),
            channels: BTreeMap::new(),
            acls: BTreeMap::new(),
        }
    }
}

impl Bridge {
    /// Returns `true` if the VLAN exists and is active.
    pub fn vlan_active(&self, vlan: VlanId) -> bool {
        self.vlans
            .get(&vlan)
            .map(|v| v.state == VlanState::Active)
            .unwrap_or(false)
    }

    /// Active VLANs, in ascending order.
    pub fn active_vlans(&self) -> impl Iterator<Item = VlanId> + '_ {
        self.vlans
            .values()
            .filter(|v| v.state == VlanState::Active)
            .map(|v| v.id)
    }

    /// Create the VLAN if it does not exist yet.
    pub fn ensure_vlan(&mut self, vlan: VlanId) {
        self.vlans.entry(vlan).or_insert_with(|| Vlan::new(vlan));
    }

    /// Learn (or move) a MAC address.
    pub fn learn(&mut self, entry: MacEntry) {
        self.mac_table
            .retain(|e| !(e.vlan == entry.vlan && e.mac == entry.mac));
        self.mac_table.push(entry);
        self.mac_table.sort();
    }

    /// Lookup the port on which a MAC address was learned.
    pub fn lookup_mac(&self, vlan: VlanId, mac: MacAddr) -> Option<PortId> {
        self.mac_table
            .iter()
            .find(|e| e.vlan == vlan && e.mac == mac)
            .map(|e| e.port)
    }

    /// Lookup an access list by its name.
    pub fn acl(&self, name: &str) -> Option<&AccessList> {
        self.acls.get(name)
    }
}
