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

//! Module containing all type definitions

use std::net::Ipv4Addr;

use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;
/// Device Identification (and index into the topology graph)
pub type DeviceId = NodeIndex<IndexType>;
/// Connection Identification (index of the cable in the topology graph)
pub type ConnectionId = EdgeIndex<IndexType>;
/// VLAN number
pub type VlanId = u16;
/// HSRP group number. Version 1 groups range from 0 to 255, and the number is part of the virtual
/// MAC address.
pub type HsrpGroupId = u8;

/// The native VLAN. Frames in this VLAN are carried untagged on trunks.
pub const NATIVE_VLAN: VlanId = 1;
/// Largest VLAN number that can be configured.
pub const MAX_VLAN: VlanId = 4094;
/// Largest number of ports on a single device. The port index is part of the derived MAC address.
pub const MAX_PORTS: usize = 1 << 16;

/// Physical topology. Nodes are devices, and every edge is a cable between two ports.
pub type Topology = StableGraph<(), Connection, Undirected, IndexType>;

/// Port identification, local to the device that owns the port. It is the index into the port
/// list of that device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PortId(pub(crate) u32);

impl PortId {
    /// Create a port id from its index.
    pub const fn new(idx: u32) -> Self {
        Self(idx)
    }

    /// Get the index of the port on its device.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port{}", self.0)
    }
}

impl From<u32> for PortId {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

impl From<usize> for PortId {
    fn from(x: usize) -> Self {
        Self(x as u32)
    }
}

impl From<i32> for PortId {
    fn from(x: i32) -> Self {
        Self(x as u32)
    }
}

/// A `(device, port)` pair, which uniquely identifies a port in the network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    /// The device owning the port
    pub device: DeviceId,
    /// The port on that device
    pub port: PortId,
}

impl PortRef {
    /// Create a new port reference
    pub fn new(device: DeviceId, port: impl Into<PortId>) -> Self {
        Self {
            device,
            port: port.into(),
        }
    }
}

impl std::fmt::Debug for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.device.index(), self.port)
    }
}

/// Identification of an interface on a device. An interface is either a physical port, a switch
/// virtual interface bound to a VLAN, or the logical interface of an EtherChannel bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterfaceId {
    /// Physical port
    Port(PortId),
    /// Switch virtual interface of a VLAN
    Svi(VlanId),
    /// Logical interface of an EtherChannel (`Port-channel<n>`)
    Channel(u16),
}

impl From<PortId> for InterfaceId {
    fn from(p: PortId) -> Self {
        Self::Port(p)
    }
}

/// MAC address. Devices derive their addresses from their [`DeviceId`], so MAC addresses are
/// unique and stable across export and import.
///
/// A derived address is locally administered. The first byte encodes what the address belongs to
/// (the device itself, a port, or a bundle), the next three bytes the device, and the last two
/// bytes the port or bundle number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

const MAC_DEVICE: u8 = 0x02;
const MAC_PORT: u8 = 0x06;
const MAC_CHANNEL: u8 = 0x0a;

impl MacAddr {
    /// The base MAC address of a device. It is used as the bridge address in spanning tree, and
    /// for all switch virtual interfaces.
    pub fn of_device(device: DeviceId) -> Self {
        Self::build(MAC_DEVICE, device, 0)
    }

    /// The MAC address of a specific interface on a device.
    pub fn of_interface(device: DeviceId, iface: InterfaceId) -> Self {
        match iface {
            InterfaceId::Port(p) => Self::build(MAC_PORT, device, p.0),
            InterfaceId::Svi(_) => Self::of_device(device),
            InterfaceId::Channel(c) => Self::build(MAC_CHANNEL, device, c as u32),
        }
    }

    /// Virtual MAC address of an HSRP group (`0000.0c07.acXX`).
    pub fn hsrp(group: HsrpGroupId) -> Self {
        Self([0x00, 0x00, 0x0c, 0x07, 0xac, group])
    }

    /// Returns `true` if the address was derived from that device.
    pub fn belongs_to(&self, device: DeviceId) -> bool {
        matches!(self.0[0], MAC_DEVICE | MAC_PORT | MAC_CHANNEL)
            && self.0[1..4] == Self::of_device(device).0[1..4]
    }

    fn build(kind: u8, device: DeviceId, idx: u32) -> Self {
        let i = device.index() as u32;
        debug_assert!(i < 1 << 24);
        Self([
            kind,
            (i >> 16) as u8,
            (i >> 8) as u8,
            i as u8,
            (idx >> 8) as u8,
            idx as u8,
        ])
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}{:02x}.{:02x}{:02x}.{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl std::fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Status of a cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkStatus {
    /// The cable is plugged in and working
    #[default]
    Up,
    /// The cable is broken (simulated link failure)
    Down,
}

/// An undirected cable between exactly two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// First endpoint
    pub a: PortRef,
    /// Second endpoint
    pub b: PortRef,
    /// Status of the cable
    pub status: LinkStatus,
}

impl Connection {
    /// Create a new working connection between `a` and `b`.
    pub fn new(a: PortRef, b: PortRef) -> Self {
        Self {
            a,
            b,
            status: LinkStatus::Up,
        }
    }

    /// Get the port on the other end of the cable. Returns `None` if `end` is not an endpoint of
    /// this connection.
    pub fn peer(&self, end: PortRef) -> Option<PortRef> {
        if end == self.a {
            Some(self.b)
        } else if end == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    /// Both endpoints of the connection.
    pub fn endpoints(&self) -> [PortRef; 2] {
        [self.a, self.b]
    }

    /// Returns `true` if the cable is working.
    pub fn is_up(&self) -> bool {
        self.status == LinkStatus::Up
    }
}

/// Returns `true` if `addr` matches `base` under the wildcard mask `wildcard` (bits set in the
/// wildcard are ignored).
pub fn wildcard_match(addr: Ipv4Addr, base: Ipv4Addr, wildcard: Ipv4Addr) -> bool {
    let care = !u32::from(wildcard);
    (u32::from(addr) & care) == (u32::from(base) & care)
}

/// Configuration Error
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// The added expression would overwrite an existing expression
    #[error("The new ConfigExpr would overwrite an existing one!")]
    ConfigExprOverload,
    /// The ConfigModifier cannot be applied. There are three cases why this is the case:
    /// 1. The ConfigModifier::Insert would insert an already existing expression
    /// 2. The ConfigModifier::Remove would remove an non-existing expression
    /// 3. The ConfigModifier::Update would update an non-existing expression
    #[error("The ConfigModifier cannot be applied.")]
    ConfigModifier,
}

/// Network Errors. These errors are raised when the caller violates the contract of the data
/// model, e.g., by referencing a device or port that does not exist.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Configuration error
    #[error("Configuration Error: {0}")]
    ConfigError(#[from] ConfigError),
    /// Device is not present in the topology
    #[error("Network device was not found in topology: {0:?}")]
    DeviceNotFound(DeviceId),
    /// Device name is not present in the topology
    #[error("Network device name was not found in topology: {0}")]
    DeviceNameNotFound(String),
    /// The port does not exist on the device
    #[error("Port {1:?} does not exist on device {0:?}")]
    PortNotFound(DeviceId, PortId),
    /// No port with that name exists on the device
    #[error("Port {1} does not exist on device {0:?}")]
    PortNameNotFound(DeviceId, String),
    /// The interface does not exist on the device
    #[error("Interface {1:?} does not exist on device {0:?}")]
    InterfaceNotFound(DeviceId, InterfaceId),
    /// The port is already bound to a connection
    #[error("Port is already connected: {0:?}")]
    PortAlreadyConnected(PortRef),
    /// A cable cannot start and end at the same port
    #[error("Cannot connect port {0:?} to itself")]
    SelfConnection(PortRef),
    /// The connection does not exist
    #[error("Connection does not exist: {0:?}")]
    ConnectionNotFound(ConnectionId),
    /// The port is not bound to any connection
    #[error("Port is not connected: {0:?}")]
    PortNotConnected(PortRef),
    /// Device must be a PC
    #[error("Network device is not a PC: {0:?}")]
    DeviceIsNotHost(DeviceId),
    /// Device must be a switch
    #[error("Network device is not a switch: {0:?}")]
    DeviceIsNotSwitch(DeviceId),
    /// Device must be a layer-3 switch
    #[error("Network device is not a layer-3 device: {0:?}")]
    DeviceIsNotRouter(DeviceId),
    /// The VLAN number is out of range
    #[error("Invalid VLAN number: {0}")]
    InvalidVlan(VlanId),
    /// The device cannot have any more ports
    #[error("Network device {0:?} has the maximum number of ports")]
    TooManyPorts(DeviceId),
    /// Json error
    #[error("{0}")]
    JsonError(Box<serde_json::Error>),
}

impl From<serde_json::Error> for NetworkError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(Box::new(value))
    }
}

impl PartialEq for NetworkError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ConfigError(l0), Self::ConfigError(r0)) => l0 == r0,
            (Self::DeviceNotFound(l0), Self::DeviceNotFound(r0)) => l0 == r0,
            (Self::DeviceNameNotFound(l0), Self::DeviceNameNotFound(r0)) => l0 == r0,
            (Self::PortNotFound(l0, l1), Self::PortNotFound(r0, r1)) => l0 == r0 && l1 == r1,
            (Self::PortNameNotFound(l0, l1), Self::PortNameNotFound(r0, r1)) => {
                l0 == r0 && l1 == r1
            }
            (Self::InterfaceNotFound(l0, l1), Self::InterfaceNotFound(r0, r1)) => {
                l0 == r0 && l1 == r1
            }
            (Self::PortAlreadyConnected(l0), Self::PortAlreadyConnected(r0)) => l0 == r0,
            (Self::SelfConnection(l0), Self::SelfConnection(r0)) => l0 == r0,
            (Self::ConnectionNotFound(l0), Self::ConnectionNotFound(r0)) => l0 == r0,
            (Self::PortNotConnected(l0), Self::PortNotConnected(r0)) => l0 == r0,
            (Self::DeviceIsNotHost(l0), Self::DeviceIsNotHost(r0)) => l0 == r0,
            (Self::DeviceIsNotSwitch(l0), Self::DeviceIsNotSwitch(r0)) => l0 == r0,
            (Self::DeviceIsNotRouter(l0), Self::DeviceIsNotRouter(r0)) => l0 == r0,
            (Self::InvalidVlan(l0), Self::InvalidVlan(r0)) => l0 == r0,
            (Self::TooManyPorts(l0), Self::TooManyPorts(r0)) => l0 == r0,
            (Self::JsonError(l), Self::JsonError(r)) => l.to_string() == r.to_string(),
            _ => false,
        }
    }
}

/// Reported outcomes of the simulation. These are not raised as errors, but returned as data so
/// that the caller can render them as command output.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimError {
    /// The PC has no default gateway configured
    #[error("No default gateway configured")]
    NoGateway,
    /// No path exists from the source to its default gateway
    #[error("Default gateway is unreachable")]
    GatewayUnreachable,
    /// No path exists towards the destination, or the destination does not exist
    #[error("Destination host unreachable")]
    DestinationUnreachable,
    /// The source has no IP address at all
    #[error("Source has no IP address")]
    NoIpAddress,
    /// An access list dropped the packet. Reported to users as unreachable.
    #[error("Packet denied by an access list")]
    AclDenied,
    /// The HSRP group is not configured on any device
    #[error("HSRP group {0} is not configured")]
    NoHsrpConfigured(HsrpGroupId),
    /// No spanning-tree instance exists for that VLAN
    #[error("No spanning-tree instance exists for VLAN {0}")]
    NoSpanningTreeInstance(VlanId),
    /// Route propagation hit its round cap before reaching a fixed point
    #[error("Routing did not converge within {0} rounds")]
    RoutingConvergenceLimitReached(usize),
}
