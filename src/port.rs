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

//! Module defining switch and host ports, and EtherChannel bundles.

use std::collections::BTreeSet;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::types::{VlanId, NATIVE_VLAN};

/// Status of a port, as shown by `show interfaces`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortStatus {
    /// Line protocol is up
    Up,
    /// No live peer is connected
    Down,
    /// The port was shut down by configuration. This overrides link presence.
    AdminDown,
}

impl PortStatus {
    /// Returns `true` if the port is up.
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

/// Operating mode of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PortMode {
    /// Access port, carrying a single VLAN untagged
    Access,
    /// Trunk port, carrying multiple VLANs (tagged, except for the native VLAN)
    Trunk,
    /// The mode is negotiated with the peer using the trunk negotiation intent ([`DtpMode`]).
    Dynamic,
    /// Layer-3 port (`no switchport`). Carries untagged frames without VLAN context.
    Routed,
}

impl PortMode {
    /// Returns `true` if the port is a switch port (not routed).
    pub fn is_switched(&self) -> bool {
        !matches!(self, Self::Routed)
    }
}

/// Trunk negotiation intent of a port in [`PortMode::Dynamic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DtpMode {
    /// No negotiation
    #[default]
    None,
    /// Become a trunk if the peer asks for it (`switchport mode dynamic auto`)
    DynamicAuto,
    /// Actively ask for a trunk (`switchport mode dynamic desirable`)
    DynamicDesirable,
}

/// Direction in which an access list is applied on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AclDirection {
    /// Packets received on the interface
    In,
    /// Packets sent out of the interface
    Out,
}

/// A physical port of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Name of the port, e.g., `FastEthernet0/1`.
    pub name: String,
    /// Administratively shut down
    pub shutdown: bool,
    /// The port is bound to a live connection whose peer port is not shut down. This is derived by
    /// the network after every topology change.
    pub(crate) link: bool,
    /// Keep the port up even without a connection
    pub forced_up: bool,
    /// Configured mode
    pub mode: PortMode,
    /// Configured trunk negotiation intent. It is only relevant in [`PortMode::Dynamic`], and it
    /// survives negotiation such that the link can be renegotiated.
    pub dtp: DtpMode,
    /// Operational mode after trunk negotiation. This is never [`PortMode::Dynamic`].
    pub(crate) oper_mode: PortMode,
    /// Access VLAN
    pub vlan: VlanId,
    /// Allowed VLANs on a trunk. `None` means that all VLANs are allowed.
    pub allowed_vlans: Option<BTreeSet<VlanId>>,
    /// EtherChannel bundle the port belongs to
    pub channel_group: Option<u16>,
    /// IP address of a routed port
    pub address: Option<Ipv4Net>,
    /// Inbound access list
    pub acl_in: Option<String>,
    /// Outbound access list
    pub acl_out: Option<String>,
}

impl Port {
    /// Create a new switch port in `dynamic auto` mode (the default of a Catalyst switch).
    pub fn switch_port(name: impl Into<String>) -> Self {
        Self::with_mode(name, PortMode::Dynamic, DtpMode::DynamicAuto)
    }

    /// Create a new host port, which is always an access port without negotiation.
    pub fn host_port(name: impl Into<String>) -> Self {
        Self::with_mode(name, PortMode::Access, DtpMode::None)
    }

    /// Create a new port with the given mode.
    pub fn with_mode(name: impl Into<String>, mode: PortMode, dtp: DtpMode) -> Self {
        Self {
            name: name.into(),
            shutdown: false,
            link: false,
            forced_up: false,
            mode,
            dtp,
            oper_mode: static_mode(mode),
            vlan: NATIVE_VLAN,
            allowed_vlans: None,
            channel_group: None,
            address: None,
            acl_in: None,
            acl_out: None,
        }
    }

    /// Derived status of the port.
    pub fn status(&self) -> PortStatus {
        if self.shutdown {
            PortStatus::AdminDown
        } else if self.link || self.forced_up {
            PortStatus::Up
        } else {
            PortStatus::Down
        }
    }

    /// Returns `true` if the port is up.
    pub fn is_up(&self) -> bool {
        self.status().is_up()
    }

    /// Operational mode of the port (after negotiation).
    pub fn oper_mode(&self) -> PortMode {
        self.oper_mode
    }

    /// Returns `true` if `vlan` is in the trunk allowed list.
    pub fn allows(&self, vlan: VlanId) -> bool {
        allowed(self.allowed_vlans.as_ref(), vlan)
    }

    /// Spanning-tree path cost of the port, derived from the interface speed.
    pub fn cost(&self) -> u32 {
        port_cost(&self.name)
    }
}

/// Operational mode of a port that was not (yet) negotiated.
pub(crate) fn static_mode(mode: PortMode) -> PortMode {
    match mode {
        PortMode::Dynamic => PortMode::Access,
        m => m,
    }
}

pub(crate) fn allowed(list: Option<&BTreeSet<VlanId>>, vlan: VlanId) -> bool {
    list.map(|l| l.contains(&vlan)).unwrap_or(true)
}

/// Path cost of an interface, based on the speed encoded in its name.
pub fn port_cost(name: &str) -> u32 {
    if name.starts_with("FastEthernet") {
        19
    } else if name.starts_with("GigabitEthernet") {
        4
    } else if name.starts_with("Port-channel") {
        3
    } else {
        100
    }
}

/// Logical interface of an EtherChannel bundle (`interface Port-channel<id>`). Member ports take
/// their mode, VLANs, address and access lists from this interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtherChannel {
    /// Channel group number
    pub id: u16,
    /// Configured mode of the bundle. In [`PortMode::Dynamic`], the negotiated mode of the member
    /// ports applies.
    pub mode: PortMode,
    /// Access VLAN
    pub vlan: VlanId,
    /// Allowed VLANs on a trunk. `None` means all.
    pub allowed_vlans: Option<BTreeSet<VlanId>>,
    /// IP address of a routed bundle
    pub address: Option<Ipv4Net>,
    /// Inbound access list
    pub acl_in: Option<String>,
    /// Outbound access list
    pub acl_out: Option<String>,
}

impl EtherChannel {
    /// Create a new channel with default parameters.
    pub fn new(id: u16) -> Self {
        Self {
            id,
            mode: PortMode::Dynamic,
            vlan: NATIVE_VLAN,
            allowed_vlans: None,
            address: None,
            acl_in: None,
            acl_out: None,
        }
    }

    /// Create a trunk bundle allowing only the given VLANs.
    pub fn trunk(id: u16, allowed_vlans: impl IntoIterator<Item = VlanId>) -> Self {
        Self {
            mode: PortMode::Trunk,
            allowed_vlans: Some(allowed_vlans.into_iter().collect()),
            ..Self::new(id)
        }
    }

    /// Name of the logical interface.
    pub fn name(&self) -> String {
        format!("Port-channel{}", self.id)
    }

    /// Spanning-tree cost of the bundle.
    pub fn cost(&self) -> u32 {
        port_cost("Port-channel")
    }
}
