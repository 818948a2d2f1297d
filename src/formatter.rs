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

//! Module that introduces a formatter to display all types containing `DeviceId`.

use std::collections::{BTreeSet, HashMap, HashSet};

use itertools::Itertools;

use crate::{
    config::{Config, ConfigExpr, ConfigExprKey, ConfigModifier, ConfigPatch},
    forwarding::ConnectivityResult,
    hsrp::{HsrpMember, HsrpRole},
    network::Network,
    router::RouteEntry,
    stp::StpInstance,
    types::{DeviceId, InterfaceId, PortRef},
};

/// Trait to format a type that contains DeviceIds
pub trait NetworkFormatter<'a, 'n> {
    /// Type that is returned, which implements `std::fmt::Display`.
    type Formatter;

    /// Return a struct that can be formatted and displayed. Unknown devices are shown as `?`.
    fn fmt(&'a self, net: &'n Network) -> Self::Formatter;
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for DeviceId {
    type Formatter = &'n str;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        net.get_device(*self)
            .map(|d| d.name.as_str())
            .unwrap_or("?")
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for PortRef {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        net.port_name(*self)
            .unwrap_or_else(|_| format!("{}:?", self.device.fmt(net)))
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for (DeviceId, InterfaceId) {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        match net.get_device(self.0) {
            Ok(d) => format!("{}:{}", d.name, d.interface_name(self.1)),
            Err(_) => format!("?:{:?}", self.1),
        }
    }
}

//
// Paths and sets of devices
//
impl<'a, 'n> NetworkFormatter<'a, 'n> for Vec<DeviceId> {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        self.iter().map(|r| r.fmt(net)).join(" => ")
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for HashSet<DeviceId> {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        format!("{{{}}}", self.iter().map(|r| r.fmt(net)).sorted().join(", "))
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for BTreeSet<DeviceId> {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        format!("{{{}}}", self.iter().map(|r| r.fmt(net)).join(", "))
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for HashMap<HsrpMember, HsrpRole> {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        format!(
            "{{{}}}",
            self.iter()
                .map(|(m, role)| format!("{}: {}", m.fmt(net), role))
                .sorted()
                .join(", ")
        )
    }
}

//
// Routing
//
impl<'a, 'n> NetworkFormatter<'a, 'n> for RouteEntry {
    type Formatter = String;

    fn fmt(&'a self, _net: &'n Network) -> Self::Formatter {
        match self.next_hop {
            None => format!("{}    {} is directly connected", self.origin.code(), self.network),
            Some(nh) => format!(
                "{}    {} [{}/{}] via {}",
                self.origin.code(),
                self.network,
                self.origin.admin_distance(),
                self.metric,
                nh
            ),
        }
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for StpInstance {
    type Formatter = String;

    fn fmt(&'a self, _net: &'n Network) -> Self::Formatter {
        let mut lines = vec![
            format!("VLAN{:04}", self.vlan),
            format!(
                "  Root ID    Priority {}, Address {}, Cost {}",
                self.root.priority, self.root.mac, self.root_cost
            ),
            format!(
                "  Bridge ID  Priority {}, Address {}",
                self.bridge.priority, self.bridge.mac
            ),
        ];
        lines.extend(self.ports.iter().map(|(p, s)| {
            format!("  {:?}: {:?} {:?} (cost {})", p, s.role, s.state, s.cost)
        }));
        lines.join("\n")
    }
}

//
// Configuration
//
impl<'a, 'n> NetworkFormatter<'a, 'n> for ConfigExprKey {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        match self {
            Self::Vlan { device, vlan } => format!("VLAN {} on {}", vlan, device.fmt(net)),
            Self::EtherChannel { device, id } => {
                format!("Port-channel{} on {}", id, device.fmt(net))
            }
            Self::AccessList { device, name } => {
                format!("Access list {} on {}", name, device.fmt(net))
            }
            Self::Svi { device, vlan } => format!("Interface Vlan{} on {}", vlan, device.fmt(net)),
            Self::PortMode { port } => format!("Mode of {}", port.fmt(net)),
            Self::AccessVlan { port } => format!("Access VLAN of {}", port.fmt(net)),
            Self::TrunkAllowedVlans { port } => format!("Allowed VLANs of {}", port.fmt(net)),
            Self::Shutdown { port } => format!("Shutdown of {}", port.fmt(net)),
            Self::ForcedUp { port } => format!("Forced up of {}", port.fmt(net)),
            Self::PortAddress { port } => format!("Address of {}", port.fmt(net)),
            Self::ChannelGroup { port } => format!("Channel group of {}", port.fmt(net)),
            Self::AccessGroup {
                device,
                iface,
                direction,
            } => format!(
                "Access group {:?} of {}",
                direction,
                (*device, *iface).fmt(net)
            ),
            Self::StpPriority { device, vlan } => {
                format!("STP priority of {} in VLAN {}", device.fmt(net), vlan)
            }
            Self::HsrpGroup {
                device,
                iface,
                group,
            } => format!("HSRP group {} on {}", group, (*device, *iface).fmt(net)),
            Self::StaticRoute { device, network } => {
                format!("Static route for {} on {}", network, device.fmt(net))
            }
            Self::Ospf { device } => format!("OSPF process on {}", device.fmt(net)),
            Self::Bgp { device } => format!("BGP process on {}", device.fmt(net)),
            Self::HostAddress { device } => format!("Address of {}", device.fmt(net)),
            Self::DefaultGateway { device } => format!("Default gateway of {}", device.fmt(net)),
        }
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for ConfigExpr {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        match self {
            Self::Vlan { device, vlan } => format!(
                "{}: vlan {} name {} ({:?})",
                device.fmt(net),
                vlan.id,
                vlan.name,
                vlan.state
            ),
            Self::EtherChannel { device, channel } => format!(
                "{}: interface Port-channel{} ({:?})",
                device.fmt(net),
                channel.id,
                channel.mode
            ),
            Self::AccessList { device, acl } => format!(
                "{}: ip access-list {} [{}]",
                device.fmt(net),
                acl.id,
                acl.entries().iter().join("; ")
            ),
            Self::Svi { device, svi } => format!(
                "{}: interface Vlan{}{}{}",
                device.fmt(net),
                svi.vlan,
                svi.address
                    .map(|a| format!(" ip address {a}"))
                    .unwrap_or_default(),
                if svi.shutdown { " shutdown" } else { "" }
            ),
            Self::PortMode { port, mode, dtp } => {
                format!("{}: mode {:?} ({:?})", port.fmt(net), mode, dtp)
            }
            Self::AccessVlan { port, vlan } => {
                format!("{}: switchport access vlan {}", port.fmt(net), vlan)
            }
            Self::TrunkAllowedVlans { port, vlans } => format!(
                "{}: switchport trunk allowed vlan {}",
                port.fmt(net),
                vlans.iter().join(",")
            ),
            Self::Shutdown { port } => format!("{}: shutdown", port.fmt(net)),
            Self::ForcedUp { port } => format!("{}: forced up", port.fmt(net)),
            Self::PortAddress { port, address } => {
                format!("{}: ip address {}", port.fmt(net), address)
            }
            Self::ChannelGroup { port, group } => {
                format!("{}: channel-group {} mode on", port.fmt(net), group)
            }
            Self::AccessGroup {
                device,
                iface,
                direction,
                acl,
            } => format!(
                "{}: ip access-group {} {:?}",
                (*device, *iface).fmt(net),
                acl,
                direction
            ),
            Self::StpPriority {
                device,
                vlan,
                priority,
            } => format!(
                "{}: spanning-tree vlan {} {:?}",
                device.fmt(net),
                vlan,
                priority
            ),
            Self::HsrpGroup { device, group } => format!(
                "{}: standby {} ip {} priority {}{}",
                (*device, group.interface).fmt(net),
                group.group,
                group
                    .virtual_ip
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                group.priority,
                if group.preempt { " preempt" } else { "" }
            ),
            Self::StaticRoute { device, route } => format!(
                "{}: ip route {} {}",
                device.fmt(net),
                route.network,
                match (route.next_hop, route.interface) {
                    (Some(nh), _) => nh.to_string(),
                    (None, Some(i)) => (*device, i).fmt(net),
                    (None, None) => "?".to_string(),
                }
            ),
            Self::Ospf { device, ospf } => format!(
                "{}: router ospf {} ({} networks)",
                device.fmt(net),
                ospf.process_id,
                ospf.networks.len()
            ),
            Self::Bgp { device, bgp } => format!(
                "{}: router bgp {} ({} neighbors)",
                device.fmt(net),
                bgp.asn,
                bgp.neighbors.len()
            ),
            Self::HostAddress { device, address } => {
                format!("{}: ip {}", device.fmt(net), address)
            }
            Self::DefaultGateway { device, gateway } => {
                format!("{}: gateway {}", device.fmt(net), gateway)
            }
        }
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for ConfigModifier {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        match self {
            Self::Insert(e) => format!("INSERT {}", e.fmt(net)),
            Self::Remove(e) => format!("REMOVE {}", e.fmt(net)),
            Self::Update { from, to } => format!("MODIFY {} --> {}", from.fmt(net), to.fmt(net)),
        }
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for ConfigPatch {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        self.modifiers
            .iter()
            .map(|m| format!("    {}", m.fmt(net)))
            .join("\n")
    }
}

impl<'a, 'n> NetworkFormatter<'a, 'n> for Config {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        self.iter().map(|e| format!("    {}", e.fmt(net))).join("\n")
    }
}

//
// Connectivity
//
impl<'a, 'n> NetworkFormatter<'a, 'n> for ConnectivityResult {
    type Formatter = String;

    fn fmt(&'a self, net: &'n Network) -> Self::Formatter {
        let samples: String = self
            .rtt_samples
            .iter()
            .map(|s| if s.is_some() { '!' } else { '.' })
            .collect();
        let mut out = format!(
            "{} Success rate is {} percent ({}/{})",
            samples,
            self.success_rate(),
            self.successes(),
            self.rtt_samples.len()
        );
        if !self.hops.is_empty() {
            out.push_str(&format!("\n  path: {}", self.hops.fmt(net)));
        }
        for e in self.errors.iter() {
            out.push_str(&format!("\n  error: {e}"));
        }
        out
    }
}
