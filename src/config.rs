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

//! # Network Configuration
//! This module represents the configuration of all devices in the network. There are several
//! different structs in this module. Here is an overview:
//!
//! - [`Config`]: Network-wide configuration. The datastructure is a collection of several
//!   [`ConfigExpr`].
//! - [`ConfigExpr`]: Single configuration expression (a line or block in the running
//!   configuration of a device).
//! - [`ConfigPatch`]: Difference between two [`Config`] structs. The datastructure is a collection
//!   of several [`ConfigModifier`].
//! - [`ConfigModifier`]: A modification of a single [`ConfigExpr`] in a configuration. A
//!   modification can either be an insertion of a new expression, a removal of an existing
//!   expression, or a modification of an existing expression.
//!
//! Only expressions that differ from the factory default appear in a configuration. Removing an
//! expression restores the default.
//!
//! # Example Usage
//!
//! ```rust
//! use labsim::config::{Config, ConfigExpr, ConfigModifier};
//! use labsim::types::{ConfigError, PortRef};
//!
//! fn main() -> Result<(), ConfigError> {
//!     let port = PortRef::new(0.into(), 3);
//!
//!     let mut c1 = Config::new();
//!     let mut c2 = Config::new();
//!
//!     c1.add(ConfigExpr::AccessVlan { port, vlan: 10 })?;
//!     c2.add(ConfigExpr::AccessVlan { port, vlan: 20 })?;
//!     c2.add(ConfigExpr::Shutdown { port })?;
//!
//!     // the same key cannot be configured twice
//!     assert!(c1.add(ConfigExpr::AccessVlan { port, vlan: 30 }).is_err());
//!
//!     let patch = c1.get_diff(&c2);
//!     c1.apply_patch(&patch)?;
//!     assert_eq!(c1, c2);
//!     Ok(())
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use log::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Same};

use crate::{
    acl::AccessList,
    device::{Device, Vlan},
    formatter::NetworkFormatter,
    hsrp::{HsrpGroup, HsrpRole},
    network::Network,
    port::{AclDirection, DtpMode, EtherChannel, PortMode},
    router::{BgpConfig, OspfConfig, StaticRoute, Svi},
    stp::StpPriority,
    types::{
        ConfigError, DeviceId, HsrpGroupId, InterfaceId, NetworkError, PortRef, VlanId,
        NATIVE_VLAN,
    },
};

/// # Network Configuration
/// This struct represents the configuration of a network. It is made up of several [`ConfigExpr`],
/// stored in the order of their [`ConfigExprKey`], such that a configuration is always exported
/// the same way. Two configurations can be compared by computing the difference, which returns a
/// [`ConfigPatch`].
///
/// The `Config` struct contains only "unique" `ConfigExpr`. This means, that a config cannot have
/// an expression setting the access VLAN of a port to 10, and another one setting it to 20.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// All lines of configuration
    #[serde_as(as = "Vec<(Same, Same)>")]
    pub expr: BTreeMap<ConfigExprKey, ConfigExpr>,
}

impl Config {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single configuration expression. This fails if a similar expression already exists.
    pub fn add(&mut self, expr: ConfigExpr) -> Result<(), ConfigError> {
        if let Some(old_expr) = self.expr.insert(expr.key(), expr) {
            self.expr.insert(old_expr.key(), old_expr);
            Err(ConfigError::ConfigExprOverload)
        } else {
            Ok(())
        }
    }

    /// Apply a single `ConfigModifier` to the configuration. If the modifier inserts an already
    /// existing expression, or if the modifier removes or updates a non-existing (or different)
    /// expression, the function returns an error, and the `Config` struct remains untouched.
    pub fn apply_modifier(&mut self, modifier: &ConfigModifier) -> Result<(), ConfigError> {
        match modifier {
            ConfigModifier::Insert(expr) => {
                if let Some(old_expr) = self.expr.insert(expr.key(), expr.clone()) {
                    self.expr.insert(old_expr.key(), old_expr);
                    return Err(ConfigError::ConfigModifier);
                }
            }
            ConfigModifier::Remove(expr) => match self.expr.remove(&expr.key()) {
                Some(old_expr) if &old_expr != expr => {
                    self.expr.insert(old_expr.key(), old_expr);
                    return Err(ConfigError::ConfigModifier);
                }
                None => return Err(ConfigError::ConfigModifier),
                _ => {}
            },
            ConfigModifier::Update { from, to } => {
                let key = from.key();
                if key != to.key() {
                    return Err(ConfigError::ConfigModifier);
                }
                match self.expr.remove(&key) {
                    Some(old_expr) if &old_expr != from => {
                        self.expr.insert(key, old_expr);
                        return Err(ConfigError::ConfigModifier);
                    }
                    None => return Err(ConfigError::ConfigModifier),
                    _ => {}
                }
                self.expr.insert(key, to.clone());
            }
        }
        Ok(())
    }

    /// Apply a patch on the current configuration. If an error occurs, the config remains
    /// untouched.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let mut config_before = self.expr.clone();
        for modifier in patch.modifiers.iter() {
            if let Err(e) = self.apply_modifier(modifier) {
                std::mem::swap(&mut self.expr, &mut config_before);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Returns a `ConfigPatch` containing the difference between `self` and `other`. When the
    /// patch is applied on `self`, it will be the same as `other`. All removals come first, in
    /// reverse order of their key, followed by insertions and updates ordered by their key. This
    /// way, VLANs and bundles exist whenever a port refers to them.
    pub fn get_diff(&self, other: &Self) -> ConfigPatch {
        let mut patch = ConfigPatch::new();
        let keys: Vec<&ConfigExprKey> = self
            .expr
            .keys()
            .chain(other.expr.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for k in keys.iter().rev() {
            if let (Some(a), None) = (self.expr.get(*k), other.expr.get(*k)) {
                patch.add(ConfigModifier::Remove(a.clone()));
            }
        }
        for k in keys {
            match (self.expr.get(k), other.expr.get(k)) {
                (None, Some(b)) => patch.add(ConfigModifier::Insert(b.clone())),
                (Some(a), Some(b)) if a != b => patch.add(ConfigModifier::Update {
                    from: a.clone(),
                    to: b.clone(),
                }),
                _ => {}
            }
        }
        patch
    }

    /// Returns the number of config expressions in the config.
    pub fn len(&self) -> usize {
        self.expr.len()
    }

    /// Returns `true` if the config is empty
    pub fn is_empty(&self) -> bool {
        self.expr.is_empty()
    }

    /// Returns an iterator over all expressions in the configuration, ordered by their key.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigExpr> + '_ {
        self.expr.values()
    }

    /// Lookup a configuration
    pub fn get(&self, index: &ConfigExprKey) -> Option<&ConfigExpr> {
        self.expr.get(index)
    }
}

/// # Single configuration expression
/// The expression sets a single, non-default configuration of a port, interface or device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigExpr {
    /// VLAN database entry (`vlan <id>` / `name` / `state suspend`)
    Vlan {
        /// Switch
        device: DeviceId,
        /// VLAN entry
        vlan: Vlan,
    },
    /// Logical interface of an EtherChannel bundle (`interface Port-channel<id>`)
    EtherChannel {
        /// Switch
        device: DeviceId,
        /// Bundle configuration
        channel: EtherChannel,
    },
    /// Access list (`ip access-list ...`)
    AccessList {
        /// Switch
        device: DeviceId,
        /// Access list
        acl: AccessList,
    },
    /// Switch virtual interface (`interface Vlan<id>`)
    Svi {
        /// Layer-3 switch
        device: DeviceId,
        /// Interface configuration
        svi: Svi,
    },
    /// Configured mode and negotiation intent of a port (`switchport mode ...`, `no switchport`)
    PortMode {
        /// Port
        port: PortRef,
        /// Mode
        mode: PortMode,
        /// Trunk negotiation intent
        dtp: DtpMode,
    },
    /// Access VLAN of a port (`switchport access vlan <id>`)
    AccessVlan {
        /// Port
        port: PortRef,
        /// VLAN
        vlan: VlanId,
    },
    /// Allowed VLANs on a trunk (`switchport trunk allowed vlan ...`)
    TrunkAllowedVlans {
        /// Port
        port: PortRef,
        /// Allowed VLANs
        vlans: BTreeSet<VlanId>,
    },
    /// Port is shut down (`shutdown`)
    Shutdown {
        /// Port
        port: PortRef,
    },
    /// Port stays up without a connected peer
    ForcedUp {
        /// Port
        port: PortRef,
    },
    /// Address of a routed port (`ip address ...`)
    PortAddress {
        /// Port
        port: PortRef,
        /// Address and mask
        address: Ipv4Net,
    },
    /// EtherChannel membership (`channel-group <id> mode on`)
    ChannelGroup {
        /// Port
        port: PortRef,
        /// Bundle
        group: u16,
    },
    /// Access list bound to an interface (`ip access-group <name> {in | out}`)
    AccessGroup {
        /// Device
        device: DeviceId,
        /// Interface
        iface: InterfaceId,
        /// Direction
        direction: AclDirection,
        /// Name of the access list
        acl: String,
    },
    /// Spanning-tree priority (`spanning-tree vlan <id> {root primary | priority <p>}`)
    StpPriority {
        /// Switch
        device: DeviceId,
        /// VLAN
        vlan: VlanId,
        /// Priority
        priority: StpPriority,
    },
    /// HSRP group (`standby <group> ...`)
    HsrpGroup {
        /// Layer-3 switch
        device: DeviceId,
        /// Group configuration. The role is derived state and always [`HsrpRole::Init`] here.
        group: HsrpGroup,
    },
    /// Static route (`ip route ...`)
    StaticRoute {
        /// Layer-3 switch
        device: DeviceId,
        /// Route
        route: StaticRoute,
    },
    /// OSPF process (`router ospf <id>`)
    Ospf {
        /// Layer-3 switch
        device: DeviceId,
        /// Process configuration
        ospf: OspfConfig,
    },
    /// BGP process (`router bgp <asn>`)
    Bgp {
        /// Layer-3 switch
        device: DeviceId,
        /// Process configuration
        bgp: BgpConfig,
    },
    /// Address of a PC
    HostAddress {
        /// PC
        device: DeviceId,
        /// Address and mask
        address: Ipv4Net,
    },
    /// Default gateway of a PC
    DefaultGateway {
        /// PC
        device: DeviceId,
        /// Gateway
        gateway: Ipv4Addr,
    },
}

impl ConfigExpr {
    /// Returns the key of the config expression. Two expressions with the same key cannot be part
    /// of the same [`Config`].
    pub fn key(&self) -> ConfigExprKey {
        match self {
            Self::Vlan { device, vlan } => ConfigExprKey::Vlan {
                device: *device,
                vlan: vlan.id,
            },
            Self::EtherChannel { device, channel } => ConfigExprKey::EtherChannel {
                device: *device,
                id: channel.id,
            },
            Self::AccessList { device, acl } => ConfigExprKey::AccessList {
                device: *device,
                name: acl.id.clone(),
            },
            Self::Svi { device, svi } => ConfigExprKey::Svi {
                device: *device,
                vlan: svi.vlan,
            },
            Self::PortMode { port, .. } => ConfigExprKey::PortMode { port: *port },
            Self::AccessVlan { port, .. } => ConfigExprKey::AccessVlan { port: *port },
            Self::TrunkAllowedVlans { port, .. } => ConfigExprKey::TrunkAllowedVlans { port: *port },
            Self::Shutdown { port } => ConfigExprKey::Shutdown { port: *port },
            Self::ForcedUp { port } => ConfigExprKey::ForcedUp { port: *port },
            Self::PortAddress { port, .. } => ConfigExprKey::PortAddress { port: *port },
            Self::ChannelGroup { port, .. } => ConfigExprKey::ChannelGroup { port: *port },
            Self::AccessGroup {
                device,
                iface,
                direction,
                ..
            } => ConfigExprKey::AccessGroup {
                device: *device,
                iface: *iface,
                direction: *direction,
            },
            Self::StpPriority { device, vlan, .. } => ConfigExprKey::StpPriority {
                device: *device,
                vlan: *vlan,
            },
            Self::HsrpGroup { device, group } => ConfigExprKey::HsrpGroup {
                device: *device,
                iface: group.interface,
                group: group.group,
            },
            Self::StaticRoute { device, route } => ConfigExprKey::StaticRoute {
                device: *device,
                network: route.network,
            },
            Self::Ospf { device, .. } => ConfigExprKey::Ospf { device: *device },
            Self::Bgp { device, .. } => ConfigExprKey::Bgp { device: *device },
            Self::HostAddress { device, .. } => ConfigExprKey::HostAddress { device: *device },
            Self::DefaultGateway { device, .. } => ConfigExprKey::DefaultGateway { device: *device },
        }
    }

    /// Returns the device that is configured by the expression.
    pub fn device(&self) -> DeviceId {
        self.key().device()
    }
}

/// # Key for Config Expressions
/// Identifies what a [`ConfigExpr`] configures, regardless of the value. Keys are ordered such
/// that VLANs, bundles, access lists and SVIs come before the port settings referring to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigExprKey {
    /// VLAN database entry
    Vlan {
        /// Switch
        device: DeviceId,
        /// VLAN
        vlan: VlanId,
    },
    /// EtherChannel logical interface
    EtherChannel {
        /// Switch
        device: DeviceId,
        /// Bundle
        id: u16,
    },
    /// Access list
    AccessList {
        /// Switch
        device: DeviceId,
        /// Name
        name: String,
    },
    /// Switch virtual interface
    Svi {
        /// Layer-3 switch
        device: DeviceId,
        /// VLAN
        vlan: VlanId,
    },
    /// Port mode
    PortMode {
        /// Port
        port: PortRef,
    },
    /// Access VLAN
    AccessVlan {
        /// Port
        port: PortRef,
    },
    /// Trunk allowed VLANs
    TrunkAllowedVlans {
        /// Port
        port: PortRef,
    },
    /// Shutdown
    Shutdown {
        /// Port
        port: PortRef,
    },
    /// Forced up
    ForcedUp {
        /// Port
        port: PortRef,
    },
    /// Routed port address
    PortAddress {
        /// Port
        port: PortRef,
    },
    /// EtherChannel membership
    ChannelGroup {
        /// Port
        port: PortRef,
    },
    /// Access list binding
    AccessGroup {
        /// Device
        device: DeviceId,
        /// Interface
        iface: InterfaceId,
        /// Direction
        direction: AclDirection,
    },
    /// Spanning-tree priority
    StpPriority {
        /// Switch
        device: DeviceId,
        /// VLAN
        vlan: VlanId,
    },
    /// HSRP group on an interface
    HsrpGroup {
        /// Layer-3 switch
        device: DeviceId,
        /// Interface
        iface: InterfaceId,
        /// Group
        group: HsrpGroupId,
    },
    /// Static route
    StaticRoute {
        /// Layer-3 switch
        device: DeviceId,
        /// Destination
        network: Ipv4Net,
    },
    /// OSPF process
    Ospf {
        /// Layer-3 switch
        device: DeviceId,
    },
    /// BGP process
    Bgp {
        /// Layer-3 switch
        device: DeviceId,
    },
    /// PC address
    HostAddress {
        /// PC
        device: DeviceId,
    },
    /// PC default gateway
    DefaultGateway {
        /// PC
        device: DeviceId,
    },
}

impl ConfigExprKey {
    /// Device configured by expressions with that key.
    pub fn device(&self) -> DeviceId {
        match self {
            Self::PortMode { port }
            | Self::AccessVlan { port }
            | Self::TrunkAllowedVlans { port }
            | Self::Shutdown { port }
            | Self::ForcedUp { port }
            | Self::PortAddress { port }
            | Self::ChannelGroup { port } => port.device,
            Self::Vlan { device, .. }
            | Self::EtherChannel { device, .. }
            | Self::AccessList { device, .. }
            | Self::Svi { device, .. }
            | Self::AccessGroup { device, .. }
            | Self::StpPriority { device, .. }
            | Self::HsrpGroup { device, .. }
            | Self::StaticRoute { device, .. }
            | Self::Ospf { device }
            | Self::Bgp { device }
            | Self::HostAddress { device }
            | Self::DefaultGateway { device } => *device,
        }
    }
}

/// # Config Modifier
/// A single patch to apply on a configuration. The modifier can either insert a new expression,
/// update an existing expression or remove an old expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigModifier {
    /// Insert a new expression
    Insert(ConfigExpr),
    /// Remove an existing expression
    Remove(ConfigExpr),
    /// Change a config expression
    Update {
        /// Original configuration expression
        from: ConfigExpr,
        /// New configuration expression, which replaces the `from` expression.
        to: ConfigExpr,
    },
}

impl ConfigModifier {
    /// Returns the ConfigExprKey for the config expression stored inside.
    pub fn key(&self) -> ConfigExprKey {
        match self {
            Self::Insert(e) | Self::Remove(e) => e.key(),
            Self::Update { to, .. } => to.key(),
        }
    }

    /// Returns the device which will be updated by this modifier
    pub fn device(&self) -> DeviceId {
        self.key().device()
    }

    /// Reverses the modifier. An insert becomes a remove, and viceversa. An update updates from the
    /// new one to the old one
    pub fn reverse(self) -> Self {
        match self {
            Self::Insert(e) => Self::Remove(e),
            Self::Remove(e) => Self::Insert(e),
            Self::Update { from, to } => Self::Update { from: to, to: from },
        }
    }
}

/// # Config Patch
/// A series of `ConfigModifiers` which can be applied on a `Config` to get a new `Config`. The
/// series is an ordered list, and the modifiers are applied in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// List of all modifiers, in the order in which they are applied.
    pub modifiers: Vec<ConfigModifier>,
}

impl ConfigPatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new modifier to the patch
    pub fn add(&mut self, modifier: ConfigModifier) {
        self.modifiers.push(modifier);
    }
}

/// Trait to manage the network using configurations, patches, and modifiers.
pub trait NetworkConfig {
    /// Set the provided network-wide configuration. The network first computes the patch from the
    /// current configuration to the next one, and applies the patch. If the process fails, the
    /// network is in an undefined state.
    fn set_config(&mut self, config: &Config) -> Result<(), NetworkError>;

    /// Apply a configuration patch. The modifications of the patch are applied to the network in
    /// the order in which they appear in `patch.modifiers`. If the process fails, the network is
    /// in an undefined state.
    fn apply_patch(&mut self, patch: &ConfigPatch) -> Result<(), NetworkError>;

    /// Apply a single configuration modification. The modification must be applicable to the
    /// current configuration.
    fn apply_modifier(&mut self, modifier: &ConfigModifier) -> Result<(), NetworkError>;

    /// Apply a single configuration modification without checking that the modifier can be
    /// applied. This function ignores the old value stored in `ConfigModifier`, and just makes sure
    /// that the network will have the new value applied.
    fn apply_modifier_unchecked(&mut self, modifier: &ConfigModifier) -> Result<(), NetworkError>;

    /// Check if a modifier can be applied.
    fn can_apply_modifier(&self, modifier: &ConfigModifier) -> bool;

    /// Get the current running configuration, gathered from all devices.
    fn get_config(&self) -> Result<Config, NetworkError>;
}

impl NetworkConfig for Network {
    fn set_config(&mut self, config: &Config) -> Result<(), NetworkError> {
        let patch = self.get_config()?.get_diff(config);
        self.apply_patch(&patch)
    }

    fn apply_patch(&mut self, patch: &ConfigPatch) -> Result<(), NetworkError> {
        for modifier in patch.modifiers.iter() {
            self.apply_modifier(modifier)?;
        }
        Ok(())
    }

    fn apply_modifier(&mut self, modifier: &ConfigModifier) -> Result<(), NetworkError> {
        if self.can_apply_modifier(modifier) {
            self.apply_modifier_unchecked(modifier)
        } else {
            warn!("Cannot apply mod.: {}", modifier.fmt(self));
            Err(ConfigError::ConfigModifier)?
        }
    }

    fn apply_modifier_unchecked(&mut self, modifier: &ConfigModifier) -> Result<(), NetworkError> {
        debug!("Applying modifier: {}", modifier.fmt(self));
        match modifier {
            ConfigModifier::Insert(expr) | ConfigModifier::Update { to: expr, .. } => {
                self.apply_expr(expr)
            }
            ConfigModifier::Remove(expr) => self.reset_expr(&expr.key()),
        }
    }

    fn can_apply_modifier(&self, modifier: &ConfigModifier) -> bool {
        match self.get_config() {
            Ok(mut config) => config.apply_modifier(modifier).is_ok(),
            Err(_) => false,
        }
    }

    fn get_config(&self) -> Result<Config, NetworkError> {
        let mut c = Config::new();
        for device in self.devices() {
            for expr in device_config(device) {
                c.add(expr)?;
            }
        }
        Ok(c)
    }
}

impl Network {
    /// Apply the value of a single expression.
    fn apply_expr(&mut self, expr: &ConfigExpr) -> Result<(), NetworkError> {
        match expr.clone() {
            ConfigExpr::Vlan { device, vlan } => {
                self.set_vlan(device, vlan.id, Some(vlan))?;
            }
            ConfigExpr::EtherChannel {
                device,
                mut channel,
            } => {
                // access groups are configured separately
                if let Some(old) = self
                    .get_device(device)?
                    .bridge()
                    .and_then(|b| b.channels.get(&channel.id))
                {
                    channel.acl_in = old.acl_in.clone();
                    channel.acl_out = old.acl_out.clone();
                }
                self.set_ether_channel(device, channel.id, Some(channel))?;
            }
            ConfigExpr::AccessList { device, acl } => {
                self.set_access_list(device, acl.id.clone(), Some(acl))?;
            }
            ConfigExpr::Svi { device, mut svi } => {
                if let Some(old) = self
                    .get_device(device)?
                    .router()
                    .and_then(|r| r.svis.get(&svi.vlan))
                {
                    svi.acl_in = old.acl_in.clone();
                    svi.acl_out = old.acl_out.clone();
                }
                self.set_svi(device, svi.vlan, Some(svi))?;
            }
            ConfigExpr::PortMode { port, mode, dtp } => {
                self.set_port_mode(port, mode, dtp)?;
            }
            ConfigExpr::AccessVlan { port, vlan } => {
                self.set_access_vlan(port, vlan)?;
            }
            ConfigExpr::TrunkAllowedVlans { port, vlans } => {
                self.set_trunk_allowed_vlans(port, Some(vlans))?;
            }
            ConfigExpr::Shutdown { port } => {
                self.set_port_shutdown(port, true)?;
            }
            ConfigExpr::ForcedUp { port } => {
                self.set_port_forced_up(port, true)?;
            }
            ConfigExpr::PortAddress { port, address } => {
                self.set_port_address(port, Some(address))?;
            }
            ConfigExpr::ChannelGroup { port, group } => {
                self.set_channel_group(port, Some(group))?;
            }
            ConfigExpr::AccessGroup {
                device,
                iface,
                direction,
                acl,
            } => {
                self.set_access_group(device, iface, direction, Some(acl))?;
            }
            ConfigExpr::StpPriority {
                device,
                vlan,
                priority,
            } => {
                self.set_stp_priority(device, vlan, Some(priority))?;
            }
            ConfigExpr::HsrpGroup { device, group } => {
                self.set_hsrp_group(device, group.interface, group.group, Some(group))?;
            }
            ConfigExpr::StaticRoute { device, route } => {
                self.set_static_route(device, route.network, Some(route))?;
            }
            ConfigExpr::Ospf { device, ospf } => {
                self.set_ospf(device, Some(ospf))?;
            }
            ConfigExpr::Bgp { device, bgp } => {
                self.set_bgp(device, Some(bgp))?;
            }
            ConfigExpr::HostAddress { device, address } => {
                self.set_host_address(device, Some(address))?;
            }
            ConfigExpr::DefaultGateway { device, gateway } => {
                self.set_default_gateway(device, Some(gateway))?;
            }
        }
        Ok(())
    }

    /// Restore the default value of a configuration key.
    fn reset_expr(&mut self, key: &ConfigExprKey) -> Result<(), NetworkError> {
        match key.clone() {
            ConfigExprKey::Vlan { device, vlan } if vlan == NATIVE_VLAN => {
                self.set_vlan(device, vlan, Some(Vlan::default_vlan()))?;
            }
            ConfigExprKey::Vlan { device, vlan } => {
                self.set_vlan(device, vlan, None)?;
            }
            ConfigExprKey::EtherChannel { device, id } => {
                self.set_ether_channel(device, id, None)?;
            }
            ConfigExprKey::AccessList { device, name } => {
                self.set_access_list(device, name, None)?;
            }
            ConfigExprKey::Svi { device, vlan } => {
                self.set_svi(device, vlan, None)?;
            }
            ConfigExprKey::PortMode { port } => {
                let (mode, dtp) = default_mode(self.get_device(port.device)?);
                self.set_port_mode(port, mode, dtp)?;
            }
            ConfigExprKey::AccessVlan { port } => {
                self.set_access_vlan(port, NATIVE_VLAN)?;
            }
            ConfigExprKey::TrunkAllowedVlans { port } => {
                self.set_trunk_allowed_vlans(port, None)?;
            }
            ConfigExprKey::Shutdown { port } => {
                self.set_port_shutdown(port, false)?;
            }
            ConfigExprKey::ForcedUp { port } => {
                self.set_port_forced_up(port, false)?;
            }
            ConfigExprKey::PortAddress { port } => {
                self.set_port_address(port, None)?;
            }
            ConfigExprKey::ChannelGroup { port } => {
                self.set_channel_group(port, None)?;
            }
            ConfigExprKey::AccessGroup {
                device,
                iface,
                direction,
            } => {
                self.set_access_group(device, iface, direction, None)?;
            }
            ConfigExprKey::StpPriority { device, vlan } => {
                self.set_stp_priority(device, vlan, None)?;
            }
            ConfigExprKey::HsrpGroup {
                device,
                iface,
                group,
            } => {
                self.set_hsrp_group(device, iface, group, None)?;
            }
            ConfigExprKey::StaticRoute { device, network } => {
                self.set_static_route(device, network, None)?;
            }
            ConfigExprKey::Ospf { device } => {
                self.set_ospf(device, None)?;
            }
            ConfigExprKey::Bgp { device } => {
                self.set_bgp(device, None)?;
            }
            ConfigExprKey::HostAddress { device } => {
                self.set_host_address(device, None)?;
            }
            ConfigExprKey::DefaultGateway { device } => {
                self.set_default_gateway(device, None)?;
            }
        }
        Ok(())
    }
}

/// Factory-default mode of the ports of a device.
fn default_mode(device: &Device) -> (PortMode, DtpMode) {
    if device.is_pc() {
        (PortMode::Access, DtpMode::None)
    } else {
        (PortMode::Dynamic, DtpMode::DynamicAuto)
    }
}

/// All non-default configuration expressions of a device.
fn device_config(device: &Device) -> Vec<ConfigExpr> {
    let id = device.id;
    let mut exprs = Vec::new();
    let default = default_mode(device);

    for p in device.port_ids() {
        let port = &device.ports[p.index()];
        let r = PortRef::new(id, p);
        if (port.mode, port.dtp) != default {
            exprs.push(ConfigExpr::PortMode {
                port: r,
                mode: port.mode,
                dtp: port.dtp,
            });
        }
        if port.vlan != NATIVE_VLAN {
            exprs.push(ConfigExpr::AccessVlan {
                port: r,
                vlan: port.vlan,
            });
        }
        if let Some(vlans) = port.allowed_vlans.clone() {
            exprs.push(ConfigExpr::TrunkAllowedVlans { port: r, vlans });
        }
        if port.shutdown {
            exprs.push(ConfigExpr::Shutdown { port: r });
        }
        if port.forced_up {
            exprs.push(ConfigExpr::ForcedUp { port: r });
        }
        if let Some(address) = port.address {
            exprs.push(ConfigExpr::PortAddress { port: r, address });
        }
        if let Some(group) = port.channel_group {
            exprs.push(ConfigExpr::ChannelGroup { port: r, group });
        }
        for (direction, acl) in [
            (AclDirection::In, port.acl_in.clone()),
            (AclDirection::Out, port.acl_out.clone()),
        ] {
            if let Some(acl) = acl {
                exprs.push(ConfigExpr::AccessGroup {
                    device: id,
                    iface: InterfaceId::Port(p),
                    direction,
                    acl,
                });
            }
        }
    }

    if let Some(host) = device.host() {
        if let Some(address) = host.address {
            exprs.push(ConfigExpr::HostAddress {
                device: id,
                address,
            });
        }
        if let Some(gateway) = host.gateway {
            exprs.push(ConfigExpr::DefaultGateway {
                device: id,
                gateway,
            });
        }
    }

    if let Some(bridge) = device.bridge() {
        for vlan in bridge.vlans.values() {
            if vlan.id != NATIVE_VLAN || *vlan != Vlan::default_vlan() {
                exprs.push(ConfigExpr::Vlan {
                    device: id,
                    vlan: vlan.clone(),
                });
            }
        }
        for channel in bridge.channels.values() {
            exprs.push(ConfigExpr::EtherChannel {
                device: id,
                channel: EtherChannel {
                    acl_in: None,
                    acl_out: None,
                    ..channel.clone()
                },
            });
            for (direction, acl) in [
                (AclDirection::In, channel.acl_in.clone()),
                (AclDirection::Out, channel.acl_out.clone()),
            ] {
                if let Some(acl) = acl {
                    exprs.push(ConfigExpr::AccessGroup {
                        device: id,
                        iface: InterfaceId::Channel(channel.id),
                        direction,
                        acl,
                    });
                }
            }
        }
        for acl in bridge.acls.values() {
            exprs.push(ConfigExpr::AccessList {
                device: id,
                acl: acl.clone(),
            });
        }
        for (vlan, priority) in bridge.stp.priorities.iter() {
            exprs.push(ConfigExpr::StpPriority {
                device: id,
                vlan: *vlan,
                priority: *priority,
            });
        }
    }

    if let Some(router) = device.router() {
        for svi in router.svis.values() {
            exprs.push(ConfigExpr::Svi {
                device: id,
                svi: Svi {
                    acl_in: None,
                    acl_out: None,
                    ..svi.clone()
                },
            });
            for (direction, acl) in [
                (AclDirection::In, svi.acl_in.clone()),
                (AclDirection::Out, svi.acl_out.clone()),
            ] {
                if let Some(acl) = acl {
                    exprs.push(ConfigExpr::AccessGroup {
                        device: id,
                        iface: InterfaceId::Svi(svi.vlan),
                        direction,
                        acl,
                    });
                }
            }
        }
        for group in router.hsrp.values() {
            exprs.push(ConfigExpr::HsrpGroup {
                device: id,
                group: HsrpGroup {
                    role: HsrpRole::Init,
                    ..group.clone()
                },
            });
        }
        for route in router.static_routes.iter() {
            exprs.push(ConfigExpr::StaticRoute {
                device: id,
                route: *route,
            });
        }
        if let Some(ospf) = router.ospf.clone() {
            exprs.push(ConfigExpr::Ospf { device: id, ospf });
        }
        if let Some(bgp) = router.bgp.clone() {
            exprs.push(ConfigExpr::Bgp { device: id, bgp });
        }
    }

    exprs
}
