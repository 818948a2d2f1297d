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

//! # HSRP Election
//!
//! This module computes the roles of all routers participating in an HSRP group. The election is
//! not simulated with hello messages. Instead, the roles are re-derived from the current
//! configuration as a whole: participants are ranked by priority (and by device identity on
//! equal priority), the first one becomes active, the second one standby, and all others listen.
//! Preemption therefore never needs separate transition logic.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    net::Ipv4Addr,
};

use itertools::Itertools;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    device::Device,
    types::{DeviceId, HsrpGroupId, InterfaceId},
};

/// Default HSRP priority
pub const DEFAULT_PRIORITY: u8 = 100;
/// Default hello timer in seconds
pub const DEFAULT_HELLO: u32 = 3;
/// Default hold timer in seconds
pub const DEFAULT_HOLD: u32 = 10;

/// State of a router in an HSRP group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HsrpRole {
    /// Not yet running (no virtual IP known)
    #[default]
    Init,
    /// Waiting to learn the virtual IP
    Learn,
    /// Neither active nor standby
    Listen,
    /// Sending hellos, taking part in the election
    Speak,
    /// Next in line to become active
    Standby,
    /// Forwarding packets sent to the virtual IP
    Active,
}

impl fmt::Display for HsrpRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Learn => write!(f, "Learn"),
            Self::Listen => write!(f, "Listen"),
            Self::Speak => write!(f, "Speak"),
            Self::Standby => write!(f, "Standby"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// `standby <group> ...` configuration of an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsrpGroup {
    /// Group number
    pub group: HsrpGroupId,
    /// Interface on which the group is configured
    pub interface: InterfaceId,
    /// Virtual IP address
    pub virtual_ip: Option<Ipv4Addr>,
    /// Priority
    pub priority: u8,
    /// Preempt a lower-priority active router
    pub preempt: bool,
    /// Hello timer in seconds
    pub hello: u32,
    /// Hold timer in seconds
    pub hold: u32,
    /// Current role, as computed by [`elect`].
    pub role: HsrpRole,
}

impl HsrpGroup {
    /// Create a group with default priority and timers.
    pub fn new(group: HsrpGroupId, interface: InterfaceId, virtual_ip: Option<Ipv4Addr>) -> Self {
        Self {
            group,
            interface,
            virtual_ip,
            priority: DEFAULT_PRIORITY,
            preempt: false,
            hello: DEFAULT_HELLO,
            hold: DEFAULT_HOLD,
            role: HsrpRole::Init,
        }
    }

    /// Set the priority
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Enable preemption
    pub fn preempt(mut self) -> Self {
        self.preempt = true;
        self
    }
}

/// An interface of a router taking part in an HSRP group. The same group number can be used on
/// several interfaces of the same router.
pub type HsrpMember = (DeviceId, InterfaceId);

/// Compute the role of every interface that has `group` configured. Interfaces are partitioned by
/// their virtual IP, and each partition elects its own active and standby router. Interfaces
/// without a virtual IP stay in [`HsrpRole::Init`].
pub fn elect<'a>(
    devices: impl IntoIterator<Item = &'a Device>,
    group: HsrpGroupId,
) -> HashMap<HsrpMember, HsrpRole> {
    let mut result = HashMap::new();
    let mut partitions: BTreeMap<Ipv4Addr, Vec<(u8, HsrpMember)>> = BTreeMap::new();

    for device in devices {
        let router = match device.router() {
            Some(r) => r,
            None => continue,
        };
        for cfg in router.hsrp.values().filter(|g| g.group == group) {
            let member = (device.id, cfg.interface);
            match cfg.virtual_ip {
                Some(vip) => partitions
                    .entry(vip)
                    .or_default()
                    .push((cfg.priority, member)),
                None => {
                    result.insert(member, HsrpRole::Init);
                }
            }
        }
    }

    for (vip, members) in partitions {
        let ranking = members
            .into_iter()
            .sorted_by(|a, b| b.cmp(a))
            .map(|(_, member)| member)
            .collect::<Vec<_>>();
        for (rank, member) in ranking.iter().enumerate() {
            let role = match rank {
                0 => HsrpRole::Active,
                1 => HsrpRole::Standby,
                _ => HsrpRole::Listen,
            };
            result.insert(*member, role);
        }
        trace!("HSRP group {group} ({vip}): ranking {:?}", ranking);
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::Device;
    use maplit::hashmap;
    use pretty_assertions::assert_eq;

    fn router(id: u32, cfg: Option<HsrpGroup>) -> Device {
        let mut d = Device::new_l3_switch(id.into(), format!("R{id}"));
        if let Some(cfg) = cfg {
            d.router_mut()
                .unwrap()
                .hsrp
                .insert((cfg.interface, cfg.group), cfg);
        }
        d
    }

    fn vip(x: u8) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(10, 0, 0, x))
    }

    #[test]
    fn priority_decides() {
        let iface = InterfaceId::Svi(10);
        let devices = vec![
            router(0, Some(HsrpGroup::new(10, iface, vip(1)).priority(90).preempt())),
            router(1, Some(HsrpGroup::new(10, iface, vip(1)).priority(110).preempt())),
        ];
        assert_eq!(
            elect(&devices, 10),
            hashmap! {
                (DeviceId::new(1), iface) => HsrpRole::Active,
                (DeviceId::new(0), iface) => HsrpRole::Standby,
            }
        );
    }

    #[test]
    fn tie_broken_by_identity() {
        let iface = InterfaceId::Svi(10);
        let devices = vec![
            router(0, Some(HsrpGroup::new(1, iface, vip(1)))),
            router(1, Some(HsrpGroup::new(1, iface, vip(1)))),
            router(2, Some(HsrpGroup::new(1, iface, vip(1)))),
        ];
        assert_eq!(
            elect(&devices, 1),
            hashmap! {
                (DeviceId::new(2), iface) => HsrpRole::Active,
                (DeviceId::new(1), iface) => HsrpRole::Standby,
                (DeviceId::new(0), iface) => HsrpRole::Listen,
            }
        );
    }

    #[test]
    fn partitions_and_init() {
        let iface = InterfaceId::Svi(10);
        let devices = vec![
            router(0, Some(HsrpGroup::new(1, iface, vip(1)))),
            router(1, Some(HsrpGroup::new(1, iface, vip(2)))),
            router(2, Some(HsrpGroup::new(1, iface, None))),
            router(3, None),
        ];
        let roles = elect(&devices, 1);
        assert_eq!(roles.len(), 3);
        assert_eq!(roles[&(DeviceId::new(0), iface)], HsrpRole::Active);
        assert_eq!(roles[&(DeviceId::new(1), iface)], HsrpRole::Active);
        assert_eq!(roles[&(DeviceId::new(2), iface)], HsrpRole::Init);
    }

    #[test]
    fn same_group_on_two_interfaces() {
        let v10 = InterfaceId::Svi(10);
        let v20 = InterfaceId::Svi(20);
        let mut d0 = router(0, Some(HsrpGroup::new(1, v10, vip(1)).priority(110)));
        d0.router_mut()
            .unwrap()
            .hsrp
            .insert((v20, 1), HsrpGroup::new(1, v20, vip(2)));
        let d1 = router(1, Some(HsrpGroup::new(1, v20, vip(2)).priority(110)));
        assert_eq!(
            elect(&[d0, d1], 1),
            hashmap! {
                (DeviceId::new(0), v10) => HsrpRole::Active,
                (DeviceId::new(0), v20) => HsrpRole::Standby,
                (DeviceId::new(1), v20) => HsrpRole::Active,
            }
        );
    }

    #[test]
    fn no_participants() {
        let devices = vec![router(0, None), Device::new_pc(1.into(), "PC")];
        assert!(elect(&devices, 5).is_empty());
    }
}
