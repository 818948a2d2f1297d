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

//! Test trunk negotiation, VLANs, spanning tree and EtherChannel bundles.

use std::collections::BTreeSet;

use petgraph::unionfind::UnionFind;
use pretty_assertions::assert_eq;
use test_log::test;

use crate::{
    device::Vlan,
    network::Network,
    port::{DtpMode, EtherChannel, PortMode},
    stp::{StpPortRole, StpPortState, StpPriority},
    test::{add_host, ip},
    types::{DeviceId, InterfaceId, PortRef, SimError},
};

#[test]
fn trunk_negotiation_on_connect() {
    let mut net = Network::default();
    let s1 = net.add_l2_switch("S1");
    let s2 = net.add_l2_switch("S2");
    let a = PortRef::new(s1, 24);
    let b = PortRef::new(s2, 24);

    // unconnected ports run their static mode
    assert_eq!(net.port(a).unwrap().oper_mode(), PortMode::Access);

    net.connect(a, b).unwrap();
    // dynamic auto on both ends never forms a trunk
    assert_eq!(net.port(a).unwrap().oper_mode(), PortMode::Access);
    assert_eq!(net.port(b).unwrap().oper_mode(), PortMode::Access);

    net.set_port_mode(a, PortMode::Dynamic, DtpMode::DynamicDesirable)
        .unwrap();
    assert_eq!(net.port(a).unwrap().oper_mode(), PortMode::Trunk);
    assert_eq!(net.port(b).unwrap().oper_mode(), PortMode::Trunk);

    net.set_port_mode(a, PortMode::Access, DtpMode::None).unwrap();
    assert_eq!(net.port(a).unwrap().oper_mode(), PortMode::Access);
    assert_eq!(net.port(b).unwrap().oper_mode(), PortMode::Access);

    net.set_port_mode(a, PortMode::Trunk, DtpMode::None).unwrap();
    assert_eq!(net.port(b).unwrap().oper_mode(), PortMode::Trunk);

    // renegotiated when the cable is unplugged
    net.disconnect(a).unwrap();
    assert_eq!(net.port(b).unwrap().oper_mode(), PortMode::Access);
    assert_eq!(net.port(a).unwrap().oper_mode(), PortMode::Trunk);
}

#[test]
fn routed_port_requires_layer3() {
    let mut net = Network::default();
    let s1 = net.add_l2_switch("S1");
    let pc = net.add_pc("PC");
    assert!(net
        .set_port_mode(PortRef::new(s1, 0), PortMode::Routed, DtpMode::None)
        .is_err());
    assert!(net
        .set_port_mode(PortRef::new(pc, 0), PortMode::Trunk, DtpMode::None)
        .is_err());
}

#[test]
fn vlan_isolation() {
    let mut net = Network::default();
    let sw = net.add_l2_switch("S1");
    let pc1 = add_host(&mut net, "PC1", PortRef::new(sw, 0), "192.168.1.1/24", None);
    let pc2 = add_host(&mut net, "PC2", PortRef::new(sw, 1), "192.168.1.2/24", None);
    net.set_access_vlan(PortRef::new(sw, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(sw, 1), 20).unwrap();

    let result = net.resolve_connectivity(pc1, ip("192.168.1.2")).unwrap();
    assert!(!result.reachable);
    assert_eq!(result.errors, vec![SimError::DestinationUnreachable]);
    assert_eq!(result.success_rate(), 0);
    assert!(net.traceroute(pc1, ip("192.168.1.2")).unwrap().is_empty());

    net.set_access_vlan(PortRef::new(sw, 1), 10).unwrap();
    let result = net.resolve_connectivity(pc1, ip("192.168.1.2")).unwrap();
    assert!(result.reachable);
    assert_eq!(result.hops, vec![pc1, sw, pc2]);
}

#[test]
fn suspended_vlan_drops_frames() {
    let mut net = Network::default();
    let sw = net.add_l2_switch("S1");
    let pc1 = add_host(&mut net, "PC1", PortRef::new(sw, 0), "192.168.1.1/24", None);
    add_host(&mut net, "PC2", PortRef::new(sw, 1), "192.168.1.2/24", None);
    net.set_access_vlan(PortRef::new(sw, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(sw, 1), 10).unwrap();
    assert!(net.ping(pc1, ip("192.168.1.2")).unwrap().reachable);

    let mut vlan = Vlan::named(10, "users");
    vlan.state = crate::device::VlanState::Suspended;
    net.set_vlan(sw, 10, Some(vlan)).unwrap();
    assert!(!net.ping(pc1, ip("192.168.1.2")).unwrap().reachable);
}

#[test]
fn trunk_allowed_vlans() {
    let mut net = Network::default();
    let s1 = net.add_l2_switch("S1");
    let s2 = net.add_l2_switch("S2");
    let a = PortRef::new(s1, 24);
    net.connect(a, PortRef::new(s2, 24)).unwrap();
    net.set_port_mode(a, PortMode::Trunk, DtpMode::None).unwrap();

    let pc1 = add_host(&mut net, "PC1", PortRef::new(s1, 0), "10.0.10.1/24", None);
    let pc2 = add_host(&mut net, "PC2", PortRef::new(s2, 0), "10.0.10.2/24", None);
    net.set_access_vlan(PortRef::new(s1, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(s2, 0), 10).unwrap();

    assert_eq!(
        net.traceroute(pc1, ip("10.0.10.2")).unwrap(),
        vec![pc1, s1, s2, pc2]
    );

    net.set_trunk_allowed_vlans(a, Some([1, 20].into_iter().collect()))
        .unwrap();
    assert!(net.traceroute(pc1, ip("10.0.10.2")).unwrap().is_empty());

    net.set_trunk_allowed_vlans(a, None).unwrap();
    assert!(!net.traceroute(pc1, ip("10.0.10.2")).unwrap().is_empty());
}

#[test]
fn mac_addresses_learned_on_ping() {
    let mut net = Network::default();
    let sw = net.add_l2_switch("S1");
    let pc1 = add_host(&mut net, "PC1", PortRef::new(sw, 0), "192.168.1.1/24", None);
    add_host(&mut net, "PC2", PortRef::new(sw, 1), "192.168.1.2/24", None);

    let result = net.ping(pc1, ip("192.168.1.2")).unwrap();
    assert_eq!(result.mac_side_effects.len(), 1);
    let (device, entry) = result.mac_side_effects[0];
    assert_eq!(device, sw);
    assert_eq!(entry.vlan, 1);
    assert_eq!(entry.port, crate::types::PortId::new(0));

    let bridge = net.get_device(sw).unwrap().bridge().unwrap();
    assert_eq!(bridge.lookup_mac(1, entry.mac), Some(entry.port));

    // flushed when the PC is removed
    net.remove_device(pc1).unwrap();
    let bridge = net.get_device(sw).unwrap().bridge().unwrap();
    assert!(bridge.mac_table.is_empty());
}

/// Three switches in a triangle:
///
/// ```text
///     S1
///    /  \
///  S2 -- S3
/// ```
fn triangle() -> (Network, [crate::types::DeviceId; 3]) {
    let mut net = Network::default();
    let s1 = net.add_l2_switch("S1");
    let s2 = net.add_l2_switch("S2");
    let s3 = net.add_l2_switch("S3");
    net.connect(PortRef::new(s1, 24), PortRef::new(s2, 24)).unwrap();
    net.connect(PortRef::new(s2, 25), PortRef::new(s3, 24)).unwrap();
    net.connect(PortRef::new(s3, 25), PortRef::new(s1, 25)).unwrap();
    (net, [s1, s2, s3])
}

fn blocking_ports(net: &Network, vlan: u16) -> Vec<PortRef> {
    let mut result = Vec::new();
    for d in net.device_ids() {
        if let Ok(instance) = net.spanning_tree(d, vlan) {
            for (p, s) in instance.ports.iter() {
                if s.state == StpPortState::Blocking {
                    result.push(PortRef::new(d, *p));
                }
            }
        }
    }
    result
}

/// Returns `true` if the cables forwarding in `vlan` on both ends form a cycle. Members of the
/// same bundle count as a single link.
fn forwarding_cycle(net: &Network, vlan: u16) -> bool {
    let forwarding = |p: PortRef| {
        net.spanning_tree(p.device, vlan)
            .ok()
            .and_then(|i| i.ports.get(&p.port))
            .map(|s| s.state == StpPortState::Forwarding)
            .unwrap_or(false)
    };
    let logical = |p: PortRef| -> Option<(DeviceId, InterfaceId)> {
        let eff = net.get_device(p.device).ok()?.effective_port(p.port)?;
        Some((p.device, eff.logical()))
    };
    let links: BTreeSet<_> = net
        .connections()
        .filter(|(_, c)| c.is_up())
        .filter(|(_, c)| c.endpoints().into_iter().all(forwarding))
        .filter_map(|(_, c)| {
            let [a, b] = c.endpoints();
            let (a, b) = (logical(a)?, logical(b)?);
            Some(if a < b { (a, b) } else { (b, a) })
        })
        .collect();
    let size = net.device_ids().iter().map(|d| d.index() + 1).max().unwrap_or(0);
    let mut components = UnionFind::<usize>::new(size);
    links
        .into_iter()
        .any(|((a, _), (b, _))| !components.union(a.index(), b.index()))
}

#[test]
fn stp_breaks_loop() {
    let (net, [s1, s2, s3]) = triangle();

    // lowest bridge id wins with equal priorities
    let root = net.spanning_tree(s1, 1).unwrap();
    assert_eq!(root.root, root.bridge);
    assert_eq!(root.root_port, None);
    assert_eq!(root.root_cost, 0);

    let i2 = net.spanning_tree(s2, 1).unwrap();
    assert_eq!(i2.root, root.bridge);
    assert_eq!(i2.root_port, Some(crate::types::PortId::new(24)));
    assert_eq!(i2.root_cost, 4);

    // the link S2 -- S3 is blocked on S3, which has the higher bridge id
    assert_eq!(blocking_ports(&net, 1), vec![PortRef::new(s3, 24)]);
    let i3 = net.spanning_tree(s3, 1).unwrap();
    assert_eq!(
        i3.ports[&crate::types::PortId::new(24)].role,
        StpPortRole::Alternate
    );
    assert_eq!(
        net.spanning_tree(s2, 1).unwrap().ports[&crate::types::PortId::new(25)].role,
        StpPortRole::Designated
    );

    assert_eq!(
        net.spanning_tree(s1, 99),
        Err(SimError::NoSpanningTreeInstance(99))
    );
}

#[test]
fn stp_root_priority() {
    let (mut net, [s1, s2, s3]) = triangle();
    net.set_stp_priority(s3, 1, Some(StpPriority::RootPrimary))
        .unwrap();
    let i3 = net.spanning_tree(s3, 1).unwrap();
    assert_eq!(i3.root, i3.bridge);
    assert_eq!(net.spanning_tree(s1, 1).unwrap().root, i3.bridge);

    // S1 -- S2 is now the redundant link, blocked on S2
    assert_eq!(blocking_ports(&net, 1), vec![PortRef::new(s2, 24)]);
}

#[test]
fn stp_forwarding_path_is_loop_free() {
    let (mut net, [s1, s2, s3]) = triangle();
    let pc1 = add_host(&mut net, "PC1", PortRef::new(s2, 0), "10.0.0.1/24", None);
    let pc2 = add_host(&mut net, "PC2", PortRef::new(s3, 0), "10.0.0.2/24", None);

    // the direct link S2 -- S3 is blocked, so the frame travels over the root bridge
    assert_eq!(
        net.traceroute(pc1, ip("10.0.0.2")).unwrap(),
        vec![pc1, s2, s1, s3, pc2]
    );

    // a link failure re-converges the tree
    let (c, _) = net.get_connection(PortRef::new(s1, 25)).unwrap();
    net.set_connection_status(c, crate::types::LinkStatus::Down)
        .unwrap();
    assert!(blocking_ports(&net, 1).is_empty());
    assert_eq!(
        net.traceroute(pc1, ip("10.0.0.2")).unwrap(),
        vec![pc1, s2, s3, pc2]
    );
}

#[test]
fn etherchannel_members_inherit_bundle() {
    let mut net = Network::default();
    let s1 = net.add_l2_switch("S1");
    let s2 = net.add_l2_switch("S2");
    for p in [24, 25] {
        net.connect(PortRef::new(s1, p), PortRef::new(s2, p)).unwrap();
    }
    for s in [s1, s2] {
        net.set_ether_channel(s, 1, Some(EtherChannel::trunk(1, [1, 10])))
            .unwrap();
        for p in [24, 25] {
            net.set_channel_group(PortRef::new(s, p), Some(1)).unwrap();
        }
    }

    let pc1 = add_host(&mut net, "PC1", PortRef::new(s1, 0), "10.0.10.1/24", None);
    let pc2 = add_host(&mut net, "PC2", PortRef::new(s2, 0), "10.0.10.2/24", None);
    let pc3 = add_host(&mut net, "PC3", PortRef::new(s1, 1), "10.0.20.1/24", None);
    add_host(&mut net, "PC4", PortRef::new(s2, 1), "10.0.20.2/24", None);
    net.set_access_vlan(PortRef::new(s1, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(s2, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(s1, 1), 20).unwrap();
    net.set_access_vlan(PortRef::new(s2, 1), 20).unwrap();

    // the physical ports carry no VLAN configuration of their own
    let member = net.port(PortRef::new(s1, 24)).unwrap();
    assert_eq!(member.allowed_vlans, None);
    assert_eq!(member.channel_group, Some(1));

    // both members forward: the bundle is a single logical link
    assert!(blocking_ports(&net, 10).is_empty());
    let i2 = net.spanning_tree(s2, 10).unwrap();
    for p in [24, 25] {
        assert_eq!(
            i2.ports[&crate::types::PortId::new(p)].state,
            StpPortState::Forwarding
        );
    }

    assert_eq!(
        net.traceroute(pc1, ip("10.0.10.2")).unwrap(),
        vec![pc1, s1, s2, pc2]
    );
    // VLAN 20 is not allowed on the bundle
    assert!(net.traceroute(pc3, ip("10.0.20.2")).unwrap().is_empty());
}

#[test]
fn mismatched_bundle_is_err_disabled() {
    let mut net = Network::default();
    let s1 = net.add_l2_switch("S1");
    let s2 = net.add_l2_switch("S2");
    for p in [24, 25] {
        net.connect(PortRef::new(s1, p), PortRef::new(s2, p)).unwrap();
    }
    // only S1 bundles the two cables
    net.set_ether_channel(s1, 1, Some(EtherChannel::trunk(1, [1])))
        .unwrap();
    for p in [24, 25] {
        net.set_channel_group(PortRef::new(s1, p), Some(1)).unwrap();
    }

    let i1 = net.spanning_tree(s1, 1).unwrap();
    for p in [24, 25] {
        let port = &i1.ports[&crate::types::PortId::new(p)];
        assert_eq!(port.state, StpPortState::Disabled);
        assert_eq!(port.role, StpPortRole::Disabled);
    }
    assert!(!forwarding_cycle(&net, 1));

    // bundling the other side as well brings the link up
    net.set_ether_channel(s2, 1, Some(EtherChannel::trunk(1, [1])))
        .unwrap();
    for p in [24, 25] {
        net.set_channel_group(PortRef::new(s2, p), Some(1)).unwrap();
    }
    let i1 = net.spanning_tree(s1, 1).unwrap();
    for p in [24, 25] {
        assert_eq!(
            i1.ports[&crate::types::PortId::new(p)].state,
            StpPortState::Forwarding
        );
    }
    assert!(!forwarding_cycle(&net, 1));
}

#[test]
fn full_mesh_is_loop_free() {
    let mut net = Network::default();
    let switches: Vec<DeviceId> = (0..5)
        .map(|i| net.add_l2_switch(format!("S{i}")))
        .collect();
    for i in 0..5 {
        for j in (i + 1)..5 {
            net.connect(
                PortRef::new(switches[i], j),
                PortRef::new(switches[j], i),
            )
            .unwrap();
        }
    }
    // parallel cable between S0 and S1
    net.connect(
        PortRef::new(switches[0], 10),
        PortRef::new(switches[1], 10),
    )
    .unwrap();

    // 11 cables, 4 of them form the tree
    assert_eq!(blocking_ports(&net, 1).len(), 7);
    assert!(!forwarding_cycle(&net, 1));
}
