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

//! Test the connectivity resolver: routed legs, access lists, ARP and the reported failures.

use maplit::hashmap;
use pretty_assertions::assert_eq;
use test_log::test;

use crate::{
    acl::{AccessList, AclEntryBuilder, AclKind},
    config::{ConfigExpr, NetworkConfig},
    hsrp::{HsrpGroup, HsrpRole},
    network::Network,
    port::{AclDirection, DtpMode, PortMode},
    router::Svi,
    test::{add_host, ip, prefix, routed},
    types::{InterfaceId, PortRef, SimError},
};

/// Two PCs with a /8 mask on both sides of a layer-3 switch with two routed ports.
fn acl_network() -> (Network, [crate::types::DeviceId; 3]) {
    let mut net = Network::default();
    let r = net.add_l3_switch("R1");
    let pc1 = add_host(
        &mut net,
        "PC1",
        PortRef::new(r, 0),
        "10.1.1.1/8",
        Some("10.1.1.254"),
    );
    let pc2 = add_host(
        &mut net,
        "PC2",
        PortRef::new(r, 1),
        "10.2.2.1/8",
        Some("10.2.2.254"),
    );
    routed(&mut net, PortRef::new(r, 0), "10.1.1.254/24");
    routed(&mut net, PortRef::new(r, 1), "10.2.2.254/24");
    (net, [pc1, r, pc2])
}

#[test]
fn acl_blocks_reachability() {
    let (mut net, [pc1, r, pc2]) = acl_network();

    let result = net.resolve_connectivity(pc1, ip("10.2.2.1")).unwrap();
    assert!(result.reachable);
    assert_eq!(result.hops, vec![pc1, r, pc2]);

    let deny_all = AccessList::with_entries(
        "BLOCK",
        AclKind::Extended,
        [AclEntryBuilder::new().sequence(10).deny().build()],
    );
    net.set_access_list(r, "BLOCK", Some(deny_all)).unwrap();
    net.set_access_group(
        r,
        InterfaceId::Port(0.into()),
        AclDirection::In,
        Some("BLOCK".to_string()),
    )
    .unwrap();

    let result = net.resolve_connectivity(pc1, ip("10.2.2.1")).unwrap();
    assert!(!result.reachable);
    assert!(result.hops.is_empty());
    assert_eq!(
        result.errors,
        vec![SimError::DestinationUnreachable, SimError::AclDenied]
    );

    // the other direction is not filtered inbound on the second port
    assert!(net.resolve_connectivity(pc2, ip("10.2.2.254")).unwrap().reachable);
}

#[test]
fn acl_permits_selected_traffic() {
    let (mut net, [pc1, r, _]) = acl_network();
    let acl = AccessList::with_entries(
        "101",
        AclKind::Extended,
        [
            AclEntryBuilder::new()
                .sequence(10)
                .deny()
                .source_host(ip("10.1.1.1"))
                .destination_host(ip("10.2.2.1"))
                .build(),
            AclEntryBuilder::new().sequence(20).permit().build(),
        ],
    );
    net.set_access_list(r, "101", Some(acl)).unwrap();
    net.set_access_group(
        r,
        InterfaceId::Port(1.into()),
        AclDirection::Out,
        Some("101".to_string()),
    )
    .unwrap();

    assert!(!net.resolve_connectivity(pc1, ip("10.2.2.1")).unwrap().reachable);
    // the router itself is not affected
    assert!(net.resolve_connectivity(pc1, ip("10.2.2.254")).unwrap().reachable);

    // an undefined access list permits everything
    net.set_access_list(r, "101", None).unwrap();
    assert!(net.resolve_connectivity(pc1, ip("10.2.2.1")).unwrap().reachable);
}

#[test]
fn arp_first_touch() {
    let mut net = Network::default();
    let r = net.add_l3_switch("R1");
    let pc = add_host(&mut net, "PC1", PortRef::new(r, 0), "192.168.1.1/24", None);
    routed(&mut net, PortRef::new(r, 0), "192.168.1.254/24");

    let first = net.ping(r, ip("192.168.1.1")).unwrap();
    assert!(first.reachable);
    assert_eq!(first.hops, vec![r, pc]);
    assert_eq!(first.successes(), 4);
    assert_eq!(first.success_rate(), 80);
    assert_eq!(first.rtt_samples[0], None);
    assert_eq!(first.arp_side_effects.len(), 1);

    let entry = net.get_device(r).unwrap().router().unwrap().arp_cache[&ip("192.168.1.1")];
    assert_eq!(entry.interface, InterfaceId::Port(0.into()));
    assert!(entry.mac.belongs_to(pc));

    let second = net.ping(r, ip("192.168.1.1")).unwrap();
    assert_eq!(second.successes(), 5);
    assert_eq!(second.success_rate(), 100);
    assert!(second.arp_side_effects.is_empty());

    // resolving does not modify the network
    let mut fresh = Network::default();
    let r = fresh.add_l3_switch("R1");
    add_host(&mut fresh, "PC1", PortRef::new(r, 0), "192.168.1.1/24", None);
    routed(&mut fresh, PortRef::new(r, 0), "192.168.1.254/24");
    for _ in 0..2 {
        let result = fresh.resolve_connectivity(r, ip("192.168.1.1")).unwrap();
        assert_eq!(result.successes(), 4);
    }
}

#[test]
fn failure_taxonomy() {
    let mut net = Network::default();
    let sw = net.add_l2_switch("S1");
    let pc1 = add_host(&mut net, "PC1", PortRef::new(sw, 0), "192.168.1.1/24", None);
    let pc2 = net.add_pc("PC2");
    net.connect(PortRef::new(pc2, 0), PortRef::new(sw, 1)).unwrap();

    let errors = |net: &Network, src, dst: &str| {
        net.resolve_connectivity(src, ip(dst)).unwrap().errors
    };

    // no address
    assert_eq!(errors(&net, pc2, "192.168.1.1"), vec![SimError::NoIpAddress]);
    assert_eq!(errors(&net, sw, "192.168.1.1"), vec![SimError::NoIpAddress]);
    // no default gateway
    assert_eq!(errors(&net, pc1, "10.0.0.1"), vec![SimError::NoGateway]);
    // gateway outside of the subnet
    net.set_default_gateway(pc1, Some(ip("10.0.0.254"))).unwrap();
    assert_eq!(
        errors(&net, pc1, "10.0.0.1"),
        vec![SimError::GatewayUnreachable]
    );
    // gateway does not exist
    net.set_default_gateway(pc1, Some(ip("192.168.1.254"))).unwrap();
    assert_eq!(
        errors(&net, pc1, "10.0.0.1"),
        vec![SimError::GatewayUnreachable]
    );
    // nobody uses the address
    assert_eq!(
        errors(&net, pc1, "192.168.1.99"),
        vec![SimError::DestinationUnreachable]
    );
    // sending to itself
    let result = net.resolve_connectivity(pc1, ip("192.168.1.1")).unwrap();
    assert!(result.reachable);
    assert_eq!(result.hops, vec![pc1]);

    assert!(net.resolve_connectivity(99.into(), ip("192.168.1.1")).is_err());
}

/// Two VLANs routed by the SVIs of a multilayer switch, behind an access switch connected with a
/// trunk.
#[test]
fn inter_vlan_routing() {
    let mut net = Network::default();
    let d1 = net.add_l3_switch("D1");
    let s1 = net.add_l2_switch("S1");
    let trunk = PortRef::new(d1, 0);
    net.connect(trunk, PortRef::new(s1, 24)).unwrap();
    net.set_port_mode(trunk, PortMode::Trunk, DtpMode::None)
        .unwrap();

    let pc10 = add_host(
        &mut net,
        "PC10",
        PortRef::new(s1, 0),
        "10.0.10.1/24",
        Some("10.0.10.254"),
    );
    let pc20 = add_host(
        &mut net,
        "PC20",
        PortRef::new(s1, 1),
        "10.0.20.1/24",
        Some("10.0.20.254"),
    );
    net.set_access_vlan(PortRef::new(s1, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(s1, 1), 20).unwrap();

    // without SVIs, the gateway is unknown
    assert_eq!(
        net.resolve_connectivity(pc10, ip("10.0.20.1")).unwrap().errors,
        vec![SimError::GatewayUnreachable]
    );

    for (vlan, addr) in [(10, "10.0.10.254/24"), (20, "10.0.20.254/24")] {
        net.set_vlan(d1, vlan, Some(crate::device::Vlan::new(vlan)))
            .unwrap();
        net.set_svi(d1, vlan, Some(Svi::new(vlan, Some(prefix(addr)))))
            .unwrap();
    }

    let result = net.resolve_connectivity(pc10, ip("10.0.20.1")).unwrap();
    assert!(result.reachable);
    assert_eq!(result.hops, vec![pc10, s1, d1, s1, pc20]);
    assert_eq!(result.rtt_samples, vec![Some(5); 5]);

    // shutting down the SVI of VLAN 20 breaks the second leg
    let mut svi = Svi::new(20, Some(prefix("10.0.20.254/24")));
    svi.shutdown = true;
    net.set_svi(d1, 20, Some(svi)).unwrap();
    assert_eq!(
        net.resolve_connectivity(pc10, ip("10.0.20.1")).unwrap().errors,
        vec![SimError::DestinationUnreachable]
    );
}

/// Two multilayer switches sharing VLAN 10 on a trunk, running HSRP group 10 on their SVIs.
fn hsrp_network() -> (Network, [crate::types::DeviceId; 3]) {
    let mut net = Network::default();
    let d1 = net.add_l3_switch("D1");
    let d2 = net.add_l3_switch("D2");
    let trunk = PortRef::new(d1, 23);
    net.connect(trunk, PortRef::new(d2, 23)).unwrap();
    net.set_port_mode(trunk, PortMode::Trunk, DtpMode::None)
        .unwrap();
    let pc = add_host(
        &mut net,
        "PC1",
        PortRef::new(d1, 0),
        "10.0.10.10/24",
        Some("10.0.10.1"),
    );
    net.set_access_vlan(PortRef::new(d1, 0), 10).unwrap();
    net.set_vlan(d2, 10, Some(crate::device::Vlan::new(10)))
        .unwrap();

    let iface = InterfaceId::Svi(10);
    for (d, addr, prio) in [(d1, "10.0.10.2/24", 110), (d2, "10.0.10.3/24", 90)] {
        net.set_svi(d, 10, Some(Svi::new(10, Some(prefix(addr)))))
            .unwrap();
        net.set_hsrp_group(
            d,
            iface,
            10,
            Some(
                HsrpGroup::new(10, iface, Some(ip("10.0.10.1")))
                    .priority(prio)
                    .preempt(),
            ),
        )
        .unwrap();
    }
    (net, [pc, d1, d2])
}

#[test]
fn hsrp_election() {
    let (mut net, [pc, d1, d2]) = hsrp_network();
    let svi = InterfaceId::Svi(10);
    assert_eq!(
        net.hsrp_roles(10).unwrap(),
        hashmap! {(d1, svi) => HsrpRole::Active, (d2, svi) => HsrpRole::Standby}
    );
    assert_eq!(net.hsrp_roles(20), Err(SimError::NoHsrpConfigured(20)));
    assert_eq!(net.recompute_hsrp(20), Err(SimError::NoHsrpConfigured(20)));

    // the virtual address is answered by the active router
    assert_eq!(net.traceroute(pc, ip("10.0.10.1")).unwrap(), vec![pc, d1]);

    // lower the priority of D1: D2 takes over
    net.set_hsrp_group(
        d1,
        svi,
        10,
        Some(
            HsrpGroup::new(10, svi, Some(ip("10.0.10.1")))
                .priority(80)
                .preempt(),
        ),
    )
    .unwrap();
    assert_eq!(
        net.hsrp_roles(10).unwrap(),
        hashmap! {(d1, svi) => HsrpRole::Standby, (d2, svi) => HsrpRole::Active}
    );
    assert_eq!(
        net.traceroute(pc, ip("10.0.10.1")).unwrap(),
        vec![pc, d1, d2]
    );

    // removing the active router makes the standby active
    net.remove_device(d2).unwrap();
    assert_eq!(
        net.hsrp_roles(10).unwrap(),
        hashmap! {(d1, svi) => HsrpRole::Active}
    );
}

#[test]
fn hsrp_group_number_reused_per_interface() {
    let mut net = Network::default();
    let d1 = net.add_l3_switch("D1");
    let pc10 = add_host(
        &mut net,
        "PC10",
        PortRef::new(d1, 0),
        "10.0.10.10/24",
        Some("10.0.10.1"),
    );
    let pc20 = add_host(
        &mut net,
        "PC20",
        PortRef::new(d1, 1),
        "10.0.20.10/24",
        Some("10.0.20.1"),
    );
    net.set_access_vlan(PortRef::new(d1, 0), 10).unwrap();
    net.set_access_vlan(PortRef::new(d1, 1), 20).unwrap();
    for (vlan, addr, vip) in [
        (10, "10.0.10.2/24", "10.0.10.1"),
        (20, "10.0.20.2/24", "10.0.20.1"),
    ] {
        let iface = InterfaceId::Svi(vlan);
        net.set_svi(d1, vlan, Some(Svi::new(vlan, Some(prefix(addr)))))
            .unwrap();
        net.set_hsrp_group(d1, iface, 1, Some(HsrpGroup::new(1, iface, Some(ip(vip)))))
            .unwrap();
    }

    let router = net.get_device(d1).unwrap().router().unwrap();
    assert_eq!(router.hsrp.len(), 2);
    assert_eq!(
        router
            .hsrp_group(InterfaceId::Svi(10), 1)
            .and_then(|g| g.virtual_ip),
        Some(ip("10.0.10.1"))
    );
    assert_eq!(
        net.hsrp_roles(1).unwrap(),
        hashmap! {
            (d1, InterfaceId::Svi(10)) => HsrpRole::Active,
            (d1, InterfaceId::Svi(20)) => HsrpRole::Active,
        }
    );
    assert!(net.resolve_connectivity(pc10, ip("10.0.10.1")).unwrap().reachable);
    assert!(net.resolve_connectivity(pc20, ip("10.0.20.1")).unwrap().reachable);

    // the configuration keeps both groups apart
    let config = net.get_config().unwrap();
    assert_eq!(
        config
            .iter()
            .filter(|e| matches!(e, ConfigExpr::HsrpGroup { .. }))
            .count(),
        2
    );
}
