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

//! Test the configuration interface of the network.

use pretty_assertions::assert_eq;
use test_log::test;

use crate::{
    acl::{AccessList, AclEntryBuilder, AclKind},
    config::{Config, ConfigExpr, ConfigExprKey, ConfigModifier, ConfigPatch, NetworkConfig},
    device::Vlan,
    network::Network,
    port::AclDirection,
    router::{OspfConfig, OspfNetwork, StaticRoute, Svi},
    test::{ip, prefix, routed_chain},
    types::{ConfigError, DeviceId, InterfaceId, NetworkError, PortRef},
};

/// Same devices and cables as [`routed_chain`], without any configuration.
fn bare_chain() -> (Network, [DeviceId; 5]) {
    let mut net = Network::default();
    let r1 = net.add_l3_switch("R1");
    let r2 = net.add_l3_switch("R2");
    let r3 = net.add_l3_switch("R3");
    net.connect(PortRef::new(r1, 0), PortRef::new(r2, 0)).unwrap();
    net.connect(PortRef::new(r2, 1), PortRef::new(r3, 0)).unwrap();
    let pc1 = net.add_pc("PC1");
    net.connect(PortRef::new(pc1, 0), PortRef::new(r1, 1)).unwrap();
    let pc3 = net.add_pc("PC3");
    net.connect(PortRef::new(pc3, 0), PortRef::new(r3, 1)).unwrap();
    (net, [pc1, r1, r2, r3, pc3])
}

/// Routed chain running OSPF, with an SVI on R2 that filters inbound traffic.
fn configured_chain() -> (Network, [DeviceId; 5]) {
    let (mut net, ids @ [_, r1, r2, r3, _]) = routed_chain();
    for r in [r1, r2, r3] {
        let mut ospf = OspfConfig::new(1);
        ospf.networks.push(OspfNetwork::new(prefix("0.0.0.0/0"), 0));
        net.set_ospf(r, Some(ospf)).unwrap();
    }
    net.set_vlan(r2, 10, Some(Vlan::named(10, "mgmt"))).unwrap();
    net.set_svi(r2, 10, Some(Svi::new(10, Some(prefix("10.0.10.2/24")))))
        .unwrap();
    let acl = AccessList::with_entries(
        "MGMT",
        AclKind::Standard,
        [AclEntryBuilder::new()
            .sequence(10)
            .permit()
            .source_host(ip("192.168.1.1"))
            .build()],
    );
    net.set_access_list(r2, "MGMT", Some(acl)).unwrap();
    net.set_access_group(
        r2,
        InterfaceId::Svi(10),
        AclDirection::In,
        Some("MGMT".to_string()),
    )
    .unwrap();
    (net, ids)
}

#[test]
fn running_config() {
    let (net, [pc1, r1, _, _, pc3]) = routed_chain();
    let c = net.get_config().unwrap();
    // 6 routed ports with mode and address, 2 PCs with address and gateway
    assert_eq!(c.len(), 16);
    assert_eq!(
        c.get(&ConfigExprKey::PortAddress {
            port: PortRef::new(r1, 0)
        }),
        Some(&ConfigExpr::PortAddress {
            port: PortRef::new(r1, 0),
            address: prefix("10.0.12.1/24"),
        })
    );
    assert_eq!(
        c.get(&ConfigExprKey::DefaultGateway { device: pc1 }),
        Some(&ConfigExpr::DefaultGateway {
            device: pc1,
            gateway: ip("192.168.1.254"),
        })
    );
    assert!(c.iter().filter(|e| e.device() == pc3).count() == 2);
    // the default VLAN is not part of the configuration
    assert!(c.iter().all(|e| !matches!(e, ConfigExpr::Vlan { .. })));

    let (bare, _) = bare_chain();
    assert!(bare.get_config().unwrap().is_empty());
}

#[test]
fn access_groups_are_separate_expressions() {
    let (net, [_, _, r2, _, _]) = configured_chain();
    let c = net.get_config().unwrap();
    assert_eq!(
        c.get(&ConfigExprKey::Svi {
            device: r2,
            vlan: 10
        }),
        Some(&ConfigExpr::Svi {
            device: r2,
            svi: Svi::new(10, Some(prefix("10.0.10.2/24"))),
        })
    );
    assert_eq!(
        c.get(&ConfigExprKey::AccessGroup {
            device: r2,
            iface: InterfaceId::Svi(10),
            direction: AclDirection::In,
        }),
        Some(&ConfigExpr::AccessGroup {
            device: r2,
            iface: InterfaceId::Svi(10),
            direction: AclDirection::In,
            acl: "MGMT".to_string(),
        })
    );
}

#[test]
fn transfer_config() {
    let (a, [pc1, _, _, _, pc3]) = configured_chain();
    let (mut b, _) = bare_chain();
    let config = a.get_config().unwrap();
    b.set_config(&config).unwrap();
    assert_eq!(b.get_config().unwrap(), config);
    assert_eq!(
        b.traceroute(pc1, ip("192.168.3.1")).unwrap(),
        a.traceroute(pc1, ip("192.168.3.1")).unwrap()
    );
    assert_eq!(
        b.traceroute(pc3, ip("192.168.1.1")).unwrap(),
        a.traceroute(pc3, ip("192.168.1.1")).unwrap()
    );

    // and back to the factory defaults
    b.set_config(&Config::new()).unwrap();
    assert!(b.get_config().unwrap().is_empty());
    assert!(b.traceroute(pc1, ip("192.168.3.1")).unwrap().is_empty());
}

#[test]
fn modifiers() {
    let (mut net, [pc1, r1, _, _, pc3]) = routed_chain();
    let dst = prefix("192.168.3.0/24");
    let route = ConfigModifier::Insert(ConfigExpr::StaticRoute {
        device: r1,
        route: StaticRoute::via(dst, ip("10.0.12.2")),
    });
    assert!(net.can_apply_modifier(&route));
    net.apply_modifier(&route).unwrap();
    assert_eq!(
        net.get_device(r1)
            .unwrap()
            .router()
            .unwrap()
            .get_static_route(dst),
        Some(&StaticRoute::via(dst, ip("10.0.12.2")))
    );

    // inserting twice is not possible
    assert!(!net.can_apply_modifier(&route));
    assert_eq!(
        net.apply_modifier(&route),
        Err(NetworkError::ConfigError(ConfigError::ConfigModifier))
    );

    net.apply_modifier(&route.clone().reverse()).unwrap();
    assert!(net
        .get_device(r1)
        .unwrap()
        .router()
        .unwrap()
        .static_routes
        .is_empty());

    // removing an expression with a different value fails
    let wrong = ConfigModifier::Remove(ConfigExpr::HostAddress {
        device: pc3,
        address: prefix("192.168.3.99/24"),
    });
    assert_eq!(
        net.apply_modifier(&wrong),
        Err(NetworkError::ConfigError(ConfigError::ConfigModifier))
    );

    // updating the address of PC1
    let update = ConfigModifier::Update {
        from: ConfigExpr::HostAddress {
            device: pc1,
            address: prefix("192.168.1.1/24"),
        },
        to: ConfigExpr::HostAddress {
            device: pc1,
            address: prefix("192.168.1.2/24"),
        },
    };
    net.apply_modifier(&update).unwrap();
    assert_eq!(
        net.get_device(pc1).unwrap().host().unwrap().address,
        Some(prefix("192.168.1.2/24"))
    );
}

#[test]
fn patches() {
    let (mut net, [pc1, r1, r2, r3, pc3]) = routed_chain();
    let dst = prefix("192.168.3.0/24");
    let mut patch = ConfigPatch::new();
    patch.add(ConfigModifier::Insert(ConfigExpr::StaticRoute {
        device: r1,
        route: StaticRoute::via(dst, ip("10.0.12.2")),
    }));
    patch.add(ConfigModifier::Insert(ConfigExpr::StaticRoute {
        device: r2,
        route: StaticRoute::via(dst, ip("10.0.23.3")),
    }));
    net.apply_patch(&patch).unwrap();
    assert_eq!(
        net.traceroute(pc1, ip("192.168.3.1")).unwrap(),
        vec![pc1, r1, r2, r3, pc3]
    );
    assert_eq!(net.get_config().unwrap().len(), 18);
}
