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

//! # Layer-2 frame semantics
//!
//! This module defines how a frame leaves a port (VLAN encoding), how it is received on the peer
//! port (VLAN decoding), and which gates (spanning tree, access lists) it must pass on the way.
//! Spanning tree, route propagation and the connectivity resolver all use these functions, such
//! that they agree on what it means for two interfaces to share a broadcast domain.

use std::collections::{HashSet, VecDeque};

use crate::{
    acl::Packet,
    device::{Device, EffectivePort},
    network::Network,
    port::{allowed, PortMode},
    stp::StpPortState,
    types::{DeviceId, InterfaceId, PortId, PortRef, VlanId, NATIVE_VLAN},
};

/// VLAN tag of a frame on a cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// No 802.1Q header
    Untagged,
    /// 802.1Q header with the VLAN id
    Tagged(VlanId),
}

/// Encode a frame with VLAN context `ctx` for sending out of `port`. Returns `None` if the port
/// does not send the frame at all.
pub fn egress(device: &Device, port: &EffectivePort<'_>, ctx: Option<VlanId>) -> Option<Tag> {
    if device.is_pc() {
        return ctx.is_none().then_some(Tag::Untagged);
    }
    match (port.mode, ctx) {
        (PortMode::Routed, None) => Some(Tag::Untagged),
        (PortMode::Access | PortMode::Dynamic, Some(v)) if v == port.vlan => Some(Tag::Untagged),
        (PortMode::Trunk, Some(v)) if allowed(port.allowed_vlans, v) => {
            if v == NATIVE_VLAN {
                Some(Tag::Untagged)
            } else {
                Some(Tag::Tagged(v))
            }
        }
        _ => None,
    }
}

/// Decode a frame received on `port`. Returns `None` if the frame is dropped, `Some(None)` if the
/// frame is received without VLAN context (routed port or host), and `Some(Some(v))` if it is
/// switched in VLAN `v`.
pub fn ingress(device: &Device, port: &EffectivePort<'_>, tag: Tag) -> Option<Option<VlanId>> {
    if device.is_pc() {
        return (tag == Tag::Untagged).then_some(None);
    }
    match (port.mode, tag) {
        (PortMode::Routed, Tag::Untagged) => Some(None),
        (PortMode::Access | PortMode::Dynamic, Tag::Untagged) => Some(Some(port.vlan)),
        (PortMode::Trunk, Tag::Untagged) => Some(Some(NATIVE_VLAN)),
        (PortMode::Trunk, Tag::Tagged(v)) if allowed(port.allowed_vlans, v) => Some(Some(v)),
        _ => None,
    }
}

/// Returns `true` if the spanning tree lets the port forward frames of VLAN `ctx`. Frames
/// without VLAN context, and ports of devices without a bridge, are never gated.
pub fn stp_forwarding(device: &Device, port: PortId, ctx: Option<VlanId>) -> bool {
    let (bridge, vlan) = match (device.bridge(), ctx) {
        (Some(b), Some(v)) => (b, v),
        _ => return true,
    };
    bridge
        .stp
        .instances
        .get(&vlan)
        .and_then(|i| i.ports.get(&port))
        .map(|p| p.state == StpPortState::Forwarding)
        .unwrap_or(false)
}

/// Evaluate an access list bound to an interface. An unbound or undefined access list permits
/// everything.
pub fn acl_permits(device: &Device, acl: Option<&str>, packet: &Packet) -> bool {
    match acl.and_then(|name| device.bridge().and_then(|b| b.acl(name))) {
        Some(acl) => acl.permits(packet),
        None => true,
    }
}

/// Reason why a frame did not make it across a cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pruned {
    /// The port is down, or not connected
    Link,
    /// The VLAN encoding of the egress port, or the decoding of the ingress port, drops the frame
    Encoding,
    /// One of the two ports is not forwarding in spanning tree
    Stp,
    /// An access list denied the packet
    Acl,
}

/// Which gates are checked when traversing a cable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gates<'p> {
    /// Check the spanning-tree state on both ends
    pub stp: bool,
    /// Evaluate access lists on both ends for this packet
    pub acl: Option<&'p Packet>,
}

impl<'p> Gates<'p> {
    /// Only the VLAN encoding is checked.
    pub const NONE: Gates<'static> = Gates {
        stp: false,
        acl: None,
    };
    /// Encoding and spanning tree are checked.
    pub const STP: Gates<'static> = Gates {
        stp: true,
        acl: None,
    };

    /// Check all gates for a packet.
    pub fn all(packet: &'p Packet) -> Self {
        Self {
            stp: true,
            acl: Some(packet),
        }
    }
}

/// The result of sending a frame over a cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hop {
    /// Port on which the frame was received
    pub ingress: PortRef,
    /// VLAN context after decoding
    pub ctx: Option<VlanId>,
}

/// Send a frame with VLAN context `ctx` out of `port` on `device`, and receive it on the peer.
pub fn traverse(
    net: &Network,
    device: &Device,
    port: PortId,
    ctx: Option<VlanId>,
    gates: Gates<'_>,
) -> Result<Hop, Pruned> {
    let local = device.effective_port(port).ok_or(Pruned::Link)?;
    if !local.up {
        return Err(Pruned::Link);
    }
    let tag = egress(device, &local, ctx).ok_or(Pruned::Encoding)?;
    if gates.stp && !stp_forwarding(device, port, ctx) {
        return Err(Pruned::Stp);
    }
    if let Some(packet) = gates.acl {
        if !acl_permits(device, local.acl_out, packet) {
            return Err(Pruned::Acl);
        }
    }

    let peer = net
        .get_peer(PortRef::new(device.id, port))
        .ok_or(Pruned::Link)?;
    let peer_device = net.get_device(peer.device).map_err(|_| Pruned::Link)?;
    let remote = peer_device
        .effective_port(peer.port)
        .ok_or(Pruned::Link)?;
    if !remote.up {
        return Err(Pruned::Link);
    }
    let new_ctx = ingress(peer_device, &remote, tag).ok_or(Pruned::Encoding)?;
    if let Some(v) = new_ctx {
        if !peer_device
            .bridge()
            .map(|b| b.vlan_active(v))
            .unwrap_or(false)
        {
            return Err(Pruned::Encoding);
        }
    }
    if gates.stp && !stp_forwarding(peer_device, peer.port, new_ctx) {
        return Err(Pruned::Stp);
    }
    if let Some(packet) = gates.acl {
        if !acl_permits(peer_device, remote.acl_in, packet) {
            return Err(Pruned::Acl);
        }
    }
    Ok(Hop {
        ingress: peer,
        ctx: new_ctx,
    })
}

/// All layer-3 interfaces in the same broadcast domain as `iface` on `device`, following only
/// forwarding spanning-tree ports. The result contains routed ports, routed bundles, SVIs and host
/// ports of other devices. `iface` itself is never part of the result.
pub fn attached_interfaces(
    net: &Network,
    device: DeviceId,
    iface: InterfaceId,
) -> Vec<(DeviceId, InterfaceId)> {
    let mut result = Vec::new();
    let mut seen: HashSet<(DeviceId, InterfaceId)> = HashSet::new();
    let mut visited: HashSet<(DeviceId, VlanId)> = HashSet::new();
    let mut queue: VecDeque<(DeviceId, VlanId)> = VecDeque::new();
    seen.insert((device, iface));

    let start = match net.get_device(device) {
        Ok(d) => d,
        Err(_) => return result,
    };

    match iface {
        InterfaceId::Svi(v) => queue.push_back((device, v)),
        iface => {
            for p in start.member_ports(iface) {
                if let Ok(hop) = traverse(net, start, p, None, Gates::STP) {
                    collect_hop(net, hop, &mut seen, &mut result, &mut queue);
                }
            }
        }
    }

    while let Some((d, v)) = queue.pop_front() {
        if !visited.insert((d, v)) {
            continue;
        }
        let dev = match net.get_device(d) {
            Ok(dev) => dev,
            Err(_) => continue,
        };
        if dev.svi_up(v) && !(d == device && iface == InterfaceId::Svi(v)) {
            let svi = (d, InterfaceId::Svi(v));
            if seen.insert(svi) {
                result.push(svi);
            }
        }
        for p in dev.port_ids() {
            if let Ok(hop) = traverse(net, dev, p, Some(v), Gates::STP) {
                collect_hop(net, hop, &mut seen, &mut result, &mut queue);
            }
        }
    }

    result
}

fn collect_hop(
    net: &Network,
    hop: Hop,
    seen: &mut HashSet<(DeviceId, InterfaceId)>,
    result: &mut Vec<(DeviceId, InterfaceId)>,
    queue: &mut VecDeque<(DeviceId, VlanId)>,
) {
    match hop.ctx {
        Some(v) => queue.push_back((hop.ingress.device, v)),
        None => {
            let l3 = match net.get_device(hop.ingress.device) {
                Ok(d) if d.is_pc() => InterfaceId::Port(hop.ingress.port),
                Ok(d) => d.l3_interface(hop.ingress.port),
                Err(_) => return,
            };
            if seen.insert((hop.ingress.device, l3)) {
                result.push((hop.ingress.device, l3));
            }
        }
    }
}
