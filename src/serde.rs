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

//! This module contains the functions to export a network to JSON, and to restore it again.
//!
//! The exported object has two fields:
//!
//! - `net`: The complete network, including all derived state.
//! - `config_nodes_links`: The running configuration, the list of devices (id, name, kind and port
//!   names), and the list of cables. This is enough to rebuild the network from scratch if `net`
//!   is missing or was written by an incompatible version.

use std::collections::BTreeSet;

use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{from_str, from_value, to_string, to_string_pretty, Value};

use crate::{
    config::{Config, NetworkConfig},
    device::{Device, DeviceKind},
    network::Network,
    port::Port,
    types::{Connection, DeviceId, LinkStatus, NetworkError},
};

/// Description of a single device, used to rebuild a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct NodeDescr {
    id: DeviceId,
    name: String,
    kind: DeviceKind,
    ports: Vec<String>,
}

impl NodeDescr {
    fn of(device: &Device) -> Self {
        Self {
            id: device.id,
            name: device.name.clone(),
            kind: device.kind(),
            ports: device.ports.iter().map(|p| p.name.clone()).collect(),
        }
    }

    fn build(&self) -> Device {
        let mut d = match self.kind {
            DeviceKind::Pc => Device::new_pc(self.id, self.name.clone()),
            DeviceKind::L2Switch => Device::new_l2_switch(self.id, self.name.clone()),
            DeviceKind::L3Switch => Device::new_l3_switch(self.id, self.name.clone()),
        };
        let pc = d.is_pc();
        for name in self.ports.iter().skip(d.ports.len()) {
            d.ports.push(if pc {
                Port::host_port(name.clone())
            } else {
                Port::switch_port(name.clone())
            });
        }
        for (port, name) in d.ports.iter_mut().zip(self.ports.iter()) {
            port.name = name.clone();
        }
        d
    }
}

impl Network {
    /// Create a json string from the network. The string contains the entire network, and the
    /// information necessary to rebuild it from its configuration.
    pub fn as_json_str(&self) -> String {
        to_string_pretty(&self.as_json_value()).unwrap_or_default()
    }

    /// Create a compact json string from the network, without whitespace.
    pub fn as_json_str_compact(&self) -> String {
        to_string(&self.as_json_value()).unwrap_or_default()
    }

    fn as_json_value(&self) -> Value {
        let config = self.get_config().unwrap_or_default();
        let nodes: Vec<NodeDescr> = self.devices().map(NodeDescr::of).collect();
        let links: Vec<Connection> = self.connections().map(|(_, c)| *c).collect();
        serde_json::json!({
            "net": serde_json::to_value(self).unwrap_or(Value::Null),
            "config_nodes_links": serde_json::to_value((config, nodes, links)).unwrap_or(Value::Null),
        })
    }

    /// Read a json string generated by [`Network::as_json_str`]. The network is taken from the
    /// field `net` if possible. Otherwise, it is rebuilt from its devices, cables and
    /// configuration. In both cases, all derived state is recomputed.
    pub fn from_json_str(json_str: &str) -> Result<Self, NetworkError> {
        let content: Value = from_str(json_str)?;
        let mut net = match content
            .get("net")
            .and_then(|v| from_value::<Network>(v.clone()).ok())
        {
            Some(net) => net,
            None => {
                debug!("Could not read the network directly. Rebuild it from the configuration.");
                let (config, nodes, links): (Config, Vec<NodeDescr>, Vec<Connection>) = from_value(
                    content
                        .get("config_nodes_links")
                        .cloned()
                        .unwrap_or(Value::Null),
                )?;
                Self::rebuild(&config, &nodes, &links)?
            }
        };
        net.recompute_all();
        Ok(net)
    }

    /// Build a network from its devices, cables and configuration. Device ids are preserved.
    fn rebuild(
        config: &Config,
        nodes: &[NodeDescr],
        links: &[Connection],
    ) -> Result<Self, NetworkError> {
        let mut net = Network::default();
        let ids: BTreeSet<DeviceId> = nodes.iter().map(|n| n.id).collect();
        let max = ids.iter().map(|id| id.index()).max();

        // allocate all indices up to the largest one, such that the ids are preserved
        let mut holes = Vec::new();
        for i in 0..max.map(|m| m + 1).unwrap_or(0) {
            let id = net.topology.add_node(());
            if id.index() != i {
                return Err(NetworkError::DeviceNotFound(id));
            }
            if !ids.contains(&id) {
                holes.push(id);
            }
        }
        for id in holes {
            net.topology.remove_node(id);
        }
        for node in nodes {
            net.devices.insert(node.id, node.build());
        }

        for link in links {
            let id = net.connect(link.a, link.b)?;
            if link.status == LinkStatus::Down {
                net.set_connection_status(id, LinkStatus::Down)?;
            }
        }

        net.set_config(config)?;
        Ok(net)
    }

    /// Compare two networks by their devices, cables and configuration, ignoring the derived state
    /// as well as learned MAC and ARP entries.
    pub fn weak_eq(&self, other: &Self) -> bool {
        let names = |n: &Self| -> Vec<NodeDescr> { n.devices().map(NodeDescr::of).collect() };
        let mut links_a: Vec<Connection> = self.connections().map(|(_, c)| *c).collect();
        let mut links_b: Vec<Connection> = other.connections().map(|(_, c)| *c).collect();
        let key = |c: &Connection| (c.a, c.b);
        links_a.sort_by_key(key);
        links_b.sort_by_key(key);
        names(self) == names(other)
            && links_a == links_b
            && self.get_config().ok() == other.get_config().ok()
    }
}
