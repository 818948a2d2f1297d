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

//! # Access Lists
//!
//! This module contains standard and extended IPv4 access lists. An access list is an ordered list
//! of entries. The first entry that matches a packet decides whether it is permitted or denied. If
//! no entry matches, the packet is denied. Use the [`AclEntryBuilder`] to conveniently build
//! entries:
//!
//! ```
//! # use labsim::acl::*;
//! # use std::net::Ipv4Addr;
//! let entry = AclEntryBuilder::new()
//!     .sequence(10)
//!     .deny()
//!     .protocol(AclProtocol::Tcp)
//!     .source_host(Ipv4Addr::new(10, 1, 1, 1))
//!     .destination_any()
//!     .dst_port(PortMatch::Eq(80))
//!     .build();
//! ```

use std::{fmt, net::Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::types::wildcard_match;

/// Kind of access list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclKind {
    /// Standard access list, matching only on the source address.
    Standard,
    /// Extended access list, matching on protocol, source, destination and destination port.
    Extended,
}

/// # Access List
/// Ordered list of entries, evaluated in ascending sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UnsortedAccessList")]
pub struct AccessList {
    /// Name or number of the access list
    pub id: String,
    /// Standard or extended
    pub kind: AclKind,
    /// Entries, sorted by their sequence number
    entries: Vec<AclEntry>,
}

/// Access list as read from a file, whose entries may be in any order.
#[derive(Deserialize)]
struct UnsortedAccessList {
    id: String,
    kind: AclKind,
    entries: Vec<AclEntry>,
}

impl From<UnsortedAccessList> for AccessList {
    fn from(acl: UnsortedAccessList) -> Self {
        Self::with_entries(acl.id, acl.kind, acl.entries)
    }
}

impl AccessList {
    /// Create an empty access list. An empty access list denies everything.
    pub fn new(id: impl Into<String>, kind: AclKind) -> Self {
        Self {
            id: id.into(),
            kind,
            entries: Vec::new(),
        }
    }

    /// Create an access list from a set of entries.
    pub fn with_entries(
        id: impl Into<String>,
        kind: AclKind,
        entries: impl IntoIterator<Item = AclEntry>,
    ) -> Self {
        let mut acl = Self::new(id, kind);
        entries.into_iter().for_each(|e| acl.insert(e));
        acl
    }

    /// The same access list under another name.
    pub fn renamed(self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self
        }
    }

    /// Insert an entry. An existing entry with the same sequence number is replaced.
    pub fn insert(&mut self, entry: AclEntry) {
        match self
            .entries
            .binary_search_by_key(&entry.sequence, |e| e.sequence)
        {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
    }

    /// Remove the entry with the given sequence number.
    pub fn remove(&mut self, sequence: u32) -> Option<AclEntry> {
        let pos = self
            .entries
            .binary_search_by_key(&sequence, |e| e.sequence)
            .ok()?;
        Some(self.entries.remove(pos))
    }

    /// Returns all entries in evaluation order.
    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Sequence number for the next entry appended without explicit sequence.
    pub fn next_sequence(&self) -> u32 {
        self.entries.last().map(|e| e.sequence + 10).unwrap_or(10)
    }

    /// Evaluate the access list on a packet. The first matching entry wins. If no entry matches,
    /// the packet is denied.
    pub fn evaluate(&self, packet: &Packet) -> AclAction {
        self.entries
            .iter()
            .find(|e| e.matches(packet, self.kind))
            .map(|e| e.action)
            .unwrap_or(AclAction::Deny)
    }

    /// Returns `true` if the packet is permitted.
    pub fn permits(&self, packet: &Packet) -> bool {
        self.evaluate(packet).is_permit()
    }
}

/// Action of an access list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclAction {
    /// Let the packet pass
    Permit,
    /// Drop the packet
    Deny,
}

impl AclAction {
    /// Returns `true` if the action is `Permit`.
    pub fn is_permit(&self) -> bool {
        self == &Self::Permit
    }

    /// Returns `true` if the action is `Deny`.
    pub fn is_deny(&self) -> bool {
        self == &Self::Deny
    }
}

/// IP protocol matched by an extended entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclProtocol {
    /// Any IP packet
    Ip,
    /// ICMP (ping, traceroute)
    Icmp,
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl AclProtocol {
    fn matches(&self, protocol: AclProtocol) -> bool {
        self == &Self::Ip || self == &protocol
    }
}

/// Address match of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddrMatch {
    /// `any`
    Any,
    /// `host A.B.C.D`
    Host(Ipv4Addr),
    /// `A.B.C.D W.W.W.W`, where the bits set in the wildcard are ignored.
    Wildcard(Ipv4Addr, Ipv4Addr),
}

impl AddrMatch {
    /// Returns `true` if the address matches.
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        match self {
            Self::Any => true,
            Self::Host(a) => *a == addr,
            Self::Wildcard(base, wc) => wildcard_match(addr, *base, *wc),
        }
    }
}

/// Destination port operator of an extended TCP/UDP entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortMatch {
    /// `eq`
    Eq(u16),
    /// `neq`
    Neq(u16),
    /// `lt`
    Lt(u16),
    /// `gt`
    Gt(u16),
    /// `range` (inclusive)
    Range(u16, u16),
}

impl PortMatch {
    /// Returns `true` if the port matches the operator.
    pub fn matches(&self, port: u16) -> bool {
        match self {
            Self::Eq(p) => port == *p,
            Self::Neq(p) => port != *p,
            Self::Lt(p) => port < *p,
            Self::Gt(p) => port > *p,
            Self::Range(lo, hi) => port >= *lo && port <= *hi,
        }
    }
}

/// Single line of an access list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclEntry {
    /// Sequence number. Lower numbers are evaluated first.
    pub sequence: u32,
    /// Permit or deny
    pub action: AclAction,
    /// Protocol (extended only). `None` matches any packet.
    pub protocol: Option<AclProtocol>,
    /// Source address match
    pub source: AddrMatch,
    /// Destination address match (extended only)
    pub destination: AddrMatch,
    /// Destination port operator (extended TCP/UDP only)
    pub dst_port: Option<PortMatch>,
}

impl AclEntry {
    /// Returns `true` if the entry matches the packet. Standard lists only look at the source.
    pub fn matches(&self, packet: &Packet, kind: AclKind) -> bool {
        if !self.source.matches(packet.src) {
            return false;
        }
        if kind == AclKind::Standard {
            return true;
        }
        if let Some(proto) = self.protocol {
            if !proto.matches(packet.protocol) {
                return false;
            }
        }
        if !self.destination.matches(packet.dst) {
            return false;
        }
        match (self.dst_port, packet.dst_port) {
            (None, _) => true,
            (Some(op), Some(port)) => op.matches(port),
            (Some(_), None) => false,
        }
    }
}

/// Packet header fields evaluated by an access list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Packet {
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Protocol
    pub protocol: AclProtocol,
    /// Destination port (TCP/UDP)
    pub dst_port: Option<u16>,
}

impl Packet {
    /// ICMP echo request, as sent by ping and traceroute.
    pub fn icmp(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self {
            src,
            dst,
            protocol: AclProtocol::Icmp,
            dst_port: None,
        }
    }
}

/// # Access List Entry Builder
///
/// Convenience type to build an entry. You are required to call [`Self::sequence`] and either
/// [`Self::permit`] or [`Self::deny`] before you can call [`Self::build`]. Source and destination
/// default to `any`.
#[derive(Debug, Default)]
pub struct AclEntryBuilder {
    sequence: Option<u32>,
    action: Option<AclAction>,
    protocol: Option<AclProtocol>,
    source: Option<AddrMatch>,
    destination: Option<AddrMatch>,
    dst_port: Option<PortMatch>,
}

impl AclEntryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sequence number
    pub fn sequence(&mut self, sequence: u32) -> &mut Self {
        self.sequence = Some(sequence);
        self
    }

    /// Set the action to permit
    pub fn permit(&mut self) -> &mut Self {
        self.action = Some(AclAction::Permit);
        self
    }

    /// Set the action to deny
    pub fn deny(&mut self) -> &mut Self {
        self.action = Some(AclAction::Deny);
        self
    }

    /// Match on a protocol
    pub fn protocol(&mut self, protocol: AclProtocol) -> &mut Self {
        self.protocol = Some(protocol);
        self
    }

    /// Match on any source
    pub fn source_any(&mut self) -> &mut Self {
        self.source = Some(AddrMatch::Any);
        self
    }

    /// Match on a single source host
    pub fn source_host(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.source = Some(AddrMatch::Host(addr));
        self
    }

    /// Match on a source address and wildcard mask
    pub fn source(&mut self, addr: Ipv4Addr, wildcard: Ipv4Addr) -> &mut Self {
        self.source = Some(AddrMatch::Wildcard(addr, wildcard));
        self
    }

    /// Match on any destination
    pub fn destination_any(&mut self) -> &mut Self {
        self.destination = Some(AddrMatch::Any);
        self
    }

    /// Match on a single destination host
    pub fn destination_host(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.destination = Some(AddrMatch::Host(addr));
        self
    }

    /// Match on a destination address and wildcard mask
    pub fn destination(&mut self, addr: Ipv4Addr, wildcard: Ipv4Addr) -> &mut Self {
        self.destination = Some(AddrMatch::Wildcard(addr, wildcard));
        self
    }

    /// Match on the destination port
    pub fn dst_port(&mut self, op: PortMatch) -> &mut Self {
        self.dst_port = Some(op);
        self
    }

    /// Build the entry.
    ///
    /// # Panics
    /// The function panics if the sequence number or the action was not set.
    pub fn build(&self) -> AclEntry {
        let sequence = match self.sequence {
            Some(s) => s,
            None => panic!("Sequence number was not set for an ACL entry!"),
        };
        let action = match self.action {
            Some(a) => a,
            None => panic!("Action was not set for an ACL entry!"),
        };
        AclEntry {
            sequence,
            action,
            protocol: self.protocol,
            source: self.source.unwrap_or(AddrMatch::Any),
            destination: self.destination.unwrap_or(AddrMatch::Any),
            dst_port: self.dst_port,
        }
    }
}

impl fmt::Display for AddrMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Host(a) => write!(f, "host {a}"),
            Self::Wildcard(a, w) => write!(f, "{a} {w}"),
        }
    }
}

impl fmt::Display for PortMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(p) => write!(f, "eq {p}"),
            Self::Neq(p) => write!(f, "neq {p}"),
            Self::Lt(p) => write!(f, "lt {p}"),
            Self::Gt(p) => write!(f, "gt {p}"),
            Self::Range(a, b) => write!(f, "range {a} {b}"),
        }
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            AclAction::Permit => "permit",
            AclAction::Deny => "deny",
        };
        write!(f, "{} {}", self.sequence, action)?;
        if let Some(p) = self.protocol {
            let p = match p {
                AclProtocol::Ip => "ip",
                AclProtocol::Icmp => "icmp",
                AclProtocol::Tcp => "tcp",
                AclProtocol::Udp => "udp",
            };
            write!(f, " {p}")?;
        }
        write!(f, " {} {}", self.source, self.destination)?;
        if let Some(op) = self.dst_port {
            write!(f, " {op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    #[test]
    fn implicit_deny() {
        let acl = AccessList::new("100", AclKind::Extended);
        assert!(acl
            .evaluate(&Packet::icmp(ip(10, 0, 0, 1), ip(10, 0, 0, 2)))
            .is_deny());
    }

    #[test]
    fn first_match_wins() {
        let acl = AccessList::with_entries(
            "100",
            AclKind::Extended,
            [
                AclEntryBuilder::new()
                    .sequence(20)
                    .permit()
                    .protocol(AclProtocol::Ip)
                    .build(),
                AclEntryBuilder::new()
                    .sequence(10)
                    .deny()
                    .protocol(AclProtocol::Icmp)
                    .source(ip(10, 1, 0, 0), ip(0, 0, 255, 255))
                    .build(),
            ],
        );
        assert_eq!(acl.entries()[0].sequence, 10);
        assert!(!acl.permits(&Packet::icmp(ip(10, 1, 2, 3), ip(10, 2, 0, 1))));
        assert!(acl.permits(&Packet::icmp(ip(10, 3, 2, 3), ip(10, 2, 0, 1))));
        let tcp = Packet {
            protocol: AclProtocol::Tcp,
            dst_port: Some(22),
            ..Packet::icmp(ip(10, 1, 2, 3), ip(10, 2, 0, 1))
        };
        assert!(acl.permits(&tcp));
    }

    #[test]
    fn standard_only_looks_at_source() {
        let acl = AccessList::with_entries(
            "1",
            AclKind::Standard,
            [AclEntryBuilder::new()
                .sequence(10)
                .permit()
                .source_host(ip(192, 168, 1, 1))
                .destination_host(ip(1, 1, 1, 1))
                .build()],
        );
        assert!(acl.permits(&Packet::icmp(ip(192, 168, 1, 1), ip(8, 8, 8, 8))));
        assert!(!acl.permits(&Packet::icmp(ip(192, 168, 1, 2), ip(1, 1, 1, 1))));
    }

    #[test]
    fn port_operators() {
        assert!(PortMatch::Eq(80).matches(80));
        assert!(PortMatch::Neq(80).matches(443));
        assert!(PortMatch::Lt(1024).matches(22));
        assert!(!PortMatch::Gt(1024).matches(22));
        assert!(PortMatch::Range(20, 21).matches(21));
        let entry = AclEntryBuilder::new()
            .sequence(10)
            .permit()
            .protocol(AclProtocol::Tcp)
            .dst_port(PortMatch::Eq(80))
            .build();
        let p = Packet::icmp(ip(1, 1, 1, 1), ip(2, 2, 2, 2));
        assert!(!entry.matches(&p, AclKind::Extended));
    }

    #[test]
    fn replace_and_remove() {
        let mut acl = AccessList::new("10", AclKind::Standard);
        acl.insert(AclEntryBuilder::new().sequence(10).deny().build());
        acl.insert(AclEntryBuilder::new().sequence(10).permit().build());
        assert_eq!(acl.entries().len(), 1);
        assert_eq!(acl.next_sequence(), 20);
        assert!(acl.remove(10).is_some());
        assert!(acl.remove(10).is_none());
    }

    #[test]
    fn deserialized_entries_are_sorted() {
        let acl = AccessList::with_entries(
            "10",
            AclKind::Standard,
            [10, 20, 30].map(|s| AclEntryBuilder::new().sequence(s).permit().build()),
        );
        let mut json = serde_json::to_value(&acl).unwrap();
        json["entries"].as_array_mut().unwrap().reverse();
        let mut restored: AccessList = serde_json::from_value(json).unwrap();
        assert_eq!(restored, acl);
        assert_eq!(restored.next_sequence(), 40);
        assert!(restored.remove(20).is_some());
        assert_eq!(
            restored.entries().iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![10, 30]
        );
    }

    #[test]
    fn rename() {
        let acl = AccessList::new("10", AclKind::Standard).renamed("MGMT");
        assert_eq!(acl.id, "MGMT");
        assert_eq!(acl.kind, AclKind::Standard);
    }
}
