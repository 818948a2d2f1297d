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

//! # Trunk Negotiation
//!
//! Resolves the operational mode of the two ports of a connection. Each side is resolved
//! independently: a statically configured mode always wins, and a dynamic port becomes a trunk
//! only if the negotiation intents of both sides agree.

use crate::port::{DtpMode, Port, PortMode};

/// Compute the operational modes of both ends of a connection, in the order `(a, b)`.
pub fn resolve_trunk_mode(a: &Port, b: &Port) -> (PortMode, PortMode) {
    (resolve_side(a, b), resolve_side(b, a))
}

/// Operational mode of `local`, when connected to `peer`.
pub fn resolve_side(local: &Port, peer: &Port) -> PortMode {
    match local.mode {
        PortMode::Dynamic => {}
        m => return m,
    }
    let peer_trunk = peer.mode == PortMode::Trunk;
    let peer_intent = match peer.mode {
        PortMode::Dynamic => peer.dtp,
        _ => DtpMode::None,
    };
    let trunk = match local.dtp {
        DtpMode::DynamicDesirable => {
            peer_trunk
                || matches!(
                    peer_intent,
                    DtpMode::DynamicDesirable | DtpMode::DynamicAuto
                )
        }
        DtpMode::DynamicAuto => peer_trunk || peer_intent == DtpMode::DynamicDesirable,
        DtpMode::None => false,
    };
    if trunk {
        PortMode::Trunk
    } else {
        PortMode::Access
    }
}
