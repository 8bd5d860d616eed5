// Copyryght (c) 2021 GPL lafleur@boum.org and Simon Thoby
//
// This file is free software: you may copy, redistribute and/or modify it
// under the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This file is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see the LICENSE file.
//
// This file incorporates work covered by the following copyright and
// permission notice:
//
//     Copyright 2018 Amagicom AB.
//
//     Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//     http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
//     <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
//     option. This file may not be copied, modified, or distributed
//     except according to those terms.

//! Netlink client for the in-kernel nf_tables subsystem, dedicated to the firewall state that
//! steers UDP media traffic into the `RTPENGINE` kernel forwarding target.
//!
//! The crate speaks nfnetlink directly over a `NETLINK_NETFILTER` socket, without linking to
//! `libnftnl` or `libmnl`. It only knows about the objects it needs: tables, chains, rules and
//! the handful of expressions ("payload", "cmp", "counter", "immediate" and the xtables
//! compatibility "target") used by the forwarding rules. Expressions of any other kind are still
//! decoded when listing rules, as opaque raw data.
//!
//! The entry points are [`setup_firewall`] and [`shutdown_firewall`], which (re)install and
//! remove the state for both IPv4 and IPv6. Both are idempotent: installing always starts by
//! removing whatever a previous run may have left behind.
//!
//! ```no_run
//! use rtpe_nftables::{setup_firewall, shutdown_firewall};
//!
//! if let Some(err) = setup_firewall("rtpengine", "", 0) {
//!     eprintln!("failed to set up the firewall: {}", err);
//! }
//! // ...
//! if let Some(err) = shutdown_firewall("rtpengine", "") {
//!     eprintln!("failed to tear the firewall down: {}", err);
//! }
//! ```
//!
//! Lower-level building blocks (the netlink [`query::Session`], [`batch::execute`] and the
//! object types) are public as well, so other callers may build their own requests.

use std::convert::TryFrom;
use std::fmt;

#[macro_use]
extern crate log;

pub mod sys;

pub mod error;
pub use error::{BuilderError, DecodeError, ErrorClass, QueryError};

pub mod batch;

mod table;
pub use table::Table;

mod chain;
pub use chain::{Chain, ChainPolicy, ChainPriority, ChainType, Hook, HookClass};

pub mod query;

pub mod nlmsg;
pub mod parser;
pub mod parser_impls;

mod rule;
pub use rule::{list_rules_for_chain, Rule};

pub mod expr;

pub mod firewall;
pub use firewall::{
    setup, setup_firewall, shutdown, shutdown_firewall, FirewallConfig, FirewallError, Operation,
};

#[cfg(test)]
mod tests;

/// The type of the message as it's sent to netfilter. A message consists of an object, such as a
/// [`Table`], [`Chain`] or [`Rule`] for example, and a [`MsgType`] to describe what to do with
/// that object. If a [`Table`] object is sent with `MsgType::Add` then that table will be added
/// to netfilter, if sent with `MsgType::Del` it will be removed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MsgType {
    /// Add the object to netfilter.
    Add,
    /// Remove the object from netfilter.
    Del,
}

/// Denotes a protocol. Used to specify which protocol a table or set belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ProtocolFamily {
    Unspec = sys::NFPROTO_UNSPEC,
    /// Inet - Means both IPv4 and IPv6
    Inet = sys::NFPROTO_INET,
    Ipv4 = sys::NFPROTO_IPV4,
    Arp = sys::NFPROTO_ARP,
    NetDev = sys::NFPROTO_NETDEV,
    Bridge = sys::NFPROTO_BRIDGE,
    Ipv6 = sys::NFPROTO_IPV6,
    DecNet = sys::NFPROTO_DECNET,
}

impl Default for ProtocolFamily {
    fn default() -> Self {
        Self::Unspec
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolFamily::Unspec => "unspec",
            ProtocolFamily::Inet => "inet",
            ProtocolFamily::Ipv4 => "ipv4",
            ProtocolFamily::Arp => "arp",
            ProtocolFamily::NetDev => "netdev",
            ProtocolFamily::Bridge => "bridge",
            ProtocolFamily::Ipv6 => "ipv6",
            ProtocolFamily::DecNet => "decnet",
        })
    }
}

impl TryFrom<i32> for ProtocolFamily {
    type Error = DecodeError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            sys::NFPROTO_UNSPEC => Ok(ProtocolFamily::Unspec),
            sys::NFPROTO_INET => Ok(ProtocolFamily::Inet),
            sys::NFPROTO_IPV4 => Ok(ProtocolFamily::Ipv4),
            sys::NFPROTO_ARP => Ok(ProtocolFamily::Arp),
            sys::NFPROTO_NETDEV => Ok(ProtocolFamily::NetDev),
            sys::NFPROTO_BRIDGE => Ok(ProtocolFamily::Bridge),
            sys::NFPROTO_IPV6 => Ok(ProtocolFamily::Ipv6),
            sys::NFPROTO_DECNET => Ok(ProtocolFamily::DecNet),
            _ => Err(DecodeError::UnknownProtocolFamily(value)),
        }
    }
}
