//! Installation and removal of the firewall state that hands UDP traffic to the `RTPENGINE`
//! kernel forwarding target.
//!
//! For each of IPv4 and IPv6, the state lives in the `filter` table and consists of:
//! - a custom chain (named by [`FirewallConfig::chain`]) holding one rule that invokes the
//!   `RTPENGINE` target, parameterized with the forwarding table id of the kernel module;
//! - if a base chain is configured, one rule in that base chain that jumps to the custom chain
//!   for UDP packets. Otherwise the custom chain is itself attached to the local input hook.
//!
//! Installing always removes the previous state first, so that repeated calls never duplicate
//! rules.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, QueryError};
use crate::query::{NetlinkChannel, Session};
use crate::ProtocolFamily;

mod lifecycle;
mod matcher;

pub use lifecycle::{setup_family, shutdown_family};
pub use matcher::RuleMatcher;

/// The table holding every chain this module manages.
pub const TABLE_NAME: &str = "filter";

/// Input chains that may hold jump rules left by older setups, whatever the configured base
/// chain.
pub const LEGACY_INPUT_CHAINS: [&str; 2] = ["INPUT", "input"];

/// Name the kernel module registers its xtables target under.
pub const TARGET_NAME: &str = "RTPENGINE";

/// Revision of the `RTPENGINE` target.
pub const TARGET_REVISION: u32 = 0;

/// The address families the firewall state is installed for, in order.
pub const FAMILIES: [ProtocolFamily; 2] = [ProtocolFamily::Ipv4, ProtocolFamily::Ipv6];

/// Settings of the firewall state.
///
/// ```
/// use rtpe_nftables::FirewallConfig;
///
/// let config = FirewallConfig::new("rtpengine").with_base_chain("input").with_table_id(3);
/// assert_eq!(config.base_chain(), Some("input"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirewallConfig {
    chain: String,
    #[serde(default)]
    base_chain: Option<String>,
    #[serde(default)]
    table_id: u32,
}

impl FirewallConfig {
    pub fn new(chain: impl Into<String>) -> Self {
        FirewallConfig {
            chain: chain.into(),
            ..Default::default()
        }
    }

    /// Sets the base chain the jump rule is added to. An empty name means that the custom chain
    /// is attached to the input hook itself.
    pub fn with_base_chain(mut self, base_chain: impl Into<String>) -> Self {
        let base_chain = base_chain.into();
        self.base_chain = if base_chain.is_empty() {
            None
        } else {
            Some(base_chain)
        };
        self
    }

    pub fn with_table_id(mut self, table_id: u32) -> Self {
        self.table_id = table_id;
        self
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn base_chain(&self) -> Option<&str> {
        self.base_chain.as_deref().filter(|name| !name.is_empty())
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    /// Without a custom chain name, there is nothing to manage.
    pub fn is_enabled(&self) -> bool {
        !self.chain.is_empty()
    }
}

/// The configuration record of the `RTPENGINE` target (`struct xt_rtpengine_info`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct TargetInfo {
    pub id: u32,
}

impl TargetInfo {
    pub fn new(id: u32) -> Self {
        TargetInfo { id }
    }

    /// The record as the kernel module reads it, in host byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.id.to_ne_bytes().to_vec()
    }
}

/// The step of a setup or shutdown that failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    OpenSocket,
    CloseSocket,
    SelectFamily,
    IterateRules,
    AddTable,
    AddChain,
    AddRule,
    DeleteRule,
    FlushChain,
    DeleteChain,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::OpenSocket => "open netlink socket",
            Operation::CloseSocket => "close netlink socket",
            Operation::SelectFamily => "select address family",
            Operation::IterateRules => "iterate rules",
            Operation::AddTable => "add table",
            Operation::AddChain => "add chain",
            Operation::AddRule => "add rule",
            Operation::DeleteRule => "delete rule",
            Operation::FlushChain => "flush chain",
            Operation::DeleteChain => "delete chain",
        })
    }
}

/// A failed setup or shutdown: the operation that failed, where, and why.
#[derive(Debug)]
pub struct FirewallError {
    operation: Operation,
    family: Option<ProtocolFamily>,
    object: Option<String>,
    source: QueryError,
}

impl FirewallError {
    pub fn new(operation: Operation, source: QueryError) -> Self {
        FirewallError {
            operation,
            family: None,
            object: None,
            source,
        }
    }

    pub fn with_family(mut self, family: ProtocolFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn family(&self) -> Option<ProtocolFamily> {
        self.family
    }

    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }

    pub fn query_error(&self) -> &QueryError {
        &self.source
    }
}

impl fmt::Display for FirewallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(family) = self.family {
            write!(f, "{}: ", family)?;
        }
        write!(f, "{}", self.operation)?;
        if let Some(object) = &self.object {
            write!(f, " '{}'", object)?;
        }
        write!(f, " failed ({}): {}", self.source.class(), self.source)
    }
}

impl Error for FirewallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Installs the firewall state for IPv4, then IPv6, over an existing session.
///
/// Stops at the first failure, leaving whatever was already installed in place.
pub fn setup_with_session<C: NetlinkChannel>(
    session: &mut Session<C>,
    config: &FirewallConfig,
) -> Result<(), FirewallError> {
    if !config.is_enabled() {
        debug!("No chain configured, not setting up the firewall");
        return Ok(());
    }
    for family in FAMILIES.iter().copied() {
        setup_family(session, family, config)?;
    }
    info!("Firewall set up with chain '{}'", config.chain());
    Ok(())
}

/// Removes the firewall state for IPv4, then IPv6, over an existing session.
pub fn shutdown_with_session<C: NetlinkChannel>(
    session: &mut Session<C>,
    config: &FirewallConfig,
) -> Result<(), FirewallError> {
    if !config.is_enabled() {
        debug!("No chain configured, not shutting down the firewall");
        return Ok(());
    }
    for family in FAMILIES.iter().copied() {
        shutdown_family(session, family, config)?;
    }
    info!("Firewall state of chain '{}' removed", config.chain());
    Ok(())
}

fn with_new_session<F>(config: &FirewallConfig, f: F) -> Result<(), FirewallError>
where
    F: FnOnce(&mut Session) -> Result<(), FirewallError>,
{
    if !config.is_enabled() {
        return Ok(());
    }
    let mut session =
        Session::open().map_err(|e| FirewallError::new(Operation::OpenSocket, e))?;
    let res = f(&mut session);
    let closed = session
        .close()
        .map_err(|e| FirewallError::new(Operation::CloseSocket, e));
    // the first error wins
    res.and(closed)
}

/// Installs the firewall state, in a netlink session of its own.
pub fn setup(config: &FirewallConfig) -> Result<(), FirewallError> {
    with_new_session(config, |session| setup_with_session(session, config))
}

/// Removes the firewall state, in a netlink session of its own.
pub fn shutdown(config: &FirewallConfig) -> Result<(), FirewallError> {
    with_new_session(config, |session| shutdown_with_session(session, config))
}

/// Installs the firewall state for the custom chain `chain`.
///
/// An empty `chain` disables the firewall handling altogether, and an empty `base_chain`
/// attaches `chain` to the input hook directly. `table_id` is the forwarding table of the kernel
/// module that packets are handed to.
///
/// Returns a description of the first failure, if any.
pub fn setup_firewall(chain: &str, base_chain: &str, table_id: u32) -> Option<String> {
    let config = FirewallConfig::new(chain)
        .with_base_chain(base_chain)
        .with_table_id(table_id);
    setup(&config).err().map(|e| e.to_string())
}

/// Removes the firewall state installed by [`setup_firewall`].
///
/// Returns a description of the first failure, if any.
pub fn shutdown_firewall(chain: &str, base_chain: &str) -> Option<String> {
    let config = FirewallConfig::new(chain).with_base_chain(base_chain);
    shutdown(&config).err().map(|e| e.to_string())
}
