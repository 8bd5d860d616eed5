use rtpe_nftables_macros::{nfnetlink_enum, nfnetlink_struct};

use super::{Expression, Register};
use crate::{
    sys::{
        self, NFT_PAYLOAD_INNER_HEADER, NFT_PAYLOAD_LL_HEADER, NFT_PAYLOAD_NETWORK_HEADER,
        NFT_PAYLOAD_TRANSPORT_HEADER,
    },
    ProtocolFamily,
};

/// The header a payload offset is relative to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[nfnetlink_enum(u32)]
pub enum PayloadBase {
    LinkLayer = NFT_PAYLOAD_LL_HEADER,
    Network = NFT_PAYLOAD_NETWORK_HEADER,
    Transport = NFT_PAYLOAD_TRANSPORT_HEADER,
    Inner = NFT_PAYLOAD_INNER_HEADER,
}

/// Payload expressions refer to data from the packet's payload.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[nfnetlink_struct(nested = true)]
pub struct Payload {
    #[field(sys::NFTA_PAYLOAD_DREG)]
    dreg: Register,
    #[field(sys::NFTA_PAYLOAD_BASE)]
    base: PayloadBase,
    #[field(sys::NFTA_PAYLOAD_OFFSET)]
    offset: u32,
    #[field(sys::NFTA_PAYLOAD_LEN)]
    len: u32,
    #[field(sys::NFTA_PAYLOAD_SREG)]
    sreg: Register,
}

impl Expression for Payload {
    fn get_name() -> &'static str {
        "payload"
    }
}

/// Payload expressions refer to data from the packet's payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HighLevelPayload {
    Network(NetworkHeaderField),
}

impl HighLevelPayload {
    /// Loads the field into [`Register::Reg1`].
    pub fn build(&self) -> Payload {
        match *self {
            HighLevelPayload::Network(ref f) => Payload::default()
                .with_base(PayloadBase::Network)
                .with_offset(f.offset())
                .with_len(f.len()),
        }
        .with_dreg(Register::Reg1)
    }
}

pub trait HeaderField {
    fn offset(&self) -> u32;
    fn len(&self) -> u32;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NetworkHeaderField {
    IPv4(IPv4HeaderField),
    IPv6(IPv6HeaderField),
}

impl NetworkHeaderField {
    /// The field holding the transport protocol number for the given family: the IPv4
    /// "protocol" byte, or the IPv6 "next header" byte.
    pub fn transport_protocol(family: ProtocolFamily) -> Option<Self> {
        match family {
            ProtocolFamily::Ipv4 => Some(NetworkHeaderField::IPv4(IPv4HeaderField::Protocol)),
            ProtocolFamily::Ipv6 => Some(NetworkHeaderField::IPv6(IPv6HeaderField::NextHeader)),
            _ => None,
        }
    }
}

impl HeaderField for NetworkHeaderField {
    fn offset(&self) -> u32 {
        use self::NetworkHeaderField::*;
        match *self {
            IPv4(ref f) => f.offset(),
            IPv6(ref f) => f.offset(),
        }
    }

    fn len(&self) -> u32 {
        use self::NetworkHeaderField::*;
        match *self {
            IPv4(ref f) => f.len(),
            IPv6(ref f) => f.len(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum IPv4HeaderField {
    Ttl,
    Protocol,
    Saddr,
    Daddr,
}

impl HeaderField for IPv4HeaderField {
    fn offset(&self) -> u32 {
        use self::IPv4HeaderField::*;
        match *self {
            Ttl => 8,
            Protocol => 9,
            Saddr => 12,
            Daddr => 16,
        }
    }

    fn len(&self) -> u32 {
        use self::IPv4HeaderField::*;
        match *self {
            Ttl => 1,
            Protocol => 1,
            Saddr => 4,
            Daddr => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum IPv6HeaderField {
    NextHeader,
    HopLimit,
    Saddr,
    Daddr,
}

impl HeaderField for IPv6HeaderField {
    fn offset(&self) -> u32 {
        use self::IPv6HeaderField::*;
        match *self {
            NextHeader => 6,
            HopLimit => 7,
            Saddr => 8,
            Daddr => 24,
        }
    }

    fn len(&self) -> u32 {
        use self::IPv6HeaderField::*;
        match *self {
            NextHeader => 1,
            HopLimit => 1,
            Saddr => 16,
            Daddr => 16,
        }
    }
}
