use std::mem::size_of;

use crate::{
    error::DecodeError,
    nlmsg::{
        pad_netlink_object, pad_netlink_object_with_variable_size, read_raw, write_raw,
        AttributeDecoder, NfNetlinkAttribute,
    },
    sys::{
        nfgenmsg, nlattr, nlmsgerr, nlmsghdr, NFNETLINK_V0, NFNL_MSG_BATCH_BEGIN,
        NFNL_MSG_BATCH_END, NFNL_SUBSYS_NFTABLES, NLA_F_NESTED, NLA_TYPE_MASK, NLMSG_DONE,
        NLMSG_ERROR, NLMSG_MIN_TYPE, NLMSG_NOOP, NLM_F_DUMP_INTR,
    },
};

/// The largest nf_tables netlink message is the set element message, which contains the
/// NFTA_SET_ELEM_LIST_ELEMENTS attribute. This attribute is a nest that describes the set
/// elements. Given that the netlink attribute length (nla_len) is 16 bits, the largest message is
/// a bit larger than 64 KBytes.
pub fn nft_nlmsg_maxsize() -> u32 {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u32::from(u16::MAX) + page_size.max(4096) as u32
}

pub fn get_subsystem_from_nlmsghdr_type(x: u16) -> u8 {
    ((x & 0xff00) >> 8) as u8
}

pub fn get_operation_from_nlmsghdr_type(x: u16) -> u8 {
    (x & 0x00ff) as u8
}

pub fn get_nlmsghdr(buf: &[u8]) -> Result<nlmsghdr, DecodeError> {
    let size_of_hdr = size_of::<nlmsghdr>();

    let nlmsghdr: nlmsghdr = read_raw(buf)?;

    if nlmsghdr.nlmsg_len as usize > buf.len() || (nlmsghdr.nlmsg_len as usize) < size_of_hdr {
        return Err(DecodeError::NlMsgTooSmall);
    }

    if nlmsghdr.nlmsg_flags & NLM_F_DUMP_INTR != 0 {
        return Err(DecodeError::ConcurrentGenerationUpdate);
    }

    Ok(nlmsghdr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlMsg<'a> {
    Done,
    Noop,
    Error(nlmsgerr),
    NfGenMsg(nfgenmsg, &'a [u8]),
}

pub fn parse_nlmsg<'a>(buf: &'a [u8]) -> Result<(nlmsghdr, NlMsg<'a>), DecodeError> {
    // in theory the message is composed of the following parts:
    // - nlmsghdr (contains the message size and type)
    // - struct nlmsgerr OR nfgenmsg (nftables header that describes the message family)
    // - the raw value that we want to validate (if the previous part is nfgenmsg)
    let hdr = get_nlmsghdr(buf)?;

    let size_of_hdr = pad_netlink_object::<nlmsghdr>();

    if hdr.nlmsg_type < NLMSG_MIN_TYPE {
        match hdr.nlmsg_type {
            NLMSG_NOOP => return Ok((hdr, NlMsg::Noop)),
            NLMSG_ERROR => {
                if (hdr.nlmsg_len as usize) < size_of_hdr + size_of::<nlmsgerr>() {
                    return Err(DecodeError::NlMsgTooSmall);
                }
                let mut err: nlmsgerr = read_raw(&buf[size_of_hdr..])?;
                // some APIs return negative values, while other return positive values
                err.error = err.error.abs();
                return Ok((hdr, NlMsg::Error(err)));
            }
            NLMSG_DONE => return Ok((hdr, NlMsg::Done)),
            x => return Err(DecodeError::UnsupportedType(x)),
        }
    }

    // batch messages are not specific to the nftables subsystem
    if hdr.nlmsg_type != NFNL_MSG_BATCH_BEGIN && hdr.nlmsg_type != NFNL_MSG_BATCH_END {
        // verify that we are decoding nftables messages
        let subsys = get_subsystem_from_nlmsghdr_type(hdr.nlmsg_type);
        if subsys != NFNL_SUBSYS_NFTABLES as u8 {
            return Err(DecodeError::InvalidSubsystem(subsys));
        }
    }

    let size_of_nfgenmsg = pad_netlink_object::<nfgenmsg>();
    if (hdr.nlmsg_len as usize) < size_of_hdr + size_of_nfgenmsg {
        return Err(DecodeError::NlMsgTooSmall);
    }

    let nfgenmsg: nfgenmsg = read_raw(&buf[size_of_hdr..])?;

    if nfgenmsg.version != NFNETLINK_V0 {
        return Err(DecodeError::InvalidVersion(nfgenmsg.version));
    }

    let raw_value = &buf[size_of_hdr + size_of_nfgenmsg..hdr.nlmsg_len as usize];

    Ok((hdr, NlMsg::NfGenMsg(nfgenmsg, raw_value)))
}

/// Write the attribute, preceded by a `libc::nlattr`
// rewrite of `mnl_attr_put`
pub fn write_attribute<T: NfNetlinkAttribute>(ty: u16, obj: &T, buf: &mut [u8]) {
    let header_len = pad_netlink_object::<nlattr>();
    // nla_len contains the header size + the unpadded attribute length
    let mut header = nlattr {
        nla_len: (header_len + obj.get_size()) as u16,
        nla_type: ty,
    };
    if obj.is_nested() {
        header.nla_type |= NLA_F_NESTED;
    }
    write_raw(buf, header);

    // copy the attribute data itself
    obj.write_payload(&mut buf[header_len..header_len + obj.get_size()]);
}

/// Iterates over the attributes of a buffer, calling `cb` with the type (stripped of the
/// nested/byteorder flags) and the content of each attribute.
pub(crate) fn for_each_attribute<'a>(
    buf: &'a [u8],
    mut cb: impl FnMut(u16, &'a [u8]) -> Result<(), DecodeError>,
) -> Result<(), DecodeError> {
    let header_len = pad_netlink_object::<nlattr>();
    let mut pos = 0;
    while buf.len() - pos >= header_len {
        let nlattr: nlattr = read_raw(&buf[pos..])?;
        let nla_len = nlattr.nla_len as usize;
        if nla_len < header_len || pos + nla_len > buf.len() {
            return Err(DecodeError::InvalidDataSize);
        }
        // ignore the byteorder and nested attributes
        let nla_type = nlattr.nla_type & NLA_TYPE_MASK;

        cb(nla_type, &buf[pos + header_len..pos + nla_len])?;

        pos += pad_netlink_object_with_variable_size(nla_len);
    }

    if pos < buf.len() {
        Err(DecodeError::InvalidDataSize)
    } else {
        Ok(())
    }
}

pub(crate) fn read_attributes<T: AttributeDecoder + Default>(buf: &[u8]) -> Result<T, DecodeError> {
    trace!(
        "Calling <{} as NfNetlinkDeserialize>::deserialize()",
        std::any::type_name::<T>()
    );
    let mut res = T::default();

    for_each_attribute(buf, |nla_type, content| {
        match T::decode_attribute(&mut res, nla_type, content) {
            Ok(()) => Ok(()),
            Err(DecodeError::UnsupportedAttributeType(t)) => {
                trace!(
                    "Ignoring unsupported attribute type {} for type {}",
                    t,
                    std::any::type_name::<T>()
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    })?;

    Ok(res)
}

pub trait Parsable
where
    Self: Sized,
{
    fn parse_object(
        buf: &[u8],
        add_obj: u16,
        del_obj: u16,
    ) -> Result<(Self, nfgenmsg, &[u8]), DecodeError>;
}

impl<T> Parsable for T
where
    T: AttributeDecoder + Default + Sized,
{
    fn parse_object(
        buf: &[u8],
        add_obj: u16,
        del_obj: u16,
    ) -> Result<(Self, nfgenmsg, &[u8]), DecodeError> {
        trace!("parse_object() started");
        let (hdr, msg) = parse_nlmsg(buf)?;

        let op = get_operation_from_nlmsghdr_type(hdr.nlmsg_type) as u16;

        if op != add_obj && op != del_obj {
            return Err(DecodeError::UnexpectedType(hdr.nlmsg_type));
        }

        let remaining_data_offset = pad_netlink_object_with_variable_size(hdr.nlmsg_len as usize);
        let remaining_data = buf.get(remaining_data_offset..).unwrap_or(&[]);

        let (nfgenmsg, res) = match msg {
            NlMsg::NfGenMsg(nfgenmsg, content) => (nfgenmsg, read_attributes(content)?),
            _ => return Err(DecodeError::UnexpectedType(hdr.nlmsg_type)),
        };

        Ok((res, nfgenmsg, remaining_data))
    }
}
