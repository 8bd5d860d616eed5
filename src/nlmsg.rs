use std::{fmt::Debug, mem::size_of};

use bitflags::bitflags;

use crate::{
    error::DecodeError,
    sys::{
        nfgenmsg, nlmsghdr, NFNETLINK_V0, NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END,
        NFNL_SUBSYS_NFTABLES, NLMSG_ALIGNTO, NLM_F_ACK, NLM_F_APPEND, NLM_F_CREATE, NLM_F_DUMP,
        NLM_F_DUMP_INTR, NLM_F_ECHO, NLM_F_EXCL, NLM_F_MULTI, NLM_F_REPLACE, NLM_F_REQUEST,
    },
    MsgType, ProtocolFamily,
};

bitflags! {
    /// Flags of the `nlmsghdr` header.
    pub struct NlmFlags: u16 {
        const REQUEST = NLM_F_REQUEST;
        const MULTI = NLM_F_MULTI;
        const ACK = NLM_F_ACK;
        const ECHO = NLM_F_ECHO;
        const DUMP_INTR = NLM_F_DUMP_INTR;
        const DUMP = NLM_F_DUMP;
        const REPLACE = NLM_F_REPLACE;
        const EXCL = NLM_F_EXCL;
        const CREATE = NLM_F_CREATE;
        const APPEND = NLM_F_APPEND;
    }
}

#[inline]
pub const fn pad_netlink_object_with_variable_size(size: usize) -> usize {
    // align on a 4 bytes boundary
    (size + (NLMSG_ALIGNTO as usize - 1)) & !(NLMSG_ALIGNTO as usize - 1)
}

#[inline]
pub const fn pad_netlink_object<T>() -> usize {
    let size = size_of::<T>();
    pad_netlink_object_with_variable_size(size)
}

/// Plain `repr(C)` kernel structures, made only of integers, that can be copied from and to
/// unaligned byte buffers.
pub(crate) trait RawNetlinkStruct: Copy + Default {}

impl RawNetlinkStruct for crate::sys::nlmsghdr {}
impl RawNetlinkStruct for crate::sys::nlmsgerr {}
impl RawNetlinkStruct for crate::sys::nlattr {}
impl RawNetlinkStruct for crate::sys::nfgenmsg {}

pub(crate) fn write_raw<T: RawNetlinkStruct>(buf: &mut [u8], value: T) {
    let dst = &mut buf[..size_of::<T>()];
    // SAFETY: `dst` holds exactly `size_of::<T>()` bytes and T is plain old data
    unsafe { std::ptr::write_unaligned(dst.as_mut_ptr() as *mut T, value) }
}

pub(crate) fn read_raw<T: RawNetlinkStruct>(buf: &[u8]) -> Result<T, DecodeError> {
    if buf.len() < size_of::<T>() {
        return Err(DecodeError::BufTooSmall);
    }
    // SAFETY: the length was checked above, and every bit pattern is a valid T
    Ok(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) })
}

pub struct NfNetlinkWriter<'a> {
    buf: &'a mut Vec<u8>,
    // offset of the header of the message currently being written
    header_start: Option<usize>,
}

impl<'a> NfNetlinkWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> NfNetlinkWriter<'a> {
        NfNetlinkWriter {
            buf,
            header_start: None,
        }
    }

    pub fn add_data_zeroed<'b>(&'b mut self, size: usize) -> &'b mut [u8] {
        let padded_size = pad_netlink_object_with_variable_size(size);
        let start = self.buf.len();
        self.buf.resize(start + padded_size, 0);

        // resize the current message to hold the new bytes
        if let Some(hdr_start) = self.header_start {
            let msg_len = (self.buf.len() - hdr_start) as u32;
            self.buf[hdr_start..hdr_start + 4].copy_from_slice(&msg_len.to_ne_bytes());
        }

        &mut self.buf[start..start + size]
    }

    // rewrite of `__nftnl_nlmsg_build_hdr`
    pub fn write_header(
        &mut self,
        msg_type: u16,
        family: ProtocolFamily,
        flags: NlmFlags,
        seq: u32,
        ressource_id: Option<u16>,
    ) {
        let nlmsghdr_len = pad_netlink_object::<nlmsghdr>();
        let nfgenmsg_len = pad_netlink_object::<nfgenmsg>();

        self.header_start = Some(self.buf.len());

        let mut nlmsg_type = msg_type;
        // batch messages are not specific to the nftables subsystem
        if msg_type != NFNL_MSG_BATCH_BEGIN && msg_type != NFNL_MSG_BATCH_END {
            nlmsg_type |= NFNL_SUBSYS_NFTABLES << 8;
        }
        let hdr = nlmsghdr {
            nlmsg_len: nlmsghdr_len as u32,
            nlmsg_type,
            nlmsg_flags: (NlmFlags::REQUEST | flags).bits(),
            nlmsg_seq: seq,
            nlmsg_pid: 0,
        };
        write_raw(self.add_data_zeroed(nlmsghdr_len), hdr);

        let genmsg = nfgenmsg {
            nfgen_family: family as u8,
            version: NFNETLINK_V0,
            res_id: ressource_id.unwrap_or(0).to_be(),
        };
        write_raw(self.add_data_zeroed(nfgenmsg_len), genmsg);
    }

    pub fn finalize_writing_object(&mut self) {
        self.header_start = None;
    }
}

pub trait AttributeDecoder {
    fn decode_attribute(&mut self, attr_type: u16, buf: &[u8]) -> Result<(), DecodeError>;
}

pub trait NfNetlinkDeserializable: Sized {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError>;
}

pub trait NfNetlinkObject:
    Sized + AttributeDecoder + NfNetlinkDeserializable + NfNetlinkAttribute
{
    const MSG_TYPE_ADD: u16;
    const MSG_TYPE_DEL: u16;

    fn add_or_remove<'a>(&self, writer: &mut NfNetlinkWriter<'a>, msg_type: MsgType, seq: u32) {
        let (raw_msg_type, flags) = match msg_type {
            MsgType::Add => (Self::MSG_TYPE_ADD, self.get_add_flags()),
            MsgType::Del => (Self::MSG_TYPE_DEL, NlmFlags::empty()),
        };
        writer.write_header(
            raw_msg_type,
            self.get_family(),
            flags | NlmFlags::ACK,
            seq,
            None,
        );
        let buf = writer.add_data_zeroed(self.get_size());
        self.write_payload(buf);
        writer.finalize_writing_object();
    }

    fn get_family(&self) -> ProtocolFamily;

    fn set_family(&mut self, _family: ProtocolFamily) {
        // the default impl do nothing, because some types are family-agnostic
    }

    fn with_family(mut self, family: ProtocolFamily) -> Self {
        self.set_family(family);
        self
    }

    fn get_add_flags(&self) -> NlmFlags {
        NlmFlags::CREATE
    }
}

pub trait NfNetlinkAttribute: Debug + Sized {
    // is it a nested argument that must be marked with a NLA_F_NESTED flag?
    fn is_nested(&self) -> bool {
        false
    }

    fn get_size(&self) -> usize {
        size_of::<Self>()
    }

    // example body: buf[..self.get_size()].copy_from_slice(&self.to_be_bytes());
    fn write_payload(&self, addr: &mut [u8]);
}
