//! An in-memory stand-in for the nf_tables subsystem, answering requests the way the kernel does
//! for the few objects this crate manages.

use std::collections::VecDeque;
use std::convert::TryFrom;
use std::mem::size_of;

use crate::error::{DecodeError, QueryError};
use crate::expr::ExpressionVariant;
use crate::nlmsg::{
    pad_netlink_object, pad_netlink_object_with_variable_size, write_raw, NfNetlinkDeserializable,
    NfNetlinkObject, NfNetlinkWriter, NlmFlags,
};
use crate::parser::{get_operation_from_nlmsghdr_type, parse_nlmsg, NlMsg, Parsable};
use crate::query::NetlinkChannel;
use crate::sys::{
    nlmsgerr, nlmsghdr, NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END, NFT_MSG_DELCHAIN,
    NFT_MSG_DELRULE, NFT_MSG_DELTABLE, NFT_MSG_GETRULE, NFT_MSG_NEWCHAIN, NFT_MSG_NEWRULE,
    NFT_MSG_NEWTABLE, NLMSG_DONE, NLMSG_ERROR, NLM_F_ACK, NLM_F_EXCL,
};
use crate::{Chain, ProtocolFamily, Rule, Table};

pub const MOCK_PORT_ID: u32 = 4242;

/// A request the mock kernel received, outside of the batch markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub operation: u16,
    pub family: ProtocolFamily,
    pub flags: u16,
    pub seq: u32,
}

#[derive(Debug, Default)]
pub struct MockKernel {
    tables: Vec<Table>,
    chains: Vec<Chain>,
    rules: Vec<Rule>,
    next_handle: u64,
    replies: VecDeque<Vec<u8>>,
    failures: Vec<(u16, i32)>,
    strict_dumps: bool,
    short_writes: bool,
    /// Sequence numbers of every message received, batch markers included.
    pub seqs: Vec<u32>,
    pub requests: Vec<Request>,
    /// The rules received in deletion requests.
    pub deleted_rules: Vec<Rule>,
}

fn name_of(name: Option<&String>) -> &str {
    name.map(String::as_str).unwrap_or("")
}

fn jumps_to(rule: &Rule, chain: &str) -> bool {
    rule.get_expressions()
        .map(|exprs| {
            exprs.iter().any(|expr| match expr.get_data() {
                Some(ExpressionVariant::Immediate(imm)) => imm.verdict_chain() == Some(chain),
                _ => false,
            })
        })
        .unwrap_or(false)
}

fn write_header(buf: &mut Vec<u8>, msg_type: u16, flags: u16, seq: u32, len: usize) {
    let hdr = nlmsghdr {
        nlmsg_len: (pad_netlink_object::<nlmsghdr>() + len) as u32,
        nlmsg_type: msg_type,
        nlmsg_flags: flags,
        nlmsg_seq: seq,
        nlmsg_pid: MOCK_PORT_ID,
    };
    let start = buf.len();
    buf.resize(start + pad_netlink_object::<nlmsghdr>() + len, 0);
    write_raw(&mut buf[start..], hdr);
}

/// A `NLMSG_ERROR` message carrying `errno`, or an acknowledgment when it is 0.
pub fn error_msg(request: &nlmsghdr, errno: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    write_header(&mut buf, NLMSG_ERROR, 0, request.nlmsg_seq, size_of::<nlmsgerr>());
    let err = nlmsgerr {
        error: -errno,
        msg: *request,
    };
    write_raw(&mut buf[pad_netlink_object::<nlmsghdr>()..], err);
    buf
}

/// The `NLMSG_DONE` message terminating a dump.
pub fn done_msg(seq: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    write_header(&mut buf, NLMSG_DONE, NlmFlags::MULTI.bits(), seq, size_of::<i32>());
    buf
}

/// `obj`, as the kernel reports it in a dump.
pub fn dumped_msg<T: NfNetlinkObject>(obj: &T, seq: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut buf);
    writer.write_header(
        T::MSG_TYPE_ADD,
        obj.get_family(),
        NlmFlags::MULTI,
        seq,
        None,
    );
    let payload = writer.add_data_zeroed(obj.get_size());
    obj.write_payload(payload);
    writer.finalize_writing_object();
    buf[12..16].copy_from_slice(&MOCK_PORT_ID.to_ne_bytes());
    buf
}

impl MockKernel {
    pub fn new() -> Self {
        MockKernel {
            next_handle: 1,
            ..Default::default()
        }
    }

    /// Answers dumps of missing chains with `ENOENT`, instead of an empty dump.
    pub fn with_strict_dumps(mut self) -> Self {
        self.strict_dumps = true;
        self
    }

    /// Only accepts part of every datagram sent.
    pub fn with_short_writes(mut self) -> Self {
        self.short_writes = true;
        self
    }

    /// Fails the next request of kind `operation` with `errno`.
    pub fn fail_next(&mut self, operation: u16, errno: i32) {
        self.failures.push((operation, errno));
    }

    /// Queues a raw datagram, returned by the next call to `recv`.
    pub fn queue_reply(&mut self, datagram: Vec<u8>) {
        self.replies.push_back(datagram);
    }

    pub fn add_table(&mut self, family: ProtocolFamily, name: &str) {
        if !self.has_table(family, name) {
            self.tables.push(Table::new(family).with_name(name));
        }
    }

    pub fn add_chain(&mut self, chain: Chain) {
        let family = chain.get_family();
        self.add_table(family, name_of(chain.get_table()));
        if self.chain(family, name_of(chain.get_name())).is_none() {
            self.chains.push(chain);
        }
    }

    /// Appends `rule` to its chain (which is created when missing), returning its handle.
    pub fn add_rule(&mut self, rule: Rule) -> u64 {
        let family = rule.get_family();
        let table = Table::new(family).with_name(name_of(rule.get_table()));
        self.add_chain(Chain::new(&table).with_name(name_of(rule.get_chain())));
        self.append_rule(rule)
    }

    fn append_rule(&mut self, mut rule: Rule) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        rule.set_handle(handle);
        self.rules.push(rule);
        handle
    }

    pub fn has_table(&self, family: ProtocolFamily, name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.get_family() == family && name_of(t.get_name()) == name)
    }

    pub fn chain(&self, family: ProtocolFamily, name: &str) -> Option<&Chain> {
        self.chains
            .iter()
            .find(|c| c.get_family() == family && name_of(c.get_name()) == name)
    }

    /// The rules of `chain`, in order.
    pub fn rules_in(&self, family: ProtocolFamily, chain: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.get_family() == family && name_of(r.get_chain()) == chain)
            .collect()
    }

    fn take_failure(&mut self, operation: u16) -> Option<i32> {
        let pos = self.failures.iter().position(|(op, _)| *op == operation)?;
        Some(self.failures.remove(pos).1)
    }

    // applies one request, returning the errno to report (0 on success)
    fn apply(&mut self, operation: u16, msg: &[u8]) -> Result<i32, DecodeError> {
        Ok(match operation {
            NFT_MSG_NEWTABLE => {
                let (table, _) = Table::deserialize(msg)?;
                self.add_table(table.get_family(), name_of(table.get_name()));
                0
            }
            NFT_MSG_DELTABLE => {
                let (table, _) = Table::deserialize(msg)?;
                let (family, name) = (table.get_family(), name_of(table.get_name()));
                if !self.has_table(family, name) {
                    return Ok(libc::ENOENT);
                }
                self.tables
                    .retain(|t| !(t.get_family() == family && name_of(t.get_name()) == name));
                self.chains.retain(|c| c.get_family() != family);
                self.rules.retain(|r| r.get_family() != family);
                0
            }
            NFT_MSG_NEWCHAIN => {
                let (chain, _) = Chain::deserialize(msg)?;
                let family = chain.get_family();
                if !self.has_table(family, name_of(chain.get_table())) {
                    return Ok(libc::ENOENT);
                }
                if self.chain(family, name_of(chain.get_name())).is_some() {
                    return Ok(if self.last_flags() & NLM_F_EXCL != 0 {
                        libc::EEXIST
                    } else {
                        0
                    });
                }
                self.chains.push(chain);
                0
            }
            NFT_MSG_DELCHAIN => {
                let (chain, _) = Chain::deserialize(msg)?;
                let (family, name) = (chain.get_family(), name_of(chain.get_name()));
                if self.chain(family, name).is_none() {
                    return Ok(libc::ENOENT);
                }
                let referenced = self
                    .rules
                    .iter()
                    .any(|r| r.get_family() == family && jumps_to(r, name));
                if !self.rules_in(family, name).is_empty() || referenced {
                    return Ok(libc::EBUSY);
                }
                self.chains
                    .retain(|c| !(c.get_family() == family && name_of(c.get_name()) == name));
                0
            }
            NFT_MSG_NEWRULE => {
                let (rule, _) = Rule::deserialize(msg)?;
                if self
                    .chain(rule.get_family(), name_of(rule.get_chain()))
                    .is_none()
                {
                    return Ok(libc::ENOENT);
                }
                self.append_rule(rule);
                0
            }
            NFT_MSG_DELRULE => {
                let (rule, _) = Rule::deserialize(msg)?;
                let family = rule.get_family();
                let chain = name_of(rule.get_chain()).to_string();
                if self.chain(family, &chain).is_none() {
                    return Ok(libc::ENOENT);
                }
                let before = self.rules.len();
                match rule.get_handle().copied() {
                    Some(handle) => {
                        self.rules.retain(|r| r.get_handle() != Some(&handle));
                        if self.rules.len() == before {
                            return Ok(libc::ENOENT);
                        }
                    }
                    None => self.rules.retain(|r| {
                        !(r.get_family() == family && name_of(r.get_chain()) == chain)
                    }),
                }
                self.deleted_rules.push(rule);
                0
            }
            x => return Err(DecodeError::UnsupportedType(x)),
        })
    }

    fn last_flags(&self) -> u16 {
        self.requests.last().map(|r| r.flags).unwrap_or(0)
    }

    fn dump_rules(&mut self, hdr: &nlmsghdr, msg: &[u8]) -> Result<(), DecodeError> {
        let (filter, nfgenmsg, _) =
            Rule::parse_object(msg, NFT_MSG_GETRULE, NFT_MSG_GETRULE)?;
        let family = ProtocolFamily::try_from(nfgenmsg.nfgen_family as i32)?;
        let chain = name_of(filter.get_chain());

        if self.chain(family, chain).is_none() && self.strict_dumps {
            self.queue_reply(error_msg(hdr, libc::ENOENT));
            return Ok(());
        }

        let mut datagram = Vec::new();
        for rule in self.rules_in(family, chain) {
            datagram.extend(dumped_msg(rule, hdr.nlmsg_seq));
        }
        datagram.extend(done_msg(hdr.nlmsg_seq));
        self.queue_reply(datagram);
        Ok(())
    }

    fn process(&mut self, mut buf: &[u8]) -> Result<(), DecodeError> {
        while !buf.is_empty() {
            let (hdr, msg) = parse_nlmsg(buf)?;
            let len = hdr.nlmsg_len as usize;
            self.seqs.push(hdr.nlmsg_seq);

            if let NlMsg::NfGenMsg(nfgenmsg, _) = msg {
                if hdr.nlmsg_type != NFNL_MSG_BATCH_BEGIN && hdr.nlmsg_type != NFNL_MSG_BATCH_END {
                    let operation = get_operation_from_nlmsghdr_type(hdr.nlmsg_type) as u16;
                    self.requests.push(Request {
                        operation,
                        family: ProtocolFamily::try_from(nfgenmsg.nfgen_family as i32)?,
                        flags: hdr.nlmsg_flags,
                        seq: hdr.nlmsg_seq,
                    });

                    if let Some(errno) = self.take_failure(operation) {
                        self.queue_reply(error_msg(&hdr, errno));
                    } else if operation == NFT_MSG_GETRULE {
                        self.dump_rules(&hdr, &buf[..len])?;
                    } else {
                        let errno = self.apply(operation, &buf[..len])?;
                        // errors are always reported, successes only when asked for
                        if errno != 0 || hdr.nlmsg_flags & NLM_F_ACK != 0 {
                            self.queue_reply(error_msg(&hdr, errno));
                        }
                    }
                }
            }

            buf = buf
                .get(pad_netlink_object_with_variable_size(len)..)
                .unwrap_or(&[]);
        }
        Ok(())
    }
}

impl NetlinkChannel for MockKernel {
    fn send(&mut self, buf: &[u8]) -> Result<usize, QueryError> {
        if self.short_writes {
            return Ok(buf.len() / 2);
        }
        self.process(buf)?;
        Ok(buf.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, QueryError> {
        match self.replies.pop_front() {
            Some(datagram) => {
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(datagram.len())
            }
            None => Ok(0),
        }
    }

    fn port_id(&self) -> u32 {
        MOCK_PORT_ID
    }
}
