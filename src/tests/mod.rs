use crate::nlmsg::{NfNetlinkObject, NfNetlinkWriter};
use crate::parser::{parse_nlmsg, NlMsg};
use crate::sys::{nfgenmsg, nlmsghdr, NLA_F_NESTED};
use crate::{Chain, MsgType, ProtocolFamily, Rule, Table};

mod batch;
mod chain;
pub(crate) mod mock;

pub const TABLE_NAME: &'static str = "mocktable";
pub const CHAIN_NAME: &'static str = "mockchain";

pub const TABLE_USERDATA: &'static str = "mocktabledata";
pub const RULE_USERDATA: &'static str = "mockruledata";

type NetLinkType = u16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetlinkExpr {
    Nested(NetLinkType, Vec<NetlinkExpr>),
    Final(NetLinkType, Vec<u8>),
    List(Vec<NetlinkExpr>),
}

impl NetlinkExpr {
    pub fn to_raw(self) -> Vec<u8> {
        match self {
            NetlinkExpr::Final(ty, val) => {
                let len = val.len() + 4;
                let mut res = Vec::with_capacity(len);

                res.extend(&(len as u16).to_ne_bytes());
                res.extend(&ty.to_ne_bytes());
                res.extend(val);
                // alignment
                while res.len() % 4 != 0 {
                    res.push(0);
                }

                res
            }
            NetlinkExpr::Nested(ty, exprs) => {
                let mut sub = Vec::new();
                for expr in exprs {
                    sub.append(&mut expr.to_raw());
                }

                let len = sub.len() + 4;
                let mut res = Vec::with_capacity(len);

                // set the "NESTED" flag
                res.extend(&(len as u16).to_ne_bytes());
                res.extend(&(ty | NLA_F_NESTED).to_ne_bytes());
                res.extend(sub);

                res
            }
            NetlinkExpr::List(exprs) => {
                let mut list = Vec::new();
                for expr in exprs {
                    list.append(&mut expr.to_raw());
                }
                list
            }
        }
    }
}

/// The bytes of `s` as sent to the kernel, NUL-terminated.
pub fn nul_terminated(s: &str) -> Vec<u8> {
    let mut res = s.as_bytes().to_vec();
    res.push(0);
    res
}

pub fn get_test_table() -> Table {
    Table::new(ProtocolFamily::Inet)
        .with_name(TABLE_NAME)
        .with_flags(0u32)
}

pub fn get_test_chain() -> Chain {
    Chain::new(&get_test_table()).with_name(CHAIN_NAME)
}

pub fn get_test_rule() -> Rule {
    Rule::new(&get_test_chain()).unwrap()
}

pub fn get_test_nlmsg_with_msg_type<'a>(
    buf: &'a mut Vec<u8>,
    obj: &impl NfNetlinkObject,
    msg_type: MsgType,
) -> (nlmsghdr, nfgenmsg, &'a [u8]) {
    let mut writer = NfNetlinkWriter::new(buf);
    obj.add_or_remove(&mut writer, msg_type, 0);

    let (hdr, msg) = parse_nlmsg(buf.as_slice()).expect("Couldn't parse the message");

    let (nfgenmsg, raw_value) = match msg {
        NlMsg::NfGenMsg(nfgenmsg, raw_value) => (nfgenmsg, raw_value),
        _ => panic!("Invalid return value type, expected a valid message"),
    };

    // sanity checks on the global message (this should be very similar/factorisable for the
    // most part in other tests)
    assert_eq!(nfgenmsg.res_id.to_be(), 0);
    assert_eq!(hdr.nlmsg_len as usize, buf.len());

    (hdr, nfgenmsg, raw_value)
}

pub fn get_test_nlmsg<'a>(
    buf: &'a mut Vec<u8>,
    obj: &impl NfNetlinkObject,
) -> (nlmsghdr, nfgenmsg, &'a [u8]) {
    get_test_nlmsg_with_msg_type(buf, obj, MsgType::Add)
}
