use crate::batch::{self, Batch};
use crate::error::{DecodeError, QueryError};
use crate::nlmsg::{pad_netlink_object_with_variable_size, NfNetlinkDeserializable, NlmFlags};
use crate::parser::{parse_nlmsg, NlMsg};
use crate::query::Session;
use crate::sys::{NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END, NFNL_SUBSYS_NFTABLES, NFT_MSG_NEWTABLE};
use crate::{MsgType, ProtocolFamily, Table};

use super::get_test_table;
use super::mock::{dumped_msg, MockKernel};

// splits a buffer into its netlink messages
fn split_messages(mut buf: &[u8]) -> Vec<&[u8]> {
    let mut res = Vec::new();
    while !buf.is_empty() {
        let (hdr, _) = parse_nlmsg(buf).expect("Invalid nlmsg message");
        let len = pad_netlink_object_with_variable_size(hdr.nlmsg_len as usize);
        res.push(&buf[..hdr.nlmsg_len as usize]);
        buf = &buf[len..];
    }
    res
}

#[test]
fn batch_is_framed_by_markers() {
    let table = get_test_table();
    let mut batch = Batch::new(5);
    batch.add(&table, MsgType::Add, 6);
    let buf = batch.finalize(7);

    let messages = split_messages(&buf);
    assert_eq!(messages.len(), 3);

    let (begin, _) = parse_nlmsg(messages[0]).unwrap();
    assert_eq!(begin.nlmsg_type, NFNL_MSG_BATCH_BEGIN);
    assert_eq!(begin.nlmsg_seq, 5);
    match parse_nlmsg(messages[0]).unwrap().1 {
        NlMsg::NfGenMsg(genmsg, raw) => {
            assert_eq!(u16::from_be(genmsg.res_id), NFNL_SUBSYS_NFTABLES);
            assert!(raw.is_empty());
        }
        _ => panic!("the batch begin marker should be a nfnetlink message"),
    }

    let (deserialized, remaining) = Table::deserialize(messages[1]).unwrap();
    assert_eq!(deserialized, table);
    assert!(remaining.is_empty());

    let (end, _) = parse_nlmsg(messages[2]).unwrap();
    assert_eq!(end.nlmsg_type, NFNL_MSG_BATCH_END);
    assert_eq!(end.nlmsg_seq, 7);
}

#[test]
fn execute_waits_for_the_acknowledgment() {
    let table = Table::new(ProtocolFamily::Ipv4).with_name("filter");
    let mut session = Session::new(MockKernel::new(), 100);

    batch::execute(&mut session, &table, MsgType::Add).expect("Couldn't add the table");
    assert_eq!(session.next_seq(), 103);

    let kernel = session.into_channel();
    assert_eq!(kernel.seqs, vec![100, 101, 102]);
    assert_eq!(kernel.requests.len(), 1);
    assert_eq!(kernel.requests[0].operation, NFT_MSG_NEWTABLE);
    assert_eq!(kernel.requests[0].seq, 101);
    assert_eq!(
        kernel.requests[0].flags,
        (NlmFlags::REQUEST | NlmFlags::ACK | NlmFlags::CREATE).bits()
    );
    assert!(kernel.has_table(ProtocolFamily::Ipv4, "filter"));
}

#[test]
fn execute_reports_missing_objects() {
    let table = Table::new(ProtocolFamily::Ipv6).with_name("filter");
    let mut session = Session::new(MockKernel::new(), 1);

    let err = batch::execute(&mut session, &table, MsgType::Del).unwrap_err();
    assert!(matches!(err, QueryError::NotFound));
}

#[test]
fn execute_rejects_data_replies() {
    let table = Table::new(ProtocolFamily::Ipv4).with_name("filter");
    let mut kernel = MockKernel::new();
    // a stray data message, in answer to the request
    kernel.queue_reply(dumped_msg(&table, 2));
    let mut session = Session::new(kernel, 1);

    let err = batch::execute(&mut session, &table, MsgType::Add).unwrap_err();
    assert!(matches!(
        err,
        QueryError::ProcessNetlinkError(DecodeError::UnexpectedType(_))
    ));
}
