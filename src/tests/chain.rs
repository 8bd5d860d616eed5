use crate::nlmsg::NfNetlinkDeserializable;
use crate::parser::get_operation_from_nlmsghdr_type;
use crate::sys::{
    NFTA_CHAIN_HOOK, NFTA_CHAIN_NAME, NFTA_CHAIN_POLICY, NFTA_CHAIN_TABLE, NFTA_CHAIN_TYPE,
    NFTA_HOOK_HOOKNUM, NFTA_HOOK_PRIORITY, NFT_MSG_DELCHAIN, NFT_MSG_NEWCHAIN, NF_ACCEPT,
    NF_INET_LOCAL_IN,
};
use crate::{Chain, ChainPolicy, ChainType, Hook, HookClass, MsgType};

use super::{
    get_test_chain, get_test_nlmsg, get_test_nlmsg_with_msg_type, nul_terminated, NetlinkExpr,
    CHAIN_NAME, TABLE_NAME,
};

fn get_test_base_chain() -> Chain {
    get_test_chain()
        .with_hook(Hook::new(HookClass::In, 0))
        .with_policy(ChainPolicy::Accept)
        .with_type(ChainType::Filter)
}

#[test]
fn new_empty_chain() {
    let chain = get_test_chain();
    let mut buf = Vec::new();
    let (nlmsghdr, _nfgenmsg, raw_expr) = get_test_nlmsg(&mut buf, &chain);
    assert_eq!(
        get_operation_from_nlmsghdr_type(nlmsghdr.nlmsg_type),
        NFT_MSG_NEWCHAIN as u8
    );
    assert_eq!(nlmsghdr.nlmsg_len, 52);
    assert!(!chain.is_base_chain());

    assert_eq!(
        raw_expr,
        NetlinkExpr::List(vec![
            NetlinkExpr::Final(NFTA_CHAIN_TABLE, nul_terminated(TABLE_NAME)),
            NetlinkExpr::Final(NFTA_CHAIN_NAME, nul_terminated(CHAIN_NAME)),
        ])
        .to_raw()
    );
}

#[test]
fn new_base_chain() {
    let chain = get_test_base_chain();
    let mut buf = Vec::new();
    let (nlmsghdr, _nfgenmsg, raw_expr) = get_test_nlmsg(&mut buf, &chain);
    assert_eq!(nlmsghdr.nlmsg_len, 92);
    assert!(chain.is_base_chain());

    assert_eq!(
        raw_expr,
        NetlinkExpr::List(vec![
            NetlinkExpr::Final(NFTA_CHAIN_TABLE, nul_terminated(TABLE_NAME)),
            NetlinkExpr::Final(NFTA_CHAIN_NAME, nul_terminated(CHAIN_NAME)),
            NetlinkExpr::Nested(
                NFTA_CHAIN_HOOK,
                vec![
                    NetlinkExpr::Final(NFTA_HOOK_HOOKNUM, NF_INET_LOCAL_IN.to_be_bytes().to_vec()),
                    NetlinkExpr::Final(NFTA_HOOK_PRIORITY, 0u32.to_be_bytes().to_vec()),
                ]
            ),
            NetlinkExpr::Final(NFTA_CHAIN_POLICY, NF_ACCEPT.to_be_bytes().to_vec()),
            NetlinkExpr::Final(NFTA_CHAIN_TYPE, nul_terminated("filter")),
        ])
        .to_raw()
    );
}

#[test]
fn delete_empty_chain() {
    let chain = get_test_chain();
    let mut buf = Vec::new();
    let (nlmsghdr, _nfgenmsg, raw_expr) =
        get_test_nlmsg_with_msg_type(&mut buf, &chain, MsgType::Del);
    assert_eq!(
        get_operation_from_nlmsghdr_type(nlmsghdr.nlmsg_type),
        NFT_MSG_DELCHAIN as u8
    );
    assert_eq!(nlmsghdr.nlmsg_len, 52);

    assert_eq!(
        raw_expr,
        NetlinkExpr::List(vec![
            NetlinkExpr::Final(NFTA_CHAIN_TABLE, nul_terminated(TABLE_NAME)),
            NetlinkExpr::Final(NFTA_CHAIN_NAME, nul_terminated(CHAIN_NAME)),
        ])
        .to_raw()
    );
}

#[test]
fn parse_base_chain() {
    let chain = get_test_base_chain();
    let mut buf = Vec::new();
    get_test_nlmsg(&mut buf, &chain);

    let (deserialized, remaining) = Chain::deserialize(&buf).expect("Couldn't parse the chain");
    assert_eq!(deserialized, chain);
    assert_eq!(
        deserialized.get_hook().and_then(|hook| hook.get_class()),
        Some(&HookClass::In)
    );
    assert!(remaining.is_empty());
}
