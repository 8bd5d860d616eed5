use rtpe_nftables::expr::{Counter, ExpressionList, Immediate, Target, VerdictKind};
use rtpe_nftables::firewall::{RuleMatcher, TargetInfo};
use rtpe_nftables::{
    setup_firewall, shutdown_firewall, Chain, FirewallConfig, FirewallError, Operation,
    ProtocolFamily, QueryError, Rule, Table,
};

fn input_chain() -> Chain {
    Chain::new(&Table::new(ProtocolFamily::Ipv6).with_name("filter")).with_name("INPUT")
}

#[test]
fn empty_chain_name_disables_everything() {
    // never touches the kernel, so no privileges are needed
    assert_eq!(setup_firewall("", "INPUT", 0), None);
    assert_eq!(shutdown_firewall("", "INPUT"), None);
}

#[test]
fn config_from_json() {
    let config: FirewallConfig = serde_json::from_str(r#"{"chain": "rtpengine"}"#).unwrap();
    assert_eq!(config, FirewallConfig::new("rtpengine"));
    assert_eq!(config.base_chain(), None);
    assert_eq!(config.table_id(), 0);

    let config: FirewallConfig =
        serde_json::from_str(r#"{"chain": "rtpengine", "base_chain": "", "table_id": 4}"#)
            .unwrap();
    assert_eq!(config.base_chain(), None);
    assert_eq!(config.table_id(), 4);
    assert!(config.is_enabled());

    let config = FirewallConfig::new("rtpengine")
        .with_base_chain("INPUT")
        .with_table_id(2);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: FirewallConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn matcher_on_built_rules() {
    let matcher = RuleMatcher::new("rtpengine");

    let jump = Rule::new(&input_chain()).unwrap().with_expressions(
        ExpressionList::default()
            .with_expression(Counter::new())
            .with_expression(Immediate::new_verdict(VerdictKind::Jump {
                chain: "rtpengine".to_string(),
            })),
    );
    assert!(matcher.classify(&jump));
    assert!(!RuleMatcher::new("other").classify(&jump));

    let forward = Rule::new(&input_chain()).unwrap().with_expressions(
        ExpressionList::default()
            .with_expression(Target::new("RTPENGINE", 0, TargetInfo::new(0).to_bytes())),
    );
    assert!(RuleMatcher::new("anything").classify(&forward));
}

#[test]
fn error_descriptions() {
    let err = FirewallError::new(Operation::OpenSocket, QueryError::NotNetlinkSocket);
    assert_eq!(
        err.to_string(),
        "open netlink socket failed (transport error): This socket is not a netlink socket"
    );

    let err = FirewallError::new(Operation::DeleteRule, QueryError::NotFound)
        .with_family(ProtocolFamily::Ipv6)
        .with_object("INPUT");
    assert_eq!(
        err.to_string(),
        "ipv6: delete rule 'INPUT' failed (not found): The object does not exist"
    );
    assert!(std::error::Error::source(&err).is_some());
}
