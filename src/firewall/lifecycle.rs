//! The setup and shutdown sequences of one address family.

use std::collections::VecDeque;

use crate::batch;
use crate::chain::{Chain, ChainPolicy, ChainType, Hook, HookClass};
use crate::error::QueryError;
use crate::expr::{
    Cmp, CmpOp, Counter, ExpressionList, HighLevelPayload, Immediate, NetworkHeaderField, Target,
    VerdictKind,
};
use crate::nlmsg::NfNetlinkObject;
use crate::query::{dump_rules, NetlinkChannel, Session};
use crate::{MsgType, ProtocolFamily, Rule, Table};

use super::{
    FirewallConfig, FirewallError, Operation, RuleMatcher, TargetInfo, LEGACY_INPUT_CHAINS,
    TABLE_NAME, TARGET_NAME, TARGET_REVISION,
};

// builds the error of a failed `operation` on the object `name`
fn failed(
    operation: Operation,
    family: ProtocolFamily,
    name: &str,
) -> impl FnOnce(QueryError) -> FirewallError + '_ {
    move |e| {
        FirewallError::new(operation, e)
            .with_family(family)
            .with_object(name)
    }
}

fn check_family(family: ProtocolFamily) -> Result<(), FirewallError> {
    match family {
        ProtocolFamily::Ipv4 | ProtocolFamily::Ipv6 => Ok(()),
        other => Err(
            FirewallError::new(Operation::SelectFamily, QueryError::UnsupportedFamily(other))
                .with_family(other),
        ),
    }
}

// the target of a delete may already be gone
fn tolerate_absence(res: Result<(), QueryError>, what: &str) -> Result<(), QueryError> {
    match res {
        Err(QueryError::NotFound) => {
            warn!("Ignoring the absence of {}", what);
            Ok(())
        }
        res => res,
    }
}

fn filter_table(family: ProtocolFamily) -> Table {
    Table::new(family).with_name(TABLE_NAME)
}

/// A chain of the `filter` table attached to the local input hook, accepting packets by default.
fn local_input_chain(table: &Table, name: &str) -> Chain {
    Chain::new(table)
        .with_name(name)
        .with_hook(Hook::new(HookClass::In, 0))
        .with_policy(ChainPolicy::Accept)
        .with_type(ChainType::Filter)
}

/// A rule of `base_chain` sending UDP packets to the chain `target`.
fn jump_rule(base_chain: &Chain, target: &str) -> Result<Rule, QueryError> {
    let family = base_chain.get_family();
    let protocol = NetworkHeaderField::transport_protocol(family)
        .ok_or(QueryError::UnsupportedFamily(family))?;

    Ok(Rule::new(base_chain)?.with_expressions(
        ExpressionList::default()
            .with_expression(HighLevelPayload::Network(protocol).build())
            .with_expression(Cmp::new(CmpOp::Eq, [libc::IPPROTO_UDP as u8]))
            .with_expression(Counter::new())
            .with_expression(Immediate::new_verdict(VerdictKind::Jump {
                chain: target.to_string(),
            })),
    ))
}

/// A rule of `chain` handing every packet to the forwarding table `table_id` of the kernel
/// module.
fn target_rule(chain: &Chain, table_id: u32) -> Result<Rule, QueryError> {
    Ok(Rule::new(chain)?.with_expressions(
        ExpressionList::default()
            .with_expression(Target::new(
                TARGET_NAME,
                TARGET_REVISION,
                TargetInfo::new(table_id).to_bytes(),
            ))
            .with_expression(Counter::new()),
    ))
}

/// Deletes the rules of `chain_name` that `matcher` recognizes.
///
/// The rules are first all dumped and classified, and the handles of ours queued. Deletions only
/// start once the dump is over.
fn delete_matching_rules<C: NetlinkChannel>(
    session: &mut Session<C>,
    table: &Table,
    chain_name: &str,
    matcher: &RuleMatcher<'_>,
) -> Result<(), FirewallError> {
    let family = table.get_family();
    let chain = Chain::new(table).with_name(chain_name);
    let filter = Rule::new(&chain)
        .map_err(QueryError::from)
        .map_err(failed(Operation::IterateRules, family, chain_name))?;

    let mut pending = VecDeque::new();
    let scan = dump_rules(session, &filter, |rule| {
        if matcher.classify(&rule) {
            match rule.get_handle() {
                Some(handle) => {
                    info!(
                        "Queueing rule {} of chain '{}' ({}) for deletion",
                        handle, chain_name, family
                    );
                    pending.push_back(*handle);
                }
                None => debug!("Skipping a matching rule without handle"),
            }
        }
        Ok(())
    });
    tolerate_absence(scan, &format!("chain '{}' ({})", chain_name, family))
        .map_err(failed(Operation::IterateRules, family, chain_name))?;

    while let Some(handle) = pending.pop_front() {
        let rule = Rule::with_handle_in(&chain, handle)
            .map_err(QueryError::from)
            .map_err(failed(Operation::DeleteRule, family, chain_name))?;
        tolerate_absence(
            batch::execute(session, &rule, MsgType::Del),
            &format!("rule {} of chain '{}' ({})", handle, chain_name, family),
        )
        .map_err(failed(Operation::DeleteRule, family, chain_name))?;
    }

    Ok(())
}

/// Removes the firewall state of `family`: our rules in the input chains and in the configured
/// base chain, then the custom chain with all its rules.
///
/// Objects that do not exist are skipped, any other failure aborts the sequence.
pub fn shutdown_family<C: NetlinkChannel>(
    session: &mut Session<C>,
    family: ProtocolFamily,
    config: &FirewallConfig,
) -> Result<(), FirewallError> {
    check_family(family)?;
    debug!("Shutting down the firewall for {}", family);

    let table = filter_table(family);
    let matcher = RuleMatcher::new(config.chain());

    let mut input_chains: Vec<&str> = LEGACY_INPUT_CHAINS.to_vec();
    input_chains.extend(config.base_chain());
    for chain_name in input_chains {
        delete_matching_rules(session, &table, chain_name, &matcher)?;
    }

    let custom = Chain::new(&table).with_name(config.chain());

    // a rule without a handle designates every rule of the chain
    let flush = Rule::new(&custom)
        .map_err(QueryError::from)
        .map_err(failed(Operation::FlushChain, family, config.chain()))?;
    tolerate_absence(
        batch::execute(session, &flush, MsgType::Del),
        &format!("rules in chain '{}' ({})", config.chain(), family),
    )
    .map_err(failed(Operation::FlushChain, family, config.chain()))?;

    tolerate_absence(
        batch::execute(session, &custom, MsgType::Del),
        &format!("chain '{}' ({})", config.chain(), family),
    )
    .map_err(failed(Operation::DeleteChain, family, config.chain()))?;

    Ok(())
}

/// Installs the firewall state of `family`, after removing any previous one.
pub fn setup_family<C: NetlinkChannel>(
    session: &mut Session<C>,
    family: ProtocolFamily,
    config: &FirewallConfig,
) -> Result<(), FirewallError> {
    check_family(family)?;
    shutdown_family(session, family, config)?;
    debug!("Setting up the firewall for {}", family);

    let table = filter_table(family);
    batch::execute(session, &table, MsgType::Add)
        .map_err(failed(Operation::AddTable, family, TABLE_NAME))?;

    let custom = match config.base_chain() {
        Some(base_name) => {
            let base = local_input_chain(&table, base_name);
            batch::execute(session, &base, MsgType::Add)
                .map_err(failed(Operation::AddChain, family, base_name))?;

            let custom = Chain::new(&table).with_name(config.chain());
            batch::execute(session, &custom, MsgType::Add)
                .map_err(failed(Operation::AddChain, family, config.chain()))?;

            let jump = jump_rule(&base, config.chain())
                .map_err(failed(Operation::AddRule, family, base_name))?;
            batch::execute(session, &jump, MsgType::Add)
                .map_err(failed(Operation::AddRule, family, base_name))?;
            custom
        }
        None => {
            let custom = local_input_chain(&table, config.chain());
            batch::execute(session, &custom, MsgType::Add)
                .map_err(failed(Operation::AddChain, family, config.chain()))?;
            custom
        }
    };

    let forward = target_rule(&custom, config.table_id())
        .map_err(failed(Operation::AddRule, family, config.chain()))?;
    batch::execute(session, &forward, MsgType::Add)
        .map_err(failed(Operation::AddRule, family, config.chain()))?;

    Ok(())
}
