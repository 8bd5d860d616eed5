use std::convert::TryFrom;

use rtpe_nftables_macros::nfnetlink_struct;

use crate::chain::Chain;
use crate::error::{BuilderError, DecodeError, QueryError};
use crate::expr::ExpressionList;
use crate::nlmsg::{NfNetlinkDeserializable, NfNetlinkObject, NlmFlags};
use crate::parser::Parsable;
use crate::query::{dump_rules, NetlinkChannel, Session};
use crate::sys::{
    NFTA_RULE_CHAIN, NFTA_RULE_EXPRESSIONS, NFTA_RULE_HANDLE, NFTA_RULE_ID, NFTA_RULE_POSITION,
    NFTA_RULE_TABLE, NFTA_RULE_USERDATA, NFT_MSG_DELRULE, NFT_MSG_NEWRULE,
};
use crate::ProtocolFamily;

/// A nftables firewall rule.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
#[nfnetlink_struct(derive_deserialize = false)]
pub struct Rule {
    family: ProtocolFamily,
    #[field(NFTA_RULE_TABLE)]
    table: String,
    #[field(NFTA_RULE_CHAIN)]
    chain: String,
    #[field(NFTA_RULE_HANDLE)]
    handle: u64,
    #[field(NFTA_RULE_EXPRESSIONS)]
    expressions: ExpressionList,
    #[field(NFTA_RULE_POSITION)]
    position: u64,
    #[field(NFTA_RULE_USERDATA)]
    userdata: Vec<u8>,
    #[field(NFTA_RULE_ID)]
    id: u32,
}

impl Rule {
    /// Creates a new rule object in the given [`Chain`].
    ///
    /// [`Chain`]: struct.Chain.html
    pub fn new(chain: &Chain) -> Result<Rule, BuilderError> {
        Ok(Rule::default()
            .with_family(chain.get_family())
            .with_table(
                chain
                    .get_table()
                    .ok_or(BuilderError::MissingChainInformationError)?
                    .as_str(),
            )
            .with_chain(
                chain
                    .get_name()
                    .ok_or(BuilderError::MissingChainInformationError)?
                    .as_str(),
            ))
    }

    /// A rule designating the rule `handle` of `chain`, as needed to delete it.
    pub fn with_handle_in(chain: &Chain, handle: u64) -> Result<Rule, BuilderError> {
        Ok(Rule::new(chain)?.with_handle(handle))
    }
}

impl NfNetlinkObject for Rule {
    const MSG_TYPE_ADD: u16 = NFT_MSG_NEWRULE;
    const MSG_TYPE_DEL: u16 = NFT_MSG_DELRULE;

    fn get_family(&self) -> ProtocolFamily {
        self.family
    }

    fn set_family(&mut self, family: ProtocolFamily) {
        self.family = family;
    }

    // append at the end of the chain, instead of the beginning
    fn get_add_flags(&self) -> NlmFlags {
        NlmFlags::CREATE | NlmFlags::APPEND
    }
}

impl NfNetlinkDeserializable for Rule {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (mut obj, nfgenmsg, remaining_data) =
            Self::parse_object(buf, NFT_MSG_NEWRULE, NFT_MSG_DELRULE)?;
        obj.family = ProtocolFamily::try_from(nfgenmsg.nfgen_family as i32)?;

        Ok((obj, remaining_data))
    }
}

/// Returns every rule of `chain`, in kernel order.
pub fn list_rules_for_chain<C: NetlinkChannel>(
    session: &mut Session<C>,
    chain: &Chain,
) -> Result<Vec<Rule>, QueryError> {
    let mut result = Vec::new();
    dump_rules(
        session,
        // only retrieve rules from the currently targetted chain
        &Rule::new(chain)?,
        |rule| {
            result.push(rule);
            Ok(())
        },
    )?;
    Ok(result)
}
