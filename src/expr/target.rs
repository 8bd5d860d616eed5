use rtpe_nftables_macros::nfnetlink_struct;

use super::Expression;
use crate::sys::{NFTA_TARGET_INFO, NFTA_TARGET_NAME, NFTA_TARGET_REV};

/// An xtables target, run through the nf_tables compatibility layer (`nft_compat`).
///
/// `info` is the target-specific structure the xtables extension expects, in host byte order.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
#[nfnetlink_struct]
pub struct Target {
    #[field(NFTA_TARGET_NAME, name_in_functions = "target_name")]
    name: String,
    #[field(NFTA_TARGET_REV)]
    rev: u32,
    #[field(NFTA_TARGET_INFO)]
    info: Vec<u8>,
}

impl Target {
    pub fn new(name: impl Into<String>, rev: u32, info: impl Into<Vec<u8>>) -> Self {
        Target::default()
            .with_target_name(name)
            .with_rev(rev)
            .with_info(info)
    }
}

impl Expression for Target {
    fn get_name() -> &'static str {
        "target"
    }
}
