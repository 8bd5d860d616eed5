use rtpe_nftables_macros::nfnetlink_struct;

use super::Expression;
use crate::sys;

/// A counter expression adds a counter to the rule that is incremented to count number of
/// packets and number of bytes for all packets that has matched the rule.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
#[nfnetlink_struct]
pub struct Counter {
    #[field(sys::NFTA_COUNTER_BYTES)]
    pub nb_bytes: u64,
    #[field(sys::NFTA_COUNTER_PACKETS)]
    pub nb_packets: u64,
}

impl Counter {
    /// A counter starting from zero.
    pub fn new() -> Self {
        Counter::default().with_nb_bytes(0u64).with_nb_packets(0u64)
    }
}

impl Expression for Counter {
    fn get_name() -> &'static str {
        "counter"
    }
}
