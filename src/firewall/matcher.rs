use crate::expr::{ExpressionHolder, ExpressionVariant};
use crate::Rule;

use super::TARGET_NAME;

/// Recognizes the rules installed for a given custom chain.
///
/// A rule belongs to us when one of its expressions jumps to the custom chain, or invokes the
/// `RTPENGINE` target.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatcher<'a> {
    chain: &'a str,
}

impl<'a> RuleMatcher<'a> {
    pub fn new(chain: &'a str) -> Self {
        RuleMatcher { chain }
    }

    /// Whether this single expression marks its rule as ours.
    pub fn matches(&self, expr: &ExpressionHolder) -> bool {
        match expr.get_data() {
            Some(ExpressionVariant::Immediate(imm)) => imm.verdict_chain() == Some(self.chain),
            Some(ExpressionVariant::Target(target)) => {
                target.get_target_name().map(String::as_str) == Some(TARGET_NAME)
            }
            _ => false,
        }
    }

    /// Whether `rule` is ours. Every expression of the rule is inspected.
    pub fn classify(&self, rule: &Rule) -> bool {
        let mut ours = false;
        if let Some(exprs) = rule.get_expressions() {
            for expr in exprs.iter() {
                ours |= self.matches(expr);
            }
        }
        debug!(
            "Rule {:?} of chain {:?} classified as {}",
            rule.get_handle(),
            rule.get_chain(),
            if ours { "ours" } else { "foreign" }
        );
        ours
    }
}
