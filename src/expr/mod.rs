//! A module with the nftables expressions that can be added to [`Rule`]s to build up how
//! they match against packets.
//!
//! Only the expressions needed to steer traffic into the `RTPENGINE` target are modelled.
//! Expressions of any other kind found in the kernel ruleset decode as
//! [`ExpressionVariant::Raw`], which keeps their name and attribute bytes untouched.
//!
//! [`Rule`]: struct.Rule.html

use rtpe_nftables_macros::nfnetlink_struct;

use crate::error::DecodeError;
use crate::nlmsg::{AttributeDecoder, NfNetlinkAttribute, NfNetlinkDeserializable};
use crate::parser_impls::NfNetlinkList;
use crate::sys::{NFTA_EXPR_DATA, NFTA_EXPR_NAME};

mod cmp;
pub use self::cmp::*;

mod counter;
pub use self::counter::*;

mod immediate;
pub use self::immediate::*;

mod payload;
pub use self::payload::*;

mod register;
pub use self::register::Register;

mod target;
pub use self::target::*;

mod verdict;
pub use self::verdict::*;

pub trait Expression {
    fn get_name() -> &'static str;
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
#[nfnetlink_struct(nested = true, derive_decoder = false)]
pub struct ExpressionHolder {
    #[field(NFTA_EXPR_NAME)]
    name: String,
    #[field(NFTA_EXPR_DATA)]
    data: ExpressionVariant,
}

impl ExpressionHolder {
    pub fn new<T>(expr: T) -> Self
    where
        T: Expression,
        ExpressionVariant: From<T>,
    {
        ExpressionHolder::default()
            .with_name(T::get_name())
            .with_data(ExpressionVariant::from(expr))
    }
}

// the kernel always emits NFTA_EXPR_NAME before NFTA_EXPR_DATA, and the name selects how the
// data is decoded
impl AttributeDecoder for ExpressionHolder {
    fn decode_attribute(&mut self, attr_type: u16, buf: &[u8]) -> Result<(), DecodeError> {
        trace!("Decoding attribute {} in an expression", attr_type);
        match attr_type {
            NFTA_EXPR_NAME => {
                let (val, remaining) = String::deserialize(buf)?;
                if !remaining.is_empty() {
                    return Err(DecodeError::InvalidDataSize);
                }
                self.name = Some(val);
                Ok(())
            }
            NFTA_EXPR_DATA => {
                let name = self
                    .name
                    .as_deref()
                    .ok_or(DecodeError::MissingExpressionName)?;
                self.data = Some(ExpressionVariant::decode(name, buf)?);
                Ok(())
            }
            _ => Err(DecodeError::UnsupportedAttributeType(attr_type)),
        }
    }
}

/// The content of an expression, selected by the expression name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionVariant {
    Cmp(Cmp),
    Counter(Counter),
    Immediate(Immediate),
    Payload(Payload),
    Target(Target),
    /// An expression this crate does not model, kept as its raw attributes.
    Raw(Vec<u8>),
}

fn decode_whole<T: NfNetlinkDeserializable>(buf: &[u8]) -> Result<T, DecodeError> {
    trace!("Calling {}::deserialize()", std::any::type_name::<T>());
    let (res, remaining) = T::deserialize(buf)?;
    if !remaining.is_empty() {
        return Err(DecodeError::InvalidDataSize);
    }
    Ok(res)
}

impl ExpressionVariant {
    fn decode(name: &str, buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(match name {
            x if x == <Cmp as Expression>::get_name() => ExpressionVariant::Cmp(decode_whole(buf)?),
            x if x == <Counter as Expression>::get_name() => ExpressionVariant::Counter(decode_whole(buf)?),
            x if x == <Immediate as Expression>::get_name() => ExpressionVariant::Immediate(decode_whole(buf)?),
            x if x == <Payload as Expression>::get_name() => ExpressionVariant::Payload(decode_whole(buf)?),
            x if x == <Target as Expression>::get_name() => ExpressionVariant::Target(decode_whole(buf)?),
            other => {
                trace!("Keeping the unknown expression '{}' as raw data", other);
                ExpressionVariant::Raw(buf.to_vec())
            }
        })
    }
}

impl NfNetlinkAttribute for ExpressionVariant {
    fn is_nested(&self) -> bool {
        true
    }

    fn get_size(&self) -> usize {
        match self {
            ExpressionVariant::Cmp(val) => val.get_size(),
            ExpressionVariant::Counter(val) => val.get_size(),
            ExpressionVariant::Immediate(val) => val.get_size(),
            ExpressionVariant::Payload(val) => val.get_size(),
            ExpressionVariant::Target(val) => val.get_size(),
            ExpressionVariant::Raw(val) => val.get_size(),
        }
    }

    fn write_payload(&self, addr: &mut [u8]) {
        match self {
            ExpressionVariant::Cmp(val) => val.write_payload(addr),
            ExpressionVariant::Counter(val) => val.write_payload(addr),
            ExpressionVariant::Immediate(val) => val.write_payload(addr),
            ExpressionVariant::Payload(val) => val.write_payload(addr),
            ExpressionVariant::Target(val) => val.write_payload(addr),
            ExpressionVariant::Raw(val) => val.write_payload(addr),
        }
    }
}

macro_rules! impl_expression_variant_from {
    ($([$name:ident, $type:ty]),+) => {
        $(
            impl From<$type> for ExpressionVariant {
                fn from(val: $type) -> Self {
                    ExpressionVariant::$name(val)
                }
            }
        )+
    };
}

impl_expression_variant_from!(
    [Cmp, Cmp],
    [Counter, Counter],
    [Immediate, Immediate],
    [Payload, Payload],
    [Target, Target]
);

pub type ExpressionList = NfNetlinkList<ExpressionHolder>;

impl ExpressionList {
    pub fn add_expression<T>(&mut self, e: T)
    where
        T: Expression,
        ExpressionVariant: From<T>,
    {
        self.add_value(ExpressionHolder::new(e));
    }

    pub fn with_expression<T>(mut self, e: T) -> Self
    where
        T: Expression,
        ExpressionVariant: From<T>,
    {
        self.add_expression(e);
        self
    }
}
