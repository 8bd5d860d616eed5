use std::fmt::Debug;

use rtpe_nftables_macros::nfnetlink_struct;

use crate::{
    error::DecodeError,
    expr::Verdict,
    nlmsg::{
        pad_netlink_object, pad_netlink_object_with_variable_size, NfNetlinkAttribute,
        NfNetlinkDeserializable,
    },
    parser::{for_each_attribute, write_attribute},
    sys::{nlattr, NFTA_DATA_VALUE, NFTA_DATA_VERDICT, NFTA_LIST_ELEM},
};

macro_rules! impl_integer_attribute {
    ($($ty:ty),+) => {
        $(
            impl NfNetlinkAttribute for $ty {
                fn write_payload(&self, addr: &mut [u8]) {
                    addr[..std::mem::size_of::<Self>()].copy_from_slice(&self.to_be_bytes());
                }
            }

            impl NfNetlinkDeserializable for $ty {
                fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
                    const SIZE: usize = std::mem::size_of::<$ty>();
                    if buf.len() < SIZE {
                        return Err(DecodeError::BufTooSmall);
                    }
                    let mut bytes = [0u8; SIZE];
                    bytes.copy_from_slice(&buf[..SIZE]);
                    Ok((<$ty>::from_be_bytes(bytes), &buf[SIZE..]))
                }
            }
        )+
    };
}

impl_integer_attribute!(u8, u16, i32, u32, u64);

// strings are sent NUL-terminated, as some attributes (e.g. NFTA_TARGET_NAME) require it
impl NfNetlinkAttribute for String {
    fn get_size(&self) -> usize {
        self.len() + 1
    }

    fn write_payload(&self, addr: &mut [u8]) {
        addr[..self.len()].copy_from_slice(self.as_bytes());
        addr[self.len()] = 0;
    }
}

impl NfNetlinkDeserializable for String {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        // ignore the NULL byte terminator, if any
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok((String::from_utf8(buf[..end].to_vec())?, &[]))
    }
}

impl NfNetlinkAttribute for Vec<u8> {
    fn get_size(&self) -> usize {
        self.len()
    }

    fn write_payload(&self, addr: &mut [u8]) {
        addr[..self.len()].copy_from_slice(self);
    }
}

impl NfNetlinkDeserializable for Vec<u8> {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        Ok((buf.to_vec(), &[]))
    }
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
#[nfnetlink_struct(nested = true)]
pub struct NfNetlinkData {
    #[field(NFTA_DATA_VALUE)]
    value: Vec<u8>,
    #[field(NFTA_DATA_VERDICT)]
    verdict: Verdict,
}

/// A nested list of objects, each serialized as a `NFTA_LIST_ELEM` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NfNetlinkList<T>
where
    T: NfNetlinkDeserializable + NfNetlinkAttribute + Debug + Clone + Eq + Default,
{
    objs: Vec<T>,
}

impl<T> NfNetlinkList<T>
where
    T: NfNetlinkDeserializable + NfNetlinkAttribute + Clone + Eq + Default,
{
    pub fn add_value(&mut self, e: impl Into<T>) {
        self.objs.push(e.into());
    }

    pub fn with_value(mut self, e: impl Into<T>) -> Self {
        self.add_value(e);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.objs.iter()
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }
}

impl<T> NfNetlinkAttribute for NfNetlinkList<T>
where
    T: NfNetlinkDeserializable + NfNetlinkAttribute + Clone + Eq + Default,
{
    fn is_nested(&self) -> bool {
        true
    }

    fn get_size(&self) -> usize {
        // one nlattr LIST_ELEM per object
        self.objs.iter().fold(0, |acc, item| {
            acc + pad_netlink_object::<nlattr>()
                + pad_netlink_object_with_variable_size(item.get_size())
        })
    }

    fn write_payload(&self, mut addr: &mut [u8]) {
        for item in &self.objs {
            write_attribute(NFTA_LIST_ELEM, item, addr);
            let size = pad_netlink_object::<nlattr>()
                + pad_netlink_object_with_variable_size(item.get_size());
            addr = &mut addr[size..];
        }
    }
}

impl<T> NfNetlinkDeserializable for NfNetlinkList<T>
where
    T: NfNetlinkDeserializable + NfNetlinkAttribute + Clone + Eq + Default,
{
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut objs = Vec::new();

        for_each_attribute(buf, |nla_type, content| {
            if nla_type != NFTA_LIST_ELEM {
                return Err(DecodeError::UnsupportedAttributeType(nla_type));
            }

            let (obj, remaining) = T::deserialize(content)?;
            if !remaining.is_empty() {
                return Err(DecodeError::InvalidDataSize);
            }
            objs.push(obj);
            Ok(())
        })?;

        Ok((Self { objs }, &[]))
    }
}

impl<O, T> From<Vec<O>> for NfNetlinkList<T>
where
    T: From<O>,
    T: NfNetlinkDeserializable + NfNetlinkAttribute + Clone + Eq + Default,
{
    fn from(v: Vec<O>) -> Self {
        NfNetlinkList {
            objs: v.into_iter().map(T::from).collect(),
        }
    }
}
