use crate::{
    error::DecodeError,
    nlmsg::{NfNetlinkAttribute, NfNetlinkDeserializable},
    sys::{NFT_REG32_00, NFT_REG32_15, NFT_REG_1, NFT_REG_2, NFT_REG_3, NFT_REG_4, NFT_REG_VERDICT},
};

/// A netfilter data register. The expressions store and read data to and from these when
/// evaluating rule statements.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Register {
    Verdict,
    Reg1,
    Reg2,
    Reg3,
    Reg4,
    /// One of the sixteen 32-bit registers (`NFT_REG32_00` to `NFT_REG32_15`) that overlay the
    /// 128-bit ones. `nft` allocates these, so they show up when listing its rules.
    Reg32(u8),
}

impl Register {
    fn to_raw(self) -> u32 {
        match self {
            Register::Verdict => NFT_REG_VERDICT,
            Register::Reg1 => NFT_REG_1,
            Register::Reg2 => NFT_REG_2,
            Register::Reg3 => NFT_REG_3,
            Register::Reg4 => NFT_REG_4,
            Register::Reg32(idx) => NFT_REG32_00 + idx as u32,
        }
    }
}

impl NfNetlinkAttribute for Register {
    fn get_size(&self) -> usize {
        std::mem::size_of::<u32>()
    }

    fn write_payload(&self, addr: &mut [u8]) {
        self.to_raw().write_payload(addr);
    }
}

impl NfNetlinkDeserializable for Register {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (val, remaining) = u32::deserialize(buf)?;
        Ok((
            match val {
                NFT_REG_VERDICT => Self::Verdict,
                NFT_REG_1 => Self::Reg1,
                NFT_REG_2 => Self::Reg2,
                NFT_REG_3 => Self::Reg3,
                NFT_REG_4 => Self::Reg4,
                NFT_REG32_00..=NFT_REG32_15 => Self::Reg32((val - NFT_REG32_00) as u8),
                _ => return Err(DecodeError::UnknownRegister(val)),
            },
            remaining,
        ))
    }
}
