//! Address width types

/// Address width of an SPI command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    /// No address phase
    #[default]
    None,
    /// 3-byte (24-bit) address - supports up to 16 MiB
    ThreeByte,
    /// 4-byte (32-bit) address - supports up to 4 GiB
    FourByte,
}

impl AddressWidth {
    /// Returns the number of address bytes
    pub const fn bytes(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::ThreeByte => 3,
            Self::FourByte => 4,
        }
    }

    /// Encode an address into bytes, most significant first
    ///
    /// Returns the number of bytes written to `buf`.
    pub fn encode(&self, address: u32, buf: &mut [u8; 4]) -> usize {
        let be = address.to_be_bytes();
        let n = self.bytes() as usize;
        buf[..n].copy_from_slice(&be[4 - n..]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_msb_first() {
        let mut buf = [0u8; 4];
        assert_eq!(AddressWidth::ThreeByte.encode(0x12_3456, &mut buf), 3);
        assert_eq!(&buf[..3], &[0x12, 0x34, 0x56]);

        assert_eq!(AddressWidth::FourByte.encode(0x0112_3456, &mut buf), 4);
        assert_eq!(buf, [0x01, 0x12, 0x34, 0x56]);

        assert_eq!(AddressWidth::None.encode(0xFFFF_FFFF, &mut buf), 0);
    }
}
