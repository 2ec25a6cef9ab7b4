//! Host main memory as seen by the DMA engine

use crate::error::{Error, Result};
use alloc::vec;
use alloc::vec::Vec;

/// Guest physical memory access used for DMA.
pub trait MemoryBus {
    /// Read `buf.len()` bytes at physical address `paddr`
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` at physical address `paddr`
    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> Result<()>;

    /// Read a little-endian 32-bit word
    fn read_u32(&mut self, paddr: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Write a little-endian 32-bit word
    fn write_u32(&mut self, paddr: u64, val: u32) -> Result<()> {
        self.write_physical(paddr, &val.to_le_bytes())
    }
}

/// Flat RAM mapped at a fixed physical base address
#[derive(Debug, Clone)]
pub struct Ram {
    base: u64,
    data: Vec<u8>,
}

impl Ram {
    /// Create zero-filled RAM of `size` bytes at `base`
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    /// Physical base address
    pub fn base(&self) -> u64 {
        self.base
    }

    /// RAM contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable RAM contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn range(&self, paddr: u64, len: usize) -> Result<core::ops::Range<usize>> {
        let oob = Error::AddressOutOfBounds { addr: paddr, len };
        let start = paddr.checked_sub(self.base).ok_or(oob)?;
        let start = usize::try_from(start).map_err(|_| oob)?;
        let end = start.checked_add(len).ok_or(oob)?;
        if end > self.data.len() {
            return Err(oob);
        }
        Ok(start..end)
    }
}

impl MemoryBus for Ram {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(paddr, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> Result<()> {
        let range = self.range(paddr, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_is_based() {
        let mut ram = Ram::new(0x4000_0000, 0x100);
        ram.write_u32(0x4000_0010, 0xDEAD_BEEF).unwrap();
        assert_eq!(ram.read_u32(0x4000_0010).unwrap(), 0xDEAD_BEEF);
        assert_eq!(&ram.data()[0x10..0x14], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_ram_bounds() {
        let mut ram = Ram::new(0x4000_0000, 0x100);
        assert!(ram.read_u32(0x3FFF_FFFC).is_err());
        assert!(ram.read_u32(0x4000_00FE).is_err());
        assert!(ram.write_u32(0x4000_00FC, 1).is_ok());
    }
}
