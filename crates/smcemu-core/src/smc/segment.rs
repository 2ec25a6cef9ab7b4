//! Segment (address window) management
//!
//! Each slave owns a window of the controller's flash mapping, described by
//! its Segment Address Register with an 8 MiB granularity:
//!
//! ```text
//!        | byte 3 | byte 2 | byte 1 | byte 0 |
//!        +--------+--------+--------+--------+
//!        |  end   |  start |   0    |   0    |
//! ```
//!
//! The hardware does not prevent overlapping windows, nor windows that are
//! not aligned on their size; both are only reported.

use super::regs::{SEG_END_MASK, SEG_END_SHIFT, SEG_START_MASK, SEG_START_SHIFT, SEG_UNIT_SHIFT};
use super::variant::SmcVariant;

/// Physical address window of one slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Physical start address
    pub addr: u32,
    /// Window size in bytes
    pub size: u32,
}

impl Segment {
    /// An unmapped window
    pub const EMPTY: Segment = Segment { addr: 0, size: 0 };

    /// Create a window
    pub const fn new(addr: u32, size: u32) -> Self {
        Self { addr, size }
    }

    /// End address (exclusive)
    pub const fn end(&self) -> u64 {
        self.addr as u64 + self.size as u64
    }

    /// Whether `addr` falls inside the window
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.addr as u64 && addr < self.end()
    }

    /// Whether two windows share at least one byte
    pub const fn overlaps(&self, other: &Segment) -> bool {
        self.size != 0
            && other.size != 0
            && self.end() > other.addr as u64
            && (self.addr as u64) < other.end()
    }

    /// Encode as a Segment Address Register value
    pub const fn to_reg(&self) -> u32 {
        let start = (self.addr >> SEG_UNIT_SHIFT) & SEG_START_MASK;
        let end = ((self.end() >> SEG_UNIT_SHIFT) as u32) & SEG_END_MASK;
        (start << SEG_START_SHIFT) | (end << SEG_END_SHIFT)
    }

    /// Decode a Segment Address Register value
    ///
    /// An end below the start decodes as an empty window at the start.
    pub const fn from_reg(reg: u32) -> Self {
        let addr = ((reg >> SEG_START_SHIFT) & SEG_START_MASK) << SEG_UNIT_SHIFT;
        let end = ((reg >> SEG_END_SHIFT) & SEG_END_MASK) << SEG_UNIT_SHIFT;
        Self {
            addr,
            size: end.saturating_sub(addr),
        }
    }
}

impl core::fmt::Display for Segment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[ 0x{:08x} - 0x{:08x} ]", self.addr, self.end())
    }
}

/// Outcome of a segment register write that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentUpdate {
    /// Window to map the slave at
    pub window: Segment,
    /// Value to store in the segment register
    pub raw: u32,
}

/// Validate a guest write to the segment register of chip-select `cs`
///
/// `current` holds the windows currently mapped for every slave. Read-only
/// fields are forced back to their fixed values. Returns `None` when the
/// write has to be discarded because the window ends below its start or
/// leaves the flash window.
pub fn resolve(
    variant: &SmcVariant,
    cs: usize,
    raw: u32,
    current: &[Segment],
) -> Option<SegmentUpdate> {
    let mut raw = raw;
    let mut seg = Segment::from_reg(raw);
    let raw_end = ((raw >> SEG_END_SHIFT) & SEG_END_MASK) << SEG_UNIT_SHIFT;
    let mut inverted = raw_end < seg.addr;

    // The start address of CS0 is read-only
    if cs == 0 && seg.addr != variant.flash_window_base {
        log::warn!(
            "{}: tried to change CS0 start address to 0x{:08x}",
            variant.name,
            seg.addr
        );
        seg.addr = variant.flash_window_base;
        raw = seg.to_reg();
    }

    // The end address of the last slave is read-only on AST2500 SPI
    // controllers
    if variant.fixed_last_end && cs + 1 == variant.max_slaves {
        let fixed_end = variant.default_segment(cs).end();
        if seg.end() != fixed_end {
            log::warn!(
                "{}: tried to change CS{} end address to 0x{:08x}",
                variant.name,
                cs,
                seg.end()
            );
            inverted = fixed_end < seg.addr as u64;
            seg.size = fixed_end.saturating_sub(seg.addr as u64) as u32;
            raw = seg.to_reg();
        }
    }

    // Keep the segment in the overall flash window
    if inverted
        || (seg.addr as u64) < variant.flash_window_base as u64
        || seg.end() > variant.flash_window_end()
    {
        log::warn!(
            "{}: new segment for CS{} is invalid : {}",
            variant.name,
            cs,
            seg
        );
        return None;
    }

    if seg.size != 0 && seg.addr % seg.size != 0 {
        log::warn!(
            "{}: new segment for CS{} is not aligned : {}",
            variant.name,
            cs,
            seg
        );
    }

    // Segments should not overlap but the hardware lets it happen
    for (i, other) in current.iter().enumerate() {
        if i != cs && seg.overlaps(other) {
            log::warn!(
                "{}: new segment CS{} {} overlaps with CS{} {}",
                variant.name,
                cs,
                seg,
                i,
                other
            );
        }
    }

    Some(SegmentUpdate { window: seg, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::variant::{AST2400_FMC, AST2500_SPI1};

    const MIB: u32 = 1024 * 1024;

    fn defaults(variant: &SmcVariant) -> heapless::Vec<Segment, 5> {
        variant.segments.iter().copied().collect()
    }

    #[test]
    fn test_register_round_trip() {
        let mut addr = 0u32;
        while addr < 0x4000_0000 {
            for units in [0u32, 1, 2, 4, 12, 16] {
                let seg = Segment::new(addr, units * 8 * MIB);
                assert_eq!(Segment::from_reg(seg.to_reg()), seg);
            }
            addr += 8 * MIB;
        }
    }

    #[test]
    fn test_register_layout() {
        let seg = Segment::new(0x2000_0000, 64 * MIB);
        assert_eq!(seg.to_reg(), 0x4840_0000);
        assert_eq!(Segment::from_reg(0x4C48_0000), Segment::new(0x2400_0000, 32 * MIB));
        // end below start
        assert_eq!(Segment::from_reg(0x4050_0000), Segment::new(0x2800_0000, 0));
    }

    #[test]
    fn test_cs0_start_is_read_only() {
        let current = defaults(&AST2400_FMC);
        let raw = Segment::new(0x2200_0000, 32 * MIB).to_reg();
        let update = resolve(&AST2400_FMC, 0, raw, &current).unwrap();

        assert_eq!(update.window.addr, AST2400_FMC.flash_window_base);
        // the size is kept
        assert_eq!(update.window.size, 32 * MIB);
        assert_eq!(update.raw, update.window.to_reg());
    }

    #[test]
    fn test_last_end_is_read_only_on_ast2500_spi() {
        let current = defaults(&AST2500_SPI1);
        let raw = Segment::new(0x3400_0000, 16 * MIB).to_reg();
        let update = resolve(&AST2500_SPI1, 1, raw, &current).unwrap();

        assert_eq!(update.window, Segment::new(0x3400_0000, 64 * MIB));
        assert_eq!(update.window.end(), 0x3800_0000);

        // CS0 of the same controller keeps a writable end
        let raw = Segment::new(0x3000_0000, 16 * MIB).to_reg();
        let update = resolve(&AST2500_SPI1, 0, raw, &current).unwrap();
        assert_eq!(update.window, Segment::new(0x3000_0000, 16 * MIB));
    }

    #[test]
    fn test_window_outside_flash_is_discarded() {
        let current = defaults(&AST2400_FMC);
        let raw = Segment::new(0x3000_0000, 8 * MIB).to_reg();
        assert_eq!(resolve(&AST2400_FMC, 1, raw, &current), None);

        let raw = Segment::new(0x2F80_0000, 16 * MIB).to_reg();
        assert_eq!(resolve(&AST2400_FMC, 2, raw, &current), None);
    }

    #[test]
    fn test_end_below_start_is_discarded() {
        let current = defaults(&AST2400_FMC);
        // start 0x28000000, end 0x24000000
        assert_eq!(resolve(&AST2400_FMC, 1, 0x4850_0000, &current), None);
        assert_eq!(resolve(&AST2400_FMC, 0, 0x4850_0000, &current), None);

        // the fixed end of the last AST2500 SPI slave wins over the guest's
        let current = defaults(&AST2500_SPI1);
        let last = AST2500_SPI1.max_slaves - 1;
        let fixed = AST2500_SPI1.default_segment(last);
        let raw = (fixed.to_reg() & !(SEG_END_MASK << SEG_END_SHIFT)) | (0x60 << SEG_END_SHIFT);
        let update = resolve(&AST2500_SPI1, last, raw, &current).unwrap();
        assert_eq!(update.window.end(), fixed.end());
    }

    #[test]
    fn test_overlap_and_misalignment_are_accepted() {
        let current = defaults(&AST2400_FMC);
        // overlaps CS0 and is not aligned on its size
        let raw = Segment::new(0x2080_0000, 16 * MIB).to_reg();
        let update = resolve(&AST2400_FMC, 1, raw, &current).unwrap();
        assert_eq!(update.window, Segment::new(0x2080_0000, 16 * MIB));
        assert_eq!(update.raw, raw);
    }
}
