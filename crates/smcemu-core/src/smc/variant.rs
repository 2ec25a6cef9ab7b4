//! Controller variants
//!
//! Each ASPEED SoC generation integrates several instances of the static
//! memory controller with different personalities. A variant is an
//! immutable descriptor looked up once when a controller is built and
//! shared by reference afterwards.

use super::regs::*;
use super::segment::Segment;
use crate::error::{Error, Result};

/// Physical base of the AST2400 legacy SMC flash window
pub const SOC_SMC_FLASH_BASE: u32 = 0x1000_0000;
/// Physical base of the FMC flash window (AST2400 and AST2500)
pub const SOC_FMC_FLASH_BASE: u32 = 0x2000_0000;
/// Physical base of the SPI (SPI1) flash window
pub const SOC_SPI_FLASH_BASE: u32 = 0x3000_0000;
/// Physical base of the AST2500 SPI2 flash window
pub const SOC_SPI2_FLASH_BASE: u32 = 0x3800_0000;

/// Highest number of slaves any variant supports
pub const MAX_SLAVES: usize = 5;

const MIB: u32 = 1024 * 1024;

/// Word indices of the registers whose position differs between variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegLayout {
    /// CE type setting / configuration register
    pub conf: usize,
    /// CE control register (4-byte addressing), absent on the AST2400 SPI
    pub ce_ctrl: Option<usize>,
    /// Control register of chip-select 0
    pub ctrl0: usize,
    /// Read timing compensation register
    pub timings: usize,
}

const SMC_LAYOUT: RegLayout = RegLayout {
    conf: R_CONF,
    ce_ctrl: Some(R_CE_CTRL),
    ctrl0: R_CTRL0,
    timings: R_TIMINGS,
};

const SPI_LAYOUT: RegLayout = RegLayout {
    conf: R_SPI_CONF,
    ce_ctrl: None,
    ctrl0: R_SPI_CTRL0,
    timings: R_SPI_TIMINGS,
};

/// Static description of one controller personality
#[derive(Debug, PartialEq, Eq)]
pub struct SmcVariant {
    /// Device name
    pub name: &'static str,
    /// Register positions
    pub regs: RegLayout,
    /// Bit of the configuration register enabling writes on CE0
    pub conf_enable_w0: u32,
    /// Number of chip-selects the controller can drive
    pub max_slaves: usize,
    /// Default segment of every slave, `max_slaves` entries
    pub segments: &'static [Segment],
    /// Physical base of the flash window
    pub flash_window_base: u32,
    /// Size of the flash window
    pub flash_window_size: u32,
    /// Whether the controller has the DMA engine
    pub has_dma: bool,
    /// Whether the end address of the last slave's segment is read-only
    pub fixed_last_end: bool,
}

impl SmcVariant {
    /// Default segment of chip-select `cs`
    pub fn default_segment(&self, cs: usize) -> Segment {
        self.segments.get(cs).copied().unwrap_or(Segment::EMPTY)
    }

    /// End of the flash window (exclusive)
    pub const fn flash_window_end(&self) -> u64 {
        self.flash_window_base as u64 + self.flash_window_size as u64
    }
}

// Only CE0 has a default window on the legacy controller; the remaining
// slaves start unmapped.
static SEGMENTS_LEGACY: [Segment; 5] = [
    Segment::new(0x1000_0000, 32 * MIB),
    Segment::EMPTY,
    Segment::EMPTY,
    Segment::EMPTY,
    Segment::EMPTY,
];

static SEGMENTS_FMC: [Segment; 5] = [
    Segment::new(0x2000_0000, 64 * MIB), // start address is readonly
    Segment::new(0x2400_0000, 32 * MIB),
    Segment::new(0x2600_0000, 32 * MIB),
    Segment::new(0x2800_0000, 32 * MIB),
    Segment::new(0x2A00_0000, 32 * MIB),
];

static SEGMENTS_SPI: [Segment; 1] = [Segment::new(0x3000_0000, 64 * MIB)];

static SEGMENTS_AST2500_FMC: [Segment; 3] = [
    Segment::new(0x2000_0000, 128 * MIB), // start address is readonly
    Segment::new(0x2800_0000, 32 * MIB),
    Segment::new(0x2A00_0000, 32 * MIB),
];

static SEGMENTS_AST2500_SPI1: [Segment; 2] = [
    Segment::new(0x3000_0000, 32 * MIB), // start address is readonly
    Segment::new(0x3200_0000, 96 * MIB), // end address is readonly
];

static SEGMENTS_AST2500_SPI2: [Segment; 2] = [
    Segment::new(0x3800_0000, 32 * MIB), // start address is readonly
    Segment::new(0x3A00_0000, 96 * MIB), // end address is readonly
];

/// AST2400 legacy static memory controller (5 slaves, no DMA)
pub static AST2400_SMC: SmcVariant = SmcVariant {
    name: "aspeed.smc.smc",
    regs: SMC_LAYOUT,
    conf_enable_w0: CONF_ENABLE_W0,
    max_slaves: 5,
    segments: &SEGMENTS_LEGACY,
    flash_window_base: SOC_SMC_FLASH_BASE,
    flash_window_size: 0x0600_0000,
    has_dma: false,
    fixed_last_end: false,
};

/// AST2400 firmware memory controller (5 slaves, DMA)
pub static AST2400_FMC: SmcVariant = SmcVariant {
    name: "aspeed.smc.fmc",
    regs: SMC_LAYOUT,
    conf_enable_w0: CONF_ENABLE_W0,
    max_slaves: 5,
    segments: &SEGMENTS_FMC,
    flash_window_base: SOC_FMC_FLASH_BASE,
    flash_window_size: 0x1000_0000,
    has_dma: true,
    fixed_last_end: false,
};

/// AST2400 SPI flash controller (1 slave, no DMA)
pub static AST2400_SPI: SmcVariant = SmcVariant {
    name: "aspeed.smc.spi",
    regs: SPI_LAYOUT,
    conf_enable_w0: SPI_CONF_ENABLE_W0,
    max_slaves: 1,
    segments: &SEGMENTS_SPI,
    flash_window_base: SOC_SPI_FLASH_BASE,
    flash_window_size: 0x1000_0000,
    has_dma: false,
    fixed_last_end: false,
};

/// AST2500 firmware memory controller (3 slaves, DMA)
pub static AST2500_FMC: SmcVariant = SmcVariant {
    name: "aspeed.smc.ast2500-fmc",
    regs: SMC_LAYOUT,
    conf_enable_w0: CONF_ENABLE_W0,
    max_slaves: 3,
    segments: &SEGMENTS_AST2500_FMC,
    flash_window_base: SOC_FMC_FLASH_BASE,
    flash_window_size: 0x1000_0000,
    has_dma: true,
    fixed_last_end: false,
};

/// AST2500 first SPI controller (2 slaves, no DMA)
pub static AST2500_SPI1: SmcVariant = SmcVariant {
    name: "aspeed.smc.ast2500-spi1",
    regs: SMC_LAYOUT,
    conf_enable_w0: CONF_ENABLE_W0,
    max_slaves: 2,
    segments: &SEGMENTS_AST2500_SPI1,
    flash_window_base: SOC_SPI_FLASH_BASE,
    flash_window_size: 0x0800_0000,
    has_dma: false,
    fixed_last_end: true,
};

/// AST2500 second SPI controller (2 slaves, no DMA)
pub static AST2500_SPI2: SmcVariant = SmcVariant {
    name: "aspeed.smc.ast2500-spi2",
    regs: SMC_LAYOUT,
    conf_enable_w0: CONF_ENABLE_W0,
    max_slaves: 2,
    segments: &SEGMENTS_AST2500_SPI2,
    flash_window_base: SOC_SPI2_FLASH_BASE,
    flash_window_size: 0x0800_0000,
    has_dma: false,
    fixed_last_end: true,
};

/// All controller variants
pub static VARIANTS: [&SmcVariant; 6] = [
    &AST2400_SMC,
    &AST2400_FMC,
    &AST2400_SPI,
    &AST2500_FMC,
    &AST2500_SPI1,
    &AST2500_SPI2,
];

/// Look up a variant by device name
///
/// The `aspeed.smc.` prefix may be omitted, so `"fmc"` and
/// `"aspeed.smc.fmc"` name the same controller.
pub fn find_variant(name: &str) -> Result<&'static SmcVariant> {
    VARIANTS
        .iter()
        .copied()
        .find(|v| v.name == name || v.name.strip_prefix("aspeed.smc.") == Some(name))
        .ok_or(Error::UnknownVariant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_consistent() {
        for v in VARIANTS {
            assert_eq!(v.segments.len(), v.max_slaves, "{}", v.name);
            assert!(v.max_slaves <= MAX_SLAVES);
            // CE0 always starts at the base of the flash window
            assert_eq!(v.segments[0].addr, v.flash_window_base, "{}", v.name);
            for seg in v.segments.iter().filter(|s| s.size != 0) {
                assert!(seg.addr >= v.flash_window_base, "{}", v.name);
                assert!(seg.end() <= v.flash_window_end(), "{}", v.name);
            }
        }
    }

    #[test]
    fn test_only_fmc_has_dma() {
        let dma: heapless::Vec<&str, 6> =
            VARIANTS.iter().filter(|v| v.has_dma).map(|v| v.name).collect();
        assert_eq!(&dma[..], ["aspeed.smc.fmc", "aspeed.smc.ast2500-fmc"]);
    }

    #[test]
    fn test_find_variant() {
        assert_eq!(find_variant("aspeed.smc.spi").unwrap().name, "aspeed.smc.spi");
        assert_eq!(find_variant("ast2500-spi2").unwrap().max_slaves, 2);
        assert_eq!(find_variant("nope"), Err(Error::UnknownVariant));
        assert!(AST2400_SPI.regs.ce_ctrl.is_none());
    }
}
