//! SMC register definitions
//!
//! Word indices into the register file and bit definitions. Every
//! sub-field read/modify/write goes through the small accessors below so
//! the dispatch code never handles raw masks.

use bitflags::bitflags;

/// Number of 32-bit registers in the controller's register space
pub const SMC_R_MAX: usize = 0x100 / 4;

// ============================================================================
// Register indices (SMC/FMC layout)
// ============================================================================

/// CE Type Setting Register
pub const R_CONF: usize = 0x00 / 4;
/// CE Control Register
pub const R_CE_CTRL: usize = 0x04 / 4;
/// Interrupt Control and Status Register
pub const R_INTR_CTRL: usize = 0x08 / 4;
/// CE0 Control Register, CEx follow at +x
pub const R_CTRL0: usize = 0x10 / 4;
/// CE0 Segment Address Register, CEx follow at +x
pub const R_SEG_ADDR0: usize = 0x30 / 4;
/// Misc Control Register #1 (not modelled)
pub const R_MISC_CTRL1: usize = 0x50 / 4;
/// Misc Control Register #2 (not modelled)
pub const R_MISC_CTRL2: usize = 0x54 / 4;
/// DMA Control/Status Register
pub const R_DMA_CTRL: usize = 0x80 / 4;
/// DMA Flash Side Address
pub const R_DMA_FLASH_ADDR: usize = 0x84 / 4;
/// DMA DRAM Side Address
pub const R_DMA_DRAM_ADDR: usize = 0x88 / 4;
/// DMA Length Register
pub const R_DMA_LEN: usize = 0x8C / 4;
/// Checksum Calculation Result
pub const R_DMA_CHECKSUM: usize = 0x90 / 4;
/// Read Timing Compensation Register
pub const R_TIMINGS: usize = 0x94 / 4;

// ============================================================================
// Register indices (AST2400 SPI layout)
// ============================================================================

/// SPI Configuration Register
pub const R_SPI_CONF: usize = 0x00 / 4;
/// SPI CE0 Control Register
pub const R_SPI_CTRL0: usize = 0x04 / 4;
/// SPI Misc Control Register (not modelled)
pub const R_SPI_MISC_CTRL: usize = 0x10 / 4;
/// SPI Read Timing Compensation Register
pub const R_SPI_TIMINGS: usize = 0x14 / 4;

// ============================================================================
// CE Type Setting Register
// ============================================================================

/// Legacy (ROM) mode disable
pub const CONF_LEGACY_DISABLE: u32 = 1 << 31;
/// First per-slave write enable bit on SMC/FMC
pub const CONF_ENABLE_W0: u32 = 16;
/// Write enable bit on the AST2400 SPI controller
pub const SPI_CONF_ENABLE_W0: u32 = 0;
/// First per-slave flash type field (2 bits per slave, from bit 1)
pub const CONF_FLASH_TYPE0: u32 = 1;

const CONF_FLASH_TYPE_MASK: u32 = 0x3;

/// Whether the controller left legacy (ROM) mode
pub const fn conf_legacy_disabled(conf: u32) -> bool {
    conf & CONF_LEGACY_DISABLE != 0
}

/// Flash type field of chip-select `cs` (0 NOR, 1 NAND, 2 SPI)
pub const fn conf_flash_type(conf: u32, cs: usize) -> u32 {
    (conf >> (CONF_FLASH_TYPE0 + 2 * cs as u32)) & CONF_FLASH_TYPE_MASK
}

/// Whether chip-select `cs` is write-enabled
pub const fn conf_write_enabled(conf: u32, enable_w0: u32, cs: usize) -> bool {
    conf & (1 << (enable_w0 + cs as u32)) != 0
}

// ============================================================================
// CE Control Register
// ============================================================================

/// Whether chip-select `cs` uses 32-bit addressing
pub const fn ce_ctrl_4byte(ce_ctrl: u32, cs: usize) -> bool {
    ce_ctrl & (1 << cs) != 0
}

// ============================================================================
// Interrupt Control and Status Register
// ============================================================================

bitflags! {
    /// Interrupt control and status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntrCtrl: u32 {
        /// Write protect interrupt enable
        const WRITE_PROTECT_EN     = 1 << 1;
        /// Command abort interrupt enable
        const CMD_ABORT_EN         = 1 << 2;
        /// DMA done interrupt enable
        const DMA_EN               = 1 << 3;
        /// Write protect violation status
        const WRITE_PROTECT_STATUS = 1 << 9;
        /// Command abort status
        const CMD_ABORT_STATUS     = 1 << 10;
        /// DMA done status
        const DMA_STATUS           = 1 << 11;
    }
}

// ============================================================================
// CEx Control Register
// ============================================================================

/// Chip-select is deasserted (CE stop active)
pub const CTRL_CE_STOP_ACTIVE: u32 = 1 << 2;
const CTRL_CMD_SHIFT: u32 = 16;
const CTRL_CMD_MASK: u32 = 0xff;
const CTRL_CMD_MODE_MASK: u32 = 0x3;

/// Command mode of a chip-select, bits [1:0] of its control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdMode {
    /// Normal read with the default READ opcode
    Read,
    /// Fast read, opcode from the command field
    FastRead,
    /// Normal write, opcode from the command field
    Write,
    /// User mode: software drives the bus byte by byte
    User,
}

impl CmdMode {
    /// Decode the mode field of a control register
    pub const fn from_ctrl(ctrl: u32) -> Self {
        match ctrl & CTRL_CMD_MODE_MASK {
            0 => Self::Read,
            1 => Self::FastRead,
            2 => Self::Write,
            _ => Self::User,
        }
    }

    /// Field value of this mode
    pub const fn bits(self) -> u32 {
        match self {
            Self::Read => 0,
            Self::FastRead => 1,
            Self::Write => 2,
            Self::User => 3,
        }
    }
}

/// Command opcode field, bits [23:16]
pub const fn ctrl_cmd(ctrl: u32) -> u8 {
    ((ctrl >> CTRL_CMD_SHIFT) & CTRL_CMD_MASK) as u8
}

/// Build a control register value from a mode and an opcode
pub const fn ctrl_value(mode: CmdMode, cmd: u8, ce_stop_active: bool) -> u32 {
    let stop = if ce_stop_active { CTRL_CE_STOP_ACTIVE } else { 0 };
    ((cmd as u32) << CTRL_CMD_SHIFT) | stop | mode.bits()
}

/// Whether the chip-select is deasserted
pub const fn ctrl_ce_stop_active(ctrl: u32) -> bool {
    ctrl & CTRL_CE_STOP_ACTIVE != 0
}

// ============================================================================
// CEx Segment Address Register
// ============================================================================

/// End address field shift, 8 MiB units
pub const SEG_END_SHIFT: u32 = 24;
/// End address field mask
pub const SEG_END_MASK: u32 = 0xff;
/// Start address field shift, address bits [A29-A23]
pub const SEG_START_SHIFT: u32 = 16;
/// Start address field mask
pub const SEG_START_MASK: u32 = 0xff;
/// Segment register granularity (8 MiB)
pub const SEG_UNIT_SHIFT: u32 = 23;

// ============================================================================
// DMA registers
// ============================================================================

bitflags! {
    /// DMA control bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DmaCtrl: u32 {
        /// Start (set) or stop (clear) the engine
        const ENABLE = 1 << 0;
        /// Direction: DRAM to flash when set
        const WRITE  = 1 << 1;
        /// Checksum mode: accumulate flash words, no DRAM traffic
        const CKSUM  = 1 << 2;
        /// Timing calibration request
        const CALIB  = 1 << 3;

        // Frequency and delay fields are stored verbatim
        const _ = !0;
    }
}

const DMA_CTRL_FREQ_SHIFT: u32 = 4;
const DMA_CTRL_FREQ_MASK: u32 = 0xf;
const DMA_CTRL_DELAY_SHIFT: u32 = 8;
const DMA_CTRL_DELAY_MASK: u32 = 0xf;

/// Calibration frequency field, bits [7:4]
pub const fn dma_ctrl_freq(ctrl: u32) -> u32 {
    (ctrl >> DMA_CTRL_FREQ_SHIFT) & DMA_CTRL_FREQ_MASK
}

/// Calibration delay field, bits [11:8]
pub const fn dma_ctrl_delay(ctrl: u32) -> u32 {
    (ctrl >> DMA_CTRL_DELAY_SHIFT) & DMA_CTRL_DELAY_MASK
}

/// Legal bits of the DMA length register
pub const fn dma_length(value: u32) -> u32 {
    value & !0xFE00_0003
}

/// DRAM side address, relocated into the SDRAM window
pub const fn dma_dram_addr(sdram_base: u32, value: u32) -> u32 {
    (value & !0xE000_0003) | sdram_base
}

/// Flash side address, relocated into the flash window
pub const fn dma_flash_addr(flash_window_base: u32, value: u32) -> u32 {
    (value & !0xE000_0003) | flash_window_base
}
