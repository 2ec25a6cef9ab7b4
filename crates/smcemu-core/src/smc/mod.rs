//! ASPEED static memory controller
//!
//! [`AspeedSmc`] is one controller instance: a word register file, one
//! [`FlashChannel`] per slave the variant supports, the serial bus the
//! slaves sit on, the DMA engine and the interrupt line. It is the only
//! entry point a machine model talks to:
//!
//! - register accesses through [`AspeedSmc::read`] / [`AspeedSmc::write`]
//! - flash window accesses through [`AspeedSmc::flash_read`] /
//!   [`AspeedSmc::flash_write`]
//! - deferred DMA work through [`AspeedSmc::run_dma_quantum`]
//!
//! Guest mistakes are logged with `warn`, accesses to registers that exist
//! on silicon but are not modelled are logged with `info`. Neither ever
//! fails the access.

mod channel;
mod dma;
pub mod regs;
pub mod segment;
pub mod variant;

pub use channel::FlashChannel;
pub use dma::{DmaDirection, DmaMode, DmaPoll, DmaTransfer, DMA_QUANTUM};
pub use segment::Segment;
pub use variant::{find_variant, SmcVariant, MAX_SLAVES, VARIANTS};

use alloc::boxed::Box;
use alloc::string::String;

use crate::error::{Error, Result};
use crate::irq::IrqLine;
use crate::spi::{SpiBus, SpiSlave};
use dma::DmaEngine;
use regs::*;

/// Saved controller state
///
/// Only the register file is saved; channel windows, decode modes and
/// chip-select levels are all derived from it on load. A DMA transfer in
/// flight is not part of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmcState {
    /// Name of the variant the state was taken from
    pub variant: String,
    /// Register file
    pub regs: heapless::Vec<u32, SMC_R_MAX>,
}

/// One ASPEED SMC/FMC/SPI controller
#[derive(Debug)]
pub struct AspeedSmc {
    variant: &'static SmcVariant,
    regs: [u32; SMC_R_MAX],
    num_cs: usize,
    sdram_base: u32,
    channels: heapless::Vec<FlashChannel, MAX_SLAVES>,
    bus: SpiBus,
    dma: DmaEngine,
    irq: IrqLine,
}

impl AspeedSmc {
    /// Build and reset a controller driving `num_cs` slaves
    ///
    /// `num_cs` is clamped to what the variant supports.
    pub fn new(variant: &'static SmcVariant, num_cs: usize) -> Self {
        Self::with_sdram_base(variant, num_cs, 0)
    }

    /// Same as [`AspeedSmc::new`] with the DRAM base DMA addresses are
    /// relocated into
    pub fn with_sdram_base(variant: &'static SmcVariant, num_cs: usize, sdram_base: u32) -> Self {
        let num_cs = if num_cs > variant.max_slaves {
            log::warn!(
                "{}: cannot drive {} slaves, clamping to {}",
                variant.name,
                num_cs,
                variant.max_slaves
            );
            variant.max_slaves
        } else {
            num_cs
        };

        let channels = (0..variant.max_slaves)
            .map(|cs| FlashChannel::new(cs, variant.default_segment(cs)))
            .collect();

        let mut smc = Self {
            variant,
            regs: [0; SMC_R_MAX],
            num_cs,
            sdram_base,
            channels,
            bus: SpiBus::new(num_cs),
            dma: DmaEngine::default(),
            irq: IrqLine::new(),
        };
        smc.reset();
        smc
    }

    /// Variant of this controller
    pub fn variant(&self) -> &'static SmcVariant {
        self.variant
    }

    /// Number of chip-selects wired
    pub fn num_cs(&self) -> usize {
        self.num_cs
    }

    /// DRAM base DMA addresses are relocated into
    pub fn sdram_base(&self) -> u32 {
        self.sdram_base
    }

    /// Flash channels, one per slave the variant supports
    pub fn channels(&self) -> &[FlashChannel] {
        &self.channels
    }

    /// Channel of chip-select `cs`
    pub fn channel(&self, cs: usize) -> Option<&FlashChannel> {
        self.channels.get(cs)
    }

    /// Interrupt output
    pub fn irq(&self) -> &IrqLine {
        &self.irq
    }

    /// Interrupt output, to connect it to an interrupt controller
    pub fn irq_mut(&mut self) -> &mut IrqLine {
        &mut self.irq
    }

    /// Level of chip-select output `cs` (`true` = deselected)
    pub fn cs_level(&self, cs: usize) -> Option<bool> {
        self.bus.cs_level(cs)
    }

    /// Connect a flash device to chip-select `cs`
    pub fn attach_flash(&mut self, cs: usize, flash: Box<dyn SpiSlave>) -> Result<()> {
        self.bus.attach(cs, flash)
    }

    /// Whether a flash device is connected to chip-select `cs`
    pub fn has_flash(&self, cs: usize) -> bool {
        self.bus.is_attached(cs)
    }

    /// Raw register by word index, for debugging
    pub fn reg(&self, index: usize) -> u32 {
        self.regs.get(index).copied().unwrap_or(0)
    }

    /// Reset to the power-on state
    pub fn reset(&mut self) {
        self.regs = [0; SMC_R_MAX];

        // Unselect all slaves
        for cs in 0..self.num_cs {
            self.regs[self.variant.regs.ctrl0 + cs] |= CTRL_CE_STOP_ACTIVE;
        }

        // setup default segment register values for all
        for cs in 0..self.variant.max_slaves {
            let seg = self.variant.default_segment(cs);
            self.regs[R_SEG_ADDR0 + cs] = seg.to_reg();
            self.channels[cs].map(seg);
        }

        self.update_cs();

        // ROM mode is the default so that we can boot from it
        for ch in self.channels.iter_mut() {
            ch.set_rom_decode(true);
        }

        self.dma.clear();
        self.irq.lower();
    }

    fn update_cs(&mut self) {
        for cs in 0..self.num_cs {
            let ctrl = self.regs[self.variant.regs.ctrl0 + cs];
            self.bus.set_cs(cs, ctrl_ce_stop_active(ctrl));
        }
    }

    fn is_seg_reg(&self, index: usize) -> bool {
        (R_SEG_ADDR0..R_SEG_ADDR0 + self.variant.max_slaves).contains(&index)
    }

    fn is_ctrl_reg(&self, index: usize) -> bool {
        let ctrl0 = self.variant.regs.ctrl0;
        (ctrl0..ctrl0 + self.num_cs).contains(&index)
    }

    fn is_dma_reg(&self, index: usize) -> bool {
        self.variant.has_dma
            && matches!(
                index,
                R_DMA_CTRL | R_DMA_FLASH_ADDR | R_DMA_DRAM_ADDR | R_DMA_LEN | R_DMA_CHECKSUM
            )
    }

    fn is_plain_reg(&self, index: usize) -> bool {
        let layout = &self.variant.regs;
        index == layout.conf
            || index == layout.timings
            || layout.ce_ctrl == Some(index)
            || index == R_INTR_CTRL
    }

    /// Human readable name of the register at word `index`
    pub fn reg_name(&self, index: usize) -> &'static str {
        let layout = &self.variant.regs;
        if index == layout.conf {
            "conf"
        } else if layout.ce_ctrl == Some(index) {
            "ce-ctrl"
        } else if index == layout.timings {
            "timings"
        } else if index == R_INTR_CTRL {
            "intr-ctrl"
        } else if self.is_ctrl_reg(index) {
            "ctrl"
        } else if self.is_seg_reg(index) {
            "segment"
        } else if self.is_dma_reg(index) {
            match index {
                R_DMA_CTRL => "dma-ctrl",
                R_DMA_FLASH_ADDR => "dma-flash-addr",
                R_DMA_DRAM_ADDR => "dma-dram-addr",
                R_DMA_LEN => "dma-len",
                _ => "dma-checksum",
            }
        } else if layout.ce_ctrl.is_some() && matches!(index, R_MISC_CTRL1 | R_MISC_CTRL2) {
            "misc-ctrl"
        } else if layout.ce_ctrl.is_none() && index == R_SPI_MISC_CTRL {
            "misc-ctrl"
        } else {
            "unknown"
        }
    }

    /// Register read, `addr` relative to the register space
    pub fn read(&self, addr: u64, size: usize) -> u64 {
        let index = (addr >> 2) as usize;
        if index >= SMC_R_MAX {
            log::warn!(
                "{}: out-of-bounds read at 0x{:x} of size {}",
                self.variant.name,
                addr,
                size
            );
            return 0;
        }

        if self.is_plain_reg(index)
            || self.is_dma_reg(index)
            || self.is_seg_reg(index)
            || self.is_ctrl_reg(index)
        {
            let value = self.regs[index];
            log::trace!(
                "{}: read {} @0x{:02x} = 0x{:08x}",
                self.variant.name,
                self.reg_name(index),
                addr,
                value
            );
            value as u64
        } else {
            log::info!(
                "{}: unimplemented register read {} @0x{:x}",
                self.variant.name,
                self.reg_name(index),
                addr
            );
            0
        }
    }

    /// Register write, `addr` relative to the register space
    pub fn write(&mut self, addr: u64, data: u64, size: usize) {
        let index = (addr >> 2) as usize;
        let value = data as u32;

        if index >= SMC_R_MAX {
            log::warn!(
                "{}: out-of-bounds write at 0x{:x} of size {}",
                self.variant.name,
                addr,
                size
            );
            return;
        }

        log::trace!(
            "{}: write {} @0x{:02x} = 0x{:08x}",
            self.variant.name,
            self.reg_name(index),
            addr,
            value
        );

        let layout = self.variant.regs;
        if index == layout.conf || index == layout.timings || layout.ce_ctrl == Some(index) {
            self.regs[index] = value;
        } else if self.is_ctrl_reg(index) {
            self.regs[index] = value;
            let cs = index - layout.ctrl0;
            self.channels[cs].set_rom_decode(CmdMode::from_ctrl(value) != CmdMode::User);
            self.update_cs();
        } else if self.is_seg_reg(index) {
            if self.regs[index] != value {
                self.set_segment(index - R_SEG_ADDR0, value);
            }
        } else if index == R_INTR_CTRL {
            self.regs[index] = value;
        } else if self.is_dma_reg(index) {
            match index {
                R_DMA_CTRL => self.dma_ctrl_write(value),
                R_DMA_DRAM_ADDR => {
                    self.regs[index] = dma_dram_addr(self.sdram_base, value);
                }
                R_DMA_FLASH_ADDR => {
                    self.regs[index] = dma_flash_addr(self.variant.flash_window_base, value);
                }
                R_DMA_LEN => self.regs[index] = dma_length(value),
                _ => log::info!(
                    "{}: unimplemented register write {} @0x{:x}",
                    self.variant.name,
                    self.reg_name(index),
                    addr
                ),
            }
        } else {
            log::info!(
                "{}: unimplemented register write {} @0x{:x}",
                self.variant.name,
                self.reg_name(index),
                addr
            );
        }
    }

    fn set_segment(&mut self, cs: usize, raw: u32) {
        let mut current = [Segment::EMPTY; MAX_SLAVES];
        for ch in &self.channels {
            current[ch.id()] = ch.window();
        }

        let Some(update) = segment::resolve(self.variant, cs, raw, &current[..self.channels.len()])
        else {
            return;
        };

        self.channels[cs].map(update.window);
        self.regs[R_SEG_ADDR0 + cs] = update.raw;
        log::debug!(
            "{}: CS{} mapped at {}",
            self.variant.name,
            cs,
            update.window
        );
    }

    /// Snapshot the controller
    pub fn save_state(&self) -> SmcState {
        SmcState {
            variant: String::from(self.variant.name),
            regs: self.regs.iter().copied().collect(),
        }
    }

    /// Restore a snapshot taken with [`AspeedSmc::save_state`]
    pub fn load_state(&mut self, state: &SmcState) -> Result<()> {
        if state.variant != self.variant.name {
            return Err(Error::VariantMismatch);
        }
        if state.regs.len() != SMC_R_MAX {
            return Err(Error::StateMismatch {
                expected: SMC_R_MAX,
                found: state.regs.len(),
            });
        }

        self.regs.copy_from_slice(&state.regs);

        for cs in 0..self.variant.max_slaves {
            let window = Segment::from_reg(self.regs[R_SEG_ADDR0 + cs]);
            self.channels[cs].map(window);
            let rom = if cs < self.num_cs {
                CmdMode::from_ctrl(self.regs[self.variant.regs.ctrl0 + cs]) != CmdMode::User
            } else {
                true
            };
            self.channels[cs].set_rom_decode(rom);
        }
        self.update_cs();

        self.dma.clear();
        if self.variant.has_dma && self.dma_in_progress() {
            log::warn!(
                "{}: DMA transfer in flight is not restored",
                self.variant.name
            );
        }
        Ok(())
    }
}
