//! DMA engine
//!
//! The FMC can move data between the flash window and DRAM, or compute a
//! checksum of a flash region, without CPU involvement. A transfer never
//! runs inside the register write that starts it: the write only latches
//! a [`DmaTransfer`] and the host advances it with
//! [`AspeedSmc::run_dma_quantum`], 4 bytes at a time, interleaved with its
//! other work.
//!
//! Every quantum checks the live enable bit before moving anything, so
//! software can cancel a transfer at any point by clearing it.

use super::regs::{
    self, DmaCtrl, IntrCtrl, R_DMA_CHECKSUM, R_DMA_CTRL, R_DMA_DRAM_ADDR, R_DMA_FLASH_ADDR,
    R_DMA_LEN, R_INTR_CTRL,
};
use super::AspeedSmc;
use crate::memory::MemoryBus;

/// Bytes moved by one quantum
pub const DMA_QUANTUM: u32 = 4;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Flash to DRAM
    FromFlash,
    /// DRAM to flash
    ToFlash,
}

/// What the engine does with the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaMode {
    /// Move the data between flash and DRAM
    Copy,
    /// Accumulate flash words, no DRAM traffic
    Checksum,
}

/// A transfer in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTransfer {
    /// Transfer direction
    pub direction: DmaDirection,
    /// Copy or checksum
    pub mode: DmaMode,
    /// Physical flash address of the next quantum
    pub flash_addr: u32,
    /// Physical DRAM address of the next quantum
    pub dram_addr: u32,
    /// Bytes left to move
    pub remaining: u32,
    /// Running checksum
    pub checksum: u32,
}

/// Outcome of [`AspeedSmc::run_dma_quantum`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaPoll {
    /// Nothing was scheduled
    Idle,
    /// A quantum was moved, more are pending
    Pending,
    /// The last quantum was moved
    Completed,
    /// Software disabled the engine; the transfer was dropped
    Cancelled,
}

/// Single-slot DMA scheduler of one controller
#[derive(Debug, Default)]
pub(crate) struct DmaEngine {
    task: Option<DmaTransfer>,
}

impl DmaEngine {
    pub(crate) fn clear(&mut self) {
        self.task = None;
    }
}

impl AspeedSmc {
    fn dma_ctrl(&self) -> DmaCtrl {
        DmaCtrl::from_bits_retain(self.regs[R_DMA_CTRL])
    }

    fn intr_ctrl(&self) -> IntrCtrl {
        IntrCtrl::from_bits_retain(self.regs[R_INTR_CTRL])
    }

    /// Whether a transfer was started and has not completed yet
    pub fn dma_in_progress(&self) -> bool {
        self.dma_ctrl().contains(DmaCtrl::ENABLE) && !self.intr_ctrl().contains(IntrCtrl::DMA_STATUS)
    }

    /// Whether a quantum is waiting to be run
    pub fn dma_pending(&self) -> bool {
        self.dma.task.is_some()
    }

    /// Transfer currently latched, if any
    pub fn dma_transfer(&self) -> Option<&DmaTransfer> {
        self.dma.task.as_ref()
    }

    /// Handle a write to the DMA control register
    pub(super) fn dma_ctrl_write(&mut self, value: u32) {
        if DmaCtrl::from_bits_retain(value).contains(DmaCtrl::ENABLE) {
            self.dma_start(value);
        } else {
            self.regs[R_DMA_CTRL] = value;
            self.dma_stop();
        }
    }

    fn dma_start(&mut self, value: u32) {
        if self.dma_in_progress() {
            log::warn!("{}: DMA already in progress", self.variant.name);
            return;
        }

        self.regs[R_DMA_CTRL] = value;
        let ctrl = DmaCtrl::from_bits_retain(value);

        let transfer = DmaTransfer {
            direction: if ctrl.contains(DmaCtrl::WRITE) {
                DmaDirection::ToFlash
            } else {
                DmaDirection::FromFlash
            },
            mode: if ctrl.contains(DmaCtrl::CKSUM) {
                DmaMode::Checksum
            } else {
                DmaMode::Copy
            },
            flash_addr: self.regs[R_DMA_FLASH_ADDR],
            dram_addr: self.regs[R_DMA_DRAM_ADDR],
            // The length register counts from 4 bytes
            remaining: self.regs[R_DMA_LEN].saturating_add(DMA_QUANTUM),
            checksum: 0,
        };

        if ctrl.contains(DmaCtrl::CALIB) {
            log::info!(
                "{}: DMA timing calibration is not modelled (freq {} delay {})",
                self.variant.name,
                regs::dma_ctrl_freq(value),
                regs::dma_ctrl_delay(value)
            );
        }

        log::debug!(
            "{}: DMA {:?} {:?} flash 0x{:08x} dram 0x{:08x} len 0x{:x}",
            self.variant.name,
            transfer.mode,
            transfer.direction,
            transfer.flash_addr,
            transfer.dram_addr,
            transfer.remaining
        );

        // A transfer cancelled but not yet reaped is replaced
        self.dma.task = Some(transfer);
    }

    fn dma_stop(&mut self) {
        let intr = self.intr_ctrl() - IntrCtrl::DMA_STATUS;
        self.regs[R_INTR_CTRL] = intr.bits();
        self.regs[R_DMA_CHECKSUM] = 0;
        self.regs[R_DMA_FLASH_ADDR] = 0;
        self.regs[R_DMA_DRAM_ADDR] = 0;
        self.regs[R_DMA_LEN] = 0;

        // Lower IRQ in any case. The IRQ handler could have been shared
        // with other devices.
        self.irq.lower();
    }

    fn dma_done(&mut self) {
        let intr = self.intr_ctrl() | IntrCtrl::DMA_STATUS;
        self.regs[R_INTR_CTRL] = intr.bits();
        if intr.contains(IntrCtrl::DMA_EN) {
            self.irq.raise();
        }
        log::debug!("{}: DMA done", self.variant.name);
    }

    fn dma_publish(&mut self, transfer: &DmaTransfer) {
        self.regs[R_DMA_FLASH_ADDR] = transfer.flash_addr;
        self.regs[R_DMA_DRAM_ADDR] = transfer.dram_addr;
        self.regs[R_DMA_LEN] = transfer.remaining;
        self.regs[R_DMA_CHECKSUM] = transfer.checksum;
    }

    fn dma_flash_offset(&self, flash_addr: u32) -> u64 {
        flash_addr.wrapping_sub(self.variant.flash_window_base) as u64
    }

    /// Advance the pending transfer by one quantum
    ///
    /// `dram` is the host memory the DRAM side of the transfer lives in.
    /// DRAM access errors are logged and the quantum carries on with zero
    /// data.
    pub fn run_dma_quantum(&mut self, dram: &mut dyn MemoryBus) -> DmaPoll {
        let Some(mut t) = self.dma.task.take() else {
            return DmaPoll::Idle;
        };

        if !self.dma_ctrl().contains(DmaCtrl::ENABLE) {
            log::debug!("{}: DMA cancelled", self.variant.name);
            return DmaPoll::Cancelled;
        }

        let flash = self.dma_flash_offset(t.flash_addr);
        match (t.mode, t.direction) {
            (DmaMode::Checksum, _) => {
                let data = self.flash_read(flash, DMA_QUANTUM as usize) as u32;
                t.checksum = t.checksum.wrapping_add(data);
                t.flash_addr = t.flash_addr.wrapping_add(DMA_QUANTUM);
            }
            (DmaMode::Copy, DmaDirection::ToFlash) => {
                let data = dram.read_u32(t.dram_addr as u64).unwrap_or_else(|e| {
                    log::warn!("{}: DMA DRAM read failed: {}", self.variant.name, e);
                    0
                });
                self.flash_write(flash, data as u64, DMA_QUANTUM as usize);
                t.flash_addr = t.flash_addr.wrapping_add(DMA_QUANTUM);
                t.dram_addr = t.dram_addr.wrapping_add(DMA_QUANTUM);
            }
            (DmaMode::Copy, DmaDirection::FromFlash) => {
                let data = self.flash_read(flash, DMA_QUANTUM as usize) as u32;
                if let Err(e) = dram.write_u32(t.dram_addr as u64, data) {
                    log::warn!("{}: DMA DRAM write failed: {}", self.variant.name, e);
                }
                t.flash_addr = t.flash_addr.wrapping_add(DMA_QUANTUM);
                t.dram_addr = t.dram_addr.wrapping_add(DMA_QUANTUM);
            }
        }
        t.remaining = t.remaining.saturating_sub(DMA_QUANTUM);

        self.dma_publish(&t);

        if t.remaining == 0 {
            self.dma_done();
            DmaPoll::Completed
        } else {
            self.dma.task = Some(t);
            DmaPoll::Pending
        }
    }

    /// Run quanta until the pending transfer completes or is cancelled
    ///
    /// `on_quantum` is called after every quantum with the number of
    /// bytes left.
    pub fn run_dma<F>(&mut self, dram: &mut dyn MemoryBus, mut on_quantum: F) -> DmaPoll
    where
        F: FnMut(u32),
    {
        let mut last = DmaPoll::Idle;
        loop {
            match self.run_dma_quantum(dram) {
                DmaPoll::Pending => {
                    last = DmaPoll::Pending;
                    on_quantum(self.regs[R_DMA_LEN]);
                }
                DmaPoll::Completed => {
                    on_quantum(0);
                    return DmaPoll::Completed;
                }
                DmaPoll::Idle => return last,
                poll => return poll,
            }
        }
    }
}
