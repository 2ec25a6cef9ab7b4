//! smcemu-dummy - In-memory SPI NOR flash
//!
//! This crate provides a flash chip emulated in memory that can be wired to
//! a controller chip-select. It decodes the common JEDEC command set one
//! byte at a time, like a real part does while its chip-select is low, and
//! exposes its contents as the memory image served in ROM-decode mode.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use smcemu_core::spi::{opcodes, SpiSlave};

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Configuration for the dummy flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u16,
    /// Flash size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Sector size for smallest erase
    pub sector_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        W25Q128FV
    }
}

/// Winbond W25Q128FV, 16 MiB
pub const W25Q128FV: DummyConfig = DummyConfig {
    manufacturer_id: 0xEF, // Winbond
    device_id: 0x4018,
    size: 16 * MIB,
    page_size: 256,
    sector_size: 4 * KIB,
};

/// Micron N25Q256A, 32 MiB (palmetto FMC boot flash)
pub const N25Q256A: DummyConfig = DummyConfig {
    manufacturer_id: 0x20, // Micron
    device_id: 0xBA19,
    size: 32 * MIB,
    page_size: 256,
    sector_size: 4 * KIB,
};

/// Macronix MX25L25635E, 32 MiB (palmetto SPI host flash)
pub const MX25L25635E: DummyConfig = DummyConfig {
    manufacturer_id: 0xC2, // Macronix
    device_id: 0x2019,
    size: 32 * MIB,
    page_size: 256,
    sector_size: 4 * KIB,
};

/// Chip presets by name
pub const CHIP_PRESETS: &[(&str, DummyConfig)] = &[
    ("n25q256a", N25Q256A),
    ("mx25l25635e", MX25L25635E),
    ("w25q128fv", W25Q128FV),
];

/// Look up a chip preset by name (case insensitive)
pub fn chip_preset(name: &str) -> Option<DummyConfig> {
    CHIP_PRESETS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, config)| config.clone())
}

/// Where the chip is in the current command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the opcode
    Opcode,
    /// Collecting address bytes
    Address { op: u8, addr: u32, left: u8 },
    /// One dummy byte before fast read data
    Dummy { addr: u32 },
    /// Streaming out data
    Read { addr: u32 },
    /// Taking page program data
    Program { addr: u32 },
    /// Erase armed, runs when chip-select goes high
    Erase { op: u8, addr: u32 },
    /// Chip erase armed
    ChipErase,
    /// Shifting out an ID
    Id { pos: usize },
    /// Shifting out the status register, repeated
    Status,
    /// Taking the new status register value
    WriteStatus,
    /// Command complete, further bytes are ignored
    Done,
}

/// Dummy flash chip
///
/// Emulates a SPI NOR flash in memory for testing purposes.
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    status_reg1: u8,
    write_enabled: bool,
    in_4byte_mode: bool,
    selected: bool,
    phase: Phase,
}

impl DummyFlash {
    /// Create a new erased dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            status_reg1: 0,
            write_enabled: false,
            in_4byte_mode: false,
            selected: false,
            phase: Phase::Opcode,
        }
    }

    /// Create a new dummy flash with default configuration (W25Q128FV)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Whether the chip is in 4-byte address mode
    pub fn is_4byte(&self) -> bool {
        self.in_4byte_mode
    }

    fn status(&self) -> u8 {
        let wel = if self.write_enabled {
            opcodes::SR1_WEL
        } else {
            0
        };
        (self.status_reg1 & !(opcodes::SR1_WEL | opcodes::SR1_WIP)) | wel
    }

    fn wrap(&self, addr: u32) -> usize {
        addr as usize % self.data.len().max(1)
    }

    fn address_bytes(&self, op: u8) -> u8 {
        match op {
            opcodes::READ_4B
            | opcodes::FAST_READ_4B
            | opcodes::PP_4B
            | opcodes::SE_21
            | opcodes::BE_DC => 4,
            _ if self.in_4byte_mode => 4,
            _ => 3,
        }
    }

    /// Decode an opcode. Commands without operands leave the chip waiting
    /// for the next opcode within the same select.
    fn start(&mut self, op: u8) -> Phase {
        match op {
            opcodes::WREN => {
                self.write_enabled = true;
                Phase::Opcode
            }
            opcodes::WRDI => {
                self.write_enabled = false;
                Phase::Opcode
            }
            opcodes::EN4B => {
                self.in_4byte_mode = true;
                Phase::Opcode
            }
            opcodes::EX4B => {
                self.in_4byte_mode = false;
                Phase::Opcode
            }
            opcodes::RDID => Phase::Id { pos: 0 },
            opcodes::RDSR => Phase::Status,
            opcodes::WRSR => Phase::WriteStatus,
            opcodes::CE_60 | opcodes::CE_C7 => Phase::ChipErase,
            opcodes::READ
            | opcodes::FAST_READ
            | opcodes::READ_4B
            | opcodes::FAST_READ_4B
            | opcodes::PP
            | opcodes::PP_4B
            | opcodes::SE_20
            | opcodes::SE_21
            | opcodes::BE_52
            | opcodes::BE_D8
            | opcodes::BE_DC => Phase::Address {
                op,
                addr: 0,
                left: self.address_bytes(op),
            },
            _ => {
                log::debug!("dummy flash: unsupported opcode 0x{:02x}", op);
                Phase::Done
            }
        }
    }

    fn address_complete(&self, op: u8, addr: u32) -> Phase {
        match op {
            opcodes::READ | opcodes::READ_4B => Phase::Read { addr },
            opcodes::FAST_READ | opcodes::FAST_READ_4B => Phase::Dummy { addr },
            opcodes::PP | opcodes::PP_4B => Phase::Program { addr },
            _ => Phase::Erase { op, addr },
        }
    }

    fn program(&mut self, addr: u32, byte: u8) -> u32 {
        if !self.write_enabled {
            return addr;
        }
        let offset = self.wrap(addr);
        // Flash programming: can only change 1 -> 0
        if let Some(cell) = self.data.get_mut(offset) {
            *cell &= byte;
        }

        // The address wraps within the page
        let page = self.config.page_size as u32;
        (addr & !(page - 1)) | (addr.wrapping_add(1) & (page - 1))
    }

    fn erase(&mut self, op: u8, addr: u32) {
        if !self.write_enabled {
            log::debug!("dummy flash: erase while write protected");
            return;
        }
        let erase_size = match op {
            opcodes::SE_20 | opcodes::SE_21 => self.config.sector_size,
            opcodes::BE_52 => 32 * KIB,
            _ => 64 * KIB,
        };

        // Align address to erase boundary
        let start = self.wrap(addr) & !(erase_size - 1);
        let end = core::cmp::min(start + erase_size, self.data.len());
        self.data[start..end].fill(0xFF);
    }

    /// Run the commands that take effect when the chip is deselected
    fn finish(&mut self) {
        let writing = match self.phase {
            Phase::Erase { op, addr } => {
                self.erase(op, addr);
                true
            }
            Phase::ChipErase => {
                if self.write_enabled {
                    self.data.fill(0xFF);
                }
                true
            }
            Phase::Program { .. } | Phase::WriteStatus => true,
            _ => false,
        };
        if writing {
            self.write_enabled = false;
        }
        self.phase = Phase::Opcode;
    }
}

impl SpiSlave for DummyFlash {
    fn set_cs(&mut self, level: bool) {
        let selected = !level;
        if self.selected && !selected {
            self.finish();
        }
        if selected {
            self.phase = Phase::Opcode;
        }
        self.selected = selected;
    }

    fn transfer(&mut self, tx: u8) -> u8 {
        if !self.selected {
            return 0;
        }

        let (rx, next) = match self.phase {
            Phase::Opcode => (0, self.start(tx)),
            Phase::Address { op, addr, left } => {
                let addr = (addr << 8) | tx as u32;
                if left > 1 {
                    (
                        0,
                        Phase::Address {
                            op,
                            addr,
                            left: left - 1,
                        },
                    )
                } else {
                    (0, self.address_complete(op, addr))
                }
            }
            Phase::Dummy { addr } => (0, Phase::Read { addr }),
            Phase::Read { addr } => {
                let rx = self.data.get(self.wrap(addr)).copied().unwrap_or(0xFF);
                (rx, Phase::Read { addr: addr.wrapping_add(1) })
            }
            Phase::Program { addr } => (0, Phase::Program { addr: self.program(addr, tx) }),
            Phase::Id { pos } => {
                let id = [
                    self.config.manufacturer_id,
                    (self.config.device_id >> 8) as u8,
                    self.config.device_id as u8,
                ];
                (id.get(pos).copied().unwrap_or(0), Phase::Id { pos: pos + 1 })
            }
            Phase::Status => (self.status(), Phase::Status),
            Phase::WriteStatus => {
                if self.write_enabled {
                    self.status_reg1 = tx;
                }
                (0, Phase::Done)
            }
            phase @ (Phase::Erase { .. } | Phase::ChipErase | Phase::Done) => (0, phase),
        };
        self.phase = next;
        rx
    }

    fn image(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use smcemu_core::smc::regs::{self, CmdMode};
    use smcemu_core::smc::{variant, AspeedSmc};

    /// Run one command with the chip selected, return what it answered
    fn command(flash: &mut DummyFlash, tx: &[u8]) -> Vec<u8> {
        flash.set_cs(false);
        let rx = tx.iter().map(|&b| flash.transfer(b)).collect();
        flash.set_cs(true);
        rx
    }

    #[test]
    fn test_read_jedec_id() {
        let mut flash = DummyFlash::new_default();
        let rx = command(&mut flash, &[opcodes::RDID, 0, 0, 0]);
        assert_eq!(rx, [0, 0xEF, 0x40, 0x18]);
    }

    #[test]
    fn test_read_write() {
        let mut flash = DummyFlash::new_default();

        // Needs write enable
        command(&mut flash, &[opcodes::PP, 0x00, 0x10, 0x00, 0x12]);
        assert_eq!(flash.data()[0x1000], 0xFF);

        command(&mut flash, &[opcodes::WREN]);
        let rx = command(&mut flash, &[opcodes::RDSR, 0]);
        assert_eq!(rx[1] & opcodes::SR1_WEL, opcodes::SR1_WEL);

        command(&mut flash, &[opcodes::PP, 0x00, 0x10, 0x00, 0x12, 0x34, 0x56, 0x78]);
        let rx = command(&mut flash, &[opcodes::RDSR, 0]);
        assert_eq!(rx[1] & opcodes::SR1_WEL, 0);

        let rx = command(&mut flash, &[opcodes::READ, 0x00, 0x10, 0x00, 0, 0, 0, 0]);
        assert_eq!(&rx[4..], [0x12, 0x34, 0x56, 0x78]);

        // one dummy byte before fast read data
        let rx = command(&mut flash, &[opcodes::FAST_READ, 0x00, 0x10, 0x01, 0, 0, 0]);
        assert_eq!(&rx[5..], [0x34, 0x56]);
    }

    #[test]
    fn test_page_program_wraps_in_page() {
        let mut flash = DummyFlash::new_default();
        command(&mut flash, &[opcodes::WREN]);
        command(&mut flash, &[opcodes::PP, 0x00, 0x01, 0xFF, 0xAA, 0xBB]);
        assert_eq!(flash.data()[0x1FF], 0xAA);
        assert_eq!(flash.data()[0x100], 0xBB);
        assert_eq!(flash.data()[0x200], 0xFF);
    }

    #[test]
    fn test_erase() {
        let mut flash = DummyFlash::with_data(DummyConfig::default(), &[0u8; 8192]);

        // Erase runs on deselect and aligns the address
        command(&mut flash, &[opcodes::WREN]);
        command(&mut flash, &[opcodes::SE_20, 0x00, 0x10, 0x80]);
        assert!(flash.data()[0x1000..0x2000].iter().all(|&b| b == 0xFF));
        assert!(flash.data()[..0x1000].iter().all(|&b| b == 0));

        command(&mut flash, &[opcodes::CE_C7]);
        assert_eq!(flash.data()[0], 0);
        command(&mut flash, &[opcodes::WREN]);
        command(&mut flash, &[opcodes::CE_C7]);
        assert!(flash.data().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_4byte_addressing() {
        let mut data = vec![0u8; 0x0100_0004];
        data[0x0100_0000..].copy_from_slice(&[1, 2, 3, 4]);
        let mut flash = DummyFlash::with_data(N25Q256A, &data);

        let rx = command(&mut flash, &[opcodes::READ_4B, 0x01, 0x00, 0x00, 0x00, 0]);
        assert_eq!(rx[5], 1);

        command(&mut flash, &[opcodes::EN4B]);
        assert!(flash.is_4byte());
        let rx = command(&mut flash, &[opcodes::READ, 0x01, 0x00, 0x00, 0x01, 0]);
        assert_eq!(rx[5], 2);
        command(&mut flash, &[opcodes::EX4B]);
        assert!(!flash.is_4byte());
    }

    #[test]
    fn test_presets() {
        assert_eq!(chip_preset("N25Q256A"), Some(N25Q256A));
        assert_eq!(chip_preset("mx25l25635e").map(|c| c.manufacturer_id), Some(0xC2));
        assert_eq!(chip_preset("nope"), None);
    }

    #[test]
    fn test_behind_controller() {
        let mut fmc = AspeedSmc::new(&variant::AST2400_FMC, 1);
        fmc.attach_flash(0, Box::new(DummyFlash::with_data(N25Q256A, b"BOOT")))
            .unwrap();

        // boot code fetched as memory
        assert_eq!(fmc.flash_read(0, 4), u32::from_le_bytes(*b"BOOT") as u64);

        // user mode: software drives the chip-select and the bytes
        fmc.write(0x00, 1 << regs::CONF_ENABLE_W0, 4);
        fmc.write(0x10, regs::ctrl_value(CmdMode::User, 0, false) as u64, 4);
        fmc.flash_write(0, opcodes::RDID as u64, 1);
        assert_eq!(fmc.flash_read(0, 3), 0x19_BA20);
        fmc.write(0x10, regs::ctrl_value(CmdMode::User, 0, true) as u64, 4);

        fmc.write(0x10, regs::ctrl_value(CmdMode::User, 0, false) as u64, 4);
        fmc.flash_write(0, opcodes::WREN as u64, 1);
        fmc.write(0x10, regs::ctrl_value(CmdMode::User, 0, true) as u64, 4);

        // write mode: the controller frames page program
        fmc.write(0x10, regs::ctrl_value(CmdMode::Write, opcodes::PP, true) as u64, 4);
        fmc.flash_write(0x10, 0x1234_5600, 4);

        // back in read mode, ROM decode sees the programmed data
        fmc.write(0x10, regs::ctrl_value(CmdMode::Read, 0, true) as u64, 4);
        assert_eq!(fmc.flash_read(0, 4), u32::from_le_bytes(*b"BOOT") as u64);
        assert_eq!(fmc.flash_read(0x10, 4), 0x1234_5600);
    }

    #[test]
    fn test_framed_program_in_4byte_mode() {
        let mut fmc = AspeedSmc::new(&variant::AST2400_FMC, 1);
        fmc.attach_flash(0, Box::new(DummyFlash::new(N25Q256A))).unwrap();
        fmc.write(0x00, 1 << regs::CONF_ENABLE_W0, 4);

        fmc.write(0x10, regs::ctrl_value(CmdMode::User, 0, false) as u64, 4);
        fmc.flash_write(0, opcodes::WREN as u64, 1);
        fmc.write(0x10, regs::ctrl_value(CmdMode::User, 0, true) as u64, 4);

        // CS0 in 4-byte mode: EN4B, PP and the address share one select
        fmc.write(0x04, 0x1, 4);
        fmc.write(0x10, regs::ctrl_value(CmdMode::Write, opcodes::PP, true) as u64, 4);
        fmc.flash_write(0x100, 0x1122_3344, 4);

        fmc.write(0x10, regs::ctrl_value(CmdMode::Read, 0, true) as u64, 4);
        assert_eq!(fmc.flash_read(0x100, 4), 0x1122_3344);
    }

    #[test]
    fn test_no_operand_commands_chain_in_one_select() {
        let mut flash = DummyFlash::new_default();
        command(&mut flash, &[opcodes::WREN, opcodes::PP, 0x00, 0x00, 0x20, 0x5A]);
        assert_eq!(flash.data()[0x20], 0x5A);

        let rx = command(&mut flash, &[opcodes::WRDI, opcodes::RDSR, 0]);
        assert_eq!(rx[2] & opcodes::SR1_WEL, 0);
    }
}
