//! Per chip-select flash channels
//!
//! A channel is the slice of the controller's flash window mapped to one
//! slave. Accesses to that slice are turned into SPI transactions on the
//! shared bus according to the slave's control register:
//!
//! - **Read / Fast Read / Write** modes: the controller asserts the
//!   chip-select, sends the command opcode and the address, clocks the data
//!   and deasserts the chip-select, all within one memory access.
//! - **User** mode: software pulses the chip-select itself through the
//!   control register and every access moves raw bytes on the bus.
//!
//! While a channel decodes as ROM (the reset state), reads are served as
//! plain memory from the slave's image, which is how firmware executes
//! straight from flash at boot.

use super::regs::{self, CmdMode, CTRL_CE_STOP_ACTIVE, SMC_R_MAX};
use super::segment::Segment;
use super::variant::SmcVariant;
use super::AspeedSmc;
use crate::spi::{opcodes, AddressWidth, SpiBus};

/// Mapping state of one slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashChannel {
    id: usize,
    window: Segment,
    enabled: bool,
    rom_decode: bool,
}

impl FlashChannel {
    pub(crate) fn new(id: usize, window: Segment) -> Self {
        Self {
            id,
            window,
            enabled: window.size != 0,
            rom_decode: true,
        }
    }

    /// Chip-select index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Physical window the slave is mapped at
    pub fn window(&self) -> Segment {
        self.window
    }

    /// Whether the window decodes at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether reads are served as plain memory
    pub fn is_rom_decode(&self) -> bool {
        self.rom_decode
    }

    /// Resize and move the window; an empty window disables the channel
    pub(crate) fn map(&mut self, window: Segment) {
        self.window = window;
        self.enabled = window.size != 0;
    }

    pub(crate) fn set_rom_decode(&mut self, rom_decode: bool) {
        self.rom_decode = rom_decode;
    }

    /// Offset of `addr` (relative to the flash window base) inside this
    /// channel, if the channel decodes it
    fn decode(&self, flash_window_base: u32, addr: u64) -> Option<u32> {
        let paddr = (flash_window_base as u64).checked_add(addr)?;
        if self.enabled && self.window.contains(paddr) {
            Some((paddr - self.window.addr as u64) as u32)
        } else {
            None
        }
    }
}

/// One memory access to a channel, borrowing the controller state the
/// framing logic works on
pub(crate) struct ChannelAccess<'a> {
    pub(crate) id: usize,
    pub(crate) variant: &'static SmcVariant,
    pub(crate) regs: &'a mut [u32; SMC_R_MAX],
    pub(crate) bus: &'a mut SpiBus,
}

impl ChannelAccess<'_> {
    fn ctrl_index(&self) -> usize {
        self.variant.regs.ctrl0 + self.id
    }

    pub(crate) fn mode(&self) -> CmdMode {
        CmdMode::from_ctrl(self.regs[self.ctrl_index()])
    }

    /// Opcode for the current mode; Read mode has a fixed default
    pub(crate) fn command(&self) -> u8 {
        match self.mode() {
            CmdMode::Read => opcodes::READ,
            _ => regs::ctrl_cmd(self.regs[self.ctrl_index()]),
        }
    }

    pub(crate) fn is_4byte(&self) -> bool {
        self.variant
            .regs
            .ce_ctrl
            .is_some_and(|r| regs::ce_ctrl_4byte(self.regs[r], self.id))
    }

    fn is_writable(&self) -> bool {
        regs::conf_write_enabled(
            self.regs[self.variant.regs.conf],
            self.variant.conf_enable_w0,
            self.id,
        )
    }

    fn select(&mut self) {
        let idx = self.ctrl_index();
        self.regs[idx] &= !CTRL_CE_STOP_ACTIVE;
        self.bus
            .set_cs(self.id, regs::ctrl_ce_stop_active(self.regs[idx]));
    }

    fn unselect(&mut self) {
        let idx = self.ctrl_index();
        self.regs[idx] |= CTRL_CE_STOP_ACTIVE;
        self.bus
            .set_cs(self.id, regs::ctrl_ce_stop_active(self.regs[idx]));
    }

    /// Send the command and address phases
    fn setup(&mut self, cmd: u8, addr: u32) {
        // We should not have to send EN4B each time
        let width = if self.is_4byte() {
            self.bus.transfer(opcodes::EN4B);
            AddressWidth::FourByte
        } else {
            AddressWidth::ThreeByte
        };

        self.bus.transfer(cmd);

        let mut buf = [0u8; 4];
        let n = width.encode(addr, &mut buf);
        for &b in &buf[..n] {
            self.bus.transfer(b);
        }
    }

    fn clock_in(&mut self, size: usize) -> u64 {
        (0..size).fold(0u64, |acc, i| {
            acc | (self.bus.transfer(0) as u64) << (8 * i)
        })
    }

    fn clock_out(&mut self, data: u64, size: usize) {
        for i in 0..size {
            self.bus.transfer((data >> (8 * i)) as u8);
        }
    }

    /// Read `size` bytes at `addr` (relative to the channel window)
    pub(crate) fn read(&mut self, addr: u32, size: usize) -> u64 {
        if self.mode() == CmdMode::User {
            return self.clock_in(size);
        }

        self.select();
        let cmd = self.command();
        self.setup(cmd, addr);
        let data = self.clock_in(size);
        self.unselect();
        data
    }

    /// Write `size` bytes of `data` at `addr` (relative to the channel
    /// window)
    pub(crate) fn write(&mut self, addr: u32, data: u64, size: usize) {
        if !self.is_writable() {
            log::warn!(
                "{}: flash CS{} is not writable at 0x{:08x}",
                self.variant.name,
                self.id,
                addr
            );
            return;
        }

        if self.mode() == CmdMode::User {
            self.clock_out(data, size);
            return;
        }

        self.select();
        let cmd = self.command();
        if cmd == 0 {
            log::warn!(
                "{}: no write command for CS{} at 0x{:08x}",
                self.variant.name,
                self.id,
                addr
            );
        } else {
            self.setup(cmd, addr);
        }
        self.clock_out(data, size);
        self.unselect();
    }
}

impl AspeedSmc {
    fn channel_access(&mut self, id: usize) -> ChannelAccess<'_> {
        ChannelAccess {
            id,
            variant: self.variant,
            regs: &mut self.regs,
            bus: &mut self.bus,
        }
    }

    /// Channel decoding `addr`, relative to the flash window base
    ///
    /// Overlapping windows are legal; the lowest chip-select wins.
    fn decode_flash(&self, addr: u64) -> Option<(usize, u32)> {
        let base = self.variant.flash_window_base;
        self.channels
            .iter()
            .find_map(|ch| ch.decode(base, addr).map(|off| (ch.id, off)))
    }

    /// Read from the flash window
    ///
    /// `addr` is relative to the flash window base and `size` is 1 to 4
    /// bytes. The value is assembled little-endian.
    pub fn flash_read(&mut self, addr: u64, size: usize) -> u64 {
        if !(1..=4).contains(&size) {
            log::warn!(
                "{}: invalid flash read of size {} at 0x{:08x}",
                self.variant.name,
                size,
                addr
            );
            return 0;
        }

        let Some((id, off)) = self.decode_flash(addr) else {
            log::warn!(
                "{}: flash read of size {} at unmapped 0x{:08x}",
                self.variant.name,
                size,
                addr
            );
            return 0;
        };

        if self.channels[id].rom_decode {
            return self.rom_read(id, off, size);
        }
        self.channel_access(id).read(off, size)
    }

    /// Write to the flash window
    ///
    /// `addr` is relative to the flash window base and `size` is 1 to 4
    /// bytes taken little-endian from `data`. Writes always go through
    /// command framing, even while the channel decodes reads as ROM.
    pub fn flash_write(&mut self, addr: u64, data: u64, size: usize) {
        if !(1..=4).contains(&size) {
            log::warn!(
                "{}: invalid flash write of size {} at 0x{:08x}",
                self.variant.name,
                size,
                addr
            );
            return;
        }

        let Some((id, off)) = self.decode_flash(addr) else {
            log::warn!(
                "{}: flash write of size {} at unmapped 0x{:08x}: 0x{:x}",
                self.variant.name,
                size,
                addr,
                data
            );
            return;
        };

        self.channel_access(id).write(off, data, size);
    }

    fn rom_read(&self, id: usize, off: u32, size: usize) -> u64 {
        let Some(image) = self.bus.image(id) else {
            return 0;
        };
        let off = off as usize;
        (0..size).fold(0u64, |acc, i| {
            let byte = image.get(off + i).copied().unwrap_or(0);
            acc | (byte as u64) << (8 * i)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::variant::{AST2400_FMC, AST2400_SPI};
    use crate::spi::SpiSlave;
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// Bus activity seen by a mock slave
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Cs(bool),
        Byte(u8),
    }

    /// A slave that records everything and answers from a script
    struct MockSlave {
        events: Rc<RefCell<Vec<Event>>>,
        reply: Rc<RefCell<Vec<u8>>>,
        image: Option<Vec<u8>>,
    }

    impl SpiSlave for MockSlave {
        fn set_cs(&mut self, level: bool) {
            self.events.borrow_mut().push(Event::Cs(level));
        }

        fn transfer(&mut self, tx: u8) -> u8 {
            self.events.borrow_mut().push(Event::Byte(tx));
            let mut reply = self.reply.borrow_mut();
            if reply.is_empty() {
                0
            } else {
                reply.remove(0)
            }
        }

        fn image(&self) -> Option<&[u8]> {
            self.image.as_deref()
        }
    }

    struct Fixture {
        smc: AspeedSmc,
        events: Rc<RefCell<Vec<Event>>>,
        reply: Rc<RefCell<Vec<u8>>>,
    }

    fn fixture(variant: &'static SmcVariant, image: Option<Vec<u8>>) -> Fixture {
        let events = Rc::new(RefCell::new(Vec::new()));
        let reply = Rc::new(RefCell::new(Vec::new()));
        let mut smc = AspeedSmc::new(variant, 1);
        smc.attach_flash(
            0,
            Box::new(MockSlave {
                events: events.clone(),
                reply: reply.clone(),
                image,
            }),
        )
        .unwrap();
        events.borrow_mut().clear();
        Fixture { smc, events, reply }
    }

    fn bytes(events: &[Event]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Byte(b) => Some(*b),
                Event::Cs(_) => None,
            })
            .collect()
    }

    fn set_ctrl(smc: &mut AspeedSmc, mode: CmdMode, cmd: u8, stop: bool) {
        let off = (smc.variant.regs.ctrl0 * 4) as u64;
        smc.write(off, regs::ctrl_value(mode, cmd, stop) as u64, 4);
    }

    #[test]
    fn test_rom_decode_reads_image_without_bus_traffic() {
        let mut f = fixture(&AST2400_FMC, Some(vec![0x11, 0x22, 0x33, 0x44, 0x55]));

        assert_eq!(f.smc.flash_read(0, 4), 0x4433_2211);
        assert_eq!(f.smc.flash_read(3, 4), 0x0000_5544);
        assert!(f.events.borrow().is_empty());
    }

    #[test]
    fn test_read_mode_frames_default_command() {
        let mut f = fixture(&AST2400_FMC, None);
        set_ctrl(&mut f.smc, CmdMode::Read, 0xAB, true);
        f.smc.channels[0].set_rom_decode(false);
        f.events.borrow_mut().clear();
        f.reply
            .borrow_mut()
            .extend_from_slice(&[0, 0, 0, 0, 0xEF, 0xBE]);

        let value = f.smc.flash_read(0x12_3456, 2);

        assert_eq!(value, 0xBEEF);
        assert_eq!(
            *f.events.borrow(),
            vec![
                Event::Cs(false),
                Event::Byte(opcodes::READ),
                Event::Byte(0x12),
                Event::Byte(0x34),
                Event::Byte(0x56),
                Event::Byte(0),
                Event::Byte(0),
                Event::Cs(true),
            ]
        );
        // chip-select released after the access
        assert!(regs::ctrl_ce_stop_active(f.smc.reg(f.smc.variant.regs.ctrl0)));
    }

    #[test]
    fn test_fast_read_4byte_sends_en4b_and_full_address() {
        let mut f = fixture(&AST2400_FMC, None);
        set_ctrl(&mut f.smc, CmdMode::FastRead, opcodes::FAST_READ, true);
        f.smc.write(0x04, 0x1, 4); // CS0 in 4-byte mode
        f.smc.channels[0].set_rom_decode(false);
        f.events.borrow_mut().clear();

        f.smc.flash_read(0x0123_4567, 1);

        assert_eq!(
            bytes(&f.events.borrow()),
            vec![opcodes::EN4B, opcodes::FAST_READ, 0x01, 0x23, 0x45, 0x67, 0x00]
        );
    }

    #[test]
    fn test_write_requires_write_enable() {
        let mut f = fixture(&AST2400_FMC, None);
        set_ctrl(&mut f.smc, CmdMode::Write, opcodes::PP, true);
        f.events.borrow_mut().clear();

        f.smc.flash_write(0x100, 0xAABB_CCDD, 4);
        assert!(f.events.borrow().is_empty());

        f.smc.write(0x00, 1 << regs::CONF_ENABLE_W0, 4);
        f.smc.flash_write(0x100, 0xAABB_CCDD, 4);
        assert_eq!(
            bytes(&f.events.borrow()),
            vec![opcodes::PP, 0x00, 0x01, 0x00, 0xDD, 0xCC, 0xBB, 0xAA]
        );
    }

    #[test]
    fn test_user_mode_moves_raw_bytes() {
        let mut f = fixture(&AST2400_FMC, Some(vec![0xFF; 16]));
        f.smc.write(0x00, 1 << regs::CONF_ENABLE_W0, 4);
        // user mode, chip-select asserted by software
        set_ctrl(&mut f.smc, CmdMode::User, 0, false);
        assert!(!f.smc.channels[0].is_rom_decode());
        f.events.borrow_mut().clear();

        f.smc.flash_write(0, opcodes::RDID as u64, 1);
        f.reply.borrow_mut().extend_from_slice(&[0xC2, 0x20, 0x19]);
        let id = f.smc.flash_read(0, 3);

        assert_eq!(id, 0x19_20C2);
        // no chip-select toggling by the controller
        assert_eq!(
            *f.events.borrow(),
            vec![
                Event::Byte(opcodes::RDID),
                Event::Byte(0),
                Event::Byte(0),
                Event::Byte(0),
            ]
        );
    }

    #[test]
    fn test_spi_variant_has_no_4byte_mode() {
        let mut f = fixture(&AST2400_SPI, None);
        // 0x04 is CE0 control on this controller
        set_ctrl(&mut f.smc, CmdMode::FastRead, opcodes::FAST_READ, true);
        f.smc.channels[0].set_rom_decode(false);
        f.events.borrow_mut().clear();

        f.smc.flash_read(0x10, 1);
        assert_eq!(
            bytes(&f.events.borrow()),
            vec![opcodes::FAST_READ, 0x00, 0x00, 0x10, 0x00]
        );
    }

    #[test]
    fn test_unmapped_and_unbacked_accesses() {
        let mut smc = AspeedSmc::new(&AST2400_FMC, 2);
        // no flash behind CS1: ROM decode and framed reads see zeroes
        assert_eq!(smc.flash_read(0x0400_0000, 4), 0);
        smc.write(0x14, regs::ctrl_value(CmdMode::Read, 0, true) as u64, 4);
        smc.channels[1].set_rom_decode(false);
        assert_eq!(smc.flash_read(0x0400_0000, 4), 0);
        // past the last default segment
        assert_eq!(smc.flash_read(0x0C00_0000, 4), 0);
        assert_eq!(smc.flash_read(0, 8), 0);
    }

    #[test]
    fn test_address_overflow_is_unmapped() {
        let mut f = fixture(&AST2400_FMC, Some(vec![0xAA; 16]));
        f.smc.write(0x00, 1 << regs::CONF_ENABLE_W0, 4);
        assert_eq!(f.smc.flash_read(u64::MAX - 1, 4), 0);
        f.smc.flash_write(u64::MAX, 0x55, 1);
        assert!(f.events.borrow().is_empty());
    }

    #[test]
    fn test_empty_windows_are_disabled() {
        let smc = AspeedSmc::new(&crate::smc::variant::AST2400_SMC, 5);
        assert!(smc.channels[0].is_enabled());
        assert!(smc.channels[1..].iter().all(|ch| !ch.is_enabled()));
    }
}
