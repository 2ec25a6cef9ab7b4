//! Serial bus shared by all chip-selects of one controller

use crate::error::{Error, Result};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// A device sitting on the controller's SPI bus
///
/// The controller never interprets what a slave answers beyond forwarding
/// it as read data. Chip-select polarity follows the hardware: a high
/// level means the slave is deselected.
pub trait SpiSlave {
    /// Chip-select input changed (`true` = high = deselected)
    fn set_cs(&mut self, level: bool);

    /// Exchange one byte: shift `tx` out, return the byte shifted in
    fn transfer(&mut self, tx: u8) -> u8;

    /// Direct-mapped contents, served while the controller decodes the
    /// slave's window as ROM
    ///
    /// Devices without a memory image return `None` and read as zero in
    /// ROM-decode mode.
    fn image(&self) -> Option<&[u8]> {
        None
    }
}

struct Port {
    level: bool,
    slave: Option<Box<dyn SpiSlave>>,
}

/// The controller side of the bus: one chip-select output per port
pub struct SpiBus {
    ports: Vec<Port>,
}

impl SpiBus {
    /// Create a bus with `num_cs` chip-select outputs, all deselected
    pub fn new(num_cs: usize) -> Self {
        let ports = (0..num_cs)
            .map(|_| Port {
                level: true,
                slave: None,
            })
            .collect();
        Self { ports }
    }

    /// Number of chip-select outputs
    pub fn num_cs(&self) -> usize {
        self.ports.len()
    }

    /// Connect a slave to chip-select `cs`
    pub fn attach(&mut self, cs: usize, mut slave: Box<dyn SpiSlave>) -> Result<()> {
        let num_cs = self.ports.len();
        let port = self
            .ports
            .get_mut(cs)
            .ok_or(Error::InvalidChipSelect { cs, num_cs })?;
        if port.slave.is_some() {
            return Err(Error::ChipSelectInUse { cs });
        }
        slave.set_cs(port.level);
        port.slave = Some(slave);
        Ok(())
    }

    /// Whether a slave is connected to chip-select `cs`
    pub fn is_attached(&self, cs: usize) -> bool {
        self.ports.get(cs).is_some_and(|p| p.slave.is_some())
    }

    /// Drive chip-select output `cs`
    ///
    /// Outputs that do not exist are ignored. The slave only sees actual
    /// level changes.
    pub fn set_cs(&mut self, cs: usize, level: bool) {
        let Some(port) = self.ports.get_mut(cs) else {
            return;
        };
        if port.level == level {
            return;
        }
        port.level = level;
        if let Some(slave) = port.slave.as_mut() {
            slave.set_cs(level);
        }
    }

    /// Level of chip-select output `cs`, `None` if it does not exist
    pub fn cs_level(&self, cs: usize) -> Option<bool> {
        self.ports.get(cs).map(|p| p.level)
    }

    /// Clock one byte on the bus
    ///
    /// Every selected slave sees the byte; their answers are OR'ed like
    /// open-drain lines. With nobody selected the bus reads as zero.
    pub fn transfer(&mut self, tx: u8) -> u8 {
        let mut rx = 0;
        for port in self.ports.iter_mut().filter(|p| !p.level) {
            if let Some(slave) = port.slave.as_mut() {
                rx |= slave.transfer(tx);
            }
        }
        log::trace!("spi: tx 0x{:02x} rx 0x{:02x}", tx, rx);
        rx
    }

    /// Memory image of the slave on chip-select `cs`
    pub fn image(&self, cs: usize) -> Option<&[u8]> {
        self.ports.get(cs)?.slave.as_ref()?.image()
    }
}

impl core::fmt::Debug for SpiBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for port in &self.ports {
            list.entry(&(port.level, port.slave.is_some()));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;

    #[derive(Default)]
    struct Echo {
        seen: Vec<u8>,
        cs: Vec<bool>,
    }

    struct Shared(Rc<RefCell<Echo>>, u8);

    impl SpiSlave for Shared {
        fn set_cs(&mut self, level: bool) {
            self.0.borrow_mut().cs.push(level);
        }

        fn transfer(&mut self, tx: u8) -> u8 {
            self.0.borrow_mut().seen.push(tx);
            self.1
        }
    }

    #[test]
    fn test_only_selected_slaves_respond() {
        let a = Rc::new(RefCell::new(Echo::default()));
        let b = Rc::new(RefCell::new(Echo::default()));
        let mut bus = SpiBus::new(2);
        bus.attach(0, Box::new(Shared(a.clone(), 0x0F))).unwrap();
        bus.attach(1, Box::new(Shared(b.clone(), 0xF0))).unwrap();

        assert_eq!(bus.transfer(0x11), 0);

        bus.set_cs(1, false);
        assert_eq!(bus.transfer(0x22), 0xF0);
        bus.set_cs(0, false);
        assert_eq!(bus.transfer(0x33), 0xFF);

        assert_eq!(a.borrow().seen, vec![0x33]);
        assert_eq!(b.borrow().seen, vec![0x22, 0x33]);
    }

    #[test]
    fn test_cs_changes_are_forwarded_once() {
        let a = Rc::new(RefCell::new(Echo::default()));
        let mut bus = SpiBus::new(1);
        bus.attach(0, Box::new(Shared(a.clone(), 0))).unwrap();

        bus.set_cs(0, false);
        bus.set_cs(0, false);
        bus.set_cs(0, true);
        bus.set_cs(3, false);

        // initial level on attach, then the two real changes
        assert_eq!(a.borrow().cs, vec![true, false, true]);
    }

    #[test]
    fn test_attach_checks_chip_select() {
        let a = Rc::new(RefCell::new(Echo::default()));
        let mut bus = SpiBus::new(1);
        assert_eq!(
            bus.attach(1, Box::new(Shared(a.clone(), 0))),
            Err(Error::InvalidChipSelect { cs: 1, num_cs: 1 })
        );
        bus.attach(0, Box::new(Shared(a.clone(), 0))).unwrap();
        assert_eq!(
            bus.attach(0, Box::new(Shared(a, 0))),
            Err(Error::ChipSelectInUse { cs: 0 })
        );
    }
}
