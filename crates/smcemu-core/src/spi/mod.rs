//! SPI bus types
//!
//! This module provides the serial bus the controller frames commands on,
//! the trait flash devices implement to sit on it, and standard JEDEC
//! opcodes.

mod address;
mod bus;
pub mod opcodes;

pub use address::AddressWidth;
pub use bus::{SpiBus, SpiSlave};
pub use opcodes::*;
