//! smcemu-core - ASPEED static memory controller emulation
//!
//! This crate emulates the SPI/NOR flash controllers found in ASPEED BMC
//! SoCs (AST2400 SMC/FMC/SPI and AST2500 FMC/SPI1/SPI2) at the register
//! level, so that unmodified firmware can drive them as it would drive
//! silicon. It is `no_std` compatible but needs `alloc`.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for the error type
//! - `serde` - Make controller snapshots serializable
//!
//! # Example
//!
//! ```ignore
//! use smcemu_core::smc::{variant, AspeedSmc};
//! use smcemu_core::memory::Ram;
//!
//! let mut fmc = AspeedSmc::with_sdram_base(&variant::AST2400_FMC, 1, 0x4000_0000);
//! fmc.attach_flash(0, Box::new(flash))?;
//!
//! // Firmware fetches boot code through ROM decode
//! let word = fmc.flash_read(0, 4);
//!
//! // DMA runs as a deferred task, one quantum per host tick
//! let mut ram = Ram::new(0x4000_0000, 64 * 1024 * 1024);
//! while fmc.dma_pending() {
//!     fmc.run_dma_quantum(&mut ram);
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod error;
pub mod irq;
pub mod memory;
pub mod smc;
pub mod spi;

pub use error::{Error, Result};
