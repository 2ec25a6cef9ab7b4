//! Error types for smcemu-core
//!
//! Guest-visible misbehaviour (bad register values, accesses out of range,
//! DMA starts while busy) is never reported through this type: the
//! controller logs it and carries on like the hardware does. These errors
//! are for the host side wiring the controller into a machine.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Board wiring errors
    /// No controller variant with this name
    UnknownVariant,
    /// Chip-select index is not wired on this controller
    InvalidChipSelect {
        /// Requested chip-select
        cs: usize,
        /// Number of configured chip-selects
        num_cs: usize,
    },
    /// A flash device is already attached to this chip-select
    ChipSelectInUse {
        /// Requested chip-select
        cs: usize,
    },

    // Snapshot errors
    /// Saved register file does not match the controller layout
    StateMismatch {
        /// Number of words expected
        expected: usize,
        /// Number of words found in the snapshot
        found: usize,
    },
    /// Saved state was taken from a different controller variant
    VariantMismatch,

    // Memory errors
    /// Physical access outside of the backing memory
    AddressOutOfBounds {
        /// Faulting physical address
        addr: u64,
        /// Access length in bytes
        len: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVariant => write!(f, "unknown controller variant"),
            Self::InvalidChipSelect { cs, num_cs } => {
                write!(
                    f,
                    "chip-select {} is not wired (controller has {} chip-selects)",
                    cs, num_cs
                )
            }
            Self::ChipSelectInUse { cs } => {
                write!(f, "a flash device is already attached to CS{}", cs)
            }
            Self::StateMismatch { expected, found } => {
                write!(
                    f,
                    "saved state has {} registers, expected {}",
                    found, expected
                )
            }
            Self::VariantMismatch => write!(f, "saved state belongs to another controller"),
            Self::AddressOutOfBounds { addr, len } => {
                write!(f, "access of {} bytes at 0x{:08X} is out of bounds", len, addr)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
