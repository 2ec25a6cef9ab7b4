//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "smcemu")]
#[command(author, version, about = "ASPEED SMC/FMC/SPI flash controller emulator", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board description (TOML format)
    /// Defaults to a palmetto-like board with an FMC and a SPI controller
    #[arg(short, long, global = true)]
    pub board: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Controller selection shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Controller to use (e.g. "fmc", "spi", "aspeed.smc.ast2500-fmc")
    #[arg(short, long, default_value = "fmc")]
    pub controller: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List controller variants and their defaults
    List,

    /// Dump the controller registers after reset
    Regs {
        #[command(flatten)]
        controller: ControllerArgs,

        /// Restore a saved register file before dumping
        #[arg(long)]
        load: Option<PathBuf>,

        /// Save the register file (TOML format)
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Show what firmware fetches at boot through ROM decode
    Boot {
        #[command(flatten)]
        controller: ControllerArgs,

        /// Offset in the flash window (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        offset: u32,

        /// Number of bytes to show (hex or decimal)
        #[arg(short, long, default_value = "64", value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Read flash through user mode command framing
    Read {
        #[command(flatten)]
        controller: ControllerArgs,

        /// Chip-select to read from
        #[arg(long, default_value = "0")]
        cs: usize,

        /// Offset in the flash (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        offset: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Output file path (hexdump to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a DMA transfer from flash to DRAM, or a checksum
    Dma {
        #[command(flatten)]
        controller: ControllerArgs,

        /// Offset in the flash window (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        offset: u32,

        /// Number of bytes, multiple of 4 (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Offset in DRAM (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        dram: u32,

        /// Compute a checksum instead of copying
        #[arg(long)]
        checksum: bool,

        /// Write the DRAM destination to a file
        #[arg(short, long, conflicts_with = "checksum")]
        output: Option<PathBuf>,
    },
}
