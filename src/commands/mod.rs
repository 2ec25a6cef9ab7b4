//! CLI command implementations
//!
//! Every command builds the controllers it needs from the board
//! description and then talks to them the way firmware would: through the
//! register file and the flash window.

mod boot;
mod dma;
mod list;
mod read;
mod regs;

pub use boot::run_boot;
pub use dma::{run_dma, DmaArgs};
pub use list::list_variants;
pub use read::run_read;
pub use regs::run_regs;

/// Print `data` as a hexdump, addresses starting at `base`
pub fn hexdump(base: u32, data: &[u8]) {
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = line
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        println!(
            "{:08x}  {:<47}  |{}|",
            base as usize + i * 16,
            hex.join(" "),
            ascii
        );
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
