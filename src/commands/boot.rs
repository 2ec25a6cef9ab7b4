//! Boot fetch command implementation

use smcemu_core::smc::AspeedSmc;

use super::hexdump;

/// Run the boot command
///
/// Fetches `length` bytes at `offset` in the flash window the way a CPU
/// does right after reset, without touching the controller registers.
pub fn run_boot(
    smc: &mut AspeedSmc,
    offset: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let variant = smc.variant();
    let base = variant.flash_window_base;

    let mut data = Vec::with_capacity(length as usize);
    let end = offset.saturating_add(length);
    let mut addr = offset;
    while addr < end {
        let size = std::cmp::min(4, end - addr) as usize;
        let word = smc.flash_read(addr as u64, size);
        data.extend_from_slice(&word.to_le_bytes()[..size]);
        addr += size as u32;
    }

    match smc.channels().iter().find(|c| c.window().contains(base as u64 + offset as u64)) {
        Some(ch) => println!(
            "{}: CS{} {} ({})",
            variant.name,
            ch.id(),
            ch.window(),
            if ch.is_rom_decode() {
                "ROM decode"
            } else {
                "command mode"
            }
        ),
        None => log::warn!("{}: offset 0x{:x} is not mapped", variant.name, offset),
    }

    hexdump(base.wrapping_add(offset), &data);
    Ok(())
}
