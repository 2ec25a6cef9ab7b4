//! Read command implementation

use indicatif::{ProgressBar, ProgressStyle};
use smcemu_core::smc::regs::{ctrl_value, CmdMode};
use smcemu_core::smc::AspeedSmc;
use smcemu_core::spi::opcodes;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::hexdump;

/// Highest address reachable with 3 address bytes
const THREE_BYTE_LIMIT: u64 = 16 * 1024 * 1024;

/// Run the read command
pub fn run_read(
    smc: &mut AspeedSmc,
    cs: usize,
    offset: u32,
    length: u32,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if cs >= smc.num_cs() {
        return Err(format!("{}: CS{} is not wired", smc.variant().name, cs).into());
    }
    if !smc.has_flash(cs) {
        log::warn!("{}: no flash on CS{}, reading zeroes", smc.variant().name, cs);
    }

    let data = read_flash_with_progress(smc, cs, offset, length)?;

    match output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(&data)?;
            println!("Wrote {} bytes to {:?}", data.len(), path);
        }
        None => hexdump(offset, &data),
    }

    Ok(())
}

/// Read through user mode, the way firmware drives the controller
pub fn read_flash_with_progress(
    smc: &mut AspeedSmc,
    cs: usize,
    offset: u32,
    length: u32,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let variant = smc.variant();
    let window = smc
        .channel(cs)
        .map(|c| c.window())
        .ok_or_else(|| format!("{}: no channel for CS{}", variant.name, cs))?;
    if window.size == 0 {
        return Err(format!("{}: CS{} is not mapped", variant.name, cs).into());
    }
    // Any address in the window reaches the slave in user mode
    let win = (window.addr - variant.flash_window_base) as u64;

    let ctrl = ((variant.regs.ctrl0 + cs) * 4) as u64;
    let conf = (variant.regs.conf * 4) as u64;
    let user = |stop| ctrl_value(CmdMode::User, 0, stop) as u64;

    // Enable writes so the command can be sent
    let conf_value = smc.reg(variant.regs.conf) | 1 << (variant.conf_enable_w0 + cs as u32);
    smc.write(conf, conf_value as u64, 4);

    smc.write(ctrl, user(true), 4);
    smc.write(ctrl, user(false), 4);

    if offset as u64 + length as u64 > THREE_BYTE_LIMIT {
        smc.flash_write(win, opcodes::READ_4B as u64, 1);
        let addr = u32::from_le_bytes(offset.to_be_bytes());
        smc.flash_write(win, addr as u64, 4);
    } else {
        let a = offset.to_be_bytes();
        let frame = u32::from_le_bytes([opcodes::READ, a[1], a[2], a[3]]);
        smc.flash_write(win, frame as u64, 4);
    }

    let pb = ProgressBar::new(length as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let mut data = Vec::with_capacity(length as usize);
    while data.len() < length as usize {
        let size = std::cmp::min(4, length as usize - data.len());
        let word = smc.flash_read(win, size);
        data.extend_from_slice(&word.to_le_bytes()[..size]);
        pb.set_position(data.len() as u64);
    }

    // Back to read mode and ROM decode
    smc.write(ctrl, user(true), 4);
    smc.write(ctrl, ctrl_value(CmdMode::Read, 0, true) as u64, 4);

    pb.finish_with_message("Read complete");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smcemu_core::smc::variant::AST2400_FMC;
    use smcemu_dummy::{DummyFlash, N25Q256A};

    #[test]
    fn test_user_mode_read_matches_image() {
        let mut image = vec![0u8; 0x0100_0010];
        image[0x100..0x104].copy_from_slice(b"uboo");
        image[0x0100_0000..0x0100_0004].copy_from_slice(b"high");

        let mut smc = AspeedSmc::new(&AST2400_FMC, 1);
        smc.attach_flash(0, Box::new(DummyFlash::with_data(N25Q256A, &image)))
            .unwrap();

        let data = read_flash_with_progress(&mut smc, 0, 0x101, 3).unwrap();
        assert_eq!(data, b"boo");

        let data = read_flash_with_progress(&mut smc, 0, 0x0100_0000, 4).unwrap();
        assert_eq!(data, b"high");

        // left in ROM decode
        assert!(smc.channel(0).unwrap().is_rom_decode());
        assert_eq!(smc.cs_level(0), Some(true));
    }
}
