//! DMA command implementation

use indicatif::{ProgressBar, ProgressStyle};
use smcemu_core::memory::Ram;
use smcemu_core::smc::regs::{
    dma_length, DmaCtrl, IntrCtrl, R_DMA_CTRL, R_DMA_DRAM_ADDR, R_DMA_FLASH_ADDR, R_DMA_LEN,
    R_INTR_CTRL,
};
use smcemu_core::smc::{AspeedSmc, DmaPoll, DMA_QUANTUM};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Parameters of a DMA run
#[derive(Debug, Clone)]
pub struct DmaArgs {
    /// Offset in the flash window
    pub offset: u32,
    /// Bytes to move
    pub length: u32,
    /// Offset in DRAM
    pub dram: u32,
    /// Checksum instead of copy
    pub checksum: bool,
    /// Where to save the DRAM destination
    pub output: Option<PathBuf>,
}

/// Run the dma command
pub fn run_dma(
    smc: &mut AspeedSmc,
    sdram_size: u32,
    args: &DmaArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let variant = smc.variant();
    if !variant.has_dma {
        return Err(format!("{} has no DMA engine", variant.name).into());
    }
    if args.length < DMA_QUANTUM || args.length % DMA_QUANTUM != 0 {
        return Err(format!("DMA length must be a non-zero multiple of {}", DMA_QUANTUM).into());
    }
    let max_length = dma_length(u32::MAX) + DMA_QUANTUM;
    if args.length > max_length {
        return Err(format!(
            "DMA length 0x{:x} exceeds the 0x{:x} bytes of the length register",
            args.length, max_length
        )
        .into());
    }
    if !args.checksum && args.dram as u64 + args.length as u64 > sdram_size as u64 {
        return Err(format!(
            "DRAM range 0x{:x}+0x{:x} exceeds the {} bytes of SDRAM",
            args.dram, args.length, sdram_size
        )
        .into());
    }

    let mut ram = Ram::new(smc.sdram_base() as u64, sdram_size as usize);

    smc.irq_mut()
        .connect(|level| log::debug!("DMA interrupt line {}", if level { "raised" } else { "lowered" }));

    let reg = |index: usize| (index * 4) as u64;
    smc.write(reg(R_INTR_CTRL), IntrCtrl::DMA_EN.bits() as u64, 4);
    smc.write(
        reg(R_DMA_FLASH_ADDR),
        variant.flash_window_base.wrapping_add(args.offset) as u64,
        4,
    );
    smc.write(reg(R_DMA_DRAM_ADDR), args.dram as u64, 4);
    // The length register counts from 4 bytes
    smc.write(reg(R_DMA_LEN), (args.length - DMA_QUANTUM) as u64, 4);

    let mut ctrl = DmaCtrl::ENABLE;
    if args.checksum {
        ctrl |= DmaCtrl::CKSUM;
    }
    smc.write(reg(R_DMA_CTRL), ctrl.bits() as u64, 4);

    let pb = ProgressBar::new(args.length as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let total = args.length as u64;
    let poll = smc.run_dma(&mut ram, |remaining| {
        pb.set_position(total.saturating_sub(remaining as u64));
    });

    if poll != DmaPoll::Completed {
        pb.abandon();
        return Err(format!("DMA did not complete: {:?}", poll).into());
    }
    pb.finish_with_message("DMA complete");

    if !smc.irq().level() {
        log::warn!("DMA completed without raising the interrupt");
    }

    if args.checksum {
        println!(
            "Checksum of 0x{:x} bytes at 0x{:08x}: 0x{:08x}",
            args.length,
            variant.flash_window_base.wrapping_add(args.offset),
            smc.read(0x90, 4)
        );
    } else {
        let start = args.dram as usize;
        let data = &ram.data()[start..start + args.length as usize];
        match &args.output {
            Some(path) => {
                let mut file = File::create(path)?;
                file.write_all(data)?;
                println!("Wrote {} bytes to {:?}", data.len(), path);
            }
            None => super::hexdump(smc.sdram_base().wrapping_add(args.dram), data),
        }
    }

    // Acknowledge, like a driver does from its interrupt handler
    smc.write(reg(R_DMA_CTRL), 0, 4);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smcemu_core::smc::variant::{AST2400_FMC, AST2400_SPI};
    use smcemu_dummy::{DummyFlash, N25Q256A};

    fn fmc() -> AspeedSmc {
        let image: Vec<u8> = (0..=255u8).collect();
        let mut smc = AspeedSmc::with_sdram_base(&AST2400_FMC, 1, 0x4000_0000);
        smc.attach_flash(0, Box::new(DummyFlash::with_data(N25Q256A, &image)))
            .unwrap();
        smc
    }

    fn args(output: Option<PathBuf>) -> DmaArgs {
        DmaArgs {
            offset: 0x10,
            length: 16,
            dram: 0x100,
            checksum: false,
            output,
        }
    }

    #[test]
    fn test_copy_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dram.bin");
        let mut smc = fmc();

        run_dma(&mut smc, 0x1000, &args(Some(path.clone()))).unwrap();

        let expected: Vec<u8> = (0x10..0x20).collect();
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        assert!(!smc.irq().level());
        assert_eq!(smc.read(0x8C, 4), 0);
    }

    #[test]
    fn test_rejected_requests() {
        let mut smc = fmc();
        let mut bad = args(None);
        bad.length = 6;
        assert!(run_dma(&mut smc, 0x1000, &bad).is_err());

        // longer than the length register can hold
        bad.length = 0x0200_0004;
        bad.checksum = true;
        assert!(run_dma(&mut smc, 0x1000, &bad).is_err());
        assert_eq!(smc.read(0x8C, 4), 0);

        // does not fit in DRAM
        assert!(run_dma(&mut smc, 0x100, &args(None)).is_err());

        let mut spi = AspeedSmc::new(&AST2400_SPI, 1);
        assert!(run_dma(&mut spi, 0x1000, &args(None)).is_err());
    }
}
