//! List command implementation

use smcemu_core::smc::VARIANTS;

use super::format_size;

/// List all controller variants
pub fn list_variants() {
    println!("Controller variants:");
    println!();
    println!(
        "{:<24} {:>6} {:>25} {:>5}",
        "Name", "Slaves", "Flash window", "DMA"
    );
    println!("{}", "-".repeat(63));

    for v in VARIANTS {
        let window = format!(
            "0x{:08X} ({})",
            v.flash_window_base,
            format_size(v.flash_window_size as u64)
        );
        println!(
            "{:<24} {:>6} {:>25} {:>5}",
            v.name,
            v.max_slaves,
            window,
            if v.has_dma { "yes" } else { "no" }
        );
        for (cs, seg) in v.segments.iter().enumerate() {
            if seg.size == 0 {
                println!("    CS{}  unmapped", cs);
            } else {
                println!("    CS{}  {} {}", cs, seg, format_size(seg.size as u64));
            }
        }
    }
}
