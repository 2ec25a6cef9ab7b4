//! Register dump command implementation

use std::fs;
use std::path::Path;

use smcemu_core::smc::regs::{
    ce_ctrl_4byte, conf_flash_type, conf_legacy_disabled, conf_write_enabled, ctrl_cmd,
    ctrl_ce_stop_active, CmdMode, R_SEG_ADDR0, SMC_R_MAX,
};
use smcemu_core::smc::{AspeedSmc, Segment, SmcState};

/// Run the regs command
pub fn run_regs(
    smc: &mut AspeedSmc,
    load: Option<&Path>,
    save: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = load {
        let state: SmcState = toml::from_str(&fs::read_to_string(path)?)?;
        smc.load_state(&state)?;
        log::info!("Restored register file from {:?}", path);
    }

    let variant = smc.variant();
    println!("{} ({} chip-selects)", variant.name, smc.num_cs());
    println!();

    for index in 0..SMC_R_MAX {
        let name = smc.reg_name(index);
        if name == "unknown" {
            continue;
        }
        let value = smc.read((index * 4) as u64, 4) as u32;
        println!("  0x{:02X}  {:<16} 0x{:08X}", index * 4, name, value);
    }

    let conf = smc.reg(variant.regs.conf);
    println!();
    println!(
        "Legacy mode:     {}",
        if conf_legacy_disabled(conf) {
            "disabled"
        } else {
            "enabled"
        }
    );

    for cs in 0..smc.num_cs() {
        let ctrl = smc.reg(variant.regs.ctrl0 + cs);
        let four_byte = variant
            .regs
            .ce_ctrl
            .is_some_and(|r| ce_ctrl_4byte(smc.reg(r), cs));
        println!(
            "CS{}: type {} mode {:?} cmd 0x{:02X} {} {}{}{}{}",
            cs,
            conf_flash_type(conf, cs),
            CmdMode::from_ctrl(ctrl),
            ctrl_cmd(ctrl),
            Segment::from_reg(smc.reg(R_SEG_ADDR0 + cs)),
            if ctrl_ce_stop_active(ctrl) {
                "deselected"
            } else {
                "selected"
            },
            if conf_write_enabled(conf, variant.conf_enable_w0, cs) {
                " write-enabled"
            } else {
                ""
            },
            if four_byte { " 4-byte" } else { "" },
            if smc.channel(cs).is_some_and(|ch| !ch.is_enabled()) {
                " unmapped"
            } else {
                ""
            },
        );
    }

    if let Some(path) = save {
        fs::write(path, toml::to_string(&smc.save_state())?)?;
        println!();
        println!("Saved register file to {:?}", path);
    }

    Ok(())
}
