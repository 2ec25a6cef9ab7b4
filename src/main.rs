//! smcemu - ASPEED SMC/FMC/SPI flash controller emulator
//!
//! Runs the controller models of `smcemu-core` against in-memory flash
//! chips, on a board either built in (palmetto) or described in TOML.
//!
//! # Architecture
//!
//! - **smcemu-core** - the controllers: register file, flash channels,
//!   segment windows and the DMA engine
//! - **smcemu-dummy** - SPI NOR flash chips emulated in memory
//! - **board** - which controller has which chip on which chip-select
//!
//! Every command drives the controller the way firmware would, through its
//! registers and its flash window.

mod board;
mod cli;
mod commands;

use board::Board;
use clap::Parser;
use cli::{Cli, Commands, ControllerArgs};
use smcemu_core::smc::AspeedSmc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let board = match &cli.board {
        Some(path) => {
            let board = Board::from_toml_file(path)?;
            log::info!("Loaded board '{}' from {:?}", board.name, path);
            Some(board)
        }
        None => None,
    };

    match cli.command {
        Commands::List => {
            commands::list_variants();
            Ok(())
        }
        Commands::Regs {
            controller,
            load,
            save,
        } => {
            let (_, mut smc) = open_controller(board, &controller)?;
            commands::run_regs(&mut smc, load.as_deref(), save.as_deref())
        }
        Commands::Boot {
            controller,
            offset,
            length,
        } => {
            let (_, mut smc) = open_controller(board, &controller)?;
            commands::run_boot(&mut smc, offset, length)
        }
        Commands::Read {
            controller,
            cs,
            offset,
            length,
            output,
        } => {
            let (_, mut smc) = open_controller(board, &controller)?;
            commands::run_read(&mut smc, cs, offset, length, output.as_deref())
        }
        Commands::Dma {
            controller,
            offset,
            length,
            dram,
            checksum,
            output,
        } => {
            let (board, mut smc) = open_controller(board, &controller)?;
            let args = commands::DmaArgs {
                offset,
                length,
                dram,
                checksum,
                output,
            };
            commands::run_dma(&mut smc, board.sdram_size, &args)
        }
    }
}

/// Build the requested controller from the board
///
/// Without a board file, the palmetto board is used, or a board with just
/// the requested controller if palmetto does not have it.
fn open_controller(
    board: Option<Board>,
    args: &ControllerArgs,
) -> Result<(Board, AspeedSmc), Box<dyn std::error::Error>> {
    let board = match board {
        Some(board) => board,
        None => {
            let palmetto = Board::palmetto()?;
            if palmetto.controller(&args.controller).is_ok() {
                palmetto
            } else {
                Board::single(&args.controller)?
            }
        }
    };

    let smc = board.build(&args.controller)?;
    log::info!(
        "Using {} on board '{}' ({} chip-selects)",
        smc.variant().name,
        board.name,
        smc.num_cs()
    );
    Ok((board, smc))
}
