// src/bin/tpm.rs

use clap::Parser;
use colored::*;
use env_logger::Env;
use log::LevelFilter;
use std::io::Write;
use tpm::{
    cli::{Cli, dispatcher, handlers::commons},
    models::MessageLevel,
    system::interrupt,
};

/// Sets up console logging. Messages are printed with their level prefix;
/// `RUST_LOG` replaces the level chosen by the verbosity flags.
fn init_logging(level: LevelFilter) {
    let env = Env::default().default_filter_or(level.as_str());
    let mut builder = env_logger::Builder::from_env(env);
    builder.format(|buf, record| {
        let level = MessageLevel::from_log_level(record.level());
        writeln!(buf, "{} >> {}", commons::colored_prefix(level), record.args())
    });
    builder.init();
}

/// The main entry point of the `tpm` application.
/// It sets up logging, parses arguments, dispatches to the correct handler,
/// and performs centralized error handling.
fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    init_logging(cli.global.level_filter());
    if let Err(e) = interrupt::install_handler() {
        log::debug!("Could not install the interrupt handler: {}", e);
    }
    log::debug!("CLI args parsed: {:?}", cli);

    if let Err(e) = dispatcher::dispatch(cli.args, &cli.global) {
        // --- Centralized Error Handling ---
        // Argument errors of a command print their own usage or help.
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            clap_err.exit();
        }

        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
