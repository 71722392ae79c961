// src/cli/handlers/validate.rs

use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;

use crate::{
    cli::{GlobalArgs, args::ValidateArgs, handlers::commons},
    core::checks::default_checks,
};

/// The main handler for the `validate` command.
/// Runs every applicable check against each selected host without deploying.
pub fn handle(args: Vec<String>, global: &GlobalArgs) -> Result<()> {
    let validate_args = ValidateArgs::try_parse_from(&args)?;
    let global = global.merged(&validate_args.global);

    if validate_args.list {
        for name in default_checks().names() {
            println!("  {}", name.cyan());
        }
        return Ok(());
    }

    let session = commons::open_session(&global)?;
    let base = commons::build_context(&session, &global);
    let hosts = commons::select_hosts(&base, &validate_args.hosts)?;
    let overrides = commons::check_overrides(&global)?;

    println!("{}", t!("commons.validation.header").bold());
    let report = commons::summarize_validation(commons::validate_hosts(&base, &hosts, &overrides));

    if let Some(check) = &report.aborted_by {
        log::debug!("Validation stopped early by '{}'.", check);
    }
    if report.is_valid() {
        println!("{}", t!("validate.success").green());
        Ok(())
    } else if global.force {
        log::warn!("{}", t!("commons.validation.forced"));
        Ok(())
    } else {
        Err(anyhow!(
            t!("commons.error.validation_failed"),
            count = report.error_count
        ))
    }
}
