// src/cli/handlers/update.rs

use anyhow::Result;
use clap::Parser;

use crate::{
    cli::{GlobalArgs, args::DeployArgs, handlers::commons},
    constants::UPDATE_CLASS,
};

/// The main handler for the `update` command.
/// Same pass as `install`, running the update methods of an existing installation.
pub fn handle(args: Vec<String>, global: &GlobalArgs) -> Result<()> {
    let deploy_args = DeployArgs::try_parse_from(&args)?;
    let global = global.merged(&deploy_args.global);
    commons::deploy(&deploy_args, &global, UPDATE_CLASS)
}
