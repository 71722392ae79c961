// src/cli/handlers/install.rs

use anyhow::Result;
use clap::Parser;

use crate::{
    cli::{GlobalArgs, args::DeployArgs, handlers::commons},
    constants::DEPLOYMENT_CLASS,
};

/// The main handler for the `install` command.
/// Validates the configured hosts and runs the deployment methods on each of them.
pub fn handle(args: Vec<String>, global: &GlobalArgs) -> Result<()> {
    let deploy_args = DeployArgs::try_parse_from(&args)?;
    let global = global.merged(&deploy_args.global);
    commons::deploy(&deploy_args, &global, DEPLOYMENT_CLASS)
}
