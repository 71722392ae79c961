// src/cli/args.rs
use crate::cli::GlobalArgs;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // Important: the command name is not part of these args
pub struct ConfigureArgs {
    /// Assignments of the form `key.path=value`. Lists are comma separated.
    pub assignments: Vec<String>,

    /// Remove a key from the configuration.
    #[arg(long, value_name = "KEY")]
    pub unset: Vec<String>,

    /// Ask for every required value that is still missing.
    #[arg(long)]
    pub interactive: bool,

    /// Print the stored configuration after applying the changes.
    #[arg(long)]
    pub show: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct DeployArgs {
    /// Only deploy these hosts. Defaults to every configured host.
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Only run one group of deployment methods.
    #[arg(long, allow_negative_numbers = true)]
    pub group: Option<i32>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct QueryArgs {
    /// Keys to resolve, e.g. `home_directory` or `hosts.db1.hostname`.
    pub keys: Vec<String>,

    /// Resolve the keys as seen from this host.
    #[arg(long)]
    pub host: Option<String>,

    /// List every known key with its resolved value.
    #[arg(long, conflicts_with = "keys")]
    pub all: bool,

    /// Show the deployment methods in execution order.
    #[arg(long)]
    pub plan: bool,

    /// Print values as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct ValidateArgs {
    /// Only validate these hosts. Defaults to every configured host.
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// List the available checks and exit.
    #[arg(long)]
    pub list: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}
