use clap::{Args, Parser};
use log::LevelFilter;

pub mod args;
pub mod dispatcher;
pub mod handlers;

/// Builds the color-aware help string at runtime.
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let template = t!("cli.help.template");

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let group = if use_colors { "\x1b[1;32m" } else { "" }; // Bold Green
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let formatted_string = template
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<group>", group)
        .replace("</group>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted_string.into_boxed_str())
}

/// tpm: configure, validate and deploy replication services across a fleet.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command and its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Flags accepted before the command and by every command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Show informational messages.
    #[arg(long, short = 'i')]
    pub info: bool,

    /// Show notices (the default).
    #[arg(long, short = 'n')]
    pub notice: bool,

    /// Only show warnings and errors.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Show everything, including debug output.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// The configuration file to use instead of the default `tungsten.cfg`.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<String>,

    /// Skip a validation check (`Class`) or one of its warnings (`Class:warning`).
    #[arg(long = "skip-validation-check", value_name = "CHECK", value_delimiter = ',')]
    pub skip_validation_check: Vec<String>,

    /// Run a validation check, or report an optional warning, that is off by default.
    #[arg(long = "enable-validation-check", value_name = "CHECK", value_delimiter = ',')]
    pub enable_validation_check: Vec<String>,

    /// Continue past validation errors.
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Validate and show the plan without changing any host.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Accept configuration files in the old `key=value` format.
    #[arg(long = "allow-legacy-format")]
    pub allow_legacy_format: bool,
}

impl GlobalArgs {
    /// Combines flags given before the command with those given after it.
    pub fn merged(&self, other: &GlobalArgs) -> GlobalArgs {
        let mut skip = self.skip_validation_check.clone();
        skip.extend(other.skip_validation_check.iter().cloned());
        let mut enable = self.enable_validation_check.clone();
        enable.extend(other.enable_validation_check.iter().cloned());

        GlobalArgs {
            info: self.info || other.info,
            notice: self.notice || other.notice,
            quiet: self.quiet || other.quiet,
            verbose: self.verbose || other.verbose,
            config: other.config.clone().or_else(|| self.config.clone()),
            skip_validation_check: skip,
            enable_validation_check: enable,
            force: self.force || other.force,
            dry_run: self.dry_run || other.dry_run,
            allow_legacy_format: self.allow_legacy_format || other.allow_legacy_format,
        }
    }

    /// The console level. The most verbose flag wins.
    pub fn level_filter(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Trace
        } else if self.info {
            LevelFilter::Debug
        } else if self.quiet && !self.notice {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_defaults_to_english() {
        if option_env!("TPM_LANG").is_none_or(|l| l == "en") {
            assert_eq!(env!("TPM_LANG_EFFECTIVE"), "en");
        }
        assert_eq!(t!("validate.success"), "All checks passed.");
    }

    #[test]
    fn test_flags_before_and_after_command() {
        let cli = Cli::try_parse_from(["tpm", "--quiet", "--config", "a.cfg", "install", "--force"]).unwrap();
        assert!(cli.global.quiet);
        assert_eq!(cli.global.config.as_deref(), Some("a.cfg"));
        assert_eq!(cli.args, vec!["install", "--force"]);
    }

    #[test]
    fn test_merge_and_levels() {
        let before = GlobalArgs {
            quiet: true,
            skip_validation_check: vec!["HostnameCheck".to_string()],
            ..GlobalArgs::default()
        };
        let after = GlobalArgs {
            force: true,
            skip_validation_check: vec!["SshLoginCheck".to_string()],
            ..GlobalArgs::default()
        };
        let merged = before.merged(&after);
        assert!(merged.quiet && merged.force);
        assert_eq!(merged.skip_validation_check.len(), 2);
        assert_eq!(merged.level_filter(), LevelFilter::Warn);

        let verbose = GlobalArgs {
            quiet: true,
            verbose: true,
            ..GlobalArgs::default()
        };
        assert_eq!(verbose.level_filter(), LevelFilter::Trace);
        assert_eq!(GlobalArgs::default().level_filter(), LevelFilter::Info);
    }
}
