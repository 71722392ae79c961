// src/cli/handlers/commons.rs

// Shared plumbing for the handlers: loading the configuration, building
// contexts and running the validate-then-deploy pass.

use anyhow::{Context as _, Result, anyhow};
use colored::Colorize;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    cli::{GlobalArgs, args::DeployArgs},
    core::{
        checks::default_checks,
        context::{Context, DeploymentOptions},
        deployment_steps::DeploymentSteps,
        paths,
        prompt_catalog::default_registry,
        scheduler::{DeploymentModule, DeploymentScheduler},
        validation::{CheckOverrides, CheckSelector, ValidationReport},
    },
    models::{MessageLevel, RunOutcome},
    state::ConfigSession,
    system::{executor::ShellExecutor, lock::InstallLock},
};

/// The modules every deployment pass is prepared with.
pub fn default_modules() -> Vec<Box<dyn DeploymentModule>> {
    vec![Box::new(DeploymentSteps)]
}

/// `--config`, expanded, or the default location.
pub fn config_path(global: &GlobalArgs) -> Result<PathBuf> {
    let path = match &global.config {
        Some(raw) => paths::expand_path(raw)?,
        None => paths::default_config_path()?,
    };
    Ok(path)
}

/// Opens the configuration file together with the per-user defaults.
pub fn open_session(global: &GlobalArgs) -> Result<ConfigSession> {
    let path = config_path(global)?;
    let defaults = match paths::user_defaults_path() {
        Ok(p) => Some(p),
        Err(e) => {
            log::debug!("No per-user defaults: {}", e);
            None
        }
    };
    ConfigSession::open(&path, defaults.as_deref(), global.allow_legacy_format)
        .with_context(|| format!(t!("commons.error.load_config"), path = path.display()))
}

pub fn deployment_options(global: &GlobalArgs) -> DeploymentOptions {
    DeploymentOptions {
        force: global.force,
        quiet: global.quiet,
        dry_run: global.dry_run,
        allow_legacy_format: global.allow_legacy_format,
    }
}

/// Parses `--skip-validation-check` and `--enable-validation-check`.
pub fn check_overrides(global: &GlobalArgs) -> Result<CheckOverrides> {
    let mut overrides = CheckOverrides::new();
    for raw in &global.skip_validation_check {
        overrides = overrides.skip(parse_selector(raw)?);
    }
    for raw in &global.enable_validation_check {
        overrides = overrides.enable(parse_selector(raw)?);
    }
    Ok(overrides)
}

fn parse_selector(raw: &str) -> Result<CheckSelector> {
    raw.parse::<CheckSelector>()
        .map_err(|reason| anyhow!(t!("commons.error.bad_selector"), selector = raw, reason = reason))
}

/// The base context for one invocation, without a host bound.
pub fn build_context(session: &ConfigSession, global: &GlobalArgs) -> Context {
    let executor = ShellExecutor::new().dry_run(global.dry_run).with_heartbeat(!global.quiet);
    let props = session.effective(Arc::new(default_registry()));
    Context::new(props, Arc::new(executor), deployment_options(global))
}

/// The hosts to work on: `requested`, or every configured host.
pub fn select_hosts(ctx: &Context, requested: &[String]) -> Result<Vec<String>> {
    let configured = ctx.hosts();
    if requested.is_empty() {
        return Ok(configured);
    }
    for host in requested {
        if !configured.contains(host) {
            return Err(anyhow!(t!("commons.error.unknown_host"), host = host));
        }
    }
    Ok(requested.to_vec())
}

/// Validates each host on its own context clone, in parallel.
///
/// The returned per-host reports keep the order of `hosts`.
pub fn validate_hosts(
    base: &Context,
    hosts: &[String],
    overrides: &CheckOverrides,
) -> Vec<(String, ValidationReport)> {
    let registry = default_checks();
    if hosts.is_empty() {
        let mut ctx = base.unbound();
        return vec![(String::new(), registry.run(&mut ctx, overrides))];
    }

    let contexts: Vec<(String, Context)> = hosts
        .iter()
        .map(|h| (h.clone(), base.for_host(h)))
        .collect();
    contexts
        .into_par_iter()
        .map(|(host, mut ctx)| {
            let report = registry.run(&mut ctx, overrides);
            (host, report)
        })
        .collect()
}

/// Prints a one-line verdict per host and returns the combined report.
pub fn summarize_validation(reports: Vec<(String, ValidationReport)>) -> ValidationReport {
    let mut combined = ValidationReport::default();
    for (host, report) in reports {
        let label = if host.is_empty() { "-".to_string() } else { host };
        if report.is_valid() {
            println!("  {} {}", "✔".green(), label.cyan());
        } else {
            println!(
                "  {} {} ({})",
                "✖".red(),
                label.cyan(),
                format!(t!("commons.validation.error_count"), count = report.error_count).red()
            );
        }
        combined.merge(report);
    }
    combined
}

/// Validation, then the `class_name` methods on every selected host.
///
/// Shared by `install` and `update`.
pub fn deploy(args: &DeployArgs, global: &GlobalArgs, class_name: &str) -> Result<()> {
    let session = open_session(global)?;
    if !session.exists() {
        return Err(anyhow!(
            t!("commons.error.no_config"),
            path = session.path().display()
        ));
    }

    let base = build_context(&session, global);
    let hosts = select_hosts(&base, &args.hosts)?;
    let overrides = check_overrides(global)?;

    println!("{}", t!("commons.validation.header").bold());
    let report = summarize_validation(validate_hosts(&base, &hosts, &overrides));
    if !report.is_valid() {
        if global.force {
            log::warn!("{}", t!("commons.validation.forced"));
        } else {
            return Err(anyhow!(
                t!("commons.error.validation_failed"),
                count = report.error_count
            ));
        }
    }

    let mut scheduler = DeploymentScheduler::new();
    scheduler.prepare(&default_modules())?;

    if global.dry_run {
        print_plan(&scheduler, class_name, &hosts, args.group);
        println!("{}", t!("commons.dry_run.done").yellow());
        return Ok(());
    }

    let _locks = lock_hosts(&base, &hosts)?;
    let mut outcomes: Vec<RunOutcome> = Vec::new();
    for host in &hosts {
        println!("{}", format!(t!("commons.deploy.host"), host = host).bold());
        let mut ctx = base.for_host(host);
        outcomes.push(scheduler.run(&mut ctx, class_name, args.group, None));
    }

    let failed: Vec<&RunOutcome> = outcomes.iter().filter(|o| !o.is_success()).collect();
    for outcome in &outcomes {
        let host = outcome.host.as_deref().unwrap_or("-");
        if outcome.is_success() {
            println!("  {} {}", "✔".green(), host.cyan());
        } else {
            println!(
                "  {} {} {}",
                "✖".red(),
                host.cyan(),
                outcome.failed_method.as_deref().unwrap_or_default().dimmed()
            );
        }
    }
    if !failed.is_empty() {
        return Err(anyhow!(t!("commons.error.deploy_failed"), count = failed.len()));
    }
    println!("{}", t!("commons.deploy.success").green());
    Ok(())
}

/// Locks the install root of every host before anything is changed. Locks
/// taken so far are released again if one host is already locked.
pub fn lock_hosts(base: &Context, hosts: &[String]) -> Result<Vec<InstallLock>> {
    let mut locks = Vec::with_capacity(hosts.len());
    for host in hosts {
        let ctx = base.for_host(host);
        let root = ctx
            .host_property_string("home_directory")?
            .ok_or_else(|| anyhow!(t!("deploy.error.no_home")))?;
        let (address, user) = ctx
            .host_login()?
            .ok_or_else(|| anyhow!(t!("deploy.error.no_host")))?;
        let root = PathBuf::from(root);
        locks.push(InstallLock::acquire(
            ctx.executor().clone(),
            &address,
            user.as_deref(),
            &root,
        )?);
    }
    Ok(locks)
}

/// Lists the methods a run would execute, in order.
pub fn print_plan(scheduler: &DeploymentScheduler, class_name: &str, hosts: &[String], group: Option<i32>) {
    println!("{}", format!(t!("commons.plan.header"), class_name = class_name).bold());
    for descriptor in scheduler.plan(class_name) {
        if group.is_some_and(|g| g != descriptor.group_id) {
            continue;
        }
        println!(
            "  {:>4} {:>4}  {}",
            descriptor.group_id.to_string().dimmed(),
            descriptor.weight.to_string().dimmed(),
            descriptor.name.cyan()
        );
    }
    if !hosts.is_empty() {
        println!("  {} {}", t!("commons.plan.hosts").yellow(), hosts.join(", "));
    }
}

/// The console prefix for a message level, colored the way the log output is.
pub fn colored_prefix(level: MessageLevel) -> colored::ColoredString {
    match level {
        MessageLevel::Error => level.prefix().red().bold(),
        MessageLevel::Warning => level.prefix().yellow().bold(),
        MessageLevel::Notice => level.prefix().green(),
        MessageLevel::Info => level.prefix().cyan(),
        MessageLevel::Debug => level.prefix().dimmed(),
    }
}
