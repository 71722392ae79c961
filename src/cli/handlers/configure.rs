// src/cli/handlers/configure.rs

use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use dialoguer::{Input, theme::ColorfulTheme};
use std::sync::Arc;

use crate::{
    cli::{GlobalArgs, args::ConfigureArgs, handlers::commons},
    core::{prompt_catalog::default_registry, prompts::PromptRegistry},
    models::PropertyKey,
    state::ConfigSession,
};

/// The main handler for the `configure` command.
///
/// Applies `key=value` assignments and `--unset` removals to the
/// configuration file, validating each value against its prompt.
pub fn handle(args: Vec<String>, global: &GlobalArgs) -> Result<()> {
    let configure_args = ConfigureArgs::try_parse_from(&args)?;
    let global = global.merged(&configure_args.global);

    let registry = Arc::new(default_registry());
    let mut session = commons::open_session(&global)?;

    for raw in &configure_args.unset {
        let key = PropertyKey::from(raw.as_str());
        if session.remove(&key).is_some() {
            println!("  {} {}", "-".red(), key.to_string().cyan());
        } else {
            log::warn!("{}", format!(t!("configure.warn.not_set"), key = key));
        }
    }

    for (key, value) in parse_assignments(&registry, &configure_args.assignments)? {
        println!("  {} {} = {}", "+".green(), key.to_string().cyan(), value);
        session.set(key, value);
    }

    if configure_args.interactive {
        ask_missing(&registry, &mut session)?;
    }

    if session.save()? {
        println!(
            "{}",
            format!(t!("configure.success.saved"), path = session.path().display()).green()
        );
    } else {
        println!("{}", t!("configure.info.unchanged").dimmed());
    }

    if configure_args.show {
        println!("{}", serde_json::to_string_pretty(session.props())?);
    }
    Ok(())
}

/// Parses and validates `key=value` pairs. Every pair is checked before
/// anything is applied.
fn parse_assignments(
    registry: &PromptRegistry,
    pairs: &[String],
) -> Result<Vec<(PropertyKey, serde_json::Value)>> {
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(anyhow!(t!("configure.error.invalid_pair"), pair = pair));
        };
        let key = PropertyKey::from(key.trim());
        if key.is_empty() {
            return Err(anyhow!(t!("configure.error.invalid_pair"), pair = pair));
        }
        let value = registry.validate_value(&key, raw)?;
        parsed.push((key, value));
    }
    Ok(parsed)
}

/// Prompts for every required value that does not resolve yet.
fn ask_missing(registry: &Arc<PromptRegistry>, session: &mut ConfigSession) -> Result<()> {
    loop {
        let effective = session.effective(registry.clone());
        let missing = registry.required_missing(&effective)?;
        let Some(next) = missing.into_iter().next() else {
            println!("{}", t!("configure.info.complete").green());
            return Ok(());
        };

        let help = registry
            .find_prompt(&next.key)
            .and_then(|p| p.help_text().map(str::to_string));
        if let Some(help) = help {
            println!("{}", help.dimmed());
        }

        let input: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{} ({})", next.label, next.key))
            .interact_text()?;

        match registry.validate_value(&next.key, &input) {
            Ok(value) => session.set(next.key, value),
            Err(e) => println!("{}", format!("Error: {}", e).red()),
        }
    }
}
