// src/cli/handlers/query.rs

use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use serde_json::{Map, Value};

use crate::{
    cli::{GlobalArgs, args::QueryArgs, handlers::commons},
    constants::{DEPLOYMENT_CLASS, UPDATE_CLASS},
    core::{context::Context, properties::scalar_to_string, scheduler::DeploymentScheduler},
    models::PropertyKey,
};

/// The main handler for the `query` command.
/// Prints resolved configuration values, or the deployment plan.
pub fn handle(args: Vec<String>, global: &GlobalArgs) -> Result<()> {
    let query_args = QueryArgs::try_parse_from(&args)?;
    let global = global.merged(&query_args.global);

    if query_args.plan {
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&commons::default_modules())?;
        for class_name in [DEPLOYMENT_CLASS, UPDATE_CLASS] {
            commons::print_plan(&scheduler, class_name, &[], None);
        }
        if query_args.keys.is_empty() && !query_args.all {
            return Ok(());
        }
    }

    let session = commons::open_session(&global)?;
    let base = commons::build_context(&session, &global);
    let ctx = match &query_args.host {
        Some(host) => {
            commons::select_hosts(&base, std::slice::from_ref(host))?;
            base.for_host(host)
        }
        None => base,
    };

    let keys: Vec<PropertyKey> = if query_args.all {
        ctx.config
            .prompts()
            .map(|registry| registry.concrete_keys(&ctx.config))
            .unwrap_or_default()
    } else if query_args.keys.is_empty() {
        return Err(anyhow!(t!("query.error.no_keys")));
    } else {
        query_args.keys.iter().map(|k| PropertyKey::from(k.as_str())).collect()
    };

    let values = resolve_all(&ctx, &keys)?;
    if query_args.json {
        let map: Map<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or(Value::Null)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&Value::Object(map))?);
        return Ok(());
    }

    let single = values.len() == 1 && !query_args.all;
    for (key, value) in values {
        let shown = match &value {
            Some(v) => scalar_to_string(v).unwrap_or_else(|| v.to_string()),
            None => String::new(),
        };
        if single {
            println!("{}", shown);
        } else if value.is_some() {
            println!("{:<40} {}", key.cyan(), shown);
        } else {
            println!("{:<40} {}", key.cyan(), t!("query.label.unset").dimmed());
        }
    }
    Ok(())
}

/// Resolves each key, keeping the requested order.
fn resolve_all(ctx: &Context, keys: &[PropertyKey]) -> Result<Vec<(String, Option<Value>)>> {
    keys.iter()
        .map(|key| Ok((key.to_string(), ctx.config.get_resolved(key)?)))
        .collect()
}
