use anyhow::{Result, anyhow};

use crate::cli::{GlobalArgs, handlers};

/// Defines a command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &GlobalArgs) -> Result<()>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "configure",
        aliases: &["config", "set"],
        handler: handlers::configure::handle,
    },
    CommandDefinition {
        name: "install",
        aliases: &["deploy"],
        handler: handlers::install::handle,
    },
    CommandDefinition {
        name: "update",
        aliases: &["upgrade"],
        handler: handlers::update::handle,
    },
    CommandDefinition {
        name: "query",
        aliases: &["get"],
        handler: handlers::query::handle,
    },
    CommandDefinition {
        name: "validate",
        aliases: &["check"],
        handler: handlers::validate::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Names of every registered command, in registry order.
pub fn command_names() -> Vec<&'static str> {
    COMMAND_REGISTRY.iter().map(|cmd| cmd.name).collect()
}

/// Routes `tpm <command> [args...]` to its handler.
pub fn dispatch(all_args: Vec<String>, global: &GlobalArgs) -> Result<()> {
    log::debug!("Dispatching args: {:?}", all_args);

    let Some((command, rest)) = all_args.split_first() else {
        return Err(anyhow!(
            t!("dispatch.error.no_command"),
            commands = command_names().join(", ")
        ));
    };

    let Some(definition) = find_command(command) else {
        return Err(anyhow!(
            t!("dispatch.error.unknown_command"),
            command = command,
            commands = command_names().join(", ")
        ));
    };

    (definition.handler)(rest.to_vec(), global)
}
