// src/core/prompt_catalog.rs

//! The built-in prompt tree shared by every command.
//!
//! DBMS-specific plugins extend this tree with their own groups; the catalog
//! only carries the generic topology, host and service parameters.

use crate::constants::{
    CONNECTORS, DATASERVICES, DEFAULT_INSTALL_ROOT, DEPLOYMENT_DATASERVICE, DEPLOYMENT_HOST,
    DEPLOYMENT_SERVICE, ENV_CONTINUENT_ROOT, HOSTS, MANAGERS, MANAGER_WAIT_TIMEOUT, REPL_SERVICES,
    SERVICE_WAIT_TIMEOUT,
};
use crate::core::properties::scalar_to_string;
use crate::core::prompts::{Prompt, PromptError, PromptGroup, PromptRegistry, PromptScope};
use crate::core::validators::Validator;
use serde_json::{Value, json};
use std::env;
use std::path::PathBuf;

/// Builds the registry used by the CLI.
pub fn default_registry() -> PromptRegistry {
    PromptRegistry::new(
        PromptGroup::root()
            .prompt(
                Prompt::new(DEPLOYMENT_HOST, "Host being deployed")
                    .validator(Validator::Hostname)
                    .default_with(|scope| {
                        let hosts = scope.props.member_aliases(HOSTS);
                        match hosts.as_slice() {
                            [only] => Ok(Some(json!(only))),
                            _ => Err(PromptError::Skip(
                                "more than one host is configured".to_string(),
                            )),
                        }
                    }),
            )
            .prompt(
                Prompt::new(DEPLOYMENT_DATASERVICE, "Dataservice being deployed")
                    .default_with(dataservice_of_current_host),
            )
            .prompt(
                Prompt::new(DEPLOYMENT_SERVICE, "Replication service being deployed")
                    .default_with(|scope| scope.get(DEPLOYMENT_DATASERVICE)),
            )
            .prompt(
                Prompt::new("home_directory", "Installation directory")
                    .validator(Validator::Filename)
                    .required()
                    .default_with(|_| {
                        let root = env::var(ENV_CONTINUENT_ROOT)
                            .unwrap_or_else(|_| DEFAULT_INSTALL_ROOT.to_string());
                        Ok(Some(json!(root)))
                    }),
            )
            .prompt(
                Prompt::new("userid", "System user")
                    .default_with(|_| Ok(env::var("USER").ok().map(Value::String))),
            )
            .prompt(
                Prompt::new("ssh_port", "SSH port")
                    .validator(Validator::Port)
                    .default_value(json!(22)),
            )
            .prompt(
                Prompt::new("start_services", "Start services after installation")
                    .validator(Validator::Boolean)
                    .default_value(json!(true)),
            )
            .prompt(
                Prompt::new("svc_start_command", "Command used to start services")
                    .default_with(|scope| {
                        let home = scope.get_string("home_directory")?;
                        Ok(home.map(|h| json!(format!("{}/tungsten/cluster-home/bin/startall", h))))
                    }),
            )
            .prompt(
                Prompt::new("svc_status_command", "Command used to check services")
                    .default_with(|scope| {
                        let home = scope.get_string("home_directory")?;
                        Ok(home.map(|h| json!(format!("{}/tungsten/cluster-home/bin/status", h))))
                    }),
            )
            .prompt(
                Prompt::new("svc_start_timeout", "Seconds to wait for services to start")
                    .validator(Validator::PositiveInteger)
                    .default_value(json!(SERVICE_WAIT_TIMEOUT.as_secs())),
            )
            .prompt(
                Prompt::new("manager_wait_timeout", "Seconds to wait for the manager")
                    .validator(Validator::PositiveInteger)
                    .default_value(json!(MANAGER_WAIT_TIMEOUT.as_secs())),
            )
            .prompt(
                Prompt::new("template_search_path", "Template directories")
                    .validator(Validator::List)
                    .default_with(|scope| {
                        let home = scope.get_string("home_directory")?;
                        Ok(home.map(|h| {
                            let path: PathBuf = [h.as_str(), "share", "templates"].iter().collect();
                            json!([path.to_string_lossy()])
                        }))
                    }),
            )
            .group(host_prompts())
            .group(dataservice_prompts())
            .group(replication_service_prompts())
            .group(manager_prompts())
            .group(connector_prompts()),
    )
}

fn host_prompts() -> PromptGroup {
    PromptGroup::members("hosts", &[HOSTS])
        .prompt(
            Prompt::new("hostname", "Network host name")
                .validator(Validator::Hostname)
                .required()
                .default_with(|scope| Ok(scope.member.map(|m| json!(m)))),
        )
        .prompt(Prompt::new("userid", "System user").default_with(|scope| scope.get("userid")))
        .prompt(
            Prompt::new("home_directory", "Installation directory")
                .validator(Validator::Filename)
                .default_with(|scope| scope.get("home_directory")),
        )
        .prompt(
            Prompt::new("ssh_port", "SSH port")
                .validator(Validator::Port)
                .default_with(|scope| scope.get("ssh_port")),
        )
        .prompt(
            Prompt::new("datasource_type", "Database type")
                .validator(Validator::one_of(
                    &["mysql", "postgresql", "oracle", "none"],
                    "a supported database type",
                ))
                .default_value(json!("mysql")),
        )
        .prompt(
            Prompt::new("host_os", "Operating system")
                .help("Detected with `uname -s` on the host.")
                .default_with(detect_host_os),
        )
}

fn dataservice_prompts() -> PromptGroup {
    PromptGroup::members("dataservices", &[DATASERVICES])
        .prompt(
            Prompt::new("members", "Dataservice members")
                .validator(Validator::List)
                .required(),
        )
        .prompt(
            Prompt::new("master", "Dataservice master")
                .validator(Validator::Hostname)
                .default_with(|scope| {
                    let members = scope.sibling("members")?;
                    Ok(first_of(members))
                }),
        )
        .prompt(
            Prompt::new("connectors", "Connector hosts")
                .validator(Validator::List)
                .default_with(|scope| scope.sibling("members")),
        )
        .prompt(
            Prompt::new("topology", "Dataservice topology")
                .validator(Validator::one_of(
                    &["clustered", "master-slave", "direct"],
                    "a supported topology",
                ))
                .default_value(json!("clustered")),
        )
}

fn replication_service_prompts() -> PromptGroup {
    PromptGroup::members("replication services", &[REPL_SERVICES])
        .prompt(
            Prompt::new("thl_port", "THL listener port")
                .validator(Validator::Port)
                .default_value(json!(2112)),
        )
        .prompt(
            Prompt::new("repl_role", "Replicator role")
                .validator(Validator::one_of(&["master", "slave"], "master or slave"))
                .default_with(|scope| {
                    let host = scope.get_string(DEPLOYMENT_HOST)?;
                    let ds = scope.get_string(DEPLOYMENT_DATASERVICE)?;
                    let (Some(host), Some(ds)) = (host, ds) else {
                        return Err(PromptError::Skip("no deployment host".to_string()));
                    };
                    let master = scope.get_string([DATASERVICES, ds.as_str(), "master"])?;
                    let role = if master.as_deref() == Some(host.as_str()) {
                        "master"
                    } else {
                        "slave"
                    };
                    Ok(Some(json!(role)))
                }),
        )
}

fn manager_prompts() -> PromptGroup {
    PromptGroup::members("managers", &[MANAGERS])
        .enabled_when(|scope| topology_of_current_dataservice(scope).as_deref() == Some("clustered"))
        .prompt(
            Prompt::new("manager_port", "Manager listener port")
                .validator(Validator::Port)
                .default_value(json!(7800)),
        )
}

fn connector_prompts() -> PromptGroup {
    PromptGroup::members("connectors", &[CONNECTORS])
        .enabled_when(|scope| topology_of_current_dataservice(scope).as_deref() != Some("direct"))
        .prompt(
            Prompt::new("connector_listen_port", "Connector listener port")
                .validator(Validator::Port)
                .default_value(json!(3306)),
        )
}

fn topology_of_current_dataservice(scope: &PromptScope<'_>) -> Option<String> {
    let ds = scope.get_string(DEPLOYMENT_DATASERVICE).ok().flatten()?;
    scope
        .get_string([DATASERVICES, ds.as_str(), "topology"])
        .ok()
        .flatten()
}

fn dataservice_of_current_host(scope: &PromptScope<'_>) -> Result<Option<Value>, PromptError> {
    let Some(host) = scope.get_string(DEPLOYMENT_HOST)? else {
        return Ok(None);
    };
    for ds in scope.props.member_aliases(DATASERVICES) {
        let members = scope.get([DATASERVICES, ds.as_str(), "members"])?;
        let contains = members
            .as_ref()
            .and_then(Value::as_array)
            .is_some_and(|m| m.iter().any(|v| v.as_str() == Some(host.as_str())));
        if contains {
            return Ok(Some(json!(ds)));
        }
    }
    Ok(None)
}

fn detect_host_os(scope: &PromptScope<'_>) -> Result<Option<Value>, PromptError> {
    let Some(executor) = scope.props.executor() else {
        return Err(PromptError::Skip("no executor attached".to_string()));
    };
    let Some(host) = scope.member else {
        return Ok(None);
    };
    let hostname = scope.sibling("hostname")?.as_ref().and_then(scalar_to_string);
    let user = scope.sibling("userid")?.as_ref().and_then(scalar_to_string);
    let target = hostname.unwrap_or_else(|| host.to_string());

    match executor.query_remote("uname -s", &target, user.as_deref()) {
        Ok(output) => Ok(Some(json!(output.trim()))),
        Err(e) => Err(PromptError::Skip(format!("unable to query {}: {}", target, e))),
    }
}

fn first_of(value: Option<Value>) -> Option<Value> {
    match value {
        Some(Value::Array(items)) => items.into_iter().next(),
        other => other,
    }
}
