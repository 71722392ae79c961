// src/core/deployment_steps.rs

//! The deployment and update methods every installation runs.

use crate::constants::{
    AFTER_STEP_EVENT, BEFORE_STEP_EVENT, CONFIG_DIR, DEPLOYMENT_CLASS, DEPLOYMENT_DATASERVICE,
    DEPLOYMENT_HOST, DEPLOYMENT_SERVICE, MANAGER_WAIT_TIMEOUT, SERVICE_CONFIG_FILENAME,
    SERVICE_WAIT_TIMEOUT, UPDATE_CLASS, WAIT_RETRY_INTERVAL,
};
use crate::core::context::Context;
use crate::core::events::EventBus;
use crate::core::scheduler::{DeploymentModule, MethodRegistration, ModuleError};
use crate::core::template;
use crate::models::{MethodDescriptor, ParallelMode};
use crate::system::executor::wait_for;
use anyhow::{Context as _, Result, anyhow};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Subdirectories created under the install root.
const INSTALL_DIRS: &[&str] = &[CONFIG_DIR, "service_logs", "share", "releases"];

/// Directories, configuration, templates and service start-up.
#[derive(Debug, Default)]
pub struct DeploymentSteps;

impl DeploymentModule for DeploymentSteps {
    fn name(&self) -> &str {
        "deployment_steps"
    }

    fn methods(&self) -> Result<Vec<MethodRegistration>, ModuleError> {
        let mut methods = vec![
            MethodRegistration::new(
                DEPLOYMENT_CLASS,
                MethodDescriptor::new("create_directories", -10, 0),
                create_directories,
            ),
        ];
        for class_name in [DEPLOYMENT_CLASS, UPDATE_CLASS] {
            methods.extend([
                MethodRegistration::new(
                    class_name,
                    MethodDescriptor::new("write_deploy_config", 0, 0).parallel(ParallelMode::ByService),
                    write_deploy_config,
                ),
                MethodRegistration::new(
                    class_name,
                    MethodDescriptor::new("render_templates", 0, 10),
                    render_templates,
                ),
                MethodRegistration::new(
                    class_name,
                    MethodDescriptor::new("start_services", 10, 0),
                    start_services,
                ),
                MethodRegistration::new(
                    class_name,
                    MethodDescriptor::new("wait_for_services", 10, 10),
                    wait_for_services,
                ),
            ]);
        }
        Ok(methods)
    }

    fn register_listeners(&self, events: &mut EventBus) {
        events.listen(BEFORE_STEP_EVENT, |ctx, payload| {
            if let Some(method) = &payload.method {
                ctx.messages.debug(format!(t!("deploy.step.start"), method = method));
            }
            Ok(())
        });
        events.listen(AFTER_STEP_EVENT, |ctx, payload| {
            if let Some(method) = &payload.method {
                ctx.messages.debug(format!(t!("deploy.step.done"), method = method));
            }
            Ok(())
        });
        for class_name in [DEPLOYMENT_CLASS, UPDATE_CLASS] {
            events.listen(format!("after_{}", class_name), |ctx, payload| {
                ctx.messages.notice(format!(t!("deploy.class.done"), class_name = payload.class_name));
                Ok(())
            });
        }
    }
}

// --- HELPERS ---

fn install_root(ctx: &Context) -> Result<PathBuf> {
    ctx.host_property_string("home_directory")?
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!(t!("deploy.error.no_home")))
}

fn login(ctx: &Context) -> Result<(String, Option<String>)> {
    ctx.host_login()?
        .ok_or_else(|| anyhow!(t!("deploy.error.no_host")))
}

fn quote(path: &str) -> Result<String> {
    Ok(shlex::try_quote(path)?.into_owned())
}

fn timeout_setting(ctx: &Context, key: &str, default: Duration) -> Result<Duration> {
    let seconds = ctx
        .host_property(key)?
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));
    Ok(seconds.map(Duration::from_secs).unwrap_or(default))
}

/// Writes `content` to `path` on the current host. The content is sent on
/// stdin and never interpreted by the remote shell.
fn upload(ctx: &Context, path: &str, content: &str) -> Result<()> {
    let (address, user) = login(ctx)?;
    let dir = PathBuf::from(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let command = format!("mkdir -p {} && cat > {}", quote(&dir)?, quote(path)?);
    ctx.executor()
        .run_remote_with_input(&command, content, &address, user.as_deref())
        .with_context(|| format!(t!("deploy.error.upload"), path = path, host = address))?;
    Ok(())
}

fn start_enabled(ctx: &Context) -> Result<bool> {
    Ok(match ctx.host_property("start_services")? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s == "true",
        _ => true,
    })
}

// --- STEPS ---

fn create_directories(ctx: &mut Context) -> Result<()> {
    let root = install_root(ctx)?;
    let (address, user) = login(ctx)?;

    let mut dirs = vec![quote(&root.to_string_lossy())?];
    for sub in INSTALL_DIRS {
        dirs.push(quote(&root.join(sub).to_string_lossy())?);
    }
    ctx.executor()
        .run_remote(&format!("mkdir -p {}", dirs.join(" ")), &address, user.as_deref())?;
    ctx.messages
        .info(format!(t!("deploy.dirs.created"), root = root.display()));
    Ok(())
}

/// Stores the configuration with the host, dataservice and service markers
/// made concrete, so the services read their own view of it.
fn write_deploy_config(ctx: &mut Context) -> Result<()> {
    let root = install_root(ctx)?;
    let mut service_config = ctx.config.clone();
    for marker in [DEPLOYMENT_HOST, DEPLOYMENT_DATASERVICE, DEPLOYMENT_SERVICE] {
        if let Some(value) = ctx.config.get_resolved(marker)? {
            service_config.set(marker, value);
        }
    }
    let content = serde_json::to_string_pretty(service_config.props())?;

    let path = root.join(CONFIG_DIR).join(SERVICE_CONFIG_FILENAME);
    upload(ctx, &path.to_string_lossy(), &content)?;
    ctx.set_additional_property("deploy_config", Value::String(path.to_string_lossy().into_owned()));
    ctx.messages
        .info(format!(t!("deploy.config.written"), path = path.display()));
    Ok(())
}

fn render_templates(ctx: &mut Context) -> Result<()> {
    let root = install_root(ctx)?;
    let search_path: Vec<PathBuf> = match ctx.host_property("template_search_path")? {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| PathBuf::from(shellexpand::tilde(s).as_ref()))
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| PathBuf::from(shellexpand::tilde(p.trim()).as_ref()))
            .collect(),
        _ => Vec::new(),
    };

    let templates = template::discover(&search_path)?;
    if templates.is_empty() {
        ctx.messages.info(t!("deploy.templates.none"));
        return Ok(());
    }

    for file in &templates {
        let rendered = template::render_file(&file.source, &ctx.config)?;
        let target = root.join(&file.target);
        upload(ctx, &target.to_string_lossy(), &rendered)?;
        log::debug!("Rendered '{}' to '{}'.", file.source.display(), target.display());
    }
    ctx.messages
        .info(format!(t!("deploy.templates.rendered"), count = templates.len()));
    Ok(())
}

fn start_services(ctx: &mut Context) -> Result<()> {
    if !start_enabled(ctx)? {
        ctx.messages.notice(t!("deploy.services.not_started"));
        return Ok(());
    }
    let Some(command) = ctx.host_property_string("svc_start_command")? else {
        return Err(anyhow!(t!("deploy.error.no_start_command")));
    };
    let (address, user) = login(ctx)?;
    let timeout = timeout_setting(ctx, "svc_start_timeout", SERVICE_WAIT_TIMEOUT)?;

    ctx.executor()
        .run_remote_with_timeout(&command, &address, user.as_deref(), timeout)?;
    ctx.messages.notice(t!("deploy.services.started"));
    Ok(())
}

fn wait_for_services(ctx: &mut Context) -> Result<()> {
    if !start_enabled(ctx)? {
        return Ok(());
    }
    let Some(command) = ctx.host_property_string("svc_status_command")? else {
        return Ok(());
    };
    let (address, user) = login(ctx)?;
    let timeout = timeout_setting(ctx, "manager_wait_timeout", MANAGER_WAIT_TIMEOUT)?;

    let executor = ctx.executor().clone();
    wait_for("services", &address, timeout, WAIT_RETRY_INTERVAL, |remaining| {
        executor
            .query_remote_with_timeout(&command, &address, user.as_deref(), remaining)
            .map(|_| true)
    })?;
    ctx.messages.info(t!("deploy.services.online"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::test_support::*;
    use crate::core::scheduler::DeploymentScheduler;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;

    fn prepared() -> DeploymentScheduler {
        let modules: Vec<Box<dyn DeploymentModule>> = vec![Box::new(DeploymentSteps)];
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        scheduler
    }

    #[test]
    fn test_method_plan() {
        let scheduler = prepared();
        let names: Vec<_> = scheduler
            .plan(DEPLOYMENT_CLASS)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "create_directories",
                "write_deploy_config",
                "render_templates",
                "start_services",
                "wait_for_services"
            ]
        );
        assert_eq!(scheduler.group_ids(UPDATE_CLASS), vec![0, 10]);
    }

    #[test]
    fn test_full_deployment_against_recording_executor() {
        let templates = tempfile::tempdir().unwrap();
        fs::create_dir_all(templates.path().join("conf")).unwrap();
        fs::write(
            templates.path().join("conf/replicator.properties.tpl"),
            "role=@{repl_role}\nport=@{thl_port}\n",
        )
        .unwrap();

        let executor = Arc::new(RecordingExecutor::default());
        let config = json!({
            "home_directory": "/opt/continuent",
            "svc_start_timeout": 5,
            "manager_wait_timeout": 5,
            "template_search_path": [templates.path().to_string_lossy()],
            "hosts": { "db1": { "hostname": "db1.example.com", "userid": "tungsten" } },
            "dataservices": { "alpha": { "members": ["db1"] } }
        });
        let base = context_with(config, executor.clone());
        let mut ctx = base.for_host("db1");

        let mut scheduler = prepared();
        let outcome = scheduler.run(&mut ctx, DEPLOYMENT_CLASS, None, None);
        assert!(outcome.is_success(), "{:?}", outcome.errors);
        assert_eq!(outcome.executed.len(), 5);

        let commands = executor.recorded();
        assert!(commands.iter().all(|(host, _)| host == "db1.example.com"));
        assert!(commands[0].1.starts_with("mkdir -p /opt/continuent /opt/continuent/conf"));

        let config_upload = commands
            .iter()
            .find(|(_, c)| c.contains("deploy.cfg"))
            .unwrap();
        assert!(config_upload.1.contains("\"deployment_dataservice\": \"alpha\""));

        let template_upload = commands
            .iter()
            .find(|(_, c)| c.contains("replicator.properties"))
            .unwrap();
        assert!(template_upload.1.contains("role=master\nport=2112\n"));
        assert!(commands.iter().any(|(_, c)| c.ends_with("cluster-home/bin/startall")));
        assert_eq!(
            ctx.additional_property("deploy_config"),
            Some(&json!("/opt/continuent/conf/deploy.cfg"))
        );
    }

    #[test]
    fn test_disabled_start_skips_commands() {
        let executor = Arc::new(RecordingExecutor::default());
        let config = json!({
            "home_directory": "/opt/continuent",
            "start_services": false,
            "template_search_path": [],
            "hosts": { "db1": {} },
            "dataservices": { "alpha": { "members": ["db1"] } }
        });
        let mut ctx = context_with(config, executor.clone()).for_host("db1");
        let mut scheduler = prepared();
        let outcome = scheduler.run(&mut ctx, DEPLOYMENT_CLASS, Some(10), None);
        assert!(outcome.is_success());
        assert!(executor.recorded().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_upload_writes_content_verbatim() {
        use crate::core::context::DeploymentOptions;
        use crate::core::properties::Properties;
        use crate::system::executor::ShellExecutor;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("conf").join("replicator.properties");
        let stray = dir.path().join("injected");
        let content = format!(
            "line one\nTPM_EOF\necho injected > {}\nline four",
            stray.display()
        );

        let config = json!({ "hosts": { "db1": { "hostname": "localhost" } } });
        let ctx = Context::new(
            Properties::from_value(config),
            Arc::new(ShellExecutor::new()),
            DeploymentOptions::default(),
        )
        .for_host("db1");

        upload(&ctx, &target.to_string_lossy(), &content).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), content);
        assert!(!stray.exists());
    }

    #[test]
    fn test_remote_failure_fails_the_run() {
        let executor = Arc::new(RecordingExecutor::with_responses(vec![("mkdir", Err(1))]));
        let config = json!({
            "hosts": { "db1": {} },
            "dataservices": { "alpha": { "members": ["db1"] } }
        });
        let mut ctx = context_with(config, executor).for_host("db1");
        let mut scheduler = prepared();
        let outcome = scheduler.run(&mut ctx, DEPLOYMENT_CLASS, None, None);
        assert!(!outcome.is_success());
        assert_eq!(outcome.failed_method.as_deref(), Some("create_directories"));
        assert!(outcome.executed.is_empty());
    }
}
