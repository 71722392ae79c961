// tests/deployment_pass.rs
//
// A full configure -> validate -> run pass through the public API, with every
// remote command answered by an in-memory executor.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tpm::cli::GlobalArgs;
use tpm::cli::handlers::{commons, configure};
use tpm::constants::{DEPLOYMENT_CLASS, UPDATE_CLASS};
use tpm::core::checks::default_checks;
use tpm::core::context::{Context, DeploymentOptions};
use tpm::core::prompt_catalog::default_registry;
use tpm::core::scheduler::DeploymentScheduler;
use tpm::core::validation::{CheckOverrides, CheckSelector};
use tpm::models::CommandOutput;
use tpm::state::ConfigSession;
use tpm::system::executor::{ExecutionError, ExecutionResult, RemoteExecutor};

#[derive(Default)]
struct FakeFleet {
    dry_run: bool,
    commands: Mutex<Vec<(String, String)>>,
}

impl FakeFleet {
    fn record(&self, host: &str, command: &str) {
        self.commands
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));
    }

    fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

impl RemoteExecutor for FakeFleet {
    fn run_local(&self, command: &str) -> ExecutionResult<CommandOutput> {
        self.record("local", command);
        Ok(CommandOutput::default())
    }

    fn run_remote(&self, command: &str, host: &str, _user: Option<&str>) -> ExecutionResult<String> {
        if self.dry_run {
            return Err(ExecutionError::NotAllowed {
                command: command.to_string(),
                host: host.to_string(),
            });
        }
        self.record(host, command);
        Ok(String::new())
    }

    fn run_remote_with_input(
        &self,
        command: &str,
        input: &str,
        host: &str,
        user: Option<&str>,
    ) -> ExecutionResult<String> {
        self.run_remote(&format!("{}\n{}", command, input), host, user)
    }

    fn run_remote_with_timeout(
        &self,
        command: &str,
        host: &str,
        user: Option<&str>,
        _timeout: Duration,
    ) -> ExecutionResult<String> {
        self.run_remote(command, host, user)
    }

    fn query_remote_with_timeout(
        &self,
        command: &str,
        host: &str,
        user: Option<&str>,
        _timeout: Duration,
    ) -> ExecutionResult<String> {
        self.query_remote(command, host, user)
    }

    fn query_remote(&self, command: &str, host: &str, _user: Option<&str>) -> ExecutionResult<String> {
        self.record(host, command);
        if command == "whoami" {
            Ok("tungsten\n".to_string())
        } else {
            Ok(String::new())
        }
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Writes a two-host configuration through the `configure` command.
fn configure_fleet(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("conf").join("tungsten.cfg");
    let templates = dir.join("templates");
    fs::create_dir_all(templates.join("conf")).unwrap();
    fs::write(
        templates.join("conf/replicator.properties.tpl"),
        "host=@{hosts.db1.hostname}\nrole=@{repl_role}\n",
    )
    .unwrap();

    let global = GlobalArgs {
        config: Some(path.to_string_lossy().into_owned()),
        ..GlobalArgs::default()
    };
    let assignments = [
        "home_directory=/opt/continuent".to_string(),
        "svc_start_timeout=5".to_string(),
        "manager_wait_timeout=5".to_string(),
        format!("template_search_path={}", templates.display()),
        "hosts.db1.hostname=db1.example.com".to_string(),
        "hosts.db1.userid=tungsten".to_string(),
        "hosts.db2.hostname=db2.example.com".to_string(),
        "hosts.db2.userid=tungsten".to_string(),
        "dataservices.alpha.members=db1,db2".to_string(),
    ];
    configure::handle(assignments.to_vec(), &global).unwrap();
    path
}

fn base_context(path: &std::path::Path, fleet: Arc<FakeFleet>) -> Context {
    let session = ConfigSession::open(path, None, false).unwrap();
    let props = session.effective(Arc::new(default_registry()));
    Context::new(props, fleet, DeploymentOptions::default())
}

fn overrides() -> CheckOverrides {
    CheckOverrides::new().skip(CheckSelector::Class("HostnameCheck".to_string()))
}

#[test]
fn configure_validate_and_deploy_every_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = configure_fleet(dir.path());
    let fleet = Arc::new(FakeFleet::default());
    let base = base_context(&path, fleet.clone());
    assert_eq!(base.hosts(), vec!["db1", "db2"]);

    let reports = commons::validate_hosts(&base, &base.hosts(), &overrides());
    assert_eq!(reports.len(), 2);
    for (host, report) in &reports {
        assert!(report.is_valid(), "{}: {:?}", host, report.messages);
        assert!(report.checks_run.contains(&"SshLoginCheck".to_string()));
    }

    let mut scheduler = DeploymentScheduler::new();
    scheduler.prepare(&commons::default_modules()).unwrap();
    for host in base.hosts() {
        let mut ctx = base.for_host(&host);
        let outcome = scheduler.run(&mut ctx, DEPLOYMENT_CLASS, None, None);
        assert!(outcome.is_success(), "{}: {:?}", host, outcome.errors);
        assert_eq!(outcome.host.as_deref(), Some(host.as_str()));
    }

    let commands = fleet.commands();
    for address in ["db1.example.com", "db2.example.com"] {
        let on_host: Vec<&str> = commands
            .iter()
            .filter(|(h, _)| h == address)
            .map(|(_, c)| c.as_str())
            .collect();
        assert!(on_host.iter().any(|c| c.starts_with("mkdir -p /opt/continuent ")));
        assert!(on_host.iter().any(|c| c.contains("deploy.cfg")));
        assert!(on_host.iter().any(|c| c.ends_with("cluster-home/bin/startall")));
    }

    // db1 is the first member, so it is the master and db2 replicates from it.
    let rendered: Vec<&str> = commands
        .iter()
        .filter(|(_, c)| c.contains("replicator.properties"))
        .map(|(_, c)| c.as_str())
        .collect();
    assert_eq!(rendered.len(), 2);
    assert!(rendered.iter().any(|c| c.contains("role=master")));
    assert!(rendered.iter().any(|c| c.contains("role=slave")));
    assert!(rendered.iter().all(|c| c.contains("host=db1.example.com")));

    // The configuration file itself never gained computed values.
    let stored = fs::read_to_string(&path).unwrap();
    assert!(!stored.contains("deployment_host"));
    assert!(!stored.contains("repl_role"));
}

#[test]
fn dry_run_validates_but_refuses_to_change_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let path = configure_fleet(dir.path());
    let fleet = Arc::new(FakeFleet {
        dry_run: true,
        ..FakeFleet::default()
    });
    let base = base_context(&path, fleet.clone());

    let mut ctx = base.for_host("db1");
    let report = default_checks().run(&mut ctx, &overrides());
    assert!(report.is_valid(), "{:?}", report.messages);

    let mut scheduler = DeploymentScheduler::new();
    scheduler.prepare(&commons::default_modules()).unwrap();
    let outcome = scheduler.run(&mut ctx, UPDATE_CLASS, None, None);
    assert!(!outcome.is_success());
    assert_eq!(outcome.failed_method.as_deref(), Some("write_deploy_config"));
    assert!(ctx.messages.has_errors());
    assert!(fleet.commands().iter().all(|(_, c)| !c.starts_with("mkdir")));
}

#[test]
fn install_roots_are_locked_per_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = configure_fleet(dir.path());
    let fleet = Arc::new(FakeFleet::default());
    let base = base_context(&path, fleet.clone());

    let locks = commons::lock_hosts(&base, &base.hosts()).unwrap();
    let hosts: Vec<&str> = locks.iter().map(|l| l.host()).collect();
    assert_eq!(hosts, vec!["db1.example.com", "db2.example.com"]);
    assert!(locks.iter().all(|l| l.path().ends_with("continuent/.lock")));
    drop(locks);

    let commands = fleet.commands();
    for address in ["db1.example.com", "db2.example.com"] {
        assert!(
            commands
                .iter()
                .any(|(h, c)| h == address && c.contains("set -C; echo"))
        );
        assert!(
            commands
                .iter()
                .any(|(h, c)| h == address && c == "rm -f /opt/continuent/.lock")
        );
    }
}
