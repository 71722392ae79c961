// src/constants.rs

use std::time::Duration;

/// The name of the global configuration file.
pub const GLOBAL_CONFIG_FILENAME: &str = "tungsten.cfg";

/// The name of the per-service configuration file written during deployment.
pub const SERVICE_CONFIG_FILENAME: &str = "deploy.cfg";

/// Directory (relative to the install root) holding configuration files.
pub const CONFIG_DIR: &str = "conf";

/// Directory (under `$HOME`) holding per-user files.
pub const USER_DIR: &str = ".tungsten";

/// Per-user defaults file, merged underneath the explicit configuration.
pub const USER_DEFAULTS_FILENAME: &str = "defaults.cfg";

/// Advisory lock file guarding an install root against concurrent scripts.
pub const LOCK_FILENAME: &str = ".lock";

/// Install root used when neither `CONTINUENT_ROOT` nor a configured value exists.
pub const DEFAULT_INSTALL_ROOT: &str = "/opt/continuent";

pub const ENV_CONTINUENT_ROOT: &str = "CONTINUENT_ROOT";

// --- Top-level sections of the configuration tree ---

pub const HOSTS: &str = "hosts";
pub const DATASERVICES: &str = "dataservices";
pub const REPL_SERVICES: &str = "replicationServices";
pub const MANAGERS: &str = "managers";
pub const CONNECTORS: &str = "connectors";

// --- Context markers, stored as ordinary properties ---

pub const DEPLOYMENT_HOST: &str = "deployment_host";
pub const DEPLOYMENT_DATASERVICE: &str = "deployment_dataservice";
pub const DEPLOYMENT_SERVICE: &str = "deployment_service";

// --- Deployment classes run by the scheduler ---

pub const DEPLOYMENT_CLASS: &str = "deployment";
pub const UPDATE_CLASS: &str = "update";

// --- Lifecycle events ---

pub const BEFORE_STEP_EVENT: &str = "before_deployment_step_method";
pub const AFTER_STEP_EVENT: &str = "after_deployment_step_method";

// --- Waits ---

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
pub const MANAGER_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const SERVICE_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const WAIT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
