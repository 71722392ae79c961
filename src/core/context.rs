// src/core/context.rs

use crate::constants::{DEPLOYMENT_DATASERVICE, DEPLOYMENT_HOST, DEPLOYMENT_SERVICE, HOSTS};
use crate::core::messages::MessageLog;
use crate::core::properties::{Properties, PropertiesResult};
use crate::system::executor::RemoteExecutor;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Flags that shape a deployment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentOptions {
    /// Keep going past validation errors.
    pub force: bool,
    /// Only warnings and errors reach the console.
    pub quiet: bool,
    /// Refuse every mutating remote call.
    pub dry_run: bool,
    /// Accept `key=value` configuration files.
    pub allow_legacy_format: bool,
}

/// Everything a check or a deployment step needs, passed explicitly.
///
/// A context is bound to at most one host at a time; the orchestrator clones
/// the base context once per host with [`Context::for_host`].
pub struct Context {
    pub config: Properties,
    pub messages: MessageLog,
    pub options: DeploymentOptions,
    executor: Arc<dyn RemoteExecutor>,
    additional: Map<String, Value>,
}

impl Context {
    pub fn new(mut config: Properties, executor: Arc<dyn RemoteExecutor>, options: DeploymentOptions) -> Self {
        config.attach_executor(executor.clone());
        let mut messages = MessageLog::new();
        messages.demote_errors(options.quiet && options.force);
        Self {
            config,
            messages,
            options,
            executor,
            additional: Map::new(),
        }
    }

    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    /// A copy of this context whose markers point at `host`. The dataservice
    /// and service markers are left to resolve from the new host.
    pub fn for_host(&self, host: &str) -> Self {
        let mut config = self.config.clone();
        config.set(DEPLOYMENT_HOST, Value::String(host.to_string()));
        config.remove(DEPLOYMENT_DATASERVICE);
        config.remove(DEPLOYMENT_SERVICE);
        let mut messages = MessageLog::for_host(host);
        messages.demote_errors(self.messages.demotes_errors());
        Self {
            config,
            messages,
            options: self.options.clone(),
            executor: self.executor.clone(),
            additional: Map::new(),
        }
    }

    /// A copy of this context that is not bound to any host.
    pub fn unbound(&self) -> Self {
        let mut config = self.config.clone();
        for marker in [DEPLOYMENT_HOST, DEPLOYMENT_DATASERVICE, DEPLOYMENT_SERVICE] {
            config.remove(marker);
        }
        let mut messages = MessageLog::new();
        messages.demote_errors(self.messages.demotes_errors());
        Self {
            config,
            messages,
            options: self.options.clone(),
            executor: self.executor.clone(),
            additional: Map::new(),
        }
    }

    /// Host aliases defined in the configuration, in file order.
    pub fn hosts(&self) -> Vec<String> {
        self.config.member_aliases(HOSTS)
    }

    pub fn host(&self) -> PropertiesResult<Option<String>> {
        self.config.get_resolved_string(DEPLOYMENT_HOST)
    }

    pub fn dataservice(&self) -> PropertiesResult<Option<String>> {
        self.config.get_resolved_string(DEPLOYMENT_DATASERVICE)
    }

    pub fn service(&self) -> PropertiesResult<Option<String>> {
        self.config.get_resolved_string(DEPLOYMENT_SERVICE)
    }

    /// The SSH address and user for the current host.
    pub fn host_login(&self) -> PropertiesResult<Option<(String, Option<String>)>> {
        let Some(host) = self.host()? else {
            return Ok(None);
        };
        let address = self
            .config
            .get_resolved_string([HOSTS, host.as_str(), "hostname"])?
            .unwrap_or_else(|| host.clone());
        let user = self
            .config
            .get_resolved_string([HOSTS, host.as_str(), "userid"])?;
        Ok(Some((address, user)))
    }

    /// Resolves `name` for the current host: `hosts.<host>.<name>` first,
    /// then the key itself.
    pub fn host_property(&self, name: &str) -> PropertiesResult<Option<Value>> {
        if let Some(host) = self.host()?
            && let Some(v) = self.config.get_resolved([HOSTS, host.as_str(), name])?
        {
            return Ok(Some(v));
        }
        self.config.get_resolved(name)
    }

    pub fn host_property_string(&self, name: &str) -> PropertiesResult<Option<String>> {
        Ok(self
            .host_property(name)?
            .as_ref()
            .and_then(crate::core::properties::scalar_to_string))
    }

    // --- ADDITIONAL PROPERTIES ---

    /// Scratch values handed to the steps of the current run.
    pub fn additional_properties(&self) -> &Map<String, Value> {
        &self.additional
    }

    pub fn additional_property(&self, key: &str) -> Option<&Value> {
        self.additional.get(key)
    }

    pub fn set_additional_property(&mut self, key: impl Into<String>, value: Value) {
        self.additional.insert(key.into(), value);
    }

    pub(crate) fn reset_additional_properties(&mut self) {
        self.additional.clear();
    }

    pub(crate) fn merge_additional_properties(&mut self, extra: Map<String, Value>) {
        self.additional.extend(extra);
    }
}
