// src/core/scheduler.rs

use crate::constants::{AFTER_STEP_EVENT, BEFORE_STEP_EVENT};
use crate::core::context::Context;
use crate::core::events::{EventBus, EventPayload};
use crate::models::{MethodDescriptor, RunOutcome};
use crate::system::executor::ExecutionError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A deployment action, invoked with the context of the host being deployed.
pub type StepHandler = Arc<dyn Fn(&mut Context) -> anyhow::Result<()> + Send + Sync>;

#[derive(Error, Debug)]
pub enum ModuleError {
    /// The module does not apply to this deployment and registers nothing.
    #[error("Module is not applicable.")]
    Ignore,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("The scheduler has not been prepared.")]
    Unprepared,
    #[error("A deployment run is already in progress.")]
    AlreadyRunning,
    #[error("Deployment method '{method}' is registered twice for '{class_name}'.")]
    DuplicateMethod { class_name: String, method: String },
    #[error("Module '{module}' failed to load: {source}")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("No deployment method '{method}' is registered for '{class_name}'.")]
    UnknownMethod { class_name: String, method: String },
}

/// One method a module contributes to a deployment class.
pub struct MethodRegistration {
    pub class_name: String,
    pub descriptor: MethodDescriptor,
    pub handler: StepHandler,
}

impl MethodRegistration {
    pub fn new<F>(class_name: impl Into<String>, descriptor: MethodDescriptor, handler: F) -> Self
    where
        F: Fn(&mut Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            class_name: class_name.into(),
            descriptor,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for MethodRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistration")
            .field("class_name", &self.class_name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// A unit that contributes deployment methods and lifecycle listeners.
pub trait DeploymentModule {
    fn name(&self) -> &str;

    /// The methods this module adds. Returning [`ModuleError::Ignore`] skips
    /// the module silently.
    fn methods(&self) -> Result<Vec<MethodRegistration>, ModuleError>;

    fn register_listeners(&self, _events: &mut EventBus) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unprepared,
    Prepared,
    Running,
    Idle,
}

/// Runs the methods of a deployment class in (group, weight, registration)
/// order for one host.
pub struct DeploymentScheduler {
    state: SchedulerState,
    classes: BTreeMap<String, BTreeMap<i32, Vec<MethodDescriptor>>>,
    handlers: HashMap<(String, String), StepHandler>,
    events: EventBus,
    modules: Vec<String>,
    carry_forward: bool,
}

impl Default for DeploymentScheduler {
    fn default() -> Self {
        Self {
            state: SchedulerState::Unprepared,
            classes: BTreeMap::new(),
            handlers: HashMap::new(),
            events: EventBus::new(),
            modules: Vec::new(),
            carry_forward: false,
        }
    }
}

impl DeploymentScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the additional properties of the previous run instead of
    /// clearing them at the start of the next one.
    pub fn carry_forward_properties(&mut self, enabled: bool) {
        self.carry_forward = enabled;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Names of the modules that registered at least one method.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Loads method descriptors and listeners from `modules`.
    pub fn prepare(&mut self, modules: &[Box<dyn DeploymentModule>]) -> Result<(), SchedulerError> {
        if self.state == SchedulerState::Running {
            return Err(SchedulerError::AlreadyRunning);
        }

        for module in modules {
            let registrations = match module.methods() {
                Ok(r) => r,
                Err(ModuleError::Ignore) => {
                    log::debug!("Module '{}' does not apply; skipping it.", module.name());
                    continue;
                }
                Err(ModuleError::Other(source)) => {
                    return Err(SchedulerError::Module {
                        module: module.name().to_string(),
                        source,
                    });
                }
            };

            for registration in registrations {
                self.register(registration)?;
            }
            module.register_listeners(&mut self.events);
            self.modules.push(module.name().to_string());
        }

        // Stable, so equal weights keep registration order.
        for groups in self.classes.values_mut() {
            for descriptors in groups.values_mut() {
                descriptors.sort_by_key(|d| d.weight);
            }
        }

        self.state = SchedulerState::Prepared;
        log::debug!(
            "Scheduler prepared with {} module(s): {:?}",
            self.modules.len(),
            self.modules
        );
        Ok(())
    }

    fn register(&mut self, registration: MethodRegistration) -> Result<(), SchedulerError> {
        let MethodRegistration {
            class_name,
            descriptor,
            handler,
        } = registration;

        let handler_key = (class_name.clone(), descriptor.name.clone());
        if self.handlers.contains_key(&handler_key) {
            return Err(SchedulerError::DuplicateMethod {
                class_name,
                method: descriptor.name,
            });
        }
        self.handlers.insert(handler_key, handler);
        self.classes
            .entry(class_name)
            .or_default()
            .entry(descriptor.group_id)
            .or_default()
            .push(descriptor);
        Ok(())
    }

    /// Group ids of `class_name`, ascending.
    pub fn group_ids(&self, class_name: &str) -> Vec<i32> {
        self.classes
            .get(class_name)
            .map(|groups| groups.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Descriptors of one group, in execution order.
    pub fn descriptors(&self, class_name: &str, group_id: i32) -> &[MethodDescriptor] {
        self.classes
            .get(class_name)
            .and_then(|groups| groups.get(&group_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every descriptor of `class_name` in execution order.
    pub fn plan(&self, class_name: &str) -> Vec<&MethodDescriptor> {
        self.classes
            .get(class_name)
            .map(|groups| groups.values().flatten().collect())
            .unwrap_or_default()
    }

    /// Invokes a single registered method by name, without lifecycle events.
    pub fn invoke(&self, ctx: &mut Context, class_name: &str, method: &str) -> anyhow::Result<()> {
        let handler = self
            .handlers
            .get(&(class_name.to_string(), method.to_string()))
            .ok_or_else(|| SchedulerError::UnknownMethod {
                class_name: class_name.to_string(),
                method: method.to_string(),
            })?;
        handler(ctx)
    }

    /// Runs every group of `class_name` in ascending order, or only `group_id`.
    ///
    /// Never fails: any error stops the run, is logged and recorded in the
    /// context's message log, and is reported in the returned outcome.
    pub fn run(
        &mut self,
        ctx: &mut Context,
        class_name: &str,
        group_id: Option<i32>,
        extra_props: Option<Map<String, Value>>,
    ) -> RunOutcome {
        let mut outcome = RunOutcome {
            class_name: class_name.to_string(),
            host: ctx.host().ok().flatten(),
            ..RunOutcome::default()
        };

        match self.state {
            SchedulerState::Unprepared => {
                record_failure(ctx, &mut outcome, &SchedulerError::Unprepared.into());
                return outcome;
            }
            SchedulerState::Running => {
                record_failure(ctx, &mut outcome, &SchedulerError::AlreadyRunning.into());
                return outcome;
            }
            SchedulerState::Prepared | SchedulerState::Idle => {}
        }

        if !self.carry_forward {
            ctx.reset_additional_properties();
        }
        if let Some(extra) = extra_props {
            ctx.merge_additional_properties(extra);
        }

        self.state = SchedulerState::Running;
        let result = self.run_sequence(ctx, class_name, group_id, &mut outcome);
        self.state = SchedulerState::Idle;

        if let Err(e) = result {
            record_failure(ctx, &mut outcome, &e);
        }
        outcome
    }

    fn run_sequence(
        &self,
        ctx: &mut Context,
        class_name: &str,
        group_id: Option<i32>,
        outcome: &mut RunOutcome,
    ) -> anyhow::Result<()> {
        let class_event = |prefix: &str| EventPayload {
            event: format!("{}_{}", prefix, class_name),
            class_name: class_name.to_string(),
            method: None,
        };

        self.events.emit(ctx, &class_event("before"))?;

        let groups = match group_id {
            Some(id) => vec![id],
            None => self.group_ids(class_name),
        };
        for id in groups {
            for descriptor in self.descriptors(class_name, id) {
                outcome.failed_method = Some(descriptor.name.clone());
                log::debug!(
                    "Running '{}' (group {}, weight {}).",
                    descriptor.name,
                    descriptor.group_id,
                    descriptor.weight
                );

                let step_event = |event: &str| EventPayload {
                    event: event.to_string(),
                    class_name: class_name.to_string(),
                    method: Some(descriptor.name.clone()),
                };
                self.events.emit(ctx, &step_event(BEFORE_STEP_EVENT))?;
                self.invoke(ctx, class_name, &descriptor.name)?;
                self.events.emit(ctx, &step_event(AFTER_STEP_EVENT))?;

                outcome.executed.push(descriptor.name.clone());
            }
        }
        outcome.failed_method = None;

        self.events.emit(ctx, &class_event("after"))?;
        Ok(())
    }
}

impl fmt::Debug for DeploymentScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentScheduler")
            .field("state", &self.state)
            .field("classes", &self.classes)
            .field("modules", &self.modules)
            .finish()
    }
}

fn record_failure(ctx: &mut Context, outcome: &mut RunOutcome, error: &anyhow::Error) {
    let timed_out = error
        .downcast_ref::<ExecutionError>()
        .is_some_and(ExecutionError::is_timeout);

    let text = match (&outcome.failed_method, timed_out) {
        (Some(method), true) => format!(t!("scheduler.error.method_timeout"), method = method, error = error),
        (Some(method), false) => format!(t!("scheduler.error.method_failed"), method = method, error = format!("{:#}", error)),
        (None, _) => format!("{:#}", error),
    };
    log::debug!("Run of '{}' failed: {:?}", outcome.class_name, error);
    ctx.messages.error(text.clone());
    outcome.errors.push(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::test_support::*;
    use crate::models::ParallelMode;
    use serde_json::json;
    use std::sync::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct TraceModule {
        name: &'static str,
        methods: Vec<(&'static str, i32, i32)>,
        failing: Option<&'static str>,
        ignore: bool,
        trace: Trace,
    }

    impl TraceModule {
        fn new(name: &'static str, methods: Vec<(&'static str, i32, i32)>, trace: &Trace) -> Self {
            Self {
                name,
                methods,
                failing: None,
                ignore: false,
                trace: trace.clone(),
            }
        }
    }

    impl DeploymentModule for TraceModule {
        fn name(&self) -> &str {
            self.name
        }

        fn methods(&self) -> Result<Vec<MethodRegistration>, ModuleError> {
            if self.ignore {
                return Err(ModuleError::Ignore);
            }
            Ok(self
                .methods
                .iter()
                .map(|&(name, group, weight)| {
                    let trace = self.trace.clone();
                    let fails = self.failing == Some(name);
                    MethodRegistration::new("X", MethodDescriptor::new(name, group, weight), move |_| {
                        trace.lock().unwrap().push(name.to_string());
                        if fails {
                            anyhow::bail!("{} exploded", name);
                        }
                        Ok(())
                    })
                })
                .collect())
        }

        fn register_listeners(&self, events: &mut EventBus) {
            for event in ["before_X", BEFORE_STEP_EVENT, AFTER_STEP_EVENT, "after_X"] {
                let trace = self.trace.clone();
                events.listen(event, move |_, payload| {
                    let entry = match &payload.method {
                        Some(m) => format!("{}:{}", payload.event, m),
                        None => payload.event.clone(),
                    };
                    trace.lock().unwrap().push(entry);
                    Ok(())
                });
            }
        }
    }

    fn context() -> Context {
        context_with(json!({}), Arc::new(RecordingExecutor::default()))
    }

    fn methods_only(trace: &Trace) -> Vec<String> {
        trace
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.contains("_"))
            .cloned()
            .collect()
    }

    #[test]
    fn test_groups_then_weights_ordering() {
        let trace: Trace = Arc::default();
        let modules: Vec<Box<dyn DeploymentModule>> = vec![Box::new(TraceModule::new(
            "steps",
            vec![("A", 0, 10), ("B", 0, -5), ("C", 1, 0)],
            &trace,
        ))];

        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Prepared);

        let outcome = scheduler.run(&mut context(), "X", None, None);
        assert!(outcome.is_success());
        assert_eq!(outcome.executed, vec!["B", "A", "C"]);
        assert_eq!(methods_only(&trace), vec!["B", "A", "C"]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_equal_weights_keep_registration_order() {
        let trace: Trace = Arc::default();
        let modules: Vec<Box<dyn DeploymentModule>> = vec![
            Box::new(TraceModule::new("first", vec![("one", -10, 0), ("two", 0, 0)], &trace)),
            Box::new(TraceModule::new("second", vec![("three", 0, 0), ("four", 0, -1)], &trace)),
        ];
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();

        assert_eq!(scheduler.group_ids("X"), vec![-10, 0]);
        let names: Vec<_> = scheduler.plan("X").iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["one", "four", "two", "three"]);
    }

    #[test]
    fn test_failure_is_recorded_not_raised() {
        let trace: Trace = Arc::default();
        let mut module = TraceModule::new("steps", vec![("A", 0, 0), ("B", 0, 1), ("C", 1, 0)], &trace);
        module.failing = Some("B");
        let modules: Vec<Box<dyn DeploymentModule>> = vec![Box::new(module)];

        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        let mut ctx = context();
        let outcome = scheduler.run(&mut ctx, "X", None, None);

        assert!(!outcome.is_success());
        assert_eq!(outcome.executed, vec!["A"]);
        assert_eq!(outcome.failed_method.as_deref(), Some("B"));
        assert_eq!(methods_only(&trace), vec!["A", "B"]);
        assert!(ctx.messages.has_errors());
        let recorded = &ctx.messages.errors().next().unwrap().text;
        assert!(recorded.contains("B exploded"), "{}", recorded);
        assert!(!trace.lock().unwrap().contains(&"after_X".to_string()));
    }

    #[test]
    fn test_lifecycle_events_wrap_each_method() {
        let trace: Trace = Arc::default();
        let modules: Vec<Box<dyn DeploymentModule>> =
            vec![Box::new(TraceModule::new("steps", vec![("A", 0, 0)], &trace))];
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        scheduler.run(&mut context(), "X", None, None);

        assert_eq!(
            *trace.lock().unwrap(),
            vec![
                "before_X".to_string(),
                format!("{}:A", BEFORE_STEP_EVENT),
                "A".to_string(),
                format!("{}:A", AFTER_STEP_EVENT),
                "after_X".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_group_run() {
        let trace: Trace = Arc::default();
        let modules: Vec<Box<dyn DeploymentModule>> = vec![Box::new(TraceModule::new(
            "steps",
            vec![("A", 0, 0), ("B", 1, 0)],
            &trace,
        ))];
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        let outcome = scheduler.run(&mut context(), "X", Some(1), None);
        assert_eq!(outcome.executed, vec!["B"]);
    }

    #[test]
    fn test_ignored_module_is_swallowed() {
        let trace: Trace = Arc::default();
        let mut ignored = TraceModule::new("optional", vec![("Z", 0, 0)], &trace);
        ignored.ignore = true;
        let modules: Vec<Box<dyn DeploymentModule>> = vec![
            Box::new(ignored),
            Box::new(TraceModule::new("steps", vec![("A", 0, 0)], &trace)),
        ];
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        assert_eq!(scheduler.modules(), ["steps".to_string()]);
        assert_eq!(scheduler.plan("X").len(), 1);
    }

    #[test]
    fn test_duplicate_method_is_rejected() {
        let trace: Trace = Arc::default();
        let modules: Vec<Box<dyn DeploymentModule>> = vec![
            Box::new(TraceModule::new("a", vec![("A", 0, 0)], &trace)),
            Box::new(TraceModule::new("b", vec![("A", 1, 0)], &trace)),
        ];
        let mut scheduler = DeploymentScheduler::new();
        assert!(matches!(
            scheduler.prepare(&modules),
            Err(SchedulerError::DuplicateMethod { .. })
        ));
    }

    #[test]
    fn test_unprepared_run_fails_gracefully() {
        let mut scheduler = DeploymentScheduler::new();
        let mut ctx = context();
        let outcome = scheduler.run(&mut ctx, "X", None, None);
        assert!(!outcome.is_success());
        assert!(ctx.messages.has_errors());
    }

    #[test]
    fn test_additional_properties_reset_between_runs() {
        let seen: Arc<Mutex<Vec<Option<Value>>>> = Arc::default();
        struct Probe(Arc<Mutex<Vec<Option<Value>>>>);
        impl DeploymentModule for Probe {
            fn name(&self) -> &str {
                "probe"
            }
            fn methods(&self) -> Result<Vec<MethodRegistration>, ModuleError> {
                let seen = self.0.clone();
                Ok(vec![MethodRegistration::new(
                    "X",
                    MethodDescriptor::new("probe", 0, 0).parallel(ParallelMode::None),
                    move |ctx| {
                        seen.lock().unwrap().push(ctx.additional_property("flag").cloned());
                        Ok(())
                    },
                )])
            }
        }

        let modules: Vec<Box<dyn DeploymentModule>> = vec![Box::new(Probe(seen.clone()))];
        let mut scheduler = DeploymentScheduler::new();
        scheduler.prepare(&modules).unwrap();
        assert_eq!(scheduler.descriptors("X", 0)[0].parallel, ParallelMode::None);

        let mut ctx = context();
        let mut extra = Map::new();
        extra.insert("flag".to_string(), json!(1));
        scheduler.run(&mut ctx, "X", None, Some(extra));
        scheduler.run(&mut ctx, "X", None, None);

        scheduler.carry_forward_properties(true);
        ctx.set_additional_property("flag", json!(2));
        scheduler.run(&mut ctx, "X", None, None);

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1)), None, Some(json!(2))]);
    }
}
