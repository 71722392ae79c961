// src/core/validation.rs

use crate::core::context::Context;
use crate::models::{Message, MessageLevel};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Addresses a whole check by class name, or one warning of a check with
/// `ClassName:warning_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckSelector {
    Class(String),
    Warning { class_name: String, warning: String },
}

impl CheckSelector {
    pub fn class_name(&self) -> &str {
        match self {
            CheckSelector::Class(c) => c,
            CheckSelector::Warning { class_name, .. } => class_name,
        }
    }
}

impl FromStr for CheckSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            _ if s.is_empty() => Err("an empty check name".to_string()),
            Some((class_name, warning)) if !class_name.is_empty() && !warning.is_empty() => {
                Ok(CheckSelector::Warning {
                    class_name: class_name.to_string(),
                    warning: warning.to_string(),
                })
            }
            Some(_) => Err(format!("'{}' is not of the form Class:warning", s)),
            None => Ok(CheckSelector::Class(s.to_string())),
        }
    }
}

impl fmt::Display for CheckSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckSelector::Class(c) => write!(f, "{}", c),
            CheckSelector::Warning { class_name, warning } => write!(f, "{}:{}", class_name, warning),
        }
    }
}

/// The `--skip-validation-check` and `--enable-validation-check` sets.
#[derive(Debug, Clone, Default)]
pub struct CheckOverrides {
    skipped: HashSet<CheckSelector>,
    enabled: HashSet<CheckSelector>,
}

impl CheckOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, selector: CheckSelector) -> Self {
        self.skipped.insert(selector);
        self
    }

    pub fn enable(mut self, selector: CheckSelector) -> Self {
        self.enabled.insert(selector);
        self
    }

    fn is_class_skipped(&self, class_name: &str) -> bool {
        self.skipped.contains(&CheckSelector::Class(class_name.to_string()))
    }

    fn is_class_enabled(&self, class_name: &str) -> bool {
        self.enabled.contains(&CheckSelector::Class(class_name.to_string()))
    }

    fn is_warning_skipped(&self, class_name: &str, warning: &str) -> bool {
        self.skipped.contains(&CheckSelector::Warning {
            class_name: class_name.to_string(),
            warning: warning.to_string(),
        })
    }

    fn is_warning_enabled(&self, class_name: &str, warning: &str) -> bool {
        self.enabled.contains(&CheckSelector::Warning {
            class_name: class_name.to_string(),
            warning: warning.to_string(),
        })
    }
}

/// What a check sees while it runs: the context, and a place to put findings.
pub struct CheckScope<'a> {
    pub ctx: &'a Context,
    class_name: &'static str,
    overrides: &'a CheckOverrides,
    findings: Vec<(MessageLevel, String)>,
    valid: bool,
}

impl<'a> CheckScope<'a> {
    fn new(ctx: &'a Context, class_name: &'static str, overrides: &'a CheckOverrides) -> Self {
        Self {
            ctx,
            class_name,
            overrides,
            findings: Vec::new(),
            valid: true,
        }
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.valid = false;
        self.findings.push((MessageLevel::Error, text.into()));
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.findings.push((MessageLevel::Warning, text.into()));
    }

    /// A warning that can be silenced with `Class:warning_id`.
    pub fn named_warning(&mut self, warning_id: &str, text: impl Into<String>) {
        if self.overrides.is_warning_skipped(self.class_name, warning_id) {
            log::debug!("Warning '{}:{}' is skipped.", self.class_name, warning_id);
            return;
        }
        self.warning(text);
    }

    /// A warning that is only reported when `Class:warning_id` is enabled.
    pub fn optional_warning(&mut self, warning_id: &str, text: impl Into<String>) {
        if self.overrides.is_warning_enabled(self.class_name, warning_id) {
            self.warning(text);
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.findings.push((MessageLevel::Info, text.into()));
    }

    /// A hint shown next to the errors of this check.
    pub fn help(&mut self, text: impl Into<String>) {
        self.findings.push((MessageLevel::Notice, text.into()));
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// A named check of the target environment.
pub trait ValidationCheck: Send {
    /// The class name used by the skip and enable selectors.
    fn name(&self) -> &'static str;

    fn title(&self) -> &str;

    fn enabled(&self, _ctx: &Context) -> bool {
        true
    }

    /// Stop the whole pass when this check records an error.
    fn fatal_on_error(&self) -> bool {
        false
    }

    fn validate(&mut self, scope: &mut CheckScope<'_>) -> anyhow::Result<()>;
}

/// Builds a fresh check instance for every pass.
pub type CheckFactory = fn() -> Box<dyn ValidationCheck>;

/// The aggregated result of one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub messages: Vec<Message>,
    /// Checks that ran, in order.
    pub checks_run: Vec<String>,
    /// The fatal check that stopped the pass, if any.
    pub aborted_by: Option<String>,
    pub error_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.messages.extend(other.messages);
        self.checks_run.extend(other.checks_run);
        self.error_count += other.error_count;
        if self.aborted_by.is_none() {
            self.aborted_by = other.aborted_by;
        }
    }
}

/// An ordered, static list of checks.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    factories: Vec<CheckFactory>,
}

impl CheckRegistry {
    pub fn new(factories: Vec<CheckFactory>) -> Self {
        Self { factories }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f().name()).collect()
    }

    /// Runs every applicable check against `ctx`, recording findings in the
    /// context's message log.
    pub fn run(&self, ctx: &mut Context, overrides: &CheckOverrides) -> ValidationReport {
        let mut report = ValidationReport::default();
        let start = ctx.messages.len();

        for factory in &self.factories {
            let mut check = factory();
            let name = check.name();

            let should_run = if overrides.is_class_skipped(name) {
                false
            } else if overrides.is_class_enabled(name) {
                true
            } else {
                check.enabled(ctx)
            };
            if !should_run {
                log::debug!("Skipping check '{}'.", name);
                continue;
            }

            log::debug!("Running check '{}': {}", name, check.title());
            let (findings, valid) = {
                let mut scope = CheckScope::new(ctx, name, overrides);
                if let Err(e) = check.validate(&mut scope) {
                    scope.error(format!(t!("validation.error.check_failed"), title = check.title(), error = format!("{:#}", e)));
                }
                (scope.findings, scope.valid)
            };
            for (level, text) in findings {
                if level == MessageLevel::Error {
                    report.error_count += 1;
                }
                ctx.messages.record(level, text);
            }
            report.checks_run.push(name.to_string());

            if !valid && check.fatal_on_error() {
                log::debug!("Check '{}' is fatal; stopping validation.", name);
                report.aborted_by = Some(name.to_string());
                break;
            }
        }

        report.messages = ctx.messages.messages()[start..].to_vec();
        report
    }
}
