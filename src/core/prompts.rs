// src/core/prompts.rs

//! # Prompt Resolution Chain
//!
//! A prompt is one configurable parameter: a key, a label, a validator, an
//! optional default-value function and a list of enablement predicates. Prompts
//! are organized in a tree of groups that mirrors the configuration tree:
//!
//! - the root group has an empty prefix (`home_directory`),
//! - a plain group adds fixed segments (`[prefix..., name]`),
//! - a member group adds its prefix plus one alias segment
//!   (`hosts.<alias>.userid`), and exposes that alias to its prompts.
//!
//! A prompt is enabled when every predicate on the path from the root group down
//! to the prompt holds. Predicates are evaluated top-down and short-circuit.

use crate::core::properties::{Properties, PropertiesError};
use crate::core::validators::Validator;
use crate::models::PropertyKey;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    /// The value cannot be determined yet. Resolution treats this as "unset".
    #[error("Value skipped: {0}")]
    Skip(String),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("'{0}' is not a known configuration key.")]
    UnknownKey(String),
    #[error("Property lookup failed: {0}")]
    Lookup(#[source] Box<PropertiesError>),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PropertiesError> for PromptError {
    fn from(e: PropertiesError) -> Self {
        PromptError::Lookup(Box::new(e))
    }
}

pub type PromptResult<T> = Result<T, PromptError>;

type DefaultFn = Arc<dyn Fn(&PromptScope<'_>) -> PromptResult<Option<Value>> + Send + Sync>;
type Predicate = Arc<dyn Fn(&PromptScope<'_>) -> bool + Send + Sync>;

/// What a default-value function or predicate can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct PromptScope<'a> {
    pub props: &'a Properties,
    /// The full key being resolved.
    pub key: &'a PropertyKey,
    /// The alias consumed by the closest member group, if any.
    pub member: Option<&'a str>,
    /// The prefix of the closest member group, if any.
    pub member_section: Option<&'a [String]>,
}

impl PromptScope<'_> {
    /// Resolves another top-level key.
    pub fn get(&self, key: impl Into<PropertyKey>) -> PromptResult<Option<Value>> {
        Ok(self.props.get_resolved(key)?)
    }

    pub fn get_string(&self, key: impl Into<PropertyKey>) -> PromptResult<Option<String>> {
        Ok(self.props.get_resolved_string(key)?)
    }

    /// Resolves a sibling value of the same member, e.g. `hosts.<alias>.<name>`.
    pub fn sibling(&self, name: &str) -> PromptResult<Option<Value>> {
        match (self.member_section, self.member) {
            (Some(section), Some(member)) => {
                let mut segments = section.to_vec();
                segments.push(member.to_string());
                segments.push(name.to_string());
                self.get(PropertyKey::new(segments))
            }
            _ => self.get(name),
        }
    }
}

/// One configurable parameter.
#[derive(Clone)]
pub struct Prompt {
    name: String,
    label: String,
    validator: Validator,
    default: Option<DefaultFn>,
    predicates: Vec<Predicate>,
    required: bool,
    help: Option<String>,
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field("validator", &self.validator)
            .field("required", &self.required)
            .finish()
    }
}

impl Prompt {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            validator: Validator::Any,
            default: None,
            predicates: Vec::new(),
            required: false,
            help: None,
        }
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// A constant default.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(Arc::new(move |_| Ok(Some(value.clone()))));
        self
    }

    /// A computed default. It may resolve other keys through the scope.
    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&PromptScope<'_>) -> PromptResult<Option<Value>> + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(f));
        self
    }

    /// Adds an enablement condition. All conditions must hold.
    pub fn enabled_when<F>(mut self, f: F) -> Self
    where
        F: Fn(&PromptScope<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(f));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn validate_value(&self, raw: &str) -> PromptResult<Value> {
        self.validator
            .validate(raw)
            .map_err(|reason| PromptError::InvalidValue {
                key: self.name.clone(),
                reason,
            })
    }

    fn load_default_value(&self, scope: &PromptScope<'_>) -> PromptResult<Option<Value>> {
        match &self.default {
            Some(f) => f(scope),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Plain,
    Members,
}

/// A node of the prompt tree.
#[derive(Clone)]
pub struct PromptGroup {
    name: String,
    prefix: Vec<String>,
    kind: GroupKind,
    predicates: Vec<Predicate>,
    prompts: Vec<Prompt>,
    children: Vec<PromptGroup>,
}

impl fmt::Debug for PromptGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptGroup")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("kind", &self.kind)
            .field("prompts", &self.prompts)
            .field("children", &self.children)
            .finish()
    }
}

impl PromptGroup {
    pub fn root() -> Self {
        Self::plain("root", &[])
    }

    pub fn plain(name: &str, prefix: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            kind: GroupKind::Plain,
            predicates: Vec::new(),
            prompts: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A group whose keys carry one alias segment after the prefix.
    pub fn members(name: &str, prefix: &[&str]) -> Self {
        Self {
            kind: GroupKind::Members,
            ..Self::plain(name, prefix)
        }
    }

    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn group(mut self, child: PromptGroup) -> Self {
        self.children.push(child);
        self
    }

    pub fn enabled_when<F>(mut self, f: F) -> Self
    where
        F: Fn(&PromptScope<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A prompt located in the tree, with everything needed to evaluate it.
struct Located<'r> {
    prompt: &'r Prompt,
    chain: Vec<&'r PromptGroup>,
    member: Option<String>,
    member_section: Option<Vec<String>>,
}

/// A required, enabled prompt without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingValue {
    pub key: PropertyKey,
    pub label: String,
}

/// The registry of all prompts, rooted in a single group.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    root: PromptGroup,
}

impl PromptRegistry {
    pub fn new(root: PromptGroup) -> Self {
        Self { root }
    }

    /// Computes the value for `key` from its prompt, if one exists and is enabled.
    ///
    /// A key that is already being resolved on `props` is reported as `None`. A
    /// `Skip` from the default function is also reported as `None`; any other
    /// error propagates. The in-progress flag is cleared in every case.
    pub fn resolve(
        &self,
        props: &Properties,
        key: &PropertyKey,
        allow_disabled: bool,
    ) -> PromptResult<Option<Value>> {
        let Some(located) = self.locate(key) else {
            return Ok(None);
        };

        props.with_resolution_guard(&key.to_string(), || {
            let scope = PromptScope {
                props,
                key,
                member: located.member.as_deref(),
                member_section: located.member_section.as_deref(),
            };
            if !allow_disabled && !Self::is_enabled(&located, &scope) {
                log::trace!("Prompt '{}' is disabled in this context.", key);
                return Ok(None);
            }
            match located.prompt.load_default_value(&scope) {
                Err(PromptError::Skip(reason)) => {
                    log::debug!("Skipping default for '{}': {}", key, reason);
                    Ok(None)
                }
                other => other,
            }
        })
    }

    /// Whether a prompt exists for `key` and is enabled in the current context.
    pub fn is_enabled_for(&self, props: &Properties, key: &PropertyKey) -> bool {
        let Some(located) = self.locate(key) else {
            return false;
        };
        let scope = PromptScope {
            props,
            key,
            member: located.member.as_deref(),
            member_section: located.member_section.as_deref(),
        };
        Self::is_enabled(&located, &scope)
    }

    fn is_enabled(located: &Located<'_>, scope: &PromptScope<'_>) -> bool {
        located
            .chain
            .iter()
            .flat_map(|g| g.predicates.iter())
            .chain(located.prompt.predicates.iter())
            .all(|p| p(scope))
    }

    pub fn find_prompt(&self, key: &PropertyKey) -> Option<&Prompt> {
        self.locate(key).map(|l| l.prompt)
    }

    /// Validates raw input for `key` and returns the normalized value.
    pub fn validate_value(&self, key: &PropertyKey, raw: &str) -> PromptResult<Value> {
        let prompt = self
            .find_prompt(key)
            .ok_or_else(|| PromptError::UnknownKey(key.to_string()))?;
        prompt
            .validate_value(raw)
            .map_err(|e| match e {
                PromptError::InvalidValue { reason, .. } => PromptError::InvalidValue {
                    key: key.to_string(),
                    reason,
                },
                other => other,
            })
    }

    /// Lists every enabled, required prompt that has no resolvable value.
    ///
    /// Member groups are expanded for each alias present in the configuration.
    pub fn required_missing(&self, props: &Properties) -> PromptResult<Vec<MissingValue>> {
        let mut missing = Vec::new();
        for key in self.concrete_keys(props) {
            let Some(prompt) = self.find_prompt(&key) else {
                continue;
            };
            if !prompt.is_required() || !self.is_enabled_for(props, &key) {
                continue;
            }
            if props.get_resolved(&key)?.is_none() {
                missing.push(MissingValue {
                    label: prompt.label().to_string(),
                    key,
                });
            }
        }
        Ok(missing)
    }

    /// Every concrete key addressable with the members currently configured.
    pub fn concrete_keys(&self, props: &Properties) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        collect_keys(&self.root, Vec::new(), props, &mut keys);
        keys
    }

    fn locate(&self, key: &PropertyKey) -> Option<Located<'_>> {
        let mut located = None;
        locate_in(&self.root, key.segments(), Vec::new(), None, None, &mut located);
        located
    }
}

fn locate_in<'r>(
    group: &'r PromptGroup,
    rest: &[String],
    mut chain: Vec<&'r PromptGroup>,
    member: Option<String>,
    member_section: Option<Vec<String>>,
    found: &mut Option<Located<'r>>,
) {
    let Some(after_prefix) = strip_segments(rest, &group.prefix) else {
        return;
    };
    let (after_member, member, member_section) = match group.kind {
        GroupKind::Plain => (after_prefix, member, member_section),
        GroupKind::Members => match after_prefix.split_first() {
            Some((alias, tail)) => (tail, Some(alias.clone()), Some(group.prefix.clone())),
            None => return,
        },
    };
    chain.push(group);

    if let [name] = after_member
        && let Some(prompt) = group.prompts.iter().find(|p| &p.name == name)
    {
        *found = Some(Located {
            prompt,
            chain,
            member,
            member_section,
        });
        return;
    }

    for child in &group.children {
        locate_in(
            child,
            after_member,
            chain.clone(),
            member.clone(),
            member_section.clone(),
            found,
        );
        if found.is_some() {
            return;
        }
    }
}

fn strip_segments<'a>(rest: &'a [String], prefix: &[String]) -> Option<&'a [String]> {
    if rest.len() < prefix.len() {
        return None;
    }
    let (head, tail) = rest.split_at(prefix.len());
    (head == prefix).then_some(tail)
}

fn collect_keys(group: &PromptGroup, base: Vec<String>, props: &Properties, out: &mut Vec<PropertyKey>) {
    let mut path = base;
    path.extend(group.prefix.iter().cloned());

    let bases = match group.kind {
        GroupKind::Plain => vec![path],
        GroupKind::Members => {
            let section = PropertyKey::new(path.clone());
            let aliases = match props.get(&section) {
                Some(Value::Object(map)) => map.keys().cloned().collect(),
                _ => Vec::new(),
            };
            aliases
                .into_iter()
                .map(|alias| {
                    let mut p = path.clone();
                    p.push(alias);
                    p
                })
                .collect()
        }
    };

    for base in bases {
        for prompt in &group.prompts {
            let mut segments = base.clone();
            segments.push(prompt.name.clone());
            out.push(PropertyKey::new(segments));
        }
        for child in &group.children {
            collect_keys(child, base.clone(), props, out);
        }
    }
}
