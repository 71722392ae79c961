// src/core/properties.rs

//! # Property Store
//!
//! A nested, JSON-backed key/value tree with dotted-path access. Two read modes
//! are offered:
//!
//! - [`Properties::get`] is a pure tree lookup with no side effects.
//! - [`Properties::get_resolved`] falls back to the attached prompt registry and
//!   then to a fixed chain of contextual paths derived from the current host,
//!   dataservice and service markers.
//!
//! Both the prompt lookup and the contextual fallback are protected by a per-key
//! in-progress guard, so a default that (directly or indirectly) asks for its own
//! key sees "no value yet" instead of recursing forever.

use crate::constants::{
    CONNECTORS, DATASERVICES, DEPLOYMENT_DATASERVICE, DEPLOYMENT_HOST, DEPLOYMENT_SERVICE, HOSTS,
    MANAGERS, REPL_SERVICES,
};
use crate::core::prompts::{PromptError, PromptRegistry};
use crate::models::PropertyKey;
use crate::system::{executor::RemoteExecutor, interrupt};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

lazy_static! {
    // `key=value`, `key[sub]=value`, `key[sub][leaf]=value`
    static ref LEGACY_LINE_RE: Regex =
        Regex::new(r"^([^\[\]=\s]+)((?:\[[^\[\]]*\])*)\s*=\s*(.*)$").unwrap();
    static ref LEGACY_SUBKEY_RE: Regex = Regex::new(r"\[([^\[\]]*)\]").unwrap();
}

#[derive(Error, Debug)]
pub enum PropertiesError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error with temporary file: {0}")]
    TempFile(#[from] tempfile::PersistError),
    #[error("Configuration file '{path}' is not valid JSON: {source}")]
    InvalidJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "Configuration file '{path}' uses the legacy key=value format. Re-run with --allow-legacy-format to migrate it."
    )]
    LegacyFormat { path: String },
    #[error("Unable to parse line {line} of '{path}': '{content}'")]
    LegacyLine {
        path: String,
        line: usize,
        content: String,
    },
    #[error("Unable to serialize the configuration: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Unable to resolve '{key}': {source}")]
    Prompt {
        key: String,
        #[source]
        source: Box<PromptError>,
    },
}

pub type PropertiesResult<T> = Result<T, PropertiesError>;

/// The configuration tree plus its resolution logic.
pub struct Properties {
    props: Value,
    prompts: Option<Arc<PromptRegistry>>,
    use_resolver: bool,
    executor: Option<Arc<dyn RemoteExecutor>>,
    in_progress: RefCell<HashSet<String>>,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            props: Value::Object(Map::new()),
            prompts: None,
            use_resolver: true,
            executor: None,
            in_progress: RefCell::new(HashSet::new()),
        }
    }
}

impl Clone for Properties {
    // The in-progress set belongs to resolutions running on the original.
    fn clone(&self) -> Self {
        Self {
            props: self.props.clone(),
            prompts: self.prompts.clone(),
            use_resolver: self.use_resolver,
            executor: self.executor.clone(),
            in_progress: RefCell::new(HashSet::new()),
        }
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Properties")
            .field("props", &self.props)
            .field("has_prompts", &self.prompts.is_some())
            .field("use_resolver", &self.use_resolver)
            .finish()
    }
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing JSON document. Non-object documents start an empty tree.
    pub fn from_value(value: Value) -> Self {
        let props = if value.is_object() {
            value
        } else {
            Value::Object(Map::new())
        };
        Self {
            props,
            ..Self::default()
        }
    }

    /// Attaches the prompt registry consulted by `get_resolved` on a miss.
    pub fn with_prompts(mut self, prompts: Arc<PromptRegistry>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn prompts(&self) -> Option<&Arc<PromptRegistry>> {
        self.prompts.as_ref()
    }

    /// Attaches the executor prompts may use for live queries against a host.
    pub fn attach_executor(&mut self, executor: Arc<dyn RemoteExecutor>) {
        self.executor = Some(executor);
    }

    pub fn executor(&self) -> Option<&Arc<dyn RemoteExecutor>> {
        self.executor.as_ref()
    }

    /// Turns prompt resolution on or off for this store. Contextual fallbacks
    /// are unaffected.
    pub fn use_resolver(&mut self, enabled: bool) {
        self.use_resolver = enabled;
    }

    pub fn props(&self) -> &Value {
        &self.props
    }

    pub fn is_empty(&self) -> bool {
        self.props.as_object().is_none_or(Map::is_empty)
    }

    // --- READS ---

    /// Pure nested lookup. Never triggers resolution.
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        self.lookup(&key.into()).cloned()
    }

    /// A `null` leaf counts as absent.
    fn lookup(&self, key: &PropertyKey) -> Option<&Value> {
        if key.is_empty() {
            return None;
        }
        let mut node = &self.props;
        for segment in key.segments() {
            node = node.as_object()?.get(segment)?;
        }
        (!node.is_null()).then_some(node)
    }

    /// Convenience wrapper returning a pure lookup rendered as a string.
    pub fn get_string(&self, key: impl Into<PropertyKey>) -> Option<String> {
        self.get(key).as_ref().and_then(scalar_to_string)
    }

    /// Lists the member aliases stored under a top-level section such as `hosts`.
    pub fn member_aliases(&self, section: &str) -> Vec<String> {
        self.props
            .get(section)
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Tree lookup, then the prompt registry, then the contextual fallbacks.
    ///
    /// The fallbacks only apply to single-segment keys and are tried in this order:
    /// `hosts.<host>`, `dataservices.<ds>`, `replicationServices.<ds>_<host>`,
    /// `managers.<ds>_<host>`, `connectors.<host>`, `replicationServices.<service>`.
    pub fn get_resolved(&self, key: impl Into<PropertyKey>) -> PropertiesResult<Option<Value>> {
        let key = key.into();
        if let Some(value) = self.lookup(&key) {
            return Ok(Some(value.clone()));
        }

        if self.use_resolver
            && let Some(prompts) = &self.prompts
        {
            let resolved = prompts
                .resolve(self, &key, false)
                .map_err(|e| PropertiesError::Prompt {
                    key: key.to_string(),
                    source: Box::new(e),
                })?;
            if resolved.is_some() {
                return Ok(resolved);
            }
        }

        match key.segments() {
            [name] => self.with_resolution_guard(&format!("fallback:{}", name), || {
                self.resolve_from_context(name)
            }),
            _ => Ok(None),
        }
    }

    /// Like `get_resolved`, rendered as a string for scalar values.
    pub fn get_resolved_string(
        &self,
        key: impl Into<PropertyKey>,
    ) -> PropertiesResult<Option<String>> {
        Ok(self.get_resolved(key)?.as_ref().and_then(scalar_to_string))
    }

    /// The value callback handed to the template renderer.
    ///
    /// Uses the same resolution chain as `get_resolved`. Lists are comma
    /// joined, mappings are rendered as compact JSON and absent values as an
    /// empty string.
    pub fn get_template_value(&self, key: impl Into<PropertyKey>) -> PropertiesResult<String> {
        let key = key.into();
        let rendered = match self.get_resolved(&key)? {
            None | Some(Value::Null) => {
                log::debug!("Template value '{}' is not set.", key);
                String::new()
            }
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| scalar_to_string(v).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(","),
            Some(v @ Value::Object(_)) => v.to_string(),
            Some(v) => scalar_to_string(&v).unwrap_or_default(),
        };
        Ok(rendered)
    }

    fn resolve_from_context(&self, name: &str) -> PropertiesResult<Option<Value>> {
        let host = self.get_resolved_string(DEPLOYMENT_HOST)?;
        let dataservice = self.get_resolved_string(DEPLOYMENT_DATASERVICE)?;

        if let Some(host) = &host
            && let Some(v) = self.get_resolved([HOSTS, host.as_str(), name])?
        {
            return Ok(Some(v));
        }

        if let Some(ds) = &dataservice {
            if let Some(v) = self.get_resolved([DATASERVICES, ds.as_str(), name])? {
                return Ok(Some(v));
            }
            if let Some(host) = &host {
                let member = format!("{}_{}", ds, host);
                if let Some(v) = self.get_resolved([REPL_SERVICES, member.as_str(), name])? {
                    return Ok(Some(v));
                }
                if let Some(v) = self.get_resolved([MANAGERS, member.as_str(), name])? {
                    return Ok(Some(v));
                }
            }
        }

        if let Some(host) = &host
            && let Some(v) = self.get_resolved([CONNECTORS, host.as_str(), name])?
        {
            return Ok(Some(v));
        }

        if let Some(service) = self.get_resolved_string(DEPLOYMENT_SERVICE)?
            && let Some(v) = self.get_resolved([REPL_SERVICES, service.as_str(), name])?
        {
            return Ok(Some(v));
        }

        Ok(None)
    }

    /// Runs `resolve` unless `guard_key` is already being resolved on this store,
    /// in which case the value is reported as unknown. The flag is cleared on
    /// every exit path.
    pub(crate) fn with_resolution_guard<T, E, F>(&self, guard_key: &str, resolve: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Result<Option<T>, E>,
    {
        if !self.in_progress.borrow_mut().insert(guard_key.to_string()) {
            log::trace!("'{}' is already being resolved; treating it as unset.", guard_key);
            return Ok(None);
        }
        let _clear = scopeguard::guard((), |_| {
            self.in_progress.borrow_mut().remove(guard_key);
        });
        resolve()
    }

    #[cfg(test)]
    pub(crate) fn is_resolving(&self, guard_key: &str) -> bool {
        self.in_progress.borrow().contains(guard_key)
    }

    // --- WRITES ---

    /// Writes `value` at `key`, creating intermediate mappings as needed.
    /// `null` and empty collections delete the leaf instead.
    pub fn set(&mut self, key: impl Into<PropertyKey>, value: Value) {
        let key = key.into();
        if is_empty_value(&value) {
            self.remove(&key);
            return;
        }
        let Some((leaf, parents)) = key.segments().split_last() else {
            return;
        };
        let mut node = &mut self.props;
        for segment in parents {
            node = ensure_object(node)
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(leaf.clone(), value);
    }

    /// Removes the leaf at `key`, returning its previous value.
    pub fn remove(&mut self, key: impl Into<PropertyKey>) -> Option<Value> {
        let key = key.into();
        let (leaf, parents) = key.segments().split_last()?;
        let mut node = &mut self.props;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        node.as_object_mut()?.remove(leaf)
    }

    /// Shallow-merges `partial` into the mapping at `key`; new values win.
    pub fn override_with(&mut self, key: impl Into<PropertyKey>, partial: Map<String, Value>) {
        self.merge(key.into(), partial, true);
    }

    /// Shallow-merges `partial` into the mapping at `key`; existing values win.
    pub fn include(&mut self, key: impl Into<PropertyKey>, partial: Map<String, Value>) {
        self.merge(key.into(), partial, false);
    }

    fn merge(&mut self, key: PropertyKey, partial: Map<String, Value>, new_wins: bool) {
        let existing = if key.is_empty() {
            Some(&mut self.props)
        } else {
            self.lookup_mut(&key)
        };
        match existing {
            Some(Value::Object(map)) => {
                for (k, v) in partial {
                    if new_wins || !map.contains_key(&k) {
                        map.insert(k, v);
                    }
                }
            }
            Some(_) if !new_wins => {
                log::debug!("Ignoring include into non-mapping value at '{}'.", key);
            }
            _ => self.set(key, Value::Object(partial)),
        }
    }

    fn lookup_mut(&mut self, key: &PropertyKey) -> Option<&mut Value> {
        let mut node = &mut self.props;
        for segment in key.segments() {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        Some(node)
    }

    /// Treats the value at `key` as a list and appends `items`, keeping the
    /// first occurrence of every element.
    pub fn append(&mut self, key: impl Into<PropertyKey>, items: Vec<Value>) {
        let key = key.into();
        let mut list = match self.get(&key) {
            Some(Value::Array(existing)) => existing,
            Some(Value::Null) | None => Vec::new(),
            Some(scalar) => vec![scalar],
        };
        list.extend(items);

        let mut unique: Vec<Value> = Vec::with_capacity(list.len());
        for item in list {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        self.set(key, Value::Array(unique));
    }

    // --- PERSISTENCE ---

    /// Replaces the tree with the contents of `path`.
    pub fn load(&mut self, path: &Path, allow_legacy: bool) -> PropertiesResult<()> {
        let content = fs::read_to_string(path)?;
        self.props = parse_document(&content, &path.display().to_string(), allow_legacy)?;
        log::debug!("Loaded configuration from '{}'.", path.display());
        Ok(())
    }

    /// Writes the tree to `path` as pretty-printed JSON.
    ///
    /// The document is serialized in memory first and then written through a
    /// temporary file in the same directory, which is atomically moved into
    /// place. Interrupts are deferred until the move has completed.
    pub fn store(&self, path: &Path) -> PropertiesResult<()> {
        let mut content =
            serde_json::to_string_pretty(&self.props).map_err(PropertiesError::Serialize)?;
        content.push('\n');

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let _deferred = interrupt::defer();
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;
        temp.persist(path)?;
        log::debug!("Stored configuration at '{}'.", path.display());
        Ok(())
    }
}

/// Parses a configuration document.
///
/// Lines whose first non-blank character is `#` are dropped before the rest is
/// parsed as a single JSON document.
pub fn parse_document(content: &str, origin: &str, allow_legacy: bool) -> PropertiesResult<Value> {
    let stripped = strip_comments(content);
    let trimmed = stripped.trim_start();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_json::from_str::<Value>(&stripped) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(PropertiesError::LegacyFormat {
            path: origin.to_string(),
        }),
        Err(source) if trimmed.starts_with('{') => Err(PropertiesError::InvalidJson {
            path: origin.to_string(),
            source,
        }),
        Err(_) if allow_legacy => {
            log::warn!("Migrating legacy configuration format in '{}'.", origin);
            parse_legacy(&stripped, origin)
        }
        Err(_) => Err(PropertiesError::LegacyFormat {
            path: origin.to_string(),
        }),
    }
}

fn strip_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_legacy(content: &str, origin: &str) -> PropertiesResult<Value> {
    let mut props = Properties::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let caps = LEGACY_LINE_RE
            .captures(line)
            .ok_or_else(|| PropertiesError::LegacyLine {
                path: origin.to_string(),
                line: idx + 1,
                content: line.to_string(),
            })?;

        let mut segments = vec![caps.get(1).map_or("", |m| m.as_str()).to_string()];
        if let Some(subkeys) = caps.get(2) {
            segments.extend(
                LEGACY_SUBKEY_RE
                    .captures_iter(subkeys.as_str())
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string())),
            );
        }
        let value = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
        props.set(PropertyKey::new(segments), Value::String(value));
    }
    Ok(props.props)
}

/// Renders a scalar JSON value as text. Strings are returned without quotes.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompts::{Prompt, PromptGroup};
    use proptest::prelude::*;
    use serde_json::json;

    fn with_context(host: &str, dataservice: &str) -> Properties {
        let mut props = Properties::new();
        props.set(DEPLOYMENT_HOST, json!(host));
        props.set(DEPLOYMENT_DATASERVICE, json!(dataservice));
        props
    }

    #[test]
    fn test_missing_intermediate_returns_none() {
        let mut props = Properties::new();
        props.set("hosts.db1.userid", json!("tungsten"));
        assert_eq!(props.get("hosts.db2.userid"), None);
        assert_eq!(props.get("hosts.db1.userid.deeper"), None);
        assert_eq!(props.get("hosts.db1.userid"), Some(json!("tungsten")));
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut props = Properties::new();
        props.set("a", json!("scalar"));
        props.set("a.b", json!(1));
        assert_eq!(props.get("a"), Some(json!({"b": 1})));
    }

    #[test]
    fn test_set_null_or_empty_deletes_leaf() {
        let mut props = Properties::new();
        props.set("hosts.db1.userid", json!("tungsten"));
        props.set("hosts.db1.ports", json!([3306]));
        props.set("hosts.db1.userid", Value::Null);
        props.set("hosts.db1.ports", json!([]));
        assert_eq!(props.get("hosts.db1"), Some(json!({})));
    }

    #[test]
    fn test_override_and_include_precedence() {
        let mut props = Properties::new();
        props.set("hosts.db1", json!({"userid": "old", "port": 22}));

        let mut partial = Map::new();
        partial.insert("userid".into(), json!("new"));
        partial.insert("home".into(), json!("/opt"));

        props.include("hosts.db1", partial.clone());
        assert_eq!(props.get("hosts.db1.userid"), Some(json!("old")));
        assert_eq!(props.get("hosts.db1.home"), Some(json!("/opt")));

        props.override_with("hosts.db1", partial);
        assert_eq!(props.get("hosts.db1.userid"), Some(json!("new")));
        assert_eq!(props.get("hosts.db1.port"), Some(json!(22)));
    }

    #[test]
    fn test_append_deduplicates_in_order() {
        let mut props = Properties::new();
        props.append("list", vec![json!(1), json!(2)]);
        props.append("list", vec![json!(2), json!(3)]);
        assert_eq!(props.get("list"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_append_wraps_existing_scalar() {
        let mut props = Properties::new();
        props.set("members", json!("db1"));
        props.append("members", vec![json!("db2"), json!("db1")]);
        assert_eq!(props.get("members"), Some(json!(["db1", "db2"])));
    }

    #[test]
    fn test_fallback_prefers_host_then_dataservice() {
        let mut props = with_context("h1", "ds1");
        props.set("hosts.h1.x", json!("from-host"));
        assert_eq!(props.get("x"), None);
        assert_eq!(props.get_resolved("x").unwrap(), Some(json!("from-host")));

        let mut props = with_context("h1", "ds1");
        props.set("dataservices.ds1.x", json!("from-dataservice"));
        assert_eq!(props.get_resolved("x").unwrap(), Some(json!("from-dataservice")));
    }

    #[test]
    fn test_fallback_uses_composite_and_service_paths() {
        let mut props = with_context("h1", "ds1");
        props.set("managers.ds1_h1.manager_port", json!(7800));
        assert_eq!(props.get_resolved("manager_port").unwrap(), Some(json!(7800)));

        let mut props = Properties::new();
        props.set(DEPLOYMENT_SERVICE, json!("east"));
        props.set("replicationServices.east.thl_port", json!(2112));
        assert_eq!(props.get_resolved("thl_port").unwrap(), Some(json!(2112)));
    }

    #[test]
    fn test_fallback_requires_markers() {
        let mut props = Properties::new();
        props.set("hosts.h1.x", json!("from-host"));
        assert_eq!(props.get_resolved("x").unwrap(), None);
        assert_eq!(props.get_resolved("hosts.h2.x").unwrap(), None);
    }

    #[test]
    fn test_self_referencing_prompt_returns_none_and_clears_guard() {
        let prompt = Prompt::new("x", "Self referencing").default_with(|scope| {
            if let Some(seed) = scope.props.get("seed") {
                return Ok(Some(seed));
            }
            Ok(scope.props.get_resolved("x")?)
        });
        let registry = Arc::new(crate::core::prompts::PromptRegistry::new(
            PromptGroup::root().prompt(prompt),
        ));
        let mut props = Properties::new().with_prompts(registry);

        assert_eq!(props.get_resolved("x").unwrap(), None);
        assert!(!props.is_resolving("x"));
        assert!(!props.is_resolving("fallback:x"));

        props.set("seed", json!("ready"));
        assert_eq!(props.get_resolved("x").unwrap(), Some(json!("ready")));
    }

    #[test]
    fn test_resolver_toggle_disables_prompts() {
        let registry = Arc::new(crate::core::prompts::PromptRegistry::new(
            PromptGroup::root().prompt(Prompt::new("answer", "Answer").default_value(json!(42))),
        ));
        let mut props = Properties::new().with_prompts(registry);
        assert_eq!(props.get_resolved("answer").unwrap(), Some(json!(42)));
        props.use_resolver(false);
        assert_eq!(props.get_resolved("answer").unwrap(), None);
    }

    #[test]
    fn test_null_leaf_is_absent() {
        let registry = Arc::new(crate::core::prompts::PromptRegistry::new(
            PromptGroup::root().prompt(Prompt::new("answer", "Answer").default_value(json!(42))),
        ));
        let props = Properties::from_value(json!({
            "answer": null,
            "x": null,
            "deployment_host": "h1",
            "hosts": { "h1": { "x": "from-host" } }
        }))
        .with_prompts(registry);

        assert_eq!(props.get("answer"), None);
        assert_eq!(props.get_resolved("answer").unwrap(), Some(json!(42)));
        assert_eq!(props.get_resolved("x").unwrap(), Some(json!("from-host")));
    }

    #[test]
    fn test_template_value_formats() {
        let mut props = Properties::new();
        props.set("members", json!(["db1", "db2"]));
        props.set("port", json!(2112));
        props.set("nested", json!({"a": true}));
        assert_eq!(props.get_template_value("members").unwrap(), "db1,db2");
        assert_eq!(props.get_template_value("port").unwrap(), "2112");
        assert_eq!(props.get_template_value("nested").unwrap(), r#"{"a":true}"#);
        assert_eq!(props.get_template_value("missing").unwrap(), "");
    }

    #[test]
    fn test_comments_are_stripped_before_parsing() {
        let commented = "# generated by tpm\n{\n  # hosts\n  \"hosts\": {\"db1\": {\"userid\": \"t\"}}\n}\n";
        let plain = "{\n  \"hosts\": {\"db1\": {\"userid\": \"t\"}}\n}\n";
        assert_eq!(
            parse_document(commented, "a", false).unwrap(),
            parse_document(plain, "b", false).unwrap()
        );
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let result = parse_document("{ \"hosts\": ", "tungsten.cfg", true);
        assert!(matches!(result, Err(PropertiesError::InvalidJson { .. })));
    }

    #[test]
    fn test_legacy_format_requires_opt_in() {
        let legacy = "home_directory=/opt/continuent\nhosts[db1][userid]=tungsten\n";
        assert!(matches!(
            parse_document(legacy, "old.cfg", false),
            Err(PropertiesError::LegacyFormat { .. })
        ));
        let value = parse_document(legacy, "old.cfg", true).unwrap();
        assert_eq!(
            value,
            json!({"home_directory": "/opt/continuent", "hosts": {"db1": {"userid": "tungsten"}}})
        );
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("tungsten.cfg");

        let mut props = Properties::new();
        props.set("hosts.db1.userid", json!("tungsten"));
        props.set("dataservices.alpha.members", json!(["db1", "db2"]));
        props.store(&path).unwrap();

        let mut loaded = Properties::new();
        loaded.load(&path, false).unwrap();
        assert_eq!(loaded.props(), props.props());
    }

    proptest! {
        #[test]
        fn prop_set_then_get_returns_value(
            segments in proptest::collection::vec("[a-z]{1,6}", 1..5),
            value in proptest::num::i64::ANY,
        ) {
            let mut props = Properties::new();
            let key = PropertyKey::new(segments);
            props.set(&key, json!(value));
            prop_assert_eq!(props.get(&key), Some(json!(value)));
        }

        #[test]
        fn prop_append_never_duplicates(
            first in proptest::collection::vec(0i64..5, 0..8),
            second in proptest::collection::vec(0i64..5, 0..8),
        ) {
            let mut props = Properties::new();
            props.append("list", first.iter().map(|v| json!(v)).collect());
            props.append("list", second.iter().map(|v| json!(v)).collect());
            let stored = props.get("list").unwrap_or(json!([]));
            let items = stored.as_array().cloned().unwrap_or_default();
            for (i, item) in items.iter().enumerate() {
                prop_assert!(!items.iter().skip(i + 1).any(|other| other == item));
            }
        }
    }
}
