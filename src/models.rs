// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;

// --- PROPERTY KEYS ---

/// An ordered sequence of key segments addressing a node of the configuration tree.
///
/// Dotted strings are split on `.`, so `"hosts.db1.userid"` and
/// `["hosts", "db1", "userid"]` address the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PropertyKey(Vec<String>);

impl PropertyKey {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for PropertyKey {
    fn from(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl From<String> for PropertyKey {
    fn from(dotted: String) -> Self {
        Self::from(dotted.as_str())
    }
}

impl From<&String> for PropertyKey {
    fn from(dotted: &String) -> Self {
        Self::from(dotted.as_str())
    }
}

impl From<Vec<String>> for PropertyKey {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for PropertyKey {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PropertyKey {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&PropertyKey> for PropertyKey {
    fn from(key: &PropertyKey) -> Self {
        key.clone()
    }
}

// --- DEPLOYMENT METHODS ---

/// Tells the outer multi-host orchestrator whether a method may run
/// concurrently. The scheduler itself always runs one host sequentially.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelMode {
    /// Must not run concurrently with the same method anywhere else.
    None,
    /// May run concurrently, one invocation per replication service.
    ByService,
    /// May run concurrently across hosts.
    #[default]
    ByHost,
}

/// Ordering metadata for one unit of deployment work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub group_id: i32,
    pub weight: i32,
    pub parallel: ParallelMode,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, group_id: i32, weight: i32) -> Self {
        Self {
            name: name.into(),
            group_id,
            weight,
            parallel: ParallelMode::default(),
        }
    }

    pub fn parallel(mut self, mode: ParallelMode) -> Self {
        self.parallel = mode;
        self
    }
}

// --- MESSAGES ---

/// Severity of a user-facing message, ordered from most to least severe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageLevel {
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl MessageLevel {
    /// The prefix printed in front of console and log lines.
    pub fn prefix(self) -> &'static str {
        match self {
            MessageLevel::Error => "ERROR",
            MessageLevel::Warning => "WARN",
            MessageLevel::Notice => "NOTE",
            MessageLevel::Info => "INFO",
            MessageLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: MessageLevel,
    pub host: Option<String>,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{} >> {} >> {}", self.level.prefix(), host, self.text),
            None => write!(f, "{} >> {}", self.level.prefix(), self.text),
        }
    }
}

// --- COMMAND OUTPUT ---

/// The captured result of a finished local command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// --- SCHEDULER RESULTS ---

/// The aggregated result of one `DeploymentScheduler::run` call.
///
/// A run never raises: failures are recorded here and in the context's
/// message log, and the caller decides what to do with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub class_name: String,
    pub host: Option<String>,
    /// Methods that completed, in execution order.
    pub executed: Vec<String>,
    /// The method that was running when the run failed, if any.
    pub failed_method: Option<String>,
    pub errors: Vec<String>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_key_is_split_into_segments() {
        let key = PropertyKey::from("hosts.db1.userid");
        assert_eq!(key.segments(), ["hosts", "db1", "userid"]);
        assert_eq!(key.to_string(), "hosts.db1.userid");
        assert_eq!(key, PropertyKey::from(["hosts", "db1", "userid"]));
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let key = PropertyKey::from("hosts..db1.");
        assert_eq!(key.len(), 2);
        assert!(PropertyKey::from("").is_empty());
    }

    #[test]
    fn test_message_display_includes_host() {
        let message = Message {
            level: MessageLevel::Warning,
            host: Some("db1".to_string()),
            text: "disk almost full".to_string(),
        };
        assert_eq!(message.to_string(), "WARN >> db1 >> disk almost full");
    }
}
