// src/state.rs

use crate::core::prompts::PromptRegistry;
use crate::core::properties::{Properties, PropertiesError, parse_document};
use serde_json::{Map, Value};
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The explicit configuration file of one command invocation.
///
/// Reads go through `Deref`. The first mutable access takes a snapshot, and
/// [`ConfigSession::save`] only writes when the tree differs from it. The
/// per-user defaults are kept apart so they never end up in the file.
pub struct ConfigSession {
    path: PathBuf,
    explicit: Properties,
    defaults: Map<String, Value>,
    original: Option<Value>,
    existed: bool,
}

impl ConfigSession {
    /// Loads `path` (an absent file is an empty configuration) and the
    /// optional per-user defaults file.
    pub fn open(path: &Path, defaults_path: Option<&Path>, allow_legacy: bool) -> Result<Self, PropertiesError> {
        let mut explicit = Properties::new();
        let existed = path.is_file();
        if existed {
            explicit.load(path, allow_legacy)?;
        } else {
            log::debug!("'{}' does not exist yet; starting empty.", path.display());
        }

        let defaults = match defaults_path {
            Some(p) if p.is_file() => {
                let content = fs::read_to_string(p)?;
                match parse_document(&content, &p.display().to_string(), allow_legacy)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            }
            _ => Map::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            explicit,
            defaults,
            original: None,
            existed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.existed
    }

    /// The configuration a deployment sees: the explicit tree with the user
    /// defaults included underneath it, and the prompt registry attached.
    pub fn effective(&self, prompts: Arc<PromptRegistry>) -> Properties {
        let mut props = self.explicit.clone().with_prompts(prompts);
        if !self.defaults.is_empty() {
            props.include(Vec::<String>::new(), self.defaults.clone());
        }
        props
    }

    pub fn needs_saving(&self) -> bool {
        match &self.original {
            None => false,
            Some(original) => !self.existed || original != self.explicit.props(),
        }
    }

    /// Writes the file if it changed. Returns whether anything was written.
    pub fn save(&mut self) -> Result<bool, PropertiesError> {
        if !self.needs_saving() {
            return Ok(false);
        }
        self.explicit.store(&self.path)?;
        self.original = Some(self.explicit.props().clone());
        self.existed = true;
        Ok(true)
    }
}

impl Deref for ConfigSession {
    type Target = Properties;

    fn deref(&self) -> &Self::Target {
        &self.explicit
    }
}

impl DerefMut for ConfigSession {
    fn deref_mut(&mut self) -> &mut Properties {
        if self.original.is_none() {
            self.original = Some(self.explicit.props().clone());
        }
        &mut self.explicit
    }
}
