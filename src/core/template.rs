// src/core/template.rs

use crate::core::properties::{Properties, PropertiesError};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension marking a file under a template directory as a template.
pub const TEMPLATE_EXTENSION: &str = "tpl";

lazy_static! {
    // `@{key.path}`; `@@{` escapes a literal `@{`.
    static ref PLACEHOLDER: Regex = Regex::new(r"@(@?)\{([A-Za-z0-9_.\-]+)\}").unwrap();
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unable to read template '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to render '{template}': {source}")]
    Value {
        template: String,
        #[source]
        source: PropertiesError,
    },
    #[error("Unable to walk template directory '{path}': {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },
}

/// Replaces every `@{key.path}` in `template` with the property's template value.
pub fn render(template: &str, origin: &str, props: &Properties) -> Result<String, TemplateError> {
    let mut failure = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        if !caps[1].is_empty() {
            return format!("@{{{}}}", &caps[2]);
        }
        match props.get_template_value(&caps[2]) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });
    match failure {
        Some(source) => Err(TemplateError::Value {
            template: origin.to_string(),
            source,
        }),
        None => Ok(rendered.into_owned()),
    }
}

pub fn render_file(path: &Path, props: &Properties) -> Result<String, TemplateError> {
    let content = fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.display().to_string(),
        source,
    })?;
    render(&content, &path.display().to_string(), props)
}

/// A template found on the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    pub source: PathBuf,
    /// Output path relative to the install directory, without the extension.
    pub target: PathBuf,
}

/// Lists every template under `search_path`. When two directories provide the
/// same target, the earlier directory wins.
pub fn discover(search_path: &[PathBuf]) -> Result<Vec<TemplateFile>, TemplateError> {
    let mut found: Vec<TemplateFile> = Vec::new();
    for dir in search_path {
        if !dir.is_dir() {
            log::debug!("Template directory '{}' does not exist.", dir.display());
            continue;
        }
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| TemplateError::Walk {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION)
            {
                continue;
            }
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let target = relative.with_extension("");
            if found.iter().any(|t| t.target == target) {
                log::debug!("Template '{}' is shadowed.", path.display());
                continue;
            }
            found.push(TemplateFile {
                source: dunce::simplified(path).to_path_buf(),
                target,
            });
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholders_resolve_through_fallbacks() {
        let props = Properties::from_value(json!({
            "deployment_host": "db1",
            "hosts": { "db1": { "thl_port": 2112, "roles": ["master", "relay"] } },
            "svc": { "name": "alpha" }
        }));
        let out = render(
            "port=@{thl_port} roles=@{roles} svc=@{svc.name} missing=[@{nope}] raw=@@{svc.name}",
            "inline",
            &props,
        )
        .unwrap();
        assert_eq!(
            out,
            "port=2112 roles=master,relay svc=alpha missing=[] raw=@{svc.name}"
        );
    }

    #[test]
    fn test_discover_prefers_earlier_directories() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(first.path().join("conf")).unwrap();
        fs::create_dir_all(second.path().join("conf")).unwrap();
        fs::write(first.path().join("conf/static.properties.tpl"), "a").unwrap();
        fs::write(second.path().join("conf/static.properties.tpl"), "b").unwrap();
        fs::write(second.path().join("conf/wrapper.conf.tpl"), "c").unwrap();
        fs::write(second.path().join("conf/README"), "not a template").unwrap();

        let found = discover(&[first.path().to_path_buf(), second.path().to_path_buf()]).unwrap();
        let targets: Vec<_> = found.iter().map(|t| t.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                PathBuf::from("conf/static.properties"),
                PathBuf::from("conf/wrapper.conf")
            ]
        );
        assert!(found[0].source.starts_with(dunce::simplified(first.path())));
    }

    #[test]
    fn test_render_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tpl");
        fs::write(&path, "home=@{home_directory}\n").unwrap();
        let props = Properties::from_value(json!({ "home_directory": "/opt/c" }));
        assert_eq!(render_file(&path, &props).unwrap(), "home=/opt/c\n");
        assert!(matches!(
            render_file(&dir.path().join("missing.tpl"), &props),
            Err(TemplateError::Read { .. })
        ));
    }
}
