// src/core/validators.rs

//! Reusable validation primitives for prompt values.
//!
//! A validator turns the raw text a user typed (on the command line or in an
//! interactive session) into the normalized JSON value that is stored in the
//! configuration tree, or explains why the text was rejected.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

lazy_static! {
    // RFC 1123 host names and dotted IPv4 addresses.
    static ref HOSTNAME_RE: Regex = Regex::new(
        r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
    static ref URI_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://\S+$").unwrap();
}

type CustomCheck = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// Validates and normalizes raw prompt input.
#[derive(Clone)]
pub enum Validator {
    /// Accepts any text as a string.
    Any,
    Integer,
    PositiveInteger,
    /// A TCP port between 1 and 65535.
    Port,
    /// `true/false`, `yes/no`, `on/off` and `1/0`, case-insensitive.
    Boolean,
    /// A file system path. `~` is expanded to the user's home directory.
    Filename,
    Hostname,
    Uri,
    /// A comma separated list, stored as a JSON array of strings.
    List,
    /// A regular expression the whole input must match, with a description
    /// used in error messages.
    Pattern(Regex, &'static str),
    Custom(CustomCheck),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Pattern(re, desc) => write!(f, "Pattern({}, {})", re.as_str(), desc),
            Validator::Custom(_) => write!(f, "Custom"),
            other => write!(f, "{}", other.describe()),
        }
    }
}

impl Validator {
    /// Builds a `Pattern` validator that accepts exactly one of `choices`.
    pub fn one_of(choices: &[&str], description: &'static str) -> Self {
        let alternation = choices
            .iter()
            .map(|c| regex::escape(c))
            .collect::<Vec<_>>()
            .join("|");
        let re = Regex::new(&format!("^(?:{})$", alternation))
            .expect("An escaped alternation is always a valid pattern");
        Validator::Pattern(re, description)
    }

    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        Validator::Custom(Arc::new(check))
    }

    /// A short, human readable description of what the validator accepts.
    pub fn describe(&self) -> &'static str {
        match self {
            Validator::Any => "any value",
            Validator::Integer => "an integer",
            Validator::PositiveInteger => "a positive integer",
            Validator::Port => "a port number",
            Validator::Boolean => "true or false",
            Validator::Filename => "a file name",
            Validator::Hostname => "a host name",
            Validator::Uri => "a URI",
            Validator::List => "a comma separated list",
            Validator::Pattern(_, desc) => desc,
            Validator::Custom(_) => "a custom value",
        }
    }

    /// Validates `raw` and returns the normalized value to store.
    pub fn validate(&self, raw: &str) -> Result<Value, String> {
        let trimmed = raw.trim();
        match self {
            Validator::Any => Ok(Value::String(raw.to_string())),
            Validator::Integer => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not {}", raw, self.describe())),
            Validator::PositiveInteger => match trimmed.parse::<u64>() {
                Ok(n) if n > 0 => Ok(Value::from(n)),
                _ => Err(format!("'{}' is not {}", raw, self.describe())),
            },
            Validator::Port => match trimmed.parse::<u16>() {
                Ok(n) if n > 0 => Ok(Value::from(n)),
                _ => Err(format!("'{}' is not {}", raw, self.describe())),
            },
            Validator::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not {}", raw, self.describe())),
            },
            Validator::Filename => {
                if trimmed.is_empty() || trimmed.contains('\0') {
                    return Err(format!("'{}' is not {}", raw, self.describe()));
                }
                Ok(Value::String(shellexpand::tilde(trimmed).into_owned()))
            }
            Validator::Hostname => {
                if trimmed.len() <= 253 && HOSTNAME_RE.is_match(trimmed) {
                    Ok(Value::String(trimmed.to_string()))
                } else {
                    Err(format!("'{}' is not {}", raw, self.describe()))
                }
            }
            Validator::Uri => {
                if URI_RE.is_match(trimmed) {
                    Ok(Value::String(trimmed.to_string()))
                } else {
                    Err(format!("'{}' is not {}", raw, self.describe()))
                }
            }
            Validator::List => Ok(Value::Array(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )),
            Validator::Pattern(re, desc) => {
                if re.is_match(trimmed) {
                    Ok(Value::String(trimmed.to_string()))
                } else {
                    Err(format!("'{}' is not {}", raw, desc))
                }
            }
            Validator::Custom(check) => check(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_validators() {
        assert_eq!(Validator::Integer.validate(" -4 "), Ok(json!(-4)));
        assert!(Validator::PositiveInteger.validate("0").is_err());
        assert_eq!(Validator::Port.validate("2112"), Ok(json!(2112)));
        assert!(Validator::Port.validate("70000").is_err());
    }

    #[test]
    fn test_boolean_accepts_common_spellings() {
        assert_eq!(Validator::Boolean.validate("YES"), Ok(json!(true)));
        assert_eq!(Validator::Boolean.validate("off"), Ok(json!(false)));
        assert!(Validator::Boolean.validate("maybe").is_err());
    }

    #[test]
    fn test_hostname_and_uri() {
        assert!(Validator::Hostname.validate("db1.example.com").is_ok());
        assert!(Validator::Hostname.validate("10.0.0.12").is_ok());
        assert!(Validator::Hostname.validate("-bad-").is_err());
        assert!(Validator::Hostname.validate("two words").is_err());
        assert!(Validator::Uri.validate("thl://db1:2112/").is_ok());
        assert!(Validator::Uri.validate("db1:2112").is_err());
    }

    #[test]
    fn test_list_splits_and_trims() {
        assert_eq!(
            Validator::List.validate("db1, db2,,db3"),
            Ok(json!(["db1", "db2", "db3"]))
        );
    }

    #[test]
    fn test_one_of_rejects_unknown_choice() {
        let v = Validator::one_of(&["mysql", "postgresql"], "a datasource type");
        assert_eq!(v.validate("mysql"), Ok(json!("mysql")));
        let err = v.validate("mongo").unwrap_err();
        assert!(err.contains("a datasource type"), "Error message was: {}", err);
    }
}
