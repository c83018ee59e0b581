use crate::{Error, Result};
use std::collections::HashMap;

/// Runtime parameters substituted into a config at load time.
///
/// Credentials never live in the config file: the file carries `${username}`
/// and `${password}` placeholders and the values arrive here, from CLI
/// `-P key=value` flags or from `PUNCH_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    /// Create empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse from CLI args like "key=value".
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            params.values.insert(key.to_string(), value.to_string());
        }
        Ok(params)
    }

    /// Fill unset params from environment variables with the given prefix;
    /// `PUNCH_USERNAME` becomes `username`. Explicit values win.
    pub fn overlay_env(mut self, prefix: &str) -> Self {
        for (key, value) in std::env::vars() {
            if let Some(rest) = key.strip_prefix(prefix) {
                self.values.entry(rest.to_lowercase()).or_insert(value);
            }
        }
        self
    }
}

/// Substitute `${var}` patterns in a string. Every placeholder must resolve.
pub fn substitute(template: &str, params: &Params) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(Error::Config(format!(
                "unterminated '${{' in '{template}'"
            )));
        };
        let name = &after[..end];
        let value = params.get(name).ok_or_else(|| {
            Error::Config(format!(
                "missing parameter '{name}' (pass -P {name}=... or set PUNCH_{})",
                name.to_uppercase()
            ))
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Recursively substitute params in a serde_yaml::Value.
pub fn substitute_value(value: &mut serde_yaml::Value, params: &Params) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute(s, params)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params)?;
            }
        }
        _ => {}
    }
    Ok(())
}
