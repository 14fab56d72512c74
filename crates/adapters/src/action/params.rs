// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action parameters with placeholder substitution
//!
//! String parameters may reference other parameters as `<name>`. The
//! `<hostname>` placeholder resolves to the `host` parameter. Only scalar
//! parameters (strings, numbers, booleans) are substituted; unknown
//! placeholders are left as written.
//!
//! JSON payloads use typed placeholders instead, so the result stays valid
//! JSON: `<string_name>`, `<number_name>`, `<boolean_name>`, `<json_name>`
//! and `<array_name>`.

use super::ActionError;
use serde_json::Value;
use std::collections::BTreeMap;

const HOST_KEY: &str = "host";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A scalar parameter rendered as text, with placeholders substituted
    pub fn string(&self, key: &str) -> Result<Option<String>, ActionError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(self.substitute(s))),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ActionError::InvalidParams(format!(
                "'{}' must be a string",
                key
            ))),
        }
    }

    pub fn require(&self, key: &str) -> Result<String, ActionError> {
        self.string(key)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ActionError::InvalidParams(format!("missing '{}'", key)))
    }

    pub fn port(&self, key: &str) -> Result<Option<u16>, ActionError> {
        let Some(text) = self.string(key)? else {
            return Ok(None);
        };
        text.parse()
            .map(Some)
            .map_err(|_| ActionError::InvalidParams(format!("'{}' is not a port: {}", key, text)))
    }

    /// A table of scalar values, e.g. environment variables or headers
    pub fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>, ActionError> {
        let Some(value) = self.values.get(key) else {
            return Ok(BTreeMap::new());
        };
        let Value::Object(map) = value else {
            return Err(ActionError::InvalidParams(format!(
                "'{}' must be a table",
                key
            )));
        };
        map.iter()
            .map(|(k, v)| {
                let text = scalar_text(v).ok_or_else(|| {
                    ActionError::InvalidParams(format!("'{}.{}' must be a scalar", key, k))
                })?;
                Ok((k.clone(), self.substitute(&text)))
            })
            .collect()
    }

    /// Replace `<hostname>` and `<name>` placeholders in `text`
    pub fn substitute(&self, text: &str) -> String {
        let mut result = text.to_string();
        if let Some(Value::String(host)) = self.values.get(HOST_KEY) {
            result = result.replace("<hostname>", host);
        }
        for (key, value) in &self.values {
            if let Some(replacement) = scalar_text(value) {
                result = result.replace(&format!("<{}>", key), &replacement);
            }
        }
        result
    }

    /// Replace typed placeholders in a JSON document
    ///
    /// Fails if a value cannot be converted to the placeholder's type or if
    /// the result is not valid JSON.
    pub fn substitute_json(&self, text: &str) -> Result<String, ActionError> {
        let mut result = text.to_string();
        let mut all: Vec<(&str, &Value)> = self.values.iter().map(|(k, v)| (k.as_str(), v)).collect();
        if let Some(host) = self.values.get(HOST_KEY) {
            all.push(("hostname", host));
        }

        for (key, value) in all {
            for kind in ["string", "number", "boolean", "json", "array"] {
                let placeholder = format!("<{}_{}>", kind, key);
                if !result.contains(&placeholder) {
                    continue;
                }
                let replacement = typed_json(kind, value).ok_or_else(|| {
                    ActionError::InvalidParams(format!(
                        "parameter '{}' cannot be used as {}",
                        key, placeholder
                    ))
                })?;
                result = result.replace(&placeholder, &replacement);
            }
        }

        serde_json::from_str::<Value>(&result).map_err(|e| {
            ActionError::InvalidParams(format!("payload is not valid JSON after substitution: {}", e))
        })?;
        Ok(result)
    }
}

impl From<BTreeMap<String, Value>> for Params {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self::new(values)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn typed_json(kind: &str, value: &Value) -> Option<String> {
    match (kind, value) {
        ("string", v) => scalar_text(v).map(|s| Value::String(s).to_string()),

        ("number", Value::Number(n)) => Some(n.to_string()),
        ("number", Value::String(s)) => {
            let s = s.trim();
            if s.contains('.') {
                s.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(|n| n.to_string())
            } else {
                s.parse::<i64>().ok().map(|n| n.to_string())
            }
        }

        ("boolean", Value::Bool(b)) => Some(b.to_string()),
        ("boolean", v) => match scalar_text(v)?.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some("true".to_string()),
            "false" | "0" | "no" => Some("false".to_string()),
            _ => None,
        },

        ("json", Value::Object(_)) => Some(value.to_string()),
        ("array", Value::Array(_)) => Some(value.to_string()),
        ("json" | "array", Value::String(s)) => {
            let parsed: Value = serde_json::from_str(s).ok()?;
            let matches = match kind {
                "json" => parsed.is_object(),
                _ => parsed.is_array(),
            };
            matches.then(|| s.clone())
        }

        _ => None,
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
