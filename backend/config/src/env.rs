//! `${VAR_NAME}` substitution for config string values.
//!
//! Only uppercase `[A-Z_][A-Z0-9_]*` names are matched. `$${VAR}` escapes to a
//! literal `${VAR}`.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var regex"));

/// Error returned for a referenced but unset env var.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    substitute_value(value, &std::env::vars().collect(), "")
}

/// Substitute env vars from a provided map.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                out.insert(k.clone(), substitute_value(v, env, &child)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in ENV_VAR_PATTERN.captures_iter(s) {
        let whole = caps.get(0).expect("group 0 always present");
        out.push_str(&s[last..whole.start()]);
        let name = &caps[2];
        if !caps[1].is_empty() {
            out.push_str(&format!("${{{name}}}"));
        } else {
            match env.get(name) {
                Some(val) if !val.is_empty() => out.push_str(val),
                _ => bail!(MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                }),
            }
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_nested_var() {
        let v = json!({"swarm": {"agents": [{"host": "${HAROLD_HOST}"}]}});
        let result = resolve_env_vars_with(&v, &env(&[("HAROLD_HOST", "10.0.0.5")])).unwrap();
        assert_eq!(result["swarm"]["agents"][0]["host"], "10.0.0.5");
    }

    #[test]
    fn missing_var_names_path() {
        let v = json!({"swarm": {"discovery": {"subnet": "${SUBNET}"}}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SUBNET"));
        assert!(msg.contains("swarm.discovery.subnet"));
    }

    #[test]
    fn escaped_reference_is_literal() {
        let v = json!({"key": "$${KEEP_ME}"});
        let result = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(result["key"], "${KEEP_ME}");
    }

    #[test]
    fn resolve_templates_pass_through() {
        let v = json!({"url": "{{resolve harold bridge}}/health"});
        let result = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(result["url"], "{{resolve harold bridge}}/health");
    }
}
