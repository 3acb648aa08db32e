//! Sprig-style template filters
//!
//! Registered under the names manifests written for Go templates expect
//! (`toYaml`, `b64enc`, `trimPrefix`, ...).

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json_value(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

/// Usage: {{ resources | toYaml | nindent(8) }}
pub fn to_yaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json_value(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Usage: {{ config | toJson }}
pub fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json_value(&value)?).map_err(|e| invalid(e.to_string()))
}

pub fn to_pretty_json(value: Value) -> Result<String, Error> {
    serde_json::to_string_pretty(&to_json_value(&value)?).map_err(|e| invalid(e.to_string()))
}

/// Usage: {{ password | b64enc }}
pub fn b64enc(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64dec(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;

    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn display_string(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Usage: {{ image.tag | quote }}
pub fn quote(value: Value) -> String {
    let s = display_string(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn squote(value: Value) -> String {
    format!("'{}'", display_string(&value).replace('\'', "''"))
}

/// Indent every non-empty line
///
/// Usage: {{ labels | toYaml | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like `indent`, with a leading newline
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail when the value is undefined, none or an empty string
///
/// Usage: {{ image.repository | required("image.repository is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        return Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ));
    }
    if value.as_str().is_some_and(str::is_empty) {
        return Err(invalid(
            message.unwrap_or_else(|| "required value is empty".to_string()),
        ));
    }
    Ok(value)
}

/// Usage: {% if tolerations | empty %}
pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    match value.len() {
        Some(len) => len == 0,
        None => value.as_str().is_some_and(str::is_empty),
    }
}

/// Usage: {% if labels | hasKey("app") %}
pub fn has_key(value: Value, key: String) -> bool {
    value
        .get_attr(&key)
        .map(|v| !v.is_undefined())
        .unwrap_or(false)
}

pub fn keys(value: Value) -> Result<Vec<String>, Error> {
    let iter = value
        .try_iter()
        .map_err(|_| invalid("cannot get keys from non-mapping value"))?;
    Ok(iter
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect())
}

/// Deep merge, the argument wins
///
/// Usage: {{ defaultLabels | merge(labels) | toYaml }}
pub fn merge(base: Value, overlay: Value) -> Result<Value, Error> {
    let mut merged = to_json_value(&base)?;
    deep_merge(&mut merged, &to_json_value(&overlay)?);
    Ok(Value::from_serialize(&merged))
}

fn deep_merge(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Usage: checksum/config: {{ config | toJson | sha256sum }}
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Truncate to at most `length` characters
pub fn trunc(value: String, length: usize) -> String {
    if value.chars().count() <= length {
        value
    } else {
        value.chars().take(length).collect()
    }
}

pub fn trim_prefix(value: String, prefix: String) -> String {
    value
        .strip_prefix(prefix.as_str())
        .map(str::to_string)
        .unwrap_or(value)
}

pub fn trim_suffix(value: String, suffix: String) -> String {
    value
        .strip_suffix(suffix.as_str())
        .map(str::to_string)
        .unwrap_or(value)
}

/// Usage: {{ "ServiceAccount" | snakecase }} -> service_account
pub fn snakecase(value: String) -> String {
    let mut result = String::with_capacity(value.len() + value.len() / 4);
    let mut prev_upper = false;

    for (i, c) in value.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !prev_upper {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            prev_upper = true;
        } else if c == '-' || c == ' ' {
            result.push('_');
            prev_upper = false;
        } else {
            result.push(c);
            prev_upper = false;
        }
    }

    result
}

pub fn kebabcase(value: String) -> String {
    snakecase(value).replace('_', "-")
}
