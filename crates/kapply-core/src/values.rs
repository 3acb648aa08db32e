//! Parameter set handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// The parameter set a template is rendered against
///
/// Always a JSON object at the top level. Every top-level key becomes a
/// template variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ValuesRead {
            path: path.to_path_buf(),
            source,
        })?;
        decode_mapping(&content, path)
    }

    /// Parse values from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        decode_mapping(yaml, Path::new("<inline>"))
    }

    /// Deep merge another Values into this one, replacing sequences
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0, false);
    }

    /// Deep merge with an explicit policy
    pub fn merge_with(&mut self, overlay: &Values, options: MergeOptions) {
        deep_merge(&mut self.0, &overlay.0, options.recurse_arrays);
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.0, |current, key| current.as_object()?.get(key))
    }

    /// Top-level keys, used for "did you mean" hints
    pub fn keys(&self) -> Vec<&str> {
        self.0
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

fn decode_mapping(content: &str, path: &Path) -> Result<Values> {
    let value: JsonValue =
        serde_yaml::from_str(content).map_err(|source| CoreError::ValuesDecode {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        // An empty document is an empty parameter set
        JsonValue::Null => Ok(Values::new()),
        JsonValue::Object(_) => Ok(Values(value)),
        _ => Err(CoreError::ValuesNotMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// How overlapping sequences are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Concatenate sequences present in both sides instead of replacing
    pub recurse_arrays: bool,
}

/// Merges an ordered list of value files into one parameter set
///
/// Later files win field by field, not document by document.
#[derive(Debug, Clone, Default)]
pub struct ValuesMerger {
    options: MergeOptions,
}

impl ValuesMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Merge files in order, starting from an empty mapping
    pub fn merge_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<Values> {
        let mut merged = Values::new();
        for file in files {
            let overlay = Values::from_file(file)?;
            tracing::debug!(path = %file.as_ref().display(), "merging values file");
            merged.merge_with(&overlay, self.options);
        }
        Ok(merged)
    }

    /// Merge already-decoded values in order
    pub fn merge_all(&self, sources: impl IntoIterator<Item = Values>) -> Values {
        sources.into_iter().fold(Values::new(), |mut acc, v| {
            acc.merge_with(&v, self.options);
            acc
        })
    }
}

fn deep_merge(base: &mut JsonValue, overlay: &JsonValue, recurse_arrays: bool) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value, recurse_arrays),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (JsonValue::Array(base_items), JsonValue::Array(overlay_items)) if recurse_arrays => {
            base_items.extend(overlay_items.iter().cloned());
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert((*key).to_string(), new_value);
        } else {
            let entry = map
                .entry((*key).to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Parse --set arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg
            .split_once('=')
            .ok_or_else(|| CoreError::InvalidSetValue {
                message: format!("'{}' is not in key=value form", arg),
            })?;

        if key.is_empty() {
            return Err(CoreError::InvalidSetValue {
                message: format!("'{}' has an empty key", arg),
            });
        }

        values.set(key, parse_scalar(val));
    }

    Ok(values)
}

fn parse_scalar(val: &str) -> JsonValue {
    match val {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        _ => {
            if let Ok(num) = val.parse::<i64>() {
                JsonValue::Number(num.into())
            } else if let Some(num) = val
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                JsonValue::Number(num)
            } else if val.starts_with('[') || val.starts_with('{') {
                serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
            } else {
                JsonValue::String(val.to_string())
            }
        }
    }
}
