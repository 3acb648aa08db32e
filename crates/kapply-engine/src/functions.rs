//! Global template functions

use indexmap::IndexMap;
use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, Value};
use semver::{Version, VersionReq};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Abort rendering with a message
///
/// Usage: {{ fail("replicas must be positive") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Build a mapping from alternating keys and values
///
/// Usage: {{ dict("app", name, "tier", "web") | toYaml }}
pub fn dict(args: Rest<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(invalid(
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = IndexMap::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("dict keys must be strings"))?;
        map.insert(key.to_string(), pair[1].clone());
    }

    Ok(Value::from_iter(map))
}

pub fn list(args: Rest<Value>) -> Value {
    Value::from(args.0)
}

/// Attribute lookup with a default
///
/// Usage: {{ get(resources, "limits", "none") }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// Walk a key path, the last argument is the default
///
/// Usage: {{ dig(ingress, "tls", "secretName", "") }}
pub fn dig(obj: Value, keys_and_default: Rest<Value>) -> Result<Value, Error> {
    let args: &[Value] = &keys_and_default;
    let Some((default, keys)) = args.split_last() else {
        return Err(invalid("dig requires at least one key and a default value"));
    };

    let mut current = obj;
    for key in keys {
        let next = match (key.as_str(), key.as_i64()) {
            (Some(k), _) => current.get_attr(k),
            (None, Some(index)) => current.get_item(&Value::from(index)),
            _ => return Ok(default.clone()),
        };
        match next {
            Ok(v) if !v.is_undefined() && !v.is_none() => current = v,
            _ => return Ok(default.clone()),
        }
    }

    Ok(current)
}

/// First argument that is neither undefined, none nor an empty string
pub fn coalesce(args: Rest<Value>) -> Value {
    args.0
        .into_iter()
        .find(|arg| {
            !arg.is_undefined() && !arg.is_none() && !arg.as_str().is_some_and(str::is_empty)
        })
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("Always", "IfNotPresent", image.tag == "latest") }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() {
        true_val
    } else {
        false_val
    }
}

/// Environment variable of the rendering process, empty when unset
///
/// Usage: {{ env("CI_COMMIT_SHA") }}
pub fn env(name: String) -> String {
    std::env::var(name).unwrap_or_default()
}

pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Printf-style formatting with %s, %d, %f, %v and %%
///
/// Usage: {{ printf("%s-%s", name, env) }}
pub fn printf(format: String, args: Rest<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len() + args.len() * 8);
    let mut chars = format.chars();
    let mut remaining = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let Some(spec) = chars.next() else {
            result.push('%');
            break;
        };
        if spec == '%' {
            result.push('%');
            continue;
        }

        let arg = remaining
            .next()
            .ok_or_else(|| invalid("not enough arguments for format string"))?;
        match spec {
            'd' => match arg.as_i64() {
                Some(n) => result.push_str(&n.to_string()),
                None => result.push_str(&arg.to_string()),
            },
            'f' => match f64::try_from(arg.clone()) {
                Ok(n) => result.push_str(&format!("{:.6}", n)),
                Err(_) => result.push_str(&arg.to_string()),
            },
            _ => match arg.as_str() {
                Some(s) => result.push_str(s),
                None => result.push_str(&arg.to_string()),
            },
        }
    }

    Ok(result)
}

/// Parse a version, tolerating a `v` prefix and missing minor/patch parts
fn parse_version(raw: &str) -> Result<Version, Error> {
    let cleaned = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(cleaned) {
        return Ok(version);
    }

    let core = cleaned.split(['-', '+']).next().unwrap_or(cleaned);
    let mut parts = core.split('.').map(str::parse::<u64>);
    let mut next = |required: bool| match parts.next() {
        Some(Ok(n)) => Ok(n),
        None if !required => Ok(0),
        _ => Err(invalid(format!("invalid version: {}", raw))),
    };

    let major = next(true)?;
    let minor = next(false)?;
    let patch = next(false)?;
    Ok(Version::new(major, minor, patch))
}

/// Check a version against a constraint
///
/// Usage: {% if semverCompare(">=1.25.0", kubeVersion) %}
pub fn semver_compare(constraint: String, version: String) -> Result<bool, Error> {
    let version = parse_version(&version)?;
    let req = VersionReq::parse(constraint.trim())
        .map_err(|e| invalid(format!("invalid constraint '{}': {}", constraint, e)))?;

    // Provider builds such as 1.29.4-gke.100 compare as their release
    let release = Version::new(version.major, version.minor, version.patch);
    Ok(req.matches(&version) || req.matches(&release))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest(values: Vec<Value>) -> Rest<Value> {
        Rest(values)
    }

    #[test]
    fn test_fail() {
        let err = fail("stop here".to_string()).unwrap_err();
        assert!(err.to_string().contains("stop here"));
    }

    #[test]
    fn test_dict() {
        let value = dict(rest(vec![
            Value::from("app"),
            Value::from("web"),
            Value::from("replicas"),
            Value::from(2),
        ]))
        .unwrap();
        assert_eq!(value.get_attr("app").unwrap(), Value::from("web"));
        assert_eq!(value.get_attr("replicas").unwrap(), Value::from(2));
    }

    #[test]
    fn test_dict_rejects_odd_arguments() {
        assert!(dict(rest(vec![Value::from("key")])).is_err());
        assert!(dict(rest(vec![Value::from(1), Value::from(2)])).is_err());
    }

    #[test]
    fn test_get() {
        let obj = Value::from_serialize(serde_json::json!({"a": 1}));
        assert_eq!(get(obj.clone(), "a".to_string(), None), Value::from(1));
        assert_eq!(
            get(obj, "b".to_string(), Some(Value::from("x"))),
            Value::from("x")
        );
    }

    #[test]
    fn test_dig() {
        let obj = Value::from_serialize(serde_json::json!({"a": {"b": [10, 20]}}));
        let found = dig(
            obj.clone(),
            rest(vec![Value::from("a"), Value::from("b"), Value::from(1), Value::from(0)]),
        )
        .unwrap();
        assert_eq!(found, Value::from(20));

        let missing = dig(
            obj,
            rest(vec![Value::from("a"), Value::from("c"), Value::from("fallback")]),
        )
        .unwrap();
        assert_eq!(missing, Value::from("fallback"));

        assert!(dig(Value::UNDEFINED, rest(vec![])).is_err());
    }

    #[test]
    fn test_coalesce() {
        let picked = coalesce(rest(vec![
            Value::UNDEFINED,
            Value::from(""),
            Value::from("second"),
        ]));
        assert_eq!(picked, Value::from("second"));
        assert!(coalesce(rest(vec![])).is_undefined());
    }

    #[test]
    fn test_ternary() {
        assert_eq!(
            ternary(Value::from("yes"), Value::from("no"), Value::from(true)),
            Value::from("yes")
        );
        assert_eq!(
            ternary(Value::from("yes"), Value::from("no"), Value::from(false)),
            Value::from("no")
        );
    }

    #[test]
    fn test_env_unset_is_empty() {
        assert_eq!(env("KAPPLY_TEST_SURELY_UNSET_VARIABLE".to_string()), "");
    }

    #[test]
    fn test_printf() {
        let out = printf(
            "%s-%d (100%%)".to_string(),
            rest(vec![Value::from("svc"), Value::from(3)]),
        )
        .unwrap();
        assert_eq!(out, "svc-3 (100%)");
        assert!(printf("%s %s".to_string(), rest(vec![Value::from("one")])).is_err());
    }

    #[test]
    fn test_semver_compare() {
        assert!(semver_compare(">=1.25.0".to_string(), "v1.31.2".to_string()).unwrap());
        assert!(!semver_compare("<1.20".to_string(), "1.31".to_string()).unwrap());
        assert!(semver_compare(">=1.21.0-0".to_string(), "1.29.4-gke.100".to_string()).unwrap());
        assert!(semver_compare(">=1".to_string(), "garbage".to_string()).is_err());
    }
}
