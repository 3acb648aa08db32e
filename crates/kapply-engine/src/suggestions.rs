//! Fuzzy "did you mean" suggestions for template errors
//!
//! Candidates come from three places: the registered filters, the registered
//! functions, and the keys of the parameter set the template was rendered with.

use serde_json::Value as JsonValue;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters registered by the engine, plus the MiniJinja builtins
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toYaml",
    "toJson",
    "toPrettyJson",
    "b64enc",
    "b64dec",
    "quote",
    "squote",
    "indent",
    "nindent",
    "required",
    "empty",
    "hasKey",
    "keys",
    "merge",
    "sha256sum",
    "trunc",
    "trimPrefix",
    "trimSuffix",
    "snakecase",
    "kebabcase",
    // MiniJinja builtins
    "default",
    "upper",
    "lower",
    "title",
    "capitalize",
    "replace",
    "trim",
    "join",
    "first",
    "last",
    "length",
    "reverse",
    "sort",
    "unique",
    "map",
    "select",
    "reject",
    "selectattr",
    "rejectattr",
    "dictsort",
    "items",
    "int",
    "float",
    "round",
    "string",
    "list",
    "bool",
    "tojson",
    "urlencode",
];

/// Functions registered by the engine, plus the MiniJinja builtins
pub const AVAILABLE_FUNCTIONS: &[&str] = &[
    "fail",
    "dict",
    "list",
    "get",
    "dig",
    "coalesce",
    "ternary",
    "env",
    "now",
    "printf",
    "semverCompare",
    // MiniJinja builtins
    "range",
    "namespace",
];

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub text: String,
    /// Levenshtein distance, lower is better
    pub distance: usize,
}

/// Closest candidates within [`MAX_SUGGESTION_DISTANCE`], best first
///
/// Exact matches are not suggestions and are skipped.
pub fn find_closest_matches(input: &str, candidates: &[&str], max_results: usize) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = strsim::levenshtein(input, candidate);
            (distance > 0 && distance <= MAX_SUGGESTION_DISTANCE).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
            })
        })
        .collect();

    suggestions.sort_by_key(|s| s.distance);
    suggestions.truncate(max_results);
    suggestions
}

fn did_you_mean(matches: &[Suggestion], prefix: &str) -> String {
    let quoted: Vec<String> = matches
        .iter()
        .map(|m| format!("`{}{}`", prefix, m.text))
        .collect();
    format!("Did you mean {}?", quoted.join(" or "))
}

/// Suggest a parameter for an undefined variable or key path
///
/// `path` is the expression as written, e.g. `image.tgs`. The parameter set is
/// walked until the path breaks, and the missing segment is matched against the
/// keys available at that level.
pub fn suggest_undefined_variable(path: &str, parameters: Option<&JsonValue>) -> Option<String> {
    let parameters = parameters?;
    let mut current = parameters;
    let mut walked: Vec<&str> = Vec::new();

    for segment in path.split('.').map(str::trim) {
        match current.get(segment) {
            Some(next) => {
                walked.push(segment);
                current = next;
            }
            None => {
                let available: Vec<&str> = current
                    .as_object()?
                    .keys()
                    .map(String::as_str)
                    .collect();
                let prefix = if walked.is_empty() {
                    String::new()
                } else {
                    format!("{}.", walked.join("."))
                };

                let matches = find_closest_matches(segment, &available, 3);
                return Some(if matches.is_empty() {
                    format!(
                        "`{}{}` is not defined. Available keys: {}",
                        prefix,
                        segment,
                        available.join(", ")
                    )
                } else {
                    did_you_mean(&matches, &prefix)
                });
            }
        }
    }

    None
}

pub fn suggest_unknown_filter(filter_name: &str) -> String {
    let matches = find_closest_matches(filter_name, AVAILABLE_FILTERS, 3);
    if matches.is_empty() {
        format!(
            "Unknown filter `{}`. Common filters: toYaml, toJson, b64enc, quote, default, nindent",
            filter_name
        )
    } else {
        did_you_mean(&matches, "")
    }
}

pub fn suggest_unknown_function(func_name: &str) -> String {
    let matches = find_closest_matches(func_name, AVAILABLE_FUNCTIONS, 3);
    if matches.is_empty() {
        format!(
            "Unknown function `{}`. Available functions: {}",
            func_name,
            AVAILABLE_FUNCTIONS.join(", ")
        )
    } else {
        did_you_mean(&matches, "")
    }
}

/// Extract the first quoted name from an error message
///
/// Handles backticks, single and double quotes.
pub fn extract_quoted_name(msg: &str) -> Option<String> {
    for quote in ['`', '\'', '"'] {
        if let Some(start) = msg.find(quote) {
            let rest = &msg[start + quote.len_utf8()..];
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].to_string());
            }
        }
    }
    None
}
