//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use thiserror::Error;

use crate::suggestions::{
    extract_quoted_name, suggest_undefined_variable, suggest_unknown_filter,
    suggest_unknown_function,
};

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error("could not read template {}: {source}", path.display())]
    #[diagnostic(code(kapply::template::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write render artifact in {}: {source}", dir.display())]
    #[diagnostic(
        code(kapply::template::artifact),
        help("set a writable temp directory with TMPDIR")
    )]
    Artifact {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {} did not converge after {passes} passes", path.display())]
    #[diagnostic(
        code(kapply::template::not_converged),
        help("a parameter probably renders to template syntax that expands to itself")
    )]
    NotConverged { path: PathBuf, passes: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

/// Template error with source location and a suggested fix
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(kapply::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Convert a MiniJinja error
    ///
    /// `parameters` is the root context; when present, undefined variables
    /// get a closest-key suggestion.
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
        parameters: Option<&JsonValue>,
    ) -> Self {
        let kind = categorize(&err);
        let expression = err
            .range()
            .and_then(|range| template_source.get(range))
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
            .map(str::to_string)
            .or_else(|| {
                err.line()
                    .and_then(|line| expression_on_line(template_source, line))
            });

        let span = err
            .range()
            .map(|range| SourceSpan::new(range.start.into(), range.len()))
            .or_else(|| err.line().and_then(|line| line_span(template_source, line)));

        let suggestion = suggest(&err, kind, expression.as_deref(), parameters);

        let message = match (kind, expression.as_deref()) {
            (TemplateErrorKind::UndefinedVariable, Some(expr)) => {
                format!("undefined variable `{}`", variable_path(expr))
            }
            _ => err
                .to_string()
                .replace("invalid operation: ", "")
                .replace("syntax error: ", "")
                .replace("undefined value", "undefined variable"),
        };

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

/// `image.tag | upper` -> `image.tag`
fn variable_path(expression: &str) -> &str {
    expression.split('|').next().unwrap_or(expression).trim()
}

/// Leading identifier of a string, e.g. `toYml(4)` -> `toYml`
fn identifier(text: &str) -> Option<String> {
    let name: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

fn suggest(
    err: &minijinja::Error,
    kind: TemplateErrorKind,
    expression: Option<&str>,
    parameters: Option<&JsonValue>,
) -> Option<String> {
    let msg = err.to_string();

    match kind {
        TemplateErrorKind::UndefinedVariable => {
            let path = expression.map(variable_path)?;
            suggest_undefined_variable(path, parameters).or_else(|| {
                Some(format!(
                    "`{}` is not defined. Check spelling or use `| default(\"fallback\")`.",
                    path
                ))
            })
        }
        TemplateErrorKind::UnknownFilter => {
            let name = expression
                .and_then(|expr| expr.rsplit('|').next())
                .and_then(identifier)
                .or_else(|| extract_quoted_name(&msg))?;
            Some(suggest_unknown_filter(&name))
        }
        TemplateErrorKind::UnknownFunction => {
            let name = expression
                .and_then(identifier)
                .or_else(|| extract_quoted_name(&msg))?;
            Some(suggest_unknown_function(&name))
        }
        TemplateErrorKind::SyntaxError => Some(
            "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements, `{# #}` for comments"
                .to_string(),
        ),
        TemplateErrorKind::TypeError if msg.contains("not iterable") => Some(
            "Mappings iterate with `| dictsort`: `{% for key, value in obj | dictsort %}`"
                .to_string(),
        ),
        _ => None,
    }
}

/// First `{{ ... }}` expression on a (1-based) line
fn expression_on_line(source: &str, line_num: usize) -> Option<String> {
    let line = source.lines().nth(line_num.checked_sub(1)?)?;
    let start = line.find("{{")? + 2;
    let end = start + line[start..].find("}}")?;
    let expr = line[start..end].trim_matches(|c: char| c.is_whitespace() || c == '-');
    (!expr.is_empty()).then(|| expr.to_string())
}

/// Span covering a whole (1-based) line
fn line_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}
