//! Recursive template rendering based on MiniJinja

use kapply_core::Values;
use minijinja::value::ValueKind;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;

/// Default upper bound on render passes
pub const DEFAULT_MAX_PASSES: usize = 10;

/// Markers that mean the output still holds template syntax
const TEMPLATE_MARKERS: &[&str] = &["{{", "{%"];

/// Fully expanded template output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub bytes: Vec<u8>,

    /// Number of passes it took to converge (at least 1)
    pub passes: usize,
}

impl RenderOutput {
    pub fn as_str(&self) -> &str {
        // Rendered from a `String`, so always valid UTF-8
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }
}

pub struct EngineBuilder {
    strict: bool,
    max_passes: usize,
    temp_dir: Option<PathBuf>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict: true,
            max_passes: DEFAULT_MAX_PASSES,
            temp_dir: None,
        }
    }

    /// Fail on undefined variables (default: true)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Maximum number of passes before giving up, at least 1
    pub fn max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Directory for intermediate render artifacts
    ///
    /// Defaults to the system temp dir.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            strict: self.strict,
            max_passes: self.max_passes,
            temp_dir: self.temp_dir,
        }
    }
}

/// The template engine
///
/// Every top-level key of the parameter set is a template variable, so a
/// template reads `{{ namespace }}` or `{{ image.tag }}`.
#[derive(Debug, Clone)]
pub struct Engine {
    strict: bool,
    max_passes: usize,
    temp_dir: Option<PathBuf>,
}

impl Default for Engine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(if self.strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        });
        // Output is YAML, never HTML, and must match the source byte for byte
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);

        // Functions share the root namespace with parameters, so a missing
        // `env` or `list` parameter resolves to the function itself
        let strict = self.strict;
        env.set_formatter(move |out, state, value| {
            if value.kind() != ValueKind::Plain {
                return minijinja::escape_formatter(out, state, value);
            }
            if strict {
                return Err(Error::new(
                    ErrorKind::UndefinedError,
                    "value is a function, not a parameter",
                ));
            }
            Ok(())
        });

        env.add_filter("toYaml", filters::to_yaml);
        env.add_filter("toJson", filters::to_json);
        env.add_filter("toPrettyJson", filters::to_pretty_json);
        env.add_filter("b64enc", filters::b64enc);
        env.add_filter("b64dec", filters::b64dec);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("required", filters::required);
        env.add_filter("empty", filters::empty);
        env.add_filter("hasKey", filters::has_key);
        env.add_filter("keys", filters::keys);
        env.add_filter("merge", filters::merge);
        env.add_filter("sha256sum", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimPrefix", filters::trim_prefix);
        env.add_filter("trimSuffix", filters::trim_suffix);
        env.add_filter("snakecase", filters::snakecase);
        env.add_filter("kebabcase", filters::kebabcase);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("dig", functions::dig);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("env", functions::env);
        env.add_function("now", functions::now);
        env.add_function("printf", functions::printf);
        env.add_function("semverCompare", functions::semver_compare);

        env
    }

    /// Render a template string once
    pub fn render_string(&self, template: &str, values: &Values, template_name: &str) -> Result<String> {
        let to_error = |e| {
            EngineError::Template(TemplateError::from_minijinja(
                e,
                template_name,
                template,
                Some(values.inner()),
            ))
        };

        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(to_error)?;
        let tmpl = env.get_template(template_name).map_err(to_error)?;

        tmpl.render(values.inner()).map_err(to_error)
    }

    /// Render a template file until no template markers remain
    ///
    /// Each intermediate pass is written to a temporary file that is removed
    /// as soon as the next pass has read it, or when rendering fails.
    pub fn render_file(&self, path: &Path, values: &Values) -> Result<RenderOutput> {
        let mut source = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut template_name = path.display().to_string();
        let mut _artifact: Option<NamedTempFile> = None;

        for pass in 1..=self.max_passes {
            let rendered = self.render_string(&source, values, &template_name)?;

            if !has_template_markers(&rendered) {
                tracing::debug!(path = %path.display(), pass, "template converged");
                return Ok(RenderOutput {
                    bytes: rendered.into_bytes(),
                    passes: pass,
                });
            }

            if pass == self.max_passes {
                break;
            }

            let artifact = self.write_artifact(&rendered)?;
            tracing::debug!(
                path = %path.display(),
                pass,
                artifact = %artifact.path().display(),
                "output still contains template syntax, rendering again"
            );

            source = fs::read_to_string(artifact.path()).map_err(|source| EngineError::Io {
                path: artifact.path().to_path_buf(),
                source,
            })?;
            template_name = format!("{} (pass {})", path.display(), pass + 1);
            // Replacing the previous artifact deletes it
            _artifact = Some(artifact);
        }

        Err(EngineError::NotConverged {
            path: path.to_path_buf(),
            passes: self.max_passes,
        })
    }

    /// Write an intermediate pass, falling back to the working directory
    /// when the temp dir is not writable
    fn write_artifact(&self, contents: &str) -> Result<NamedTempFile> {
        let primary = self.temp_dir.clone().unwrap_or_else(std::env::temp_dir);

        match create_artifact(&primary, contents) {
            Ok(file) => Ok(file),
            Err(err) => {
                tracing::warn!(
                    dir = %primary.display(),
                    error = %err,
                    "temp dir unusable, writing render artifact to working directory"
                );
                let fallback = PathBuf::from(".");
                create_artifact(&fallback, contents).map_err(|source| EngineError::Artifact {
                    dir: fallback,
                    source,
                })
            }
        }
    }
}

fn create_artifact(dir: &Path, contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("kapply-render-")
        .suffix(".yaml")
        .tempfile_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// True if the text still contains `{{` or `{%`
pub fn has_template_markers(text: &str) -> bool {
    TEMPLATE_MARKERS.iter().any(|marker| text.contains(marker))
}
