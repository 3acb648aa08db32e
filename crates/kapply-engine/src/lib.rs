//! kapply Engine - recursive MiniJinja rendering
//!
//! Renders a template file against a parameter set, re-rendering the output
//! for as long as it still contains template syntax (up to a pass limit).

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod suggestions;

pub use engine::{DEFAULT_MAX_PASSES, Engine, EngineBuilder, RenderOutput, has_template_markers};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
