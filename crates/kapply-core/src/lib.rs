//! kapply Core - values merging and schema-less manifest decoding
//!
//! This crate provides the input side of an apply:
//! - `Values`: the parameter set, built by deep-merging ordered value files
//! - `ValuesMerger`: merge policy (replace or concatenate sequences)
//! - `GenericResource`: one decoded cluster resource without a compiled schema
//! - `parse_manifest`: rendered bytes to resources, with list flattening

pub mod error;
pub mod manifest;
pub mod values;

pub use error::{CoreError, Result};
pub use manifest::{GenericResource, ParsedItem, TypeRef, parse_manifest};
pub use values::{MergeOptions, Values, ValuesMerger, parse_set_values};
