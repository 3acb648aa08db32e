//! Schema-less manifest decoding
//!
//! Rendered output is decoded into [`GenericResource`]s without knowing the
//! resource kinds in advance. Documents that carry an `items` sequence are
//! flattened into their items, using an explicit worklist so deeply nested
//! lists cannot exhaust the stack.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::error::{CoreError, Result};

/// Kind marker for the generic list wrapper
const LIST_KIND: &str = "List";

/// Metadata fields assigned by the server that must not be sent back
const SERVER_MANAGED_FIELDS: &[&str] = &["selfLink", "resourceVersion", "uid"];

const OWNER_REFERENCES: &str = "ownerReferences";

/// Outcome of decoding one flattened item
///
/// An invalid item does not invalidate its siblings.
pub type ParsedItem = std::result::Result<GenericResource, CoreError>;

/// `apiVersion` and `kind` of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub api_version: String,
    pub kind: String,
}

impl TypeRef {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    /// API group, empty for the core group
    ///
    /// - "apps/v1" -> "apps"
    /// - "v1" -> ""
    pub fn group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    pub fn version(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(_, version)| version)
            .unwrap_or(&self.api_version)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version, self.kind)
    }
}

/// One cluster resource, decoded without a compiled schema
///
/// The type (`apiVersion`/`kind`) is fixed at decode time. Everything other
/// than the type and `metadata` lives untouched in `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericResource {
    type_ref: TypeRef,
    metadata: Map<String, JsonValue>,
    fields: Map<String, JsonValue>,
}

impl GenericResource {
    /// Decode a resource from a JSON value
    ///
    /// `location` names the document in errors (e.g. "document 0.items[2]").
    pub fn from_value(value: JsonValue, location: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidResource {
            location: location.to_string(),
            message: message.to_string(),
        };

        let JsonValue::Object(mut fields) = value else {
            return Err(invalid("expected a mapping"));
        };

        let api_version = take_string(&mut fields, "apiVersion")
            .ok_or_else(|| invalid("missing apiVersion"))?;
        let kind = take_string(&mut fields, "kind").ok_or_else(|| invalid("missing kind"))?;

        let metadata = match fields.remove("metadata") {
            Some(JsonValue::Object(metadata)) => metadata,
            _ => return Err(invalid(&format!("{} is missing metadata.name", kind))),
        };
        let has_name = metadata
            .get("name")
            .and_then(JsonValue::as_str)
            .is_some_and(|name| !name.is_empty());
        if !has_name {
            return Err(invalid(&format!("{} is missing metadata.name", kind)));
        }

        Ok(Self {
            type_ref: TypeRef { api_version, kind },
            metadata,
            fields,
        })
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn api_version(&self) -> &str {
        &self.type_ref.api_version
    }

    pub fn kind(&self) -> &str {
        &self.type_ref.kind
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    /// Namespace set on the document itself, if any
    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace").filter(|ns| !ns.is_empty())
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata
            .insert("namespace".to_string(), JsonValue::String(namespace.to_string()));
    }

    pub fn owner_references(&self) -> Option<&JsonValue> {
        self.metadata.get(OWNER_REFERENCES)
    }

    /// Remove server-assigned metadata before submission
    ///
    /// Owner references are dropped unless `keep_owner_references` is set.
    pub fn strip_server_fields(&mut self, keep_owner_references: bool) {
        for field in SERVER_MANAGED_FIELDS {
            self.metadata.remove(*field);
        }
        if !keep_owner_references {
            self.metadata.remove(OWNER_REFERENCES);
        }
    }

    /// Human-readable reference, e.g. `Deployment team-a/web`
    pub fn display_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{} {}/{}", self.kind(), ns, self.name()),
            None => format!("{} {}", self.kind(), self.name()),
        }
    }

    /// Full JSON representation with the decoded type
    pub fn to_value(&self) -> JsonValue {
        self.to_value_as(&self.type_ref)
    }

    /// JSON representation stamped with another type
    ///
    /// Used to build patch bodies; the resource itself keeps its own type.
    pub fn to_value_as(&self, type_ref: &TypeRef) -> JsonValue {
        let mut object = Map::with_capacity(self.fields.len() + 3);
        object.insert(
            "apiVersion".to_string(),
            JsonValue::String(type_ref.api_version.clone()),
        );
        object.insert("kind".to_string(), JsonValue::String(type_ref.kind.clone()));
        object.insert(
            "metadata".to_string(),
            JsonValue::Object(self.metadata.clone()),
        );
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        JsonValue::Object(object)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)?.as_str()
    }
}

fn take_string(fields: &mut Map<String, JsonValue>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// What a decoded document turned out to be
enum DocumentShape {
    /// A collection; its items are processed in its place
    List(Vec<JsonValue>),
    /// The generic list marker without items
    EmptyListMarker,
    Single(JsonValue),
}

fn classify(value: JsonValue) -> DocumentShape {
    match value {
        JsonValue::Object(mut map) if map.get("items").is_some_and(JsonValue::is_array) => {
            match map.remove("items") {
                Some(JsonValue::Array(items)) => DocumentShape::List(items),
                _ => DocumentShape::List(Vec::new()),
            }
        }
        value if value.get("kind").and_then(JsonValue::as_str) == Some(LIST_KIND) => {
            DocumentShape::EmptyListMarker
        }
        value => DocumentShape::Single(value),
    }
}

/// Decode rendered bytes into resources
///
/// Accepts a YAML (or JSON) stream of one or more `---`-separated documents.
/// Malformed YAML fails the whole manifest; an item that is well-formed but
/// not a valid resource is returned as an `Err` entry in place.
pub fn parse_manifest(bytes: &[u8]) -> Result<Vec<ParsedItem>> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_slice(bytes).enumerate() {
        let value = JsonValue::deserialize(document)?;
        if !value.is_null() {
            documents.push((format!("document {}", index), value));
        }
    }

    // Reversed so popping yields document order
    let mut pending: Vec<(String, JsonValue)> = documents.into_iter().rev().collect();
    let mut parsed = Vec::new();

    while let Some((location, value)) = pending.pop() {
        match classify(value) {
            DocumentShape::List(items) => {
                tracing::debug!(%location, count = items.len(), "flattening list");
                pending.extend(
                    items
                        .into_iter()
                        .enumerate()
                        .rev()
                        .map(|(i, item)| (format!("{}.items[{}]", location, i), item)),
                );
            }
            DocumentShape::EmptyListMarker => {
                tracing::debug!(%location, "dropping empty list");
            }
            DocumentShape::Single(value) => {
                parsed.push(GenericResource::from_value(value, &location));
            }
        }
    }

    Ok(parsed)
}
