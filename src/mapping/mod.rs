//! Declarative mapping between flat storage rows and nested SCIM payloads.

pub mod attributes;
pub mod engine;
pub mod lookup;
pub mod merge;
pub mod value;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::evaluator::EvaluatorRegistry;

pub use attributes::AttributeSelection;
pub use engine::MappingEngine;
pub use lookup::{find_field, find_leaf, find_property};
pub use value::Cast;

/// Opaque evaluator arguments taken verbatim from the mapping.
pub type Arguments = Map<String, Value>;

const LEAF_KEYS: [&str; 5] = ["mapOn", "cast", "toggle", "callback", "arguments"];

/// Options of a single mapped property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<Cast>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub toggle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Arguments,
}

impl FieldConfig {
    pub fn map_on(field: impl Into<String>) -> Self {
        Self {
            map_on: Some(field.into()),
            ..Default::default()
        }
    }

    pub fn callback(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            callback: Some(name.into()),
            arguments,
            ..Default::default()
        }
    }

    pub fn with_cast(mut self, cast: Cast) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn toggled(mut self) -> Self {
        self.toggle = true;
        self
    }

    /// Neither a column nor a computed value: the leaf maps to nothing.
    pub fn is_empty(&self) -> bool {
        self.map_on.is_none() && self.callback.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MappingNode {
    Leaf(FieldConfig),
    Group(MappingSpec),
}

/// Ordered property path to configuration mapping.
///
/// Keys may be dotted (`name.givenName`) or nested groups; both forms address
/// the same leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingSpec {
    entries: Vec<(String, MappingNode)>,
}

impl MappingSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, node: impl Into<MappingNode>) -> Self {
        self.insert(key, node);
        self
    }

    /// Inserts or replaces an entry, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<MappingNode>) {
        let key = key.into();
        let node = node.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MappingNode> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MappingNode)> {
        self.entries.iter().map(|(k, node)| (k.as_str(), node))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All leaves in declaration order, keyed by their full dotted path.
    pub fn leaves(&self) -> Vec<(String, &FieldConfig)> {
        let mut out = Vec::new();
        self.collect_leaves(None, &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: Option<&str>, out: &mut Vec<(String, &'a FieldConfig)>) {
        for (key, node) in &self.entries {
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{key}"),
                None => key.clone(),
            };
            match node {
                MappingNode::Leaf(config) => out.push((path, config)),
                MappingNode::Group(inner) => inner.collect_leaves(Some(&path), out),
            }
        }
    }

    /// Storage columns written by plain `mapOn` leaves.
    pub fn mapped_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for (_, config) in self.leaves() {
            if let Some(column) = &config.map_on {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    pub fn from_value(value: Value) -> AppResult<Self> {
        match value {
            Value::Object(map) => spec_from_map(map, None),
            Value::Null => Ok(Self::new()),
            other => Err(AppError::Configuration(format!(
                "Mapping must be an object, got: {other}"
            ))),
        }
    }

    pub fn from_yaml_str(content: &str) -> AppResult<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_json_str(content: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| AppError::Configuration(format!("Invalid mapping JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Loads a mapping file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to read mapping file {}: {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Checks callbacks against the registry.
    ///
    /// In strict mode leaves that map to nothing and unknown callbacks are
    /// errors; otherwise they are logged and later omitted. Evaluator argument
    /// errors are always fatal.
    pub fn validate(&self, registry: &EvaluatorRegistry, strict: bool) -> AppResult<()> {
        for (path, config) in self.leaves() {
            if config.is_empty() {
                let message = format!("Mapping leaf '{path}' has neither mapOn nor callback");
                if strict {
                    return Err(AppError::Configuration(message));
                }
                warn!(path = %path, "{}", message);
                continue;
            }

            let Some(name) = &config.callback else {
                continue;
            };
            match registry.get(name) {
                Some(evaluator) => evaluator
                    .validate_arguments(&config.arguments)
                    .map_err(|e| AppError::Configuration(format!("Mapping leaf '{path}': {e}")))?,
                None if strict => {
                    return Err(AppError::Configuration(format!(
                        "Mapping leaf '{path}' names unknown evaluator '{name}'"
                    )))
                }
                None => warn!(path = %path, callback = %name, "Unknown evaluator, leaf falls back to mapOn"),
            }
        }
        Ok(())
    }
}

impl From<FieldConfig> for MappingNode {
    fn from(config: FieldConfig) -> Self {
        MappingNode::Leaf(config)
    }
}

impl From<MappingSpec> for MappingNode {
    fn from(spec: MappingSpec) -> Self {
        MappingNode::Group(spec)
    }
}

fn spec_from_map(map: Map<String, Value>, prefix: Option<&str>) -> AppResult<MappingSpec> {
    let mut spec = MappingSpec::new();
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        let node = node_from_value(&path, value)?;
        spec.insert(key, node);
    }
    Ok(spec)
}

fn node_from_value(path: &str, value: Value) -> AppResult<MappingNode> {
    match value {
        Value::Null => Ok(MappingNode::Leaf(FieldConfig::default())),
        Value::Object(map) if map.is_empty() => Ok(MappingNode::Leaf(FieldConfig::default())),
        Value::Object(map) if map.keys().any(|k| LEAF_KEYS.contains(&k.as_str())) => {
            serde_json::from_value(Value::Object(map))
                .map(MappingNode::Leaf)
                .map_err(|e| AppError::Configuration(format!("Mapping leaf '{path}': {e}")))
        }
        Value::Object(map) => spec_from_map(map, Some(path)).map(MappingNode::Group),
        other => Err(AppError::Configuration(format!(
            "Mapping entry '{path}' must be an object, got: {other}"
        ))),
    }
}

impl Serialize for MappingSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MappingSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MappingSpec::from_value(value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_and_flat_leaves() {
        let spec = MappingSpec::from_value(json!({
            "userName": {"mapOn": "username"},
            "name": {
                "givenName": {"mapOn": "first_name"},
                "familyName": {"mapOn": "last_name"}
            },
            "emails.work": {"mapOn": "email"}
        }))
        .unwrap();

        let paths: Vec<String> = spec.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec!["userName", "name.givenName", "name.familyName", "emails.work"]
        );
        assert_eq!(
            spec.mapped_columns(),
            vec!["username", "first_name", "last_name", "email"]
        );
    }

    #[test]
    fn test_invalid_cast_fails_at_load() {
        let err = MappingSpec::from_value(json!({"active": {"mapOn": "disabled", "cast": "float"}}))
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_yaml_mapping() {
        let spec = MappingSpec::from_yaml_str(
            r#"
active:
  mapOn: disabled
  cast: bool
  toggle: true
groups:
  callback: membership
  arguments:
    field: usergroup
"#,
        )
        .unwrap();

        let leaves = spec.leaves();
        assert_eq!(leaves[0].1, &FieldConfig::map_on("disabled").with_cast(Cast::Bool).toggled());
        assert_eq!(leaves[1].1.callback.as_deref(), Some("membership"));
        assert_eq!(leaves[1].1.arguments["field"], json!("usergroup"));
    }

    #[test]
    fn test_serialize_keeps_order() {
        let spec = MappingSpec::new()
            .with("b", FieldConfig::map_on("col_b"))
            .with("a", FieldConfig::map_on("col_a"));
        let rendered = serde_json::to_string(&spec).unwrap();
        assert_eq!(rendered, r#"{"b":{"mapOn":"col_b"},"a":{"mapOn":"col_a"}}"#);
    }

    #[test]
    fn test_validate_strict_rejects_empty_leaf() {
        let registry = EvaluatorRegistry::new();
        let spec = MappingSpec::new()
            .with("userName", FieldConfig::map_on("username"))
            .with("nickName", FieldConfig::default());

        assert!(spec.validate(&registry, false).is_ok());
        assert!(matches!(
            spec.validate(&registry, true),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_unknown_callback() {
        let registry = EvaluatorRegistry::new();
        let spec = MappingSpec::new().with(
            "groups",
            FieldConfig::callback("nope", Arguments::new()),
        );
        assert!(spec.validate(&registry, false).is_ok());
        assert!(spec.validate(&registry, true).is_err());
    }
}
