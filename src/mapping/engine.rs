use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::merge::{deep_merge, graft};
use super::value::{cast, toggle};
use super::{AttributeSelection, MappingSpec};
use crate::error::AppResult;
use crate::evaluator::EvaluatorRegistry;
use crate::models::RecordData;

/// Bidirectional record/payload translator driven by a [`MappingSpec`].
#[derive(Debug, Clone)]
pub struct MappingEngine {
    registry: Arc<EvaluatorRegistry>,
}

impl MappingEngine {
    pub fn new(registry: Arc<EvaluatorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Renders a stored row as a SCIM payload.
    ///
    /// Per leaf: the `mapOn` column, replaced by the callback result when the
    /// callback resolves, then `cast`, then `toggle`. Null results are dropped.
    pub async fn data_to_payload(
        &self,
        record: &RecordData,
        spec: &MappingSpec,
        selection: &AttributeSelection,
    ) -> AppResult<Value> {
        let mut payload = Value::Object(Map::new());

        for (path, config) in spec.leaves() {
            if !selection.is_selected(&path) {
                continue;
            }

            let mut value = config
                .map_on
                .as_deref()
                .and_then(|column| record.get(column))
                .cloned()
                .unwrap_or(Value::Null);

            if let Some(name) = &config.callback {
                match self.registry.get(name) {
                    Some(evaluator) => {
                        value = evaluator
                            .retrieve(record, &config.arguments)
                            .await?
                            .unwrap_or(Value::Null);
                    }
                    None => debug!(path = %path, callback = %name, "Evaluator not registered"),
                }
            }

            if value.is_null() {
                continue;
            }
            if let Some(kind) = config.cast {
                value = cast(&value, kind);
            }
            if config.toggle {
                value = toggle(&value);
            }

            deep_merge(&mut payload, graft(&path, value));
        }

        Ok(payload)
    }

    /// Extracts the storage fields a SCIM payload writes.
    ///
    /// `toggle` is applied but `cast` is not: values reach storage in their
    /// payload type. Callbacks fold the raw value found under the exact
    /// top-level key, after the `mapOn` write.
    pub fn payload_to_data(&self, payload: &Value, spec: &MappingSpec) -> AppResult<RecordData> {
        let mut data = RecordData::new();

        for (path, config) in spec.leaves() {
            let Some(found) = lookup_path(payload, &path) else {
                continue;
            };

            let value = if config.toggle {
                toggle(found)
            } else {
                found.clone()
            };

            if let Some(column) = &config.map_on {
                data.insert(column.clone(), value);
            }

            if let Some(name) = &config.callback {
                let raw = payload.get(path.as_str()).filter(|v| !v.is_null());
                match (self.registry.get(name), raw) {
                    (Some(evaluator), Some(raw)) => {
                        data = evaluator.fold(raw, data, &config.arguments)?;
                    }
                    (None, _) => debug!(path = %path, callback = %name, "Evaluator not registered"),
                    _ => {}
                }
            }
        }

        Ok(data)
    }
}

/// Walks a dotted path; absent keys, nulls and non-object intermediates
/// yield `None`.
fn lookup_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{MembershipEvaluator, MEMBERSHIP};
    use crate::mapping::{Arguments, Cast, FieldConfig};
    use serde_json::json;

    fn engine() -> MappingEngine {
        let registry = EvaluatorRegistry::new()
            .with(MEMBERSHIP, Arc::new(MembershipEvaluator))
            .unwrap();
        MappingEngine::new(Arc::new(registry))
    }

    fn record(value: Value) -> RecordData {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_given_name_and_toggled_active() {
        let spec = MappingSpec::new()
            .with("name.givenName", FieldConfig::map_on("first_name"))
            .with("active", FieldConfig::map_on("disabled").toggled());

        let payload = engine()
            .data_to_payload(
                &record(json!({"first_name": "Ann", "disabled": 0})),
                &spec,
                &AttributeSelection::all(),
            )
            .await
            .unwrap();

        assert_eq!(payload, json!({"name": {"givenName": "Ann"}, "active": true}));
    }

    #[tokio::test]
    async fn test_map_on_round_trip() {
        let spec = MappingSpec::new()
            .with("userName", FieldConfig::map_on("username"))
            .with("name.givenName", FieldConfig::map_on("first_name"))
            .with("name.familyName", FieldConfig::map_on("last_name"))
            .with("externalId", FieldConfig::map_on("external_id"));
        let original = record(json!({
            "username": "ann",
            "first_name": "Ann",
            "last_name": "Lee",
            "external_id": "ext-1"
        }));

        let engine = engine();
        let payload = engine
            .data_to_payload(&original, &spec, &AttributeSelection::all())
            .await
            .unwrap();
        let data = engine.payload_to_data(&payload, &spec).unwrap();
        assert_eq!(data, original);
    }

    #[tokio::test]
    async fn test_bool_cast_with_toggle_round_trips() {
        let spec = MappingSpec::new().with(
            "active",
            FieldConfig::map_on("disabled").with_cast(Cast::Bool).toggled(),
        );
        let engine = engine();

        for disabled in [true, false] {
            let original = record(json!({"disabled": disabled}));
            let payload = engine
                .data_to_payload(&original, &spec, &AttributeSelection::all())
                .await
                .unwrap();
            assert_eq!(payload["active"], json!(!disabled));
            assert_eq!(engine.payload_to_data(&payload, &spec).unwrap(), original);
        }
    }

    #[tokio::test]
    async fn test_int_cast_is_not_reapplied_on_write() {
        let spec = MappingSpec::new().with("age", FieldConfig::map_on("age").with_cast(Cast::Int));
        let engine = engine();

        let payload = engine
            .data_to_payload(&record(json!({"age": "42"})), &spec, &AttributeSelection::all())
            .await
            .unwrap();
        assert_eq!(payload, json!({"age": 42}));

        let data = engine.payload_to_data(&json!({"age": "17 years"}), &spec).unwrap();
        assert_eq!(data["age"], json!("17 years"));
    }

    #[tokio::test]
    async fn test_nulls_and_empty_leaves_are_dropped() {
        let spec = MappingSpec::new()
            .with("nickName", FieldConfig::map_on("nickname"))
            .with("title", FieldConfig::default())
            .with("userName", FieldConfig::map_on("username"));
        let engine = engine();

        let payload = engine
            .data_to_payload(
                &record(json!({"nickname": null, "username": "ann"})),
                &spec,
                &AttributeSelection::all(),
            )
            .await
            .unwrap();
        assert_eq!(payload, json!({"userName": "ann"}));

        let data = engine
            .payload_to_data(&json!({"nickName": null, "title": "x", "userName": "ann"}), &spec)
            .unwrap();
        assert_eq!(data, record(json!({"username": "ann"})));
    }

    #[tokio::test]
    async fn test_non_container_intermediate_is_skipped() {
        let spec = MappingSpec::new().with("name.givenName", FieldConfig::map_on("first_name"));
        let data = engine()
            .payload_to_data(&json!({"name": "Ann Lee"}), &spec)
            .unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_literal_dotted_payload_key_is_not_read() {
        let spec = MappingSpec::new().with("name.givenName", FieldConfig::map_on("first_name"));
        let data = engine()
            .payload_to_data(&json!({"name.givenName": "Ann"}), &spec)
            .unwrap();
        assert!(data.is_empty());

        let data = engine()
            .payload_to_data(&json!({"name": {"givenName": "Ann"}}), &spec)
            .unwrap();
        assert_eq!(data, record(json!({"first_name": "Ann"})));
    }

    #[tokio::test]
    async fn test_callback_replaces_map_on() {
        let arguments: Arguments = json!({"field": "usergroup"}).as_object().cloned().unwrap();
        let mut groups = FieldConfig::callback(MEMBERSHIP, arguments);
        groups.map_on = Some("usergroup".to_string());
        let spec = MappingSpec::new().with("groups", groups);
        let engine = engine();

        let payload = engine
            .data_to_payload(&record(json!({"usergroup": "3,5"})), &spec, &AttributeSelection::all())
            .await
            .unwrap();
        assert_eq!(payload, json!({"groups": [{"value": "3"}, {"value": "5"}]}));

        // fold runs after the mapOn write and wins
        let data = engine
            .payload_to_data(&json!({"groups": [{"value": "8"}]}), &spec)
            .unwrap();
        assert_eq!(data["usergroup"], json!("8"));
    }

    #[tokio::test]
    async fn test_unregistered_callback_keeps_map_on_value() {
        let mut config = FieldConfig::callback("unknown", Arguments::new());
        config.map_on = Some("title".to_string());
        let spec = MappingSpec::new().with("title", config);

        let payload = engine()
            .data_to_payload(&record(json!({"title": "CEO"})), &spec, &AttributeSelection::all())
            .await
            .unwrap();
        assert_eq!(payload, json!({"title": "CEO"}));
    }

    #[tokio::test]
    async fn test_later_leaf_replaces_earlier_value() {
        let spec = MappingSpec::from_value(json!({
            "name": {
                "givenName": {"mapOn": "first_name"},
                "familyName": {"mapOn": "last_name"}
            },
            "name.givenName": {"mapOn": "preferred_name"},
            "phone": {"mapOn": "phone"},
            "phone.value": {"mapOn": "phone_number"}
        }))
        .unwrap();

        let payload = engine()
            .data_to_payload(
                &record(json!({
                    "first_name": "Annabel",
                    "last_name": "Lee",
                    "preferred_name": "Ann",
                    "phone": ["legacy"],
                    "phone_number": "+33 1"
                })),
                &spec,
                &AttributeSelection::all(),
            )
            .await
            .unwrap();
        assert_eq!(
            payload,
            json!({
                "name": {"givenName": "Ann", "familyName": "Lee"},
                "phone": {"value": "+33 1"}
            })
        );
    }

    #[tokio::test]
    async fn test_attribute_selection() {
        let spec = MappingSpec::new()
            .with("userName", FieldConfig::map_on("username"))
            .with("name.givenName", FieldConfig::map_on("first_name"));
        let payload = engine()
            .data_to_payload(
                &record(json!({"username": "ann", "first_name": "Ann"})),
                &spec,
                &AttributeSelection::from_params(None, Some("userName")),
            )
            .await
            .unwrap();
        assert_eq!(payload, json!({"name": {"givenName": "Ann"}}));
    }
}
