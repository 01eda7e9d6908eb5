use async_trait::async_trait;
use scim_v2::models::user::Group as UserGroup;
use serde_json::Value;

use super::{optional_str, required_str, separator, Evaluator};
use crate::error::{AppError, AppResult};
use crate::mapping::value::to_string;
use crate::mapping::Arguments;
use crate::models::RecordData;

pub const MEMBERSHIP: &str = "membership";

/// Delimited list of ids kept in a single column, e.g. `"7,9"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipList {
    ids: Vec<String>,
    separator: String,
}

impl MembershipList {
    pub const DEFAULT_SEPARATOR: &'static str = ",";

    pub fn parse(raw: Option<&Value>, separator: &str) -> Self {
        let text = raw.map(to_string).unwrap_or_default();
        let ids = text
            .split(separator)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            ids,
            separator: separator.to_string(),
        }
    }

    pub fn from_ids<I, S>(ids: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self {
            ids: Vec::new(),
            separator: separator.to_string(),
        };
        for id in ids {
            list.insert(&id.into());
        }
        list
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Returns `true` when the id was not present yet.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    /// Returns `true` when at least one occurrence was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    pub fn join(&self) -> String {
        self.ids.join(&self.separator)
    }
}

/// User side of the membership relation: the record's own delimited column
/// rendered as `[{"value": id}]`.
///
/// Arguments: `field` (required), `separator` (default `,`), `ref_prefix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MembershipEvaluator;

impl MembershipEvaluator {
    fn item_id(item: &Value) -> Option<String> {
        let id = match item {
            Value::Object(map) => map.get("value").map(to_string),
            Value::String(_) | Value::Number(_) => Some(to_string(item)),
            _ => None,
        }?;
        let id = id.trim().to_string();
        (!id.is_empty()).then_some(id)
    }
}

#[async_trait]
impl Evaluator for MembershipEvaluator {
    async fn retrieve(&self, record: &RecordData, arguments: &Arguments) -> AppResult<Option<Value>> {
        let field = required_str(arguments, "field")?;
        let list = MembershipList::parse(record.get(field), &separator(arguments)?);
        if list.is_empty() {
            return Ok(None);
        }

        let ref_prefix = optional_str(arguments, "ref_prefix")?;
        let mut items = Vec::with_capacity(list.ids().len());
        for id in list.ids() {
            let group = UserGroup {
                value: Some(id.clone()),
                ref_: ref_prefix.map(|prefix| format!("{prefix}{id}")),
                display: None,
                type_: None,
            };
            let mut item = serde_json::to_value(group)?;
            if let Value::Object(map) = &mut item {
                map.retain(|_, v| !v.is_null());
            }
            items.push(item);
        }
        Ok(Some(Value::Array(items)))
    }

    fn fold(&self, value: &Value, mut data: RecordData, arguments: &Arguments) -> AppResult<RecordData> {
        let field = required_str(arguments, "field")?;
        let ids: Vec<String> = match value {
            Value::Array(items) => items.iter().filter_map(Self::item_id).collect(),
            Value::Null => Vec::new(),
            Value::Bool(_) => {
                return Err(AppError::BadRequest(format!(
                    "Membership value must be a list of references, got: {value}"
                )))
            }
            single => Self::item_id(single).into_iter().collect(),
        };
        let list = MembershipList::from_ids(ids, &separator(arguments)?);
        data.insert(field.to_string(), Value::String(list.join()));
        Ok(data)
    }

    fn validate_arguments(&self, arguments: &Arguments) -> AppResult<()> {
        required_str(arguments, "field")?;
        separator(arguments)?;
        optional_str(arguments, "ref_prefix")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Arguments {
        json!({"field": "usergroup"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_membership_list_edit() {
        let mut list = MembershipList::parse(Some(&json!("7, 9,,7")), ",");
        assert_eq!(list.ids(), ["7", "9", "7"]);
        assert!(list.remove("7"));
        assert_eq!(list.join(), "9");
        assert!(!list.remove("7"));
        assert!(list.insert("3"));
        assert!(!list.insert("3"));
        assert_eq!(list.join(), "9,3");
    }

    #[test]
    fn test_numeric_column_parses() {
        let list = MembershipList::parse(Some(&json!(12)), ",");
        assert!(list.contains("12"));
        assert!(MembershipList::parse(None, ",").is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_renders_references() {
        let record = json!({"usergroup": "7,9"}).as_object().cloned().unwrap();
        let value = MembershipEvaluator.retrieve(&record, &args()).await.unwrap();
        assert_eq!(value, Some(json!([{"value": "7"}, {"value": "9"}])));

        let empty = json!({"usergroup": ""}).as_object().cloned().unwrap();
        assert_eq!(MembershipEvaluator.retrieve(&empty, &args()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retrieve_with_ref_prefix() {
        let record = json!({"usergroup": "7"}).as_object().cloned().unwrap();
        let mut arguments = args();
        arguments.insert("ref_prefix".to_string(), json!("/Groups/"));
        let value = MembershipEvaluator.retrieve(&record, &arguments).await.unwrap();
        assert_eq!(value, Some(json!([{"value": "7", "$ref": "/Groups/7"}])));
    }

    #[test]
    fn test_fold_accepts_objects_and_scalars() {
        let data = MembershipEvaluator
            .fold(&json!([{"value": "7"}, 9, "11", {"display": "x"}]), RecordData::new(), &args())
            .unwrap();
        assert_eq!(data["usergroup"], json!("7,9,11"));

        let data = MembershipEvaluator
            .fold(&json!({"value": 4}), RecordData::new(), &args())
            .unwrap();
        assert_eq!(data["usergroup"], json!("4"));
    }

    #[test]
    fn test_validate_arguments() {
        assert!(MembershipEvaluator.validate_arguments(&args()).is_ok());
        assert!(MembershipEvaluator.validate_arguments(&Arguments::new()).is_err());
        let bad = json!({"field": "usergroup", "separator": ""}).as_object().cloned().unwrap();
        assert!(MembershipEvaluator.validate_arguments(&bad).is_err());
    }
}
