use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Flat storage row: column name to scalar value.
pub type RecordData = Map<String, Value>;

pub const UID: &str = "uid";
pub const SCIM_ID: &str = "scim_id";
pub const PID: &str = "pid";
pub const CRDATE: &str = "crdate";
pub const TSTAMP: &str = "tstamp";
pub const DELETED: &str = "deleted";

/// Columns every resource table carries and `update` must not touch.
pub const IDENTITY_COLUMNS: [&str; 5] = [UID, SCIM_ID, PID, CRDATE, DELETED];

pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";

/// Tenant scope of a row (the `pid` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantScope(pub i64);

impl TenantScope {
    pub fn id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Active,
    Deleted,
}

impl ResourceStatus {
    pub fn from_flag(flag: Option<&Value>) -> Self {
        if flag.map(crate::mapping::value::is_truthy).unwrap_or(false) {
            ResourceStatus::Deleted
        } else {
            ResourceStatus::Active
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ResourceStatus::Deleted)
    }
}

/// A stored row together with typed access to its identity columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRecord(RecordData);

impl ResourceRecord {
    pub fn new(data: RecordData) -> Self {
        Self(data)
    }

    pub fn uid(&self) -> Option<i64> {
        self.0.get(UID).and_then(crate::mapping::value::as_i64)
    }

    pub fn scim_id(&self) -> Option<&str> {
        self.0.get(SCIM_ID).and_then(Value::as_str)
    }

    pub fn pid(&self) -> Option<TenantScope> {
        self.0
            .get(PID)
            .and_then(crate::mapping::value::as_i64)
            .map(TenantScope)
    }

    pub fn crdate(&self) -> Option<i64> {
        self.0.get(CRDATE).and_then(crate::mapping::value::as_i64)
    }

    pub fn tstamp(&self) -> Option<i64> {
        self.0.get(TSTAMP).and_then(crate::mapping::value::as_i64)
    }

    pub fn status(&self) -> ResourceStatus {
        ResourceStatus::from_flag(self.0.get(DELETED))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &RecordData {
        &self.0
    }

    pub fn into_fields(self) -> RecordData {
        self.0
    }
}

impl From<RecordData> for ResourceRecord {
    fn from(data: RecordData) -> Self {
        Self(data)
    }
}

/// Names one resource domain, e.g. `frontend` or `backend`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(pub String);

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    Create,
    Update,
    Delete,
}

/// SCIM list query parameters (RFC 7644 section 3.4.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub start_index: Option<i64>,
    pub items_per_page: Option<i64>,
    pub count: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub filter: Option<String>,
    pub attributes: Option<String>,
    pub excluded_attributes: Option<String>,
}

impl QueryParams {
    pub const DEFAULT_ITEMS_PER_PAGE: i64 = 10;

    /// 1-based start index; anything below 1 is treated as 1.
    pub fn start_index(&self) -> i64 {
        self.start_index.unwrap_or(1).max(1)
    }

    /// Page size; `count` is accepted as an alias. Negative values clamp to 0.
    pub fn items_per_page(&self) -> i64 {
        self.items_per_page
            .or(self.count)
            .unwrap_or(Self::DEFAULT_ITEMS_PER_PAGE)
            .max(0)
    }

    pub fn offset(&self) -> i64 {
        self.start_index() - 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScimListResponse {
    pub schemas: Vec<String>,
    #[serde(rename = "totalResults")]
    pub total_results: i64,
    #[serde(rename = "startIndex", skip_serializing_if = "Option::is_none")]
    pub start_index: Option<i64>,
    #[serde(rename = "itemsPerPage", skip_serializing_if = "Option::is_none")]
    pub items_per_page: Option<i64>,
    #[serde(rename = "Resources")]
    pub resources: Vec<Value>,
}

impl ScimListResponse {
    pub fn new(total_results: i64, start_index: i64, resources: Vec<Value>) -> Self {
        Self {
            schemas: vec![LIST_RESPONSE_SCHEMA.to_string()],
            total_results,
            start_index: Some(start_index),
            items_per_page: Some(resources.len() as i64),
            resources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params_defaults() {
        let params = QueryParams::default();
        assert_eq!(params.start_index(), 1);
        assert_eq!(params.items_per_page(), 10);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_query_params_clamping_and_count_alias() {
        let params: QueryParams =
            serde_json::from_value(json!({"startIndex": -4, "count": 3})).unwrap();
        assert_eq!(params.start_index(), 1);
        assert_eq!(params.items_per_page(), 3);

        let params: QueryParams =
            serde_json::from_value(json!({"startIndex": 6, "itemsPerPage": -1, "count": 3}))
                .unwrap();
        assert_eq!(params.offset(), 5);
        assert_eq!(params.items_per_page(), 0);
    }

    #[test]
    fn test_record_accessors() {
        let record = ResourceRecord::new(
            json!({"uid": 7, "scim_id": "abc", "pid": "3", "deleted": 1})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(record.uid(), Some(7));
        assert_eq!(record.scim_id(), Some("abc"));
        assert_eq!(record.pid(), Some(TenantScope(3)));
        assert_eq!(record.status(), ResourceStatus::Deleted);
    }
}
