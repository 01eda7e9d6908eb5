use async_trait::async_trait;
use scim_v2::models::group::Member;
use serde_json::Value;
use std::sync::Arc;

use super::{optional_str, required_str, separator, Evaluator};
use crate::error::AppResult;
use crate::mapping::value::{as_i64, to_string};
use crate::mapping::{Arguments, MappingSpec};
use crate::models::{RecordData, TenantScope, UID};
use crate::repository::ResourceRepository;

pub const MEMBERS: &str = "members";

/// Group side of the membership relation.
///
/// Lists the users whose `field_user` column contains the group's `uid`.
/// Arguments: `field_user` (required), `display_field`, `separator`.
pub struct MembersEvaluator {
    users: Arc<ResourceRepository>,
    tenant: TenantScope,
}

impl MembersEvaluator {
    /// Members are only listed from `tenant`.
    pub fn new(users: Arc<ResourceRepository>, tenant: TenantScope) -> Self {
        Self { users, tenant }
    }
}

#[async_trait]
impl Evaluator for MembersEvaluator {
    async fn retrieve(&self, record: &RecordData, arguments: &Arguments) -> AppResult<Option<Value>> {
        let field_user = required_str(arguments, "field_user")?;
        let display_field = optional_str(arguments, "display_field")?;
        let Some(group_uid) = record.get(UID).and_then(as_i64) else {
            return Ok(None);
        };

        let users = self
            .users
            .find_by_membership(
                field_user,
                &group_uid.to_string(),
                &separator(arguments)?,
                Some(self.tenant),
                false,
            )
            .await?;
        if users.is_empty() {
            return Ok(None);
        }

        let mut members = Vec::with_capacity(users.len());
        for user in users {
            let member = Member {
                value: user.scim_id().map(str::to_string),
                ref_: None,
                display: display_field
                    .and_then(|field| user.get(field))
                    .filter(|v| !v.is_null())
                    .map(to_string),
                type_: Some("User".to_string()),
            };
            let mut item = serde_json::to_value(member)?;
            if let Value::Object(map) = &mut item {
                map.retain(|_, v| !v.is_null());
            }
            members.push(item);
        }
        Ok(Some(Value::Array(members)))
    }

    /// Membership is stored on the user rows; attaching happens after persist.
    fn fold(&self, _value: &Value, data: RecordData, _arguments: &Arguments) -> AppResult<RecordData> {
        Ok(data)
    }

    fn validate_arguments(&self, arguments: &Arguments) -> AppResult<()> {
        required_str(arguments, "field_user")?;
        optional_str(arguments, "display_field")?;
        separator(arguments)?;
        Ok(())
    }
}

/// A members leaf of a group mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberField {
    /// SCIM path of the leaf, normally `members`.
    pub path: String,
    /// User column holding the delimited group ids.
    pub field_user: String,
    pub separator: String,
}

/// Scans a group mapping for leaves backed by the members evaluator.
pub fn member_fields(spec: &MappingSpec) -> Vec<MemberField> {
    spec.leaves()
        .into_iter()
        .filter(|(_, config)| config.callback.as_deref() == Some(MEMBERS))
        .filter_map(|(path, config)| {
            let field_user = required_str(&config.arguments, "field_user").ok()?;
            let separator = separator(&config.arguments).ok()?;
            Some(MemberField {
                path,
                field_user: field_user.to_string(),
                separator,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_member_fields() {
        let spec = MappingSpec::from_value(json!({
            "displayName": {"mapOn": "title"},
            "members": {"callback": "members", "arguments": {"field_user": "usergroup"}},
            "owners": {"callback": "members", "arguments": {"field_user": "owned_groups", "separator": ";"}},
            "broken": {"callback": "members"}
        }))
        .unwrap();

        assert_eq!(
            member_fields(&spec),
            vec![
                MemberField {
                    path: "members".to_string(),
                    field_user: "usergroup".to_string(),
                    separator: ",".to_string(),
                },
                MemberField {
                    path: "owners".to_string(),
                    field_user: "owned_groups".to_string(),
                    separator: ";".to_string(),
                },
            ]
        );
    }
}
