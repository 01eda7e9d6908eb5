use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::membership::{rewrite_membership, MembershipEdit};
use super::{EventListener, GroupEvent, ResourceEvent};
use crate::error::AppResult;
use crate::evaluator::{member_fields, MemberField};
use crate::mapping::value::to_string;
use crate::models::PersistMode;
use crate::resource::{ResourceDomain, ResourceDomains};

/// Writes the members listed in a persisted group payload onto the users.
///
/// Each listed user (by `scim_id`) gets the group `uid` added to its
/// membership column. On update, users that are no longer listed lose it.
/// Only users of the group's tenant are touched. A payload without the
/// members key leaves memberships untouched.
pub struct MemberAttachment {
    domains: Arc<ResourceDomains>,
}

impl MemberAttachment {
    pub fn new(domains: Arc<ResourceDomains>) -> Self {
        Self { domains }
    }

    fn listed_user_ids(value: &Value) -> Vec<String> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            single => vec![single],
        };
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => map.get("value").map(to_string),
                Value::String(_) | Value::Number(_) => Some(to_string(item)),
                _ => None,
            })
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect()
    }

    async fn sync_field(
        &self,
        domain: &ResourceDomain,
        event: &GroupEvent,
        group_uid: &str,
        field: &MemberField,
    ) -> AppResult<()> {
        let Some(listed) = event.payload.get(field.path.as_str()) else {
            return Ok(());
        };
        let wanted = Self::listed_user_ids(listed);
        let fields = std::slice::from_ref(field);

        let mut added = 0usize;
        for user_id in &wanted {
            match domain.users.find_in_tenant(user_id, domain.tenant).await? {
                Some(user) => {
                    if rewrite_membership(&domain.users, user, fields, MembershipEdit::Add(group_uid)).await? {
                        added += 1;
                    }
                }
                None => warn!(
                    context = %event.context,
                    user = %user_id,
                    "Listed member does not exist in this tenant, skipping"
                ),
            }
        }

        let mut removed = 0usize;
        if event.mode == PersistMode::Update {
            let wanted: HashSet<&str> = wanted.iter().map(String::as_str).collect();
            let current = domain
                .users
                .find_by_membership(&field.field_user, group_uid, &field.separator, Some(domain.tenant), false)
                .await?;
            for user in current {
                if user.scim_id().is_some_and(|id| wanted.contains(id)) {
                    continue;
                }
                if rewrite_membership(&domain.users, user, fields, MembershipEdit::Remove(group_uid)).await? {
                    removed += 1;
                }
            }
        }

        info!(
            context = %event.context,
            group_uid = %group_uid,
            field = %field.field_user,
            added,
            removed,
            "Synchronized group members"
        );
        Ok(())
    }

    async fn on_group_persisted(&self, event: &GroupEvent) -> AppResult<()> {
        let fields = member_fields(&event.mapping);
        if fields.is_empty() {
            return Ok(());
        }

        let domain = self.domains.get(&event.context)?;
        let group_uid = match event.record.uid() {
            Some(uid) => uid,
            None => {
                let Some(id) = event.record_id() else {
                    return Ok(());
                };
                match domain.groups.read(id).await?.and_then(|group| group.uid()) {
                    Some(uid) => uid,
                    None => {
                        warn!(context = %event.context, scim_id = %id, "Persisted group not found");
                        return Ok(());
                    }
                }
            }
        };
        let group_uid = group_uid.to_string();

        for field in &fields {
            self.sync_field(domain, event, &group_uid, field).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventListener for MemberAttachment {
    fn name(&self) -> &str {
        "member_attachment"
    }

    async fn handle(&self, event: &ResourceEvent) -> AppResult<()> {
        match event {
            ResourceEvent::PostPersistGroup(group_event) => self.on_group_persisted(group_event).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listed_user_ids() {
        assert_eq!(
            MemberAttachment::listed_user_ids(&json!([{"value": "a"}, "b", {"display": "x"}, {"value": " "}])),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(MemberAttachment::listed_user_ids(&json!(null)).is_empty());
        assert_eq!(
            MemberAttachment::listed_user_ids(&json!({"value": "a"})),
            vec!["a".to_string()]
        );
    }
}
