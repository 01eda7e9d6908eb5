use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::membership::{rewrite_membership, MembershipEdit};
use super::{EventListener, GroupEvent, ResourceEvent};
use crate::backend::Predicate;
use crate::error::AppResult;
use crate::evaluator::member_fields;
use crate::models::DELETED;
use crate::resource::ResourceDomains;

/// Removes a deleted group from the membership columns of its users.
pub struct MembershipCascade {
    domains: Arc<ResourceDomains>,
}

impl MembershipCascade {
    pub fn new(domains: Arc<ResourceDomains>) -> Self {
        Self { domains }
    }

    async fn on_group_deleted(&self, event: &GroupEvent) -> AppResult<()> {
        let domain = self.domains.get(&event.context)?;
        let Some(record_id) = event.record_id() else {
            warn!(context = %event.context, "Group delete event without scim_id");
            return Ok(());
        };

        let Some(group) = domain.groups.read(record_id).await? else {
            warn!(context = %event.context, scim_id = %record_id, "Deleted group not found");
            return Ok(());
        };
        let Some(group_uid) = group.uid() else {
            return Ok(());
        };
        let group_uid = group_uid.to_string();

        let fields = member_fields(&event.mapping);
        if fields.is_empty() {
            debug!(context = %event.context, "Group mapping has no members leaf");
            return Ok(());
        }

        let referencing = Predicate::Or(
            fields
                .iter()
                .map(|f| Predicate::in_set(f.field_user.clone(), group_uid.clone(), f.separator.clone()))
                .collect(),
        );
        let users = domain
            .users
            .find_where(Predicate::all([referencing, Predicate::eq(DELETED, 0)]))
            .await?;

        let mut rewritten = 0usize;
        for user in users {
            if rewrite_membership(&domain.users, user, &fields, MembershipEdit::Remove(&group_uid)).await? {
                rewritten += 1;
            }
        }

        info!(
            context = %event.context,
            group = %record_id,
            rewritten,
            "Removed deleted group from users"
        );
        Ok(())
    }
}

#[async_trait]
impl EventListener for MembershipCascade {
    fn name(&self) -> &str {
        "membership_cascade"
    }

    async fn handle(&self, event: &ResourceEvent) -> AppResult<()> {
        match event {
            ResourceEvent::PostDeleteGroup(group_event) => self.on_group_deleted(group_event).await,
            _ => Ok(()),
        }
    }
}
