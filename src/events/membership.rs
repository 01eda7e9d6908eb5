use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::evaluator::{MemberField, MembershipList};
use crate::models::{RecordData, ResourceRecord};
use crate::repository::ResourceRepository;

/// Re-reads before giving up on a contended membership column.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEdit<'a> {
    Add(&'a str),
    Remove(&'a str),
}

impl MembershipEdit<'_> {
    fn apply(&self, list: &mut MembershipList) -> bool {
        match self {
            MembershipEdit::Add(id) => list.insert(id),
            MembershipEdit::Remove(id) => list.remove(id),
        }
    }
}

/// Applies `edit` to every membership column of `user`.
///
/// Only columns whose list actually changes are written, each guarded by
/// the value that was read. A concurrent writer makes the guard miss; the
/// row is then re-read and the edit recomputed. Returns whether a write
/// happened.
pub async fn rewrite_membership(
    users: &ResourceRepository,
    user: ResourceRecord,
    fields: &[MemberField],
    edit: MembershipEdit<'_>,
) -> AppResult<bool> {
    let Some(scim_id) = user.scim_id().map(str::to_string) else {
        return Ok(false);
    };

    let mut current = user;
    for attempt in 1..=MAX_ATTEMPTS {
        let mut expected = RecordData::new();
        let mut changes = RecordData::new();

        for field in fields {
            if changes.contains_key(&field.field_user) || expected.contains_key(&field.field_user) {
                continue;
            }
            let raw = current.get(&field.field_user);
            let mut list = MembershipList::parse(raw, &field.separator);
            if edit.apply(&mut list) {
                expected.insert(field.field_user.clone(), raw.cloned().unwrap_or(Value::Null));
                changes.insert(field.field_user.clone(), Value::String(list.join()));
            }
        }

        if changes.is_empty() {
            return Ok(false);
        }

        if users.update_if_unchanged(&scim_id, &expected, changes).await? {
            debug!(table = users.table(), scim_id = %scim_id, ?edit, "Membership rewritten");
            return Ok(true);
        }

        warn!(
            table = users.table(),
            scim_id = %scim_id,
            attempt,
            "Membership column changed concurrently, re-reading"
        );
        match users.find(&scim_id, true).await? {
            Some(fresh) => current = fresh,
            None => return Ok(false),
        }
    }

    Err(AppError::Conflict(format!(
        "Membership of {} {} kept changing during update",
        users.resource_type(),
        scim_id
    )))
}
