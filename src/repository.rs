use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{Predicate, RecordCursor, RecordStore, SelectQuery};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::filter::FilterTranslator;
use crate::mapping::{find_field, MappingSpec};
use crate::models::{
    QueryParams, RecordData, ResourceRecord, TenantScope, CRDATE, DELETED, IDENTITY_COLUMNS, PID,
    SCIM_ID, TSTAMP, UID,
};
use crate::parser::{ResourceType, SortOrder, SortSpec};

/// Paginated, sortable, soft-delete aware access to one resource table.
pub struct ResourceRepository {
    resource_type: ResourceType,
    table: String,
    store: Arc<dyn RecordStore>,
    filter_translator: Arc<dyn FilterTranslator>,
    clock: Arc<dyn Clock>,
}

impl ResourceRepository {
    pub fn new(
        resource_type: ResourceType,
        table: impl Into<String>,
        store: Arc<dyn RecordStore>,
        filter_translator: Arc<dyn FilterTranslator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resource_type,
            table: table.into(),
            store,
            filter_translator,
            clock,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Lists active rows of a tenant.
    ///
    /// Returns the total matching the filter, counted before paging, and the
    /// requested page. Sorting follows `sortBy` when it resolves to a column,
    /// `uid` otherwise.
    pub async fn search(
        &self,
        params: &QueryParams,
        spec: &MappingSpec,
        tenant: TenantScope,
    ) -> AppResult<(i64, RecordCursor)> {
        let mut constraints = vec![Predicate::eq(PID, tenant.id()), Predicate::eq(DELETED, 0)];
        if let Some(filter) = params.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            constraints.extend(self.filter_translator.translate(filter, spec)?);
        }
        let predicate = Predicate::all(constraints);

        let total = self.store.count(&self.table, &predicate).await?;

        let (column, order) = match SortSpec::from_params(params.sort_by.as_deref(), params.sort_order.as_deref()) {
            Some(sort) => (find_field(&sort.attribute, spec).unwrap_or(UID), sort.order),
            None => (
                UID,
                params
                    .sort_order
                    .as_deref()
                    .map(SortOrder::from_str)
                    .unwrap_or(SortOrder::Ascending),
            ),
        };

        let mut query = SelectQuery::new(predicate).order_by(column, order);
        if column != UID {
            query = query.order_by(UID, SortOrder::Ascending);
        }
        let query = query.page(params.offset(), params.items_per_page());

        let records = self.store.select(&self.table, &query).await?;
        debug!(
            table = %self.table,
            tenant = %tenant,
            total,
            returned = records.len(),
            "search"
        );
        Ok((total, records))
    }

    /// Fetches a row by `scim_id`, soft-deleted rows included.
    pub async fn read(&self, id: &str) -> AppResult<Option<ResourceRecord>> {
        self.find(id, true).await
    }

    pub async fn find(&self, id: &str, include_deleted: bool) -> AppResult<Option<ResourceRecord>> {
        let mut constraints = vec![Predicate::eq(SCIM_ID, id)];
        if !include_deleted {
            constraints.push(Predicate::eq(DELETED, 0));
        }
        let query = SelectQuery::new(Predicate::all(constraints)).page(0, 1);
        Ok(self.store.select(&self.table, &query).await?.next())
    }

    /// Active row of one tenant by `scim_id`.
    pub async fn find_in_tenant(&self, id: &str, tenant: TenantScope) -> AppResult<Option<ResourceRecord>> {
        let predicate = Predicate::all([
            Predicate::eq(SCIM_ID, id),
            Predicate::eq(PID, tenant.id()),
            Predicate::eq(DELETED, 0),
        ]);
        Ok(self.store.select(&self.table, &SelectQuery::new(predicate).page(0, 1)).await?.next())
    }

    /// Rows whose delimited `field` lists `id`, limited to `tenant` when given.
    pub async fn find_by_membership(
        &self,
        field: &str,
        id: &str,
        separator: &str,
        tenant: Option<TenantScope>,
        include_deleted: bool,
    ) -> AppResult<Vec<ResourceRecord>> {
        let mut constraints = vec![Predicate::in_set(field, id, separator)];
        if let Some(tenant) = tenant {
            constraints.push(Predicate::eq(PID, tenant.id()));
        }
        if !include_deleted {
            constraints.push(Predicate::eq(DELETED, 0));
        }
        self.find_where(Predicate::all(constraints)).await
    }

    /// Every row matching `predicate`, ascending by `uid`.
    pub async fn find_where(&self, predicate: Predicate) -> AppResult<Vec<ResourceRecord>> {
        let query = SelectQuery::new(predicate).order_by(UID, SortOrder::Ascending);
        Ok(self.store.select(&self.table, &query).await?.collect())
    }

    /// Inserts a row and returns its new `scim_id`.
    ///
    /// Identity columns are always stamped here; caller supplied values for
    /// them are overwritten.
    pub async fn create(&self, mut data: RecordData, tenant: TenantScope) -> AppResult<String> {
        let scim_id = Uuid::now_v7().to_string();
        let now = self.clock.epoch_seconds();

        data.remove(UID);
        data.insert(SCIM_ID.to_string(), Value::String(scim_id.clone()));
        data.insert(CRDATE.to_string(), Value::from(now));
        data.insert(TSTAMP.to_string(), Value::from(now));
        data.insert(PID.to_string(), Value::from(tenant.id()));
        data.insert(DELETED.to_string(), Value::from(0));

        let uid = self
            .store
            .insert(&self.table, &data)
            .await
            .map_err(|e| match e {
                AppError::Conflict(detail) => {
                    AppError::Internal(format!("Identity collision on {}: {}", self.table, detail))
                }
                other => other,
            })?;

        info!(table = %self.table, scim_id = %scim_id, uid, tenant = %tenant, "Created resource");
        Ok(scim_id)
    }

    /// Writes the supplied fields and bumps `tstamp`.
    pub async fn update(&self, id: &str, mut changes: RecordData) -> AppResult<String> {
        reject_identity_columns(&changes)?;
        changes.insert(TSTAMP.to_string(), Value::from(self.clock.epoch_seconds()));

        let affected = self
            .store
            .update(&self.table, &Predicate::eq(SCIM_ID, id), &changes)
            .await?;
        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "{} {} not found",
                self.resource_type, id
            )));
        }

        debug!(table = %self.table, scim_id = %id, fields = changes.len(), "Updated resource");
        Ok(id.to_string())
    }

    /// Compare-and-set update: only applies when every `expected` field still
    /// holds the given value. Returns whether a row was written.
    pub async fn update_if_unchanged(
        &self,
        id: &str,
        expected: &RecordData,
        mut changes: RecordData,
    ) -> AppResult<bool> {
        reject_identity_columns(&changes)?;
        changes.insert(TSTAMP.to_string(), Value::from(self.clock.epoch_seconds()));

        let mut constraints = vec![Predicate::eq(SCIM_ID, id)];
        constraints.extend(
            expected
                .iter()
                .map(|(field, value)| Predicate::eq(field.clone(), value.clone())),
        );

        let affected = self
            .store
            .update(&self.table, &Predicate::all(constraints), &changes)
            .await?;
        Ok(affected > 0)
    }

    /// Soft delete. The row is kept; repeating the call changes nothing.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let mut changes = RecordData::new();
        changes.insert(DELETED.to_string(), Value::from(1));

        let affected = self
            .store
            .update(&self.table, &Predicate::eq(SCIM_ID, id), &changes)
            .await?;
        if affected == 0 {
            debug!(table = %self.table, scim_id = %id, "Delete matched no row");
        } else {
            info!(table = %self.table, scim_id = %id, "Deleted resource");
        }
        Ok(())
    }
}

fn reject_identity_columns(changes: &RecordData) -> AppResult<()> {
    match IDENTITY_COLUMNS.iter().find(|column| changes.contains_key(**column)) {
        Some(column) => Err(AppError::ImmutableField(column.to_string())),
        None => Ok(()),
    }
}
