use scim_v2::models::scim_schema::Meta;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::ResourceDomain;
use crate::error::{AppError, AppResult};
use crate::events::{EventDispatcher, GroupEvent, ResourceEvent};
use crate::mapping::{AttributeSelection, MappingEngine, MappingSpec};
use crate::models::{Context, PersistMode, QueryParams, ResourceRecord, ScimListResponse, TenantScope};
use crate::parser::ResourceType;
use crate::repository::ResourceRepository;
use crate::utils::format_epoch_seconds;

/// SCIM operations for one resource kind within one context.
#[derive(Clone)]
pub struct ResourceService {
    resource_type: ResourceType,
    context: Context,
    tenant: TenantScope,
    repository: Arc<ResourceRepository>,
    mapping: Arc<MappingSpec>,
    engine: MappingEngine,
    dispatcher: Arc<EventDispatcher>,
}

impl ResourceService {
    pub fn new(domain: &ResourceDomain, resource_type: ResourceType, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            resource_type,
            context: domain.context.clone(),
            tenant: domain.tenant,
            repository: domain.repository(resource_type).clone(),
            mapping: domain.mapping(resource_type).clone(),
            engine: domain.engine.clone(),
            dispatcher,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn mapping(&self) -> &MappingSpec {
        &self.mapping
    }

    pub async fn list(&self, params: &QueryParams) -> AppResult<ScimListResponse> {
        let selection =
            AttributeSelection::from_params(params.attributes.as_deref(), params.excluded_attributes.as_deref());
        let (total, records) = self.repository.search(params, &self.mapping, self.tenant).await?;

        let mut resources = Vec::with_capacity(records.len());
        for record in records {
            resources.push(self.render(&record, &selection).await?);
        }
        debug!(
            context = %self.context,
            resource = %self.resource_type,
            total,
            returned = resources.len(),
            "Listed resources"
        );
        Ok(ScimListResponse::new(total, params.start_index(), resources))
    }

    /// Active resources only; deleted and foreign-tenant rows read as missing.
    pub async fn get(&self, id: &str) -> AppResult<Value> {
        self.get_with(id, &AttributeSelection::all()).await
    }

    pub async fn get_with(&self, id: &str, selection: &AttributeSelection) -> AppResult<Value> {
        let record = self.require_active(id).await?;
        self.render(&record, selection).await
    }

    pub async fn create(&self, payload: Value) -> AppResult<Value> {
        let data = self.engine.payload_to_data(&payload, &self.mapping)?;
        let id = self.repository.create(data, self.tenant).await?;
        let record = self.require_active(&id).await?;

        self.after_persist(&payload, &record, PersistMode::Create).await?;
        info!(context = %self.context, resource = %self.resource_type, scim_id = %id, "Created");
        self.get(&id).await
    }

    /// Replaces the mapped attributes present in `payload`.
    pub async fn update(&self, id: &str, payload: Value) -> AppResult<Value> {
        self.require_active(id).await?;

        let data = self.engine.payload_to_data(&payload, &self.mapping)?;
        self.repository.update(id, data).await?;
        let record = self.require_active(id).await?;

        self.after_persist(&payload, &record, PersistMode::Update).await?;
        info!(context = %self.context, resource = %self.resource_type, scim_id = %id, "Updated");
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let record = self.require_active(id).await?;
        let payload = self.render(&record, &AttributeSelection::all()).await?;

        self.repository.delete(id).await?;
        if self.resource_type == ResourceType::Group {
            let event = self.group_event(payload, record, PersistMode::Delete);
            self.dispatcher.dispatch(&ResourceEvent::PostDeleteGroup(event)).await?;
        }
        info!(context = %self.context, resource = %self.resource_type, scim_id = %id, "Deleted");
        Ok(())
    }

    async fn after_persist(&self, payload: &Value, record: &ResourceRecord, mode: PersistMode) -> AppResult<()> {
        if self.resource_type != ResourceType::Group {
            return Ok(());
        }
        let event = self.group_event(payload.clone(), record.clone(), mode);
        self.dispatcher.dispatch(&ResourceEvent::PostPersistGroup(event)).await
    }

    fn group_event(&self, payload: Value, record: ResourceRecord, mode: PersistMode) -> GroupEvent {
        GroupEvent {
            mapping: self.mapping.clone(),
            payload,
            record,
            mode,
            context: self.context.clone(),
        }
    }

    async fn require_active(&self, id: &str) -> AppResult<ResourceRecord> {
        match self.repository.read(id).await? {
            Some(record) if !record.status().is_deleted() && record.pid() == Some(self.tenant) => Ok(record),
            _ => Err(AppError::NotFound(format!("{} {} not found", self.resource_type, id))),
        }
    }

    async fn render(&self, record: &ResourceRecord, selection: &AttributeSelection) -> AppResult<Value> {
        let payload = self
            .engine
            .data_to_payload(record.fields(), &self.mapping, selection)
            .await?;
        self.decorate(payload, record)
    }

    /// Adds `schemas`, `id` and `meta` to a mapped payload.
    fn decorate(&self, payload: Value, record: &ResourceRecord) -> AppResult<Value> {
        let Value::Object(attributes) = payload else {
            return Err(AppError::Internal("Mapped payload is not an object".to_string()));
        };

        let meta = Meta {
            resource_type: Some(self.resource_type.to_string()),
            created: record.crdate().and_then(format_epoch_seconds),
            last_modified: record.tstamp().and_then(format_epoch_seconds),
            location: None,
            version: None,
        };
        let mut meta = serde_json::to_value(meta)?;
        if let Value::Object(map) = &mut meta {
            map.retain(|_, v| !v.is_null());
        }

        let mut resource = json!({
            "schemas": [self.resource_type.schema()],
            "id": record.scim_id(),
        });
        if let Value::Object(map) = &mut resource {
            map.extend(
                attributes
                    .into_iter()
                    .filter(|(key, _)| key != "id" && key != "schemas" && key != "meta"),
            );
            map.insert("meta".to_string(), meta);
        }
        Ok(resource)
    }
}
