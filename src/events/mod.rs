//! In-process lifecycle events for group resources.
//!
//! Listeners run one after another in registration order; the first error
//! stops dispatch and is returned to the caller.

pub mod attach;
pub mod cascade;
pub mod membership;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::AppResult;
use crate::mapping::MappingSpec;
use crate::models::{Context, PersistMode, ResourceRecord};

pub use attach::MemberAttachment;
pub use cascade::MembershipCascade;

/// Snapshot handed to group listeners.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    pub mapping: Arc<MappingSpec>,
    pub payload: Value,
    pub record: ResourceRecord,
    pub mode: PersistMode,
    pub context: Context,
}

impl GroupEvent {
    pub fn record_id(&self) -> Option<&str> {
        self.record.scim_id()
    }
}

#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// After a group was created or updated.
    PostPersistGroup(GroupEvent),
    /// After a group was soft-deleted.
    PostDeleteGroup(GroupEvent),
}

impl ResourceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceEvent::PostPersistGroup(_) => "post_persist_group",
            ResourceEvent::PostDeleteGroup(_) => "post_delete_group",
        }
    }
}

#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;

    /// Listeners ignore events they are not interested in.
    async fn handle(&self, event: &ResourceEvent) -> AppResult<()>;
}

#[derive(Default, Clone)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn with(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.subscribe(listener);
        self
    }

    pub fn listener_names(&self) -> Vec<&str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    pub async fn dispatch(&self, event: &ResourceEvent) -> AppResult<()> {
        for listener in &self.listeners {
            debug!(event = event.name(), listener = listener.name(), "Dispatching");
            listener.handle(event).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_names())
            .finish()
    }
}
