//! Per-context resource wiring and the SCIM-facing service layer.

pub mod service;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::mapping::{MappingEngine, MappingSpec};
use crate::models::{Context, TenantScope};
use crate::parser::ResourceType;
use crate::repository::ResourceRepository;

pub use service::ResourceService;

/// Everything one context needs: both repositories, their mappings and the
/// engine holding the context's evaluators.
#[derive(Clone)]
pub struct ResourceDomain {
    pub context: Context,
    pub tenant: TenantScope,
    pub users: Arc<ResourceRepository>,
    pub groups: Arc<ResourceRepository>,
    pub user_mapping: Arc<MappingSpec>,
    pub group_mapping: Arc<MappingSpec>,
    pub engine: MappingEngine,
}

impl ResourceDomain {
    pub fn repository(&self, resource_type: ResourceType) -> &Arc<ResourceRepository> {
        match resource_type {
            ResourceType::User => &self.users,
            ResourceType::Group => &self.groups,
        }
    }

    pub fn mapping(&self, resource_type: ResourceType) -> &Arc<MappingSpec> {
        match resource_type {
            ResourceType::User => &self.user_mapping,
            ResourceType::Group => &self.group_mapping,
        }
    }
}

impl std::fmt::Debug for ResourceDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDomain")
            .field("context", &self.context)
            .field("tenant", &self.tenant)
            .field("users", &self.users.table())
            .field("groups", &self.groups.table())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ResourceDomains {
    domains: BTreeMap<Context, ResourceDomain>,
}

impl ResourceDomains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: ResourceDomain) -> AppResult<()> {
        if self.domains.contains_key(&domain.context) {
            return Err(AppError::Configuration(format!(
                "Context '{}' is defined more than once",
                domain.context
            )));
        }
        self.domains.insert(domain.context.clone(), domain);
        Ok(())
    }

    pub fn get(&self, context: &Context) -> AppResult<&ResourceDomain> {
        self.domains
            .get(context)
            .ok_or_else(|| AppError::Configuration(format!("Unknown context '{}'", context)))
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.domains.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDomain> {
        self.domains.values()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
