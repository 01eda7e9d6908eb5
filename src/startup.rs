use std::sync::Arc;
use tracing::info;

use crate::backend::{RecordStore, StoreFactory};
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, ContextConfig};
use crate::error::AppResult;
use crate::evaluator::{member_fields, EvaluatorRegistry, MembersEvaluator, MembershipEvaluator, MEMBERS, MEMBERSHIP};
use crate::events::{EventDispatcher, MemberAttachment, MembershipCascade};
use crate::filter::{FilterTranslator, ScimFilterTranslator};
use crate::mapping::{MappingEngine, MappingSpec};
use crate::models::Context;
use crate::parser::ResourceType;
use crate::repository::ResourceRepository;
use crate::resource::{ResourceDomain, ResourceDomains, ResourceService};

/// Wired application: one store, one domain per configured context and the
/// group event listeners.
pub struct Application {
    config: AppConfig,
    store: Arc<dyn RecordStore>,
    domains: Arc<ResourceDomains>,
    dispatcher: Arc<EventDispatcher>,
}

impl Application {
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let store = StoreFactory::create(&config.database).await?;
        Self::with_store(config, store, Arc::new(SystemClock)).await
    }

    /// Builds every context on `store` and makes sure its tables exist.
    pub async fn with_store(config: AppConfig, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;
        store.health_check().await?;

        let translator: Arc<dyn FilterTranslator> = Arc::new(ScimFilterTranslator::new());
        let mut domains = ResourceDomains::new();
        for context in &config.contexts {
            let domain = build_domain(&config, context, &store, &translator, &clock)?;
            domains.insert(domain)?;
        }
        let domains = Arc::new(domains);

        let dispatcher = EventDispatcher::new()
            .with(Arc::new(MemberAttachment::new(domains.clone())))
            .with(Arc::new(MembershipCascade::new(domains.clone())));

        let app = Self {
            config,
            store,
            domains,
            dispatcher: Arc::new(dispatcher),
        };
        app.initialize_schemas().await?;
        Ok(app)
    }

    /// Creates missing tables and columns; safe to run repeatedly.
    pub async fn initialize_schemas(&self) -> AppResult<()> {
        for domain in self.domains.iter() {
            let (user_columns, group_columns) = schema_columns(&domain.user_mapping, &domain.group_mapping);
            self.store.init_table(domain.users.table(), &user_columns).await?;
            self.store.init_table(domain.groups.table(), &group_columns).await?;
            info!(
                context = %domain.context,
                users = domain.users.table(),
                groups = domain.groups.table(),
                "Initialized context"
            );
        }
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn domains(&self) -> &Arc<ResourceDomains> {
        &self.domains
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn service(&self, context: &str, resource_type: ResourceType) -> AppResult<ResourceService> {
        let domain = self.domains.get(&Context::new(context))?;
        Ok(ResourceService::new(domain, resource_type, self.dispatcher.clone()))
    }

    pub fn users(&self, context: &str) -> AppResult<ResourceService> {
        self.service(context, ResourceType::User)
    }

    pub fn groups(&self, context: &str) -> AppResult<ResourceService> {
        self.service(context, ResourceType::Group)
    }
}

fn build_domain(
    config: &AppConfig,
    context: &ContextConfig,
    store: &Arc<dyn RecordStore>,
    translator: &Arc<dyn FilterTranslator>,
    clock: &Arc<dyn Clock>,
) -> AppResult<ResourceDomain> {
    let base_dir = config.base_dir.as_deref();
    let user_mapping = context.users.load_mapping(base_dir)?;
    let group_mapping = context.groups.load_mapping(base_dir)?;

    let users = Arc::new(ResourceRepository::new(
        ResourceType::User,
        context.users.table.clone(),
        store.clone(),
        translator.clone(),
        clock.clone(),
    ));
    let groups = Arc::new(ResourceRepository::new(
        ResourceType::Group,
        context.groups.table.clone(),
        store.clone(),
        translator.clone(),
        clock.clone(),
    ));

    let registry = EvaluatorRegistry::new()
        .with(MEMBERSHIP, Arc::new(MembershipEvaluator))?
        .with(MEMBERS, Arc::new(MembersEvaluator::new(users.clone(), context.tenant())))?;
    user_mapping.validate(&registry, config.mapping.strict)?;
    group_mapping.validate(&registry, config.mapping.strict)?;

    Ok(ResourceDomain {
        context: context.context(),
        tenant: context.tenant(),
        users,
        groups,
        user_mapping: Arc::new(user_mapping),
        group_mapping: Arc::new(group_mapping),
        engine: MappingEngine::new(Arc::new(registry)),
    })
}

/// Columns each table needs beyond the identity columns: every `mapOn`
/// column, every membership `field`, and on the user table the columns
/// the group mapping lists members from.
fn schema_columns(user_mapping: &MappingSpec, group_mapping: &MappingSpec) -> (Vec<String>, Vec<String>) {
    let mut user_columns = user_mapping.mapped_columns();
    let mut group_columns = group_mapping.mapped_columns();

    for (spec, columns) in [(user_mapping, &mut user_columns), (group_mapping, &mut group_columns)] {
        for (_, config) in spec.leaves() {
            if config.callback.as_deref() != Some(MEMBERSHIP) {
                continue;
            }
            if let Some(field) = config.arguments.get("field").and_then(|v| v.as_str()) {
                push_unique(columns, field);
            }
        }
    }
    for field in member_fields(group_mapping) {
        push_unique(&mut user_columns, &field.field_user);
    }

    (user_columns, group_columns)
}

fn push_unique(columns: &mut Vec<String>, column: &str) {
    if !columns.iter().any(|c| c == column) {
        columns.push(column.to_string());
    }
}
