use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::mapping::{Cast, FieldConfig, MappingSpec};
use crate::models::{Context, TenantScope};

lazy_static! {
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    pub contexts: Vec<ContextConfig>,
    /// Directory relative `mapping_file` paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MappingConfig {
    /// Reject leaves that map to nothing and unknown callbacks at startup.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    pub name: String,
    #[serde(default)]
    pub pid: i64,
    pub users: ResourceConfig,
    pub groups: ResourceConfig,
}

impl ContextConfig {
    pub fn context(&self) -> Context {
        Context::new(self.name.clone())
    }

    pub fn tenant(&self) -> TenantScope {
        TenantScope(self.pid)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResourceConfig {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_file: Option<PathBuf>,
}

impl ResourceConfig {
    /// The inline mapping, or the one read from `mapping_file`.
    pub fn load_mapping(&self, base_dir: Option<&Path>) -> AppResult<MappingSpec> {
        match (&self.mapping, &self.mapping_file) {
            (Some(spec), None) => Ok(spec.clone()),
            (None, Some(file)) => {
                let path = match base_dir {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file.clone(),
                };
                MappingSpec::from_file(path)
            }
            (Some(_), Some(_)) => Err(AppError::Configuration(format!(
                "Table '{}' sets both mapping and mapping_file",
                self.table
            ))),
            (None, None) => Err(AppError::Configuration(format!(
                "Table '{}' has no mapping",
                self.table
            ))),
        }
    }
}

impl AppConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> AppResult<Self> {
        let path = config_path.as_ref();

        if !path.exists() {
            return Err(AppError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml_str(&content).map_err(|e| {
            AppError::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> AppResult<Self> {
        let expanded = Self::expand_env_vars(content)?;
        let config: AppConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory SQLite with one `default` context on `fe_users` / `fe_groups`.
    pub fn default_config() -> Self {
        AppConfig {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 1,
            },
            logging: LoggingConfig::default(),
            mapping: MappingConfig::default(),
            contexts: vec![ContextConfig {
                name: "default".to_string(),
                pid: 0,
                users: ResourceConfig {
                    table: "fe_users".to_string(),
                    mapping: Some(default_user_mapping()),
                    mapping_file: None,
                },
                groups: ResourceConfig {
                    table: "fe_groups".to_string(),
                    mapping: Some(default_group_mapping()),
                    mapping_file: None,
                },
            }],
            base_dir: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.contexts.is_empty() {
            return Err(AppError::Configuration(
                "Configuration must contain at least one context".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for context in &self.contexts {
            if context.name.trim().is_empty() {
                return Err(AppError::Configuration("Context name must not be empty".to_string()));
            }
            if !names.insert(context.name.as_str()) {
                return Err(AppError::Configuration(format!(
                    "Context '{}' is defined more than once",
                    context.name
                )));
            }
            for resource in [&context.users, &context.groups] {
                if resource.table.trim().is_empty() {
                    return Err(AppError::Configuration(format!(
                        "Context '{}' has an empty table name",
                        context.name
                    )));
                }
            }
            if context.users.table == context.groups.table {
                return Err(AppError::Configuration(format!(
                    "Context '{}' uses '{}' for both users and groups",
                    context.name, context.users.table
                )));
            }
        }
        Ok(())
    }

    pub fn find_context(&self, name: &str) -> Option<&ContextConfig> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Expand environment variables in format ${VAR_NAME} or ${VAR_NAME:-default}
    fn expand_env_vars(content: &str) -> AppResult<String> {
        let mut expanded = String::with_capacity(content.len());
        let mut last = 0;

        for captures in ENV_VAR.captures_iter(content) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let name = &captures[1];
            let value = match (std::env::var(name), captures.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => {
                    return Err(AppError::Configuration(format!(
                        "Environment variable {} not found and no default provided",
                        name
                    )))
                }
            };
            expanded.push_str(&content[last..whole.start()]);
            expanded.push_str(&value);
            last = whole.end();
        }
        expanded.push_str(&content[last..]);

        Ok(expanded)
    }
}

fn arguments(value: serde_json::Value) -> crate::mapping::Arguments {
    value.as_object().cloned().unwrap_or_default()
}

pub fn default_user_mapping() -> MappingSpec {
    MappingSpec::new()
        .with("userName", FieldConfig::map_on("username"))
        .with(
            "name",
            MappingSpec::new()
                .with("givenName", FieldConfig::map_on("first_name"))
                .with("familyName", FieldConfig::map_on("last_name")),
        )
        .with("active", FieldConfig::map_on("disabled").with_cast(Cast::Bool).toggled())
        .with("externalId", FieldConfig::map_on("external_id"))
        .with(
            "groups",
            FieldConfig::callback("membership", arguments(json!({"field": "usergroup"}))),
        )
}

pub fn default_group_mapping() -> MappingSpec {
    MappingSpec::new()
        .with("displayName", FieldConfig::map_on("title"))
        .with("externalId", FieldConfig::map_on("external_id"))
        .with(
            "members",
            FieldConfig::callback(
                "members",
                arguments(json!({"field_user": "usergroup", "display_field": "username"})),
            ),
        )
}
