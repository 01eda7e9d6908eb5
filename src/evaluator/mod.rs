//! Named strategies for computed mapping leaves.

pub mod members;
pub mod membership;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::mapping::Arguments;
use crate::models::RecordData;

pub use members::{member_fields, MemberField, MembersEvaluator, MEMBERS};
pub use membership::{MembershipEvaluator, MembershipList, MEMBERSHIP};

/// Computed-field strategy referenced from a mapping leaf by `callback`.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Derives the payload value for a record. `None` omits the attribute.
    async fn retrieve(&self, record: &RecordData, arguments: &Arguments) -> AppResult<Option<Value>>;

    /// Folds a payload value into the data being written.
    fn fold(&self, value: &Value, data: RecordData, arguments: &Arguments) -> AppResult<RecordData>;

    /// Checked once when the mapping is loaded.
    fn validate_arguments(&self, _arguments: &Arguments) -> AppResult<()> {
        Ok(())
    }
}

/// Evaluators by name, assembled once at startup.
#[derive(Default, Clone)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, evaluator: Arc<dyn Evaluator>) -> AppResult<()> {
        let name = name.into();
        if self.evaluators.contains_key(&name) {
            return Err(AppError::Configuration(format!(
                "Evaluator '{name}' is already registered"
            )));
        }
        self.evaluators.insert(name, evaluator);
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, evaluator: Arc<dyn Evaluator>) -> AppResult<Self> {
        self.register(name, evaluator)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Evaluator>> {
        self.evaluators.get(name)
    }

    pub fn resolve(&self, name: &str) -> AppResult<&Arc<dyn Evaluator>> {
        self.get(name)
            .ok_or_else(|| AppError::Configuration(format!("Unknown evaluator '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.evaluators.keys().collect();
        names.sort();
        f.debug_struct("EvaluatorRegistry").field("evaluators", &names).finish()
    }
}

/// Reads a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a Arguments, key: &str) -> AppResult<&'a str> {
    match arguments.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(other) => Err(AppError::Configuration(format!(
            "Argument '{key}' must be a non-empty string, got: {other}"
        ))),
        None => Err(AppError::Configuration(format!("Missing argument '{key}'"))),
    }
}

pub(crate) fn optional_str<'a>(arguments: &'a Arguments, key: &str) -> AppResult<Option<&'a str>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(AppError::Configuration(format!(
            "Argument '{key}' must be a string, got: {other}"
        ))),
    }
}

pub(crate) fn separator(arguments: &Arguments) -> AppResult<String> {
    match optional_str(arguments, "separator")? {
        Some("") => Err(AppError::Configuration(
            "Argument 'separator' must not be empty".to_string(),
        )),
        Some(sep) => Ok(sep.to_string()),
        None => Ok(MembershipList::DEFAULT_SEPARATOR.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = EvaluatorRegistry::new();
        registry
            .register(MEMBERSHIP, Arc::new(MembershipEvaluator))
            .unwrap();
        assert!(registry.contains(MEMBERSHIP));
        assert!(matches!(
            registry.register(MEMBERSHIP, Arc::new(MembershipEvaluator)),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_fails_eagerly() {
        let registry = EvaluatorRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(matches!(registry.resolve("nope"), Err(AppError::Configuration(_))));
    }
}
