//! SCIM filter expressions to storage predicates
//!
//! Attribute names resolve through the mapping; `id` falls back to the
//! `scim_id` column and `meta.created` / `meta.lastModified` to the
//! timestamp columns when the mapping does not name them.
//!
//! Value filters (`emails[type eq "work"]`) and attributes without a mapped
//! column are rejected rather than silently ignored.

use chrono::DateTime;
use serde_json::Value;

use crate::backend::{CompareOp, Predicate};
use crate::error::{AppError, AppResult};
use crate::mapping::{find_leaf, MappingSpec};
use crate::models::{CRDATE, SCIM_ID, TSTAMP};
use crate::parser::{parse_filter, FilterOperator};

/// Turns a filter string into predicate fragments that are ANDed together.
pub trait FilterTranslator: Send + Sync {
    fn translate(&self, filter: &str, spec: &MappingSpec) -> AppResult<Vec<Predicate>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScimFilterTranslator;

/// Storage column an attribute resolved to.
struct ResolvedAttr {
    column: String,
    toggle: bool,
    timestamp: bool,
}

impl ScimFilterTranslator {
    pub fn new() -> Self {
        Self
    }

    fn resolve(attr: &str, spec: &MappingSpec) -> AppResult<ResolvedAttr> {
        if let Some(leaf) = find_leaf(attr, spec) {
            if let Some(column) = &leaf.map_on {
                return Ok(ResolvedAttr {
                    column: column.clone(),
                    toggle: leaf.toggle,
                    timestamp: false,
                });
            }
        }

        let (column, timestamp) = match attr {
            "id" => (SCIM_ID, false),
            "meta.created" => (CRDATE, true),
            "meta.lastModified" => (TSTAMP, true),
            _ => {
                return Err(AppError::FilterParse(format!(
                    "Attribute '{attr}' cannot be filtered on"
                )))
            }
        };
        Ok(ResolvedAttr {
            column: column.to_string(),
            toggle: false,
            timestamp,
        })
    }

    fn compare(attr: &str, op: CompareOp, value: &Value, spec: &MappingSpec) -> AppResult<Predicate> {
        let resolved = Self::resolve(attr, spec)?;

        let value = if resolved.timestamp {
            timestamp_value(attr, value)?
        } else if resolved.toggle && matches!(op, CompareOp::Eq | CompareOp::Ne) {
            match value {
                Value::Bool(b) => Value::Bool(!b),
                other => other.clone(),
            }
        } else {
            value.clone()
        };

        let op = match (op, &value) {
            (CompareOp::Eq, Value::String(_)) => CompareOp::EqualIgnoreCase,
            (CompareOp::Ne, Value::String(_)) => CompareOp::NotEqualIgnoreCase,
            (op, _) => op,
        };

        Ok(Predicate::compare(resolved.column, op, value))
    }

    fn convert(operator: &FilterOperator, spec: &MappingSpec) -> AppResult<Predicate> {
        match operator {
            FilterOperator::Equal(attr, value) => Self::compare(attr, CompareOp::Eq, value, spec),
            FilterOperator::NotEqual(attr, value) => Self::compare(attr, CompareOp::Ne, value, spec),
            FilterOperator::Contains(attr, value) => {
                Self::compare(attr, CompareOp::Contains, value, spec)
            }
            FilterOperator::StartsWith(attr, value) => {
                Self::compare(attr, CompareOp::StartsWith, value, spec)
            }
            FilterOperator::EndsWith(attr, value) => {
                Self::compare(attr, CompareOp::EndsWith, value, spec)
            }
            FilterOperator::GreaterThan(attr, value) => Self::compare(attr, CompareOp::Gt, value, spec),
            FilterOperator::GreaterThanOrEqual(attr, value) => {
                Self::compare(attr, CompareOp::Ge, value, spec)
            }
            FilterOperator::LessThan(attr, value) => Self::compare(attr, CompareOp::Lt, value, spec),
            FilterOperator::LessThanOrEqual(attr, value) => {
                Self::compare(attr, CompareOp::Le, value, spec)
            }
            FilterOperator::Present(attr) => {
                Ok(Predicate::Present(Self::resolve(attr, spec)?.column))
            }
            FilterOperator::And(left, right) => Ok(Predicate::And(vec![
                Self::convert(left, spec)?,
                Self::convert(right, spec)?,
            ])),
            FilterOperator::Or(left, right) => Ok(Predicate::Or(vec![
                Self::convert(left, spec)?,
                Self::convert(right, spec)?,
            ])),
            FilterOperator::Not(inner) => Ok(Self::convert(inner, spec)?.negate()),
            FilterOperator::Complex(attr, _) => Err(AppError::FilterParse(format!(
                "Value filters on '{attr}' are not supported"
            ))),
        }
    }
}

impl FilterTranslator for ScimFilterTranslator {
    fn translate(&self, filter: &str, spec: &MappingSpec) -> AppResult<Vec<Predicate>> {
        parse_filter(filter)?
            .into_conjuncts()
            .iter()
            .map(|operator| Self::convert(operator, spec))
            .collect()
    }
}

/// `meta.*` comparisons take an RFC 3339 date and compare epoch seconds.
fn timestamp_value(attr: &str, value: &Value) -> AppResult<Value> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| Value::from(dt.timestamp()))
            .map_err(|e| AppError::FilterParse(format!("Invalid date for '{attr}': {e}"))),
        Value::Number(_) => Ok(value.clone()),
        other => Err(AppError::FilterParse(format!(
            "Invalid date for '{attr}': {other}"
        ))),
    }
}
