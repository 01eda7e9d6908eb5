//! Predicate to SQLite SQL translation
//!
//! Identifiers are validated and double-quoted; every value travels as a
//! bound `?` parameter.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::backend::predicate::{CompareOp, Predicate, SelectQuery};
use crate::error::{AppError, AppResult};
use crate::mapping::value::to_string;
use crate::models::RecordData;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// SQL bind value types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

/// A statement and its bindings, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub bindings: Vec<SqlValue>,
}

pub fn quote_identifier(name: &str) -> AppResult<String> {
    if IDENTIFIER.is_match(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(AppError::BadRequest(format!("Invalid column or table name: {name}")))
    }
}

fn escape_like_pattern(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Internal context for building SQL queries.
#[derive(Default)]
struct TranslationContext {
    bindings: Vec<SqlValue>,
}

impl TranslationContext {
    fn bind(&mut self, value: SqlValue) -> &'static str {
        self.bindings.push(value);
        "?"
    }

    fn translate(&mut self, predicate: &Predicate) -> AppResult<String> {
        match predicate {
            Predicate::True => Ok("1 = 1".to_string()),
            Predicate::Compare { field, op, value } => self.translate_compare(field, *op, value),
            Predicate::Present(field) => {
                let col = quote_identifier(field)?;
                Ok(format!("({col} IS NOT NULL AND {col} <> '')"))
            }
            Predicate::InSet {
                field,
                item,
                separator,
            } => {
                let col = quote_identifier(field)?;
                self.bind(SqlValue::Text(separator.clone()));
                self.bind(SqlValue::Text(separator.clone()));
                self.bind(SqlValue::Text(format!("{separator}{item}{separator}")));
                Ok(format!(
                    "instr(? || REPLACE(CAST({col} AS TEXT), ' ', '') || ?, ?) > 0"
                ))
            }
            Predicate::And(parts) => self.join(parts, " AND ", "1 = 1"),
            Predicate::Or(parts) => self.join(parts, " OR ", "1 = 0"),
            Predicate::Not(inner) => Ok(format!("NOT ({})", self.translate(inner)?)),
        }
    }

    fn join(&mut self, parts: &[Predicate], separator: &str, empty: &str) -> AppResult<String> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let mut clauses = Vec::with_capacity(parts.len());
        for part in parts {
            clauses.push(self.translate(part)?);
        }
        Ok(format!("({})", clauses.join(separator)))
    }

    fn translate_compare(&mut self, field: &str, op: CompareOp, value: &Value) -> AppResult<String> {
        let col = quote_identifier(field)?;

        if value.is_null() {
            return match op {
                CompareOp::Eq | CompareOp::EqualIgnoreCase => Ok(format!("{col} IS NULL")),
                CompareOp::Ne | CompareOp::NotEqualIgnoreCase => Ok(format!("{col} IS NOT NULL")),
                _ => Err(AppError::FilterParse(format!(
                    "Operator {op:?} cannot compare '{field}' with null"
                ))),
            };
        }

        let clause = match op {
            CompareOp::Eq => format!("{col} = {}", self.bind(value.into())),
            CompareOp::Ne => format!("{col} IS NOT {}", self.bind(value.into())),
            CompareOp::EqualIgnoreCase => {
                format!("{col} = {} COLLATE NOCASE", self.bind(value.into()))
            }
            CompareOp::NotEqualIgnoreCase => {
                format!("{col} IS NOT {} COLLATE NOCASE", self.bind(value.into()))
            }
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => {
                let escaped = escape_like_pattern(&to_string(value));
                let pattern = match op {
                    CompareOp::Contains => format!("%{escaped}%"),
                    CompareOp::StartsWith => format!("{escaped}%"),
                    _ => format!("%{escaped}"),
                };
                format!("{col} LIKE {} ESCAPE '\\'", self.bind(SqlValue::Text(pattern)))
            }
            CompareOp::Gt => format!("{col} > {}", self.bind(value.into())),
            CompareOp::Ge => format!("{col} >= {}", self.bind(value.into())),
            CompareOp::Lt => format!("{col} < {}", self.bind(value.into())),
            CompareOp::Le => format!("{col} <= {}", self.bind(value.into())),
        };
        Ok(clause)
    }
}

pub fn where_clause(predicate: &Predicate) -> AppResult<SqlStatement> {
    let mut ctx = TranslationContext::default();
    let sql = ctx.translate(predicate)?;
    Ok(SqlStatement {
        sql,
        bindings: ctx.bindings,
    })
}

pub fn count_sql(table: &str, predicate: &Predicate) -> AppResult<SqlStatement> {
    let filter = where_clause(predicate)?;
    Ok(SqlStatement {
        sql: format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_identifier(table)?,
            filter.sql
        ),
        bindings: filter.bindings,
    })
}

pub fn select_sql(table: &str, query: &SelectQuery) -> AppResult<SqlStatement> {
    let filter = where_clause(&query.predicate)?;
    let mut sql = format!(
        "SELECT * FROM {} WHERE {}",
        quote_identifier(table)?,
        filter.sql
    );
    let mut bindings = filter.bindings;

    if !query.order_by.is_empty() {
        let mut terms = Vec::with_capacity(query.order_by.len());
        for (field, order) in &query.order_by {
            terms.push(format!("{} {}", quote_identifier(field)?, order.as_sql()));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    sql.push_str(" LIMIT ? OFFSET ?");
    bindings.push(SqlValue::Integer(query.limit.unwrap_or(-1)));
    bindings.push(SqlValue::Integer(query.offset.max(0)));

    Ok(SqlStatement { sql, bindings })
}

pub fn insert_sql(table: &str, data: &RecordData) -> AppResult<SqlStatement> {
    if data.is_empty() {
        return Ok(SqlStatement {
            sql: format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table)?),
            bindings: Vec::new(),
        });
    }

    let mut columns = Vec::with_capacity(data.len());
    let mut bindings = Vec::with_capacity(data.len());
    for (column, value) in data {
        columns.push(quote_identifier(column)?);
        bindings.push(SqlValue::from(value));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");

    Ok(SqlStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table)?,
            columns.join(", "),
            placeholders
        ),
        bindings,
    })
}

pub fn update_sql(table: &str, predicate: &Predicate, changes: &RecordData) -> AppResult<SqlStatement> {
    if changes.is_empty() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    let mut assignments = Vec::with_capacity(changes.len());
    let mut bindings = Vec::with_capacity(changes.len());
    for (column, value) in changes {
        assignments.push(format!("{} = ?", quote_identifier(column)?));
        bindings.push(SqlValue::from(value));
    }

    let filter = where_clause(predicate)?;
    bindings.extend(filter.bindings);

    Ok(SqlStatement {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(table)?,
            assignments.join(", "),
            filter.sql
        ),
        bindings,
    })
}
