use serde_json::Value;

use crate::parser::SortOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    /// Case-insensitive equality, used for SCIM string attributes.
    EqualIgnoreCase,
    NotEqualIgnoreCase,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Boolean constraint tree over storage columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Column is neither null nor empty.
    Present(String),
    /// Delimited list column contains `item` as a whole element.
    InSet {
        field: String,
        item: String,
        separator: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn in_set(field: impl Into<String>, item: impl Into<String>, separator: impl Into<String>) -> Self {
        Predicate::InSet {
            field: field.into(),
            item: item.into(),
            separator: separator.into(),
        }
    }

    /// Conjunction that drops `True` operands and unwraps a single operand.
    pub fn all(parts: impl IntoIterator<Item = Predicate>) -> Self {
        let mut parts: Vec<Predicate> = parts
            .into_iter()
            .filter(|p| !matches!(p, Predicate::True))
            .collect();
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

/// Query shape for `RecordStore::select`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub predicate: Predicate,
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl SelectQuery {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    pub fn page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset.max(0);
        self.limit = Some(limit.max(0));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_flattens_trivial_cases() {
        assert_eq!(Predicate::all(vec![]), Predicate::True);
        assert_eq!(
            Predicate::all(vec![Predicate::True, Predicate::eq("pid", 1)]),
            Predicate::eq("pid", 1)
        );
        assert_eq!(
            Predicate::all(vec![Predicate::eq("pid", 1), Predicate::eq("deleted", 0)]),
            Predicate::And(vec![
                Predicate::compare("pid", CompareOp::Eq, json!(1)),
                Predicate::compare("deleted", CompareOp::Eq, json!(0)),
            ])
        );
    }
}
