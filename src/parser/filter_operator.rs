use serde_json::Value;

/// Parsed SCIM filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOperator {
    // Comparison operators
    Equal(String, Value),
    NotEqual(String, Value),
    Contains(String, Value),
    StartsWith(String, Value),
    EndsWith(String, Value),
    GreaterThan(String, Value),
    GreaterThanOrEqual(String, Value),
    LessThan(String, Value),
    LessThanOrEqual(String, Value),
    Present(String),

    // Logical operators
    And(Box<FilterOperator>, Box<FilterOperator>),
    Or(Box<FilterOperator>, Box<FilterOperator>),
    Not(Box<FilterOperator>),

    // Value filter, `attribute[filter]`
    Complex(String, Box<FilterOperator>),
}

impl FilterOperator {
    /// Splits a conjunction into its operands, left to right.
    pub fn into_conjuncts(self) -> Vec<FilterOperator> {
        match self {
            FilterOperator::And(left, right) => {
                let mut parts = left.into_conjuncts();
                parts.extend(right.into_conjuncts());
                parts
            }
            other => vec![other],
        }
    }
}
