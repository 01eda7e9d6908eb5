#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Only the exact keyword `ascending` sorts ascending; any other value
    /// sorts descending. An absent `sortOrder` is handled by the caller.
    pub fn from_str(s: &str) -> SortOrder {
        match s {
            "ascending" => SortOrder::Ascending,
            _ => SortOrder::Descending,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub attribute: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(attribute: String, order: SortOrder) -> Self {
        SortSpec { attribute, order }
    }

    /// Parse SCIM sortBy and sortOrder parameters
    pub fn from_params(sort_by: Option<&str>, sort_order: Option<&str>) -> Option<SortSpec> {
        sort_by.filter(|attr| !attr.is_empty()).map(|attr| {
            let order = sort_order
                .map(SortOrder::from_str)
                .unwrap_or(SortOrder::Ascending);
            SortSpec::new(attr.to_string(), order)
        })
    }
}
