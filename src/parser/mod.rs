pub mod filter_operator;
pub mod filter_parser;
pub mod resource_type;
pub mod sort_parser;

pub use filter_operator::FilterOperator;
pub use filter_parser::parse_filter;
pub use resource_type::ResourceType;
pub use sort_parser::{SortOrder, SortSpec};
