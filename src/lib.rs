pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod filter;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod parser;
pub mod repository;
pub mod resource;
pub mod startup;
pub mod utils;

// Re-export commonly used types for easier access
pub use error::{AppError, AppResult};
pub use mapping::{AttributeSelection, MappingEngine, MappingSpec};
pub use models::{Context, QueryParams, RecordData, ResourceRecord, TenantScope};
pub use repository::ResourceRepository;
pub use resource::ResourceService;
pub use startup::Application;
