pub mod schema;
pub mod sql;
pub mod store;

pub use store::SqliteRecordStore;
