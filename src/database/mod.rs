pub mod migrations;
pub mod schema;

pub use migrations::sync_schema;
pub use schema::CURRENT_SCHEMA;
