// ABOUTME: Command implementations for the migrator CLI
// ABOUTME: Exports migrate, schema, and verify commands

pub mod migrate;
pub mod schema;
pub mod verify;

pub use migrate::migrate;
pub use schema::schema;
pub use verify::verify;
