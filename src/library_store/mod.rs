//! Library store module: the normalized streaming-history database.
//!
//! Persistence is abstracted behind the `LibraryStore` trait so the populate
//! engine can run against SQLite in production and plain maps in tests.

mod memory_store;
mod models;
mod schema;
mod store;
mod trait_def;

pub use memory_store::MemoryLibraryStore;
pub use models::*;
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use store::SqliteLibraryStore;
pub use trait_def::LibraryStore;
