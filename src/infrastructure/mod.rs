// Core infrastructure modules
pub mod cache;                 // Versioned LRU cache for document post-images
pub mod database;              // Document store interface and query types
pub mod id_generator;          // ObjectId-style document ids
pub mod middleware;            // Request-scoped viewer context
pub mod security;              // Bearer token verification
pub mod sqlite_database;       // SQLite document store
pub mod update;                // Atomic document update operators
pub mod viewer;                // Viewer context

pub use cache::Cache;
pub use database::{Collection, DocumentDatabase, FindQuery, UnwindQuery, UnwindSource, UnwoundRow};
pub use id_generator::{DocId, IdGenerator};
pub use security::TokenService;
pub use sqlite_database::SqliteDocumentDatabase;
pub use update::{Aggregate, ElementFilter, Update, UpdateOutcome};
pub use viewer::ViewerContext;
