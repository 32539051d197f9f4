// Society hub: residential community backend

// HTTP routes and handlers
pub mod api;
pub mod app_state;
pub mod config;

// Typed document access
pub mod entities;

// Document store, caching, ids and request identity
pub mod infrastructure;

// Document models
pub mod models;

// Order reconciliation, engagement, moderation and directory services
pub mod services;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
