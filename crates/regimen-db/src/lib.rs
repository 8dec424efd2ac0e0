//! Persistence for regimen: models, schema migrations, query functions, and
//! the store traits the generation pipeline is written against.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;
