//! Shared test utilities for regimen tests.
//!
//! - [`MemoryStore`]: an in-memory [`JobStore`](regimen_db::store::JobStore)
//!   and [`CatalogReader`](regimen_db::store::CatalogReader) with fault
//!   injection, for exercising the worker without a database.
//! - [`TestDb`]: a throwaway, fully migrated regimen database on a shared
//!   PostgreSQL server. `REGIMEN_TEST_PG_URL` names an existing server;
//!   otherwise one container is started per test binary.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::TestDb;
