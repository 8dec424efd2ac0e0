//! Query functions, one module per table family.

pub mod catalog;
pub mod jobs;
pub mod templates;
