pub mod catalog;
pub mod generate;
pub mod jobs;
pub mod worker;
