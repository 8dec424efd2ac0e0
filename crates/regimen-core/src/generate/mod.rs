//! The generation pipeline: prompt construction, the external generation
//! call, and turning its untrusted output into a validated template.
//!
//! Everything except [`client`] is pure logic with no I/O.

pub mod build;
pub mod client;
mod lenient;
pub mod parser;
pub mod prompt;
pub mod structure;
pub mod validate;

pub use build::{BuildError, build_template};
pub use client::{GenerationClient, GenerationConfig, GenerationError, HttpGenerationClient};
pub use parser::{ParseError, parse_program};
pub use prompt::{PromptError, build_prompt};
pub use structure::{DayStructure, ExerciseStructure, ProgramStructure, WeekStructure};
pub use validate::{ValidationError, ValidationPolicy, validate_structure};
