//! Response parser: raw generator text to [`ProgramStructure`].

use thiserror::Error;

use super::structure::ProgramStructure;

/// Errors from parsing a generator response.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("generator returned an empty response")]
    Empty,

    #[error("generated program is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("generated program contains no weeks")]
    NoWeeks,
}

/// Strip surrounding whitespace and a Markdown code fence (with optional
/// language tag) from `raw`.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        body = &rest[tag_len..];
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a generator response into a [`ProgramStructure`].
pub fn parse_program(raw: &str) -> Result<ProgramStructure, ParseError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    let structure: ProgramStructure = serde_json::from_str(body)?;
    if structure.weeks.is_empty() {
        return Err(ParseError::NoWeeks);
    }
    Ok(structure)
}
