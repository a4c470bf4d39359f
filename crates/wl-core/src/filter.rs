//! Client and project name filters applied before merging.

use regex::Regex;
use thiserror::Error;

use crate::entry::Entry;

/// A user supplied pattern failed to compile.
#[derive(Debug, Error)]
#[error("invalid {option} pattern `{pattern}`")]
pub struct PatternError {
    pub option: &'static str,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Compiles an optional pattern. Empty patterns are treated as absent.
pub fn compile_pattern(
    option: &'static str,
    pattern: Option<&str>,
) -> Result<Option<Regex>, PatternError> {
    match pattern {
        None | Some("") => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|source| PatternError {
                option,
                pattern: pattern.to_string(),
                source,
            }),
    }
}

/// Patterns narrowing the fetched entries down by client and project name.
///
/// An absent pattern matches everything.
#[derive(Debug, Clone, Default)]
pub struct FilterOpts {
    pub client: Option<Regex>,
    pub project: Option<Regex>,
}

impl FilterOpts {
    pub fn new(client: Option<&str>, project: Option<&str>) -> Result<Self, PatternError> {
        Ok(Self {
            client: compile_pattern("client filter", client)?,
            project: compile_pattern("project filter", project)?,
        })
    }

    /// Returns true if the entry passes both patterns.
    pub fn matches(&self, entry: &Entry) -> bool {
        let client_ok = self
            .client
            .as_ref()
            .is_none_or(|re| re.is_match(&entry.client.name));
        let project_ok = self
            .project
            .as_ref()
            .is_none_or(|re| re.is_match(&entry.project.name));

        client_ok && project_ok
    }
}
