//! Entity filtering by vhost and name.
//!
//! Four independently configured regular expressions decide whether a record
//! takes part in a collection cycle: vhost include/skip and name
//! include/skip. Patterns are unanchored and compiled once at startup.

use regex::Regex;

use crate::record::EntityRecord;

/// Error compiling a filter pattern.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid filter pattern '{pattern}': {error}")]
pub struct FilterCompileError {
    pub pattern: String,
    pub error: String,
}

/// Compiled include/skip patterns for one entity kind.
///
/// An unset include pattern matches everything; an unset skip pattern
/// matches nothing.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    include_vhost: Option<Regex>,
    skip_vhost: Option<Regex>,
    include_name: Option<Regex>,
    skip_name: Option<Regex>,
}

fn compile(pattern: &str) -> Result<Regex, FilterCompileError> {
    Regex::new(pattern).map_err(|e| FilterCompileError {
        pattern: pattern.to_string(),
        error: e.to_string(),
    })
}

impl EntityFilter {
    /// Compile a filter.
    pub fn compile(
        include_vhost: &str,
        skip_vhost: Option<&str>,
        include_name: &str,
        skip_name: Option<&str>,
    ) -> Result<Self, FilterCompileError> {
        Ok(Self {
            include_vhost: Some(compile(include_vhost)?),
            skip_vhost: skip_vhost.map(compile).transpose()?,
            include_name: Some(compile(include_name)?),
            skip_name: skip_name.map(compile).transpose()?,
        })
    }

    /// Check a vhost and entity name pair.
    pub fn admits(&self, vhost: &str, name: &str) -> bool {
        if self.include_vhost.as_ref().is_some_and(|re| !re.is_match(vhost)) {
            return false;
        }
        if self.skip_vhost.as_ref().is_some_and(|re| re.is_match(vhost)) {
            return false;
        }
        if self.include_name.as_ref().is_some_and(|re| !re.is_match(name)) {
            return false;
        }
        if self.skip_name.as_ref().is_some_and(|re| re.is_match(name)) {
            return false;
        }
        true
    }

    /// Check whether a record takes part in the current cycle.
    pub fn admit(&self, record: &EntityRecord) -> bool {
        self.admits(record.label("vhost"), record.label("name"))
    }
}
