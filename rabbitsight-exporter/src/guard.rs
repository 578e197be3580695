//! Cardinality guard.
//!
//! Vetoes a whole collection cycle when the broker reports more entities than
//! the configured ceiling. There is no per-record truncation: either every
//! admitted entity is exported or none is.

use tracing::debug;

use crate::error::CollectError;

/// All-or-nothing ceiling on the number of entities of one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardinalityGuard {
    ceiling: i64,
}

impl CardinalityGuard {
    /// Create a guard; a ceiling `<= 0` disables it.
    pub fn new(ceiling: i64) -> Self {
        Self { ceiling }
    }

    /// Whether the guard needs a total count at all.
    pub fn is_enabled(&self) -> bool {
        self.ceiling > 0
    }

    /// Decide for a known total.
    pub fn should_collect(&self, total: usize) -> bool {
        if !self.is_enabled() {
            return true;
        }
        total as u64 <= self.ceiling as u64
    }

    /// Decide for an optional total supplied by the scrape context.
    ///
    /// A missing total is an error only when the guard is enabled.
    pub fn check(&self, kind: &'static str, total: Option<usize>) -> Result<bool, CollectError> {
        if !self.is_enabled() {
            return Ok(true);
        }

        let total = total.ok_or(CollectError::TotalCountMissing { kind })?;
        let collect = self.should_collect(total);
        if !collect {
            debug!(
                kind,
                ceiling = self.ceiling,
                total,
                "Entity ceiling exceeded, skipping collection"
            );
        }
        Ok(collect)
    }
}
