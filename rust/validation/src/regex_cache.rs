// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compiled pattern cache
//!
//! One cache per execution unit, passed by `&mut` into evaluation. Patterns that
//! fail to compile are remembered as invalid so they are not recompiled; callers
//! fall back to substring containment for them.

use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;

/// Default maximum number of cached patterns
const DEFAULT_CAPACITY: usize = 1024;

/// Cache performance statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegexCacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Patterns that failed to compile
    pub invalid: usize,
    pub entries: usize,
}

/// Memoized pattern matchers keyed by (flags, pattern)
#[derive(Debug)]
pub struct RegexCache {
    /// flags → pattern → compiled regex (`None` = not a valid regex)
    patterns: FxHashMap<String, FxHashMap<String, Option<Regex>>>,
    capacity: usize,
    entries: usize,
    stats: RegexCacheStats,
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexCache {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_CAPACITY)
    }

    /// Create a cache that is cleared once it holds `capacity` patterns
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            patterns: FxHashMap::default(),
            capacity: capacity.max(1),
            entries: 0,
            stats: RegexCacheStats::default(),
        }
    }

    /// Get the compiled pattern, compiling on first use.
    ///
    /// Returns `None` when the pattern is not a valid regular expression.
    /// Flags: `i` enables case-insensitive matching.
    pub fn compile(&mut self, pattern: &str, flags: &str) -> Option<&Regex> {
        let cached = self
            .patterns
            .get(flags)
            .is_some_and(|by_pattern| by_pattern.contains_key(pattern));

        if cached {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            if self.entries >= self.capacity {
                tracing::debug!(entries = self.entries, "Regex cache full, clearing");
                self.patterns.clear();
                self.entries = 0;
            }

            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(flags.contains('i'))
                .build()
                .map_err(|e| {
                    tracing::debug!(pattern = %pattern, error = %e, "Invalid pattern, using substring match");
                })
                .ok();
            if compiled.is_none() {
                self.stats.invalid += 1;
            }

            self.patterns
                .entry(flags.to_string())
                .or_default()
                .insert(pattern.to_string(), compiled);
            self.entries += 1;
        }

        self.patterns.get(flags)?.get(pattern)?.as_ref()
    }

    /// Test `text` against `pattern`.
    ///
    /// Valid patterns use an unanchored regex search; invalid patterns fall
    /// back to substring containment (case-folded when the `i` flag is set).
    pub fn matches(&mut self, pattern: &str, flags: &str, text: &str) -> bool {
        match self.compile(pattern, flags) {
            Some(regex) => regex.is_match(text),
            None if flags.contains('i') => text.to_lowercase().contains(&pattern.to_lowercase()),
            None => text.contains(pattern),
        }
    }

    pub fn stats(&self) -> RegexCacheStats {
        RegexCacheStats {
            entries: self.entries,
            ..self.stats
        }
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
        self.entries = 0;
    }
}
