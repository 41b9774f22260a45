//! Thread-local compilation cache for search patterns.
//!
//! Build configurations commonly repeat the same pattern across several files
//! (a version regex applied to every manifest, for example). Compiled regexes
//! are cached per thread so each distinct pattern is compiled once.
//! Cache is capped at 256 entries; the whole cache is cleared when full.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static PATTERN_CACHE: RefCell<HashMap<String, Regex>> =
        RefCell::new(HashMap::new());
}

/// Get a compiled pattern from cache, or compile and cache it.
///
/// Compilation errors are returned as-is and never cached. Cloning a
/// [`Regex`] is cheap; the compiled program is shared.
pub fn get_or_compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }

        // Evict all if at capacity (simple but effective for batch workloads)
        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the pattern cache (mainly for testing).
pub fn clear_cache() {
    PATTERN_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

/// Number of cached patterns on the current thread.
pub fn cache_size() -> usize {
    PATTERN_CACHE.with(|cache| cache.borrow().len())
}
