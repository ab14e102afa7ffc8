//! Error-code severity policy.

use std::collections::HashMap;

/// Severity used for codes nobody registered, until the job changes it.
pub const DEFAULT_ERROR_LEVEL: i32 = 8;

/// Severity that marks a code as tolerated.
pub const TOLERATED: i32 = 0;

/// Maps warehouse error codes to the job's severity levels.
///
/// Classification is total: unknown codes fall back to the default level.
#[derive(Debug, Clone)]
pub struct SeverityMap {
    levels: HashMap<i64, i32>,
    default_level: i32,
}

impl SeverityMap {
    pub fn new() -> Self {
        Self {
            levels: HashMap::new(),
            default_level: DEFAULT_ERROR_LEVEL,
        }
    }

    /// Sets the severity of one code. Later calls win.
    pub fn register(&mut self, code: i64, severity: i32) {
        self.levels.insert(code, severity);
    }

    /// Sets the same severity for several codes.
    pub fn register_all<I>(&mut self, codes: I, severity: i32)
    where
        I: IntoIterator<Item = i64>,
    {
        for code in codes {
            self.register(code, severity);
        }
    }

    /// Changes the fallback severity for unregistered codes.
    pub fn set_default_level(&mut self, severity: i32) {
        self.default_level = severity;
    }

    pub fn default_level(&self) -> i32 {
        self.default_level
    }

    pub fn classify(&self, code: i64) -> i32 {
        self.levels
            .get(&code)
            .copied()
            .unwrap_or(self.default_level)
    }

    /// True when the code was explicitly registered as tolerated.
    pub fn is_tolerated(&self, code: i64) -> bool {
        self.levels.get(&code) == Some(&TOLERATED)
    }
}

impl Default for SeverityMap {
    fn default() -> Self {
        Self::new()
    }
}
