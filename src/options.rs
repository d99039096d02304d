use serde::{Deserialize, Serialize};

/// Settings shared by every scan done with a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// When enabled, a zero-width begin immediately followed by a zero-width end is worked
    /// around by moving one character forward. When disabled, it's an error: useful when
    /// writing grammars.
    pub safe_mode: bool,
    /// How many steps a scan can take before being considered stuck.
    /// It's only an error if there are also more than 3 steps per byte scanned so far.
    pub max_iterations: usize,
    /// How many sublanguages can be nested in each other
    pub max_depth: usize,
    /// How many modes can be open at once in a single scan, the root included.
    /// Deeper input fails instead of producing a tree too deep to serialize.
    pub max_nesting: usize,
    /// Grammars considered by auto-detection when no candidates are given.
    /// All the registered grammars are used if not set.
    pub auto_detect_languages: Option<Vec<String>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            safe_mode: true,
            max_iterations: 100_000,
            max_depth: 16,
            max_nesting: 1_000,
            auto_detect_languages: None,
        }
    }
}

/// Options for a single explicit scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions<'a> {
    pub(crate) language: &'a str,
    pub(crate) ignore_illegals: bool,
}

impl<'a> ScanOptions<'a> {
    /// Scan with the grammar registered under that name or alias.
    /// Matches of `illegal` patterns are errors by default.
    pub fn new(language: &'a str) -> Self {
        Self {
            language,
            ignore_illegals: false,
        }
    }

    /// Treats text matching an `illegal` pattern as plain text instead of failing the scan
    pub fn ignore_illegals(mut self, value: bool) -> Self {
        self.ignore_illegals = value;
        self
    }
}
