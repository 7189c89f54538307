//! Analyzer configuration.
//!
//! ```rust
//! use dotlens::config::{AnalyzerConfig, OverrideMatching};
//!
//! let config = AnalyzerConfig::default()
//!     .with_default_page_size(20)
//!     .with_override_matching(OverrideMatching::ParameterCount);
//! assert_eq!(config.default_page_size, 20);
//!
//! let config = AnalyzerConfig::from_json(r#"{ "max_page_size": 100 }"#)?;
//! assert_eq!(config.max_page_size, 100);
//! assert_eq!(config.default_page_size, 50);
//! # Ok::<(), dotlens::Error>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error::InvalidArgument, Result};

/// Hard upper bound of any page size, whatever the configuration says
pub const PAGE_SIZE_CEILING: u32 = 500;

/// How a derived method is matched against a base method when looking for overrides
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OverrideMatching {
    /// Same name and parameter count
    ParameterCount,
    /// Same name, generic arity and parameter type names
    #[default]
    Signature,
}

/// Tunables of an [`crate::Analyzer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Page size used when a request does not set a limit
    pub default_page_size: u32,
    /// Upper bound of any page size, at most [`PAGE_SIZE_CEILING`]; larger limits are capped
    pub max_page_size: u32,
    /// Compiled size limit of search patterns, in bytes
    pub regex_size_limit: usize,
    /// Wall clock budget of one usage scan call, in milliseconds
    pub scan_time_budget_ms: u64,
    /// Maximum number of method bodies one usage scan call inspects
    pub scan_method_budget: usize,
    /// Method bodies scanned in parallel per batch
    pub scan_batch_size: usize,
    /// Override matching rule
    pub override_matching: OverrideMatching,
    /// Depth limit of inheritance walks
    pub max_inheritance_depth: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            default_page_size: 50,
            max_page_size: 500,
            regex_size_limit: 1 << 20,
            scan_time_budget_ms: 2_000,
            scan_method_budget: 50_000,
            scan_batch_size: 64,
            override_matching: OverrideMatching::Signature,
            max_inheritance_depth: 64,
        }
    }
}

impl AnalyzerConfig {
    /// Parses a configuration from JSON; absent keys keep their defaults.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for malformed JSON or values that fail
    /// [`AnalyzerConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalyzerConfig = serde_json::from_str(json)
            .map_err(|error| InvalidArgument(format!("invalid configuration: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if a page size, budget or batch size is zero,
    /// the maximum page size exceeds [`PAGE_SIZE_CEILING`], or the default page size exceeds
    /// the maximum.
    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(InvalidArgument("page sizes must be positive".to_string()));
        }
        if self.max_page_size > PAGE_SIZE_CEILING {
            return Err(InvalidArgument(format!(
                "maximum page size {} exceeds {PAGE_SIZE_CEILING}",
                self.max_page_size
            )));
        }
        if self.default_page_size > self.max_page_size {
            return Err(InvalidArgument(format!(
                "default page size {} exceeds the maximum {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.scan_method_budget == 0 || self.scan_batch_size == 0 {
            return Err(InvalidArgument("scan budgets must be positive".to_string()));
        }

        Ok(())
    }

    /// Scan time budget as a [`Duration`]
    #[must_use]
    pub fn scan_time_budget(&self) -> Duration {
        Duration::from_millis(self.scan_time_budget_ms)
    }

    /// Sets the default page size
    #[must_use]
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the maximum page size
    #[must_use]
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size;
        self
    }

    /// Sets the compiled regex size limit
    #[must_use]
    pub fn with_regex_size_limit(mut self, bytes: usize) -> Self {
        self.regex_size_limit = bytes;
        self
    }

    /// Sets the scan time budget
    #[must_use]
    pub fn with_scan_time_budget(mut self, budget: Duration) -> Self {
        self.scan_time_budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the scan method budget
    #[must_use]
    pub fn with_scan_method_budget(mut self, methods: usize) -> Self {
        self.scan_method_budget = methods;
        self
    }

    /// Sets the scan batch size
    #[must_use]
    pub fn with_scan_batch_size(mut self, methods: usize) -> Self {
        self.scan_batch_size = methods;
        self
    }

    /// Sets the override matching rule
    #[must_use]
    pub fn with_override_matching(mut self, matching: OverrideMatching) -> Self {
        self.override_matching = matching;
        self
    }

    /// Sets the inheritance depth limit
    #[must_use]
    pub fn with_max_inheritance_depth(mut self, depth: usize) -> Self {
        self.max_inheritance_depth = depth;
        self
    }
}
