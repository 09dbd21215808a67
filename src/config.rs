// Configuration constants and the injected extension settings
// Hardcoded names and limits live here instead of being scattered through queries

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::errors::{TagError, TagResult};

/// Tag-related configuration constants
pub mod tags {
    /// Results page used when the host has no setting
    pub const DEFAULT_RESULTS_URL: &str = "/t";

    /// Maximum allowed length for tag names
    pub const MAX_TAG_LENGTH: usize = 255;

    /// Host setting key for the results page URL
    pub const RESULTS_PAGE_URL_KEY: &str = "tags.results_page_url";

    /// Host setting key enabling quoted tag names in tag lists
    pub const COMPLEX_STRINGS_KEY: &str = "tags.complex_strings";
}

/// Database schema constants
pub mod database {
    pub const TAGS_TABLE: &str = "tags";

    /// taggable_type stored on every page tagging
    pub const PAGE_TAGGABLE_TYPE: &str = "Page";

    /// Tagging context used for page categories
    pub const CATEGORY_CONTEXT: &str = "categories";

    /// class_name of the host's placeholder page for unknown URLs
    pub const NOT_FOUND_PAGE_CLASS: &str = "FileNotFoundPage";

    /// Upper bound on ancestor chain walks, guards against parent cycles
    pub const MAX_ANCESTOR_DEPTH: i64 = 256;
}

/// Query attribute constants
pub mod query {
    /// Default sort field for tagged page listings
    pub const DEFAULT_ORDER_FIELD: &str = "published_at";

    /// Default sort direction
    pub const DEFAULT_ORDER_DIRECTION: &str = "desc";

    /// Default status filter
    pub const DEFAULT_STATUS: &str = "published";

    /// Status filter value disabling the status check
    pub const ALL_STATUSES: &str = "all";

    /// Scope value naming the page being rendered
    pub const CURRENT_PAGE_SCOPE: &str = "current_page";

    /// limit/offset accept 1 to 4 decimal digits
    pub const NUMERIC_ATTRIBUTE_PATTERN: &str = r"^\d{1,4}$";

    /// Largest value a limit/offset may take
    pub const MAX_NUMERIC_ATTRIBUTE: u16 = 9999;
}

/// Tag cloud constants
pub mod cloud {
    /// CSS classes assigned from smallest to largest bucket
    pub const STYLES: [&str; 9] = [
        "size1", "size2", "size3", "size4", "size5", "size6", "size7", "size8", "size9",
    ];

    /// Default number of tags listed by all_tags
    pub const ALL_TAGS_DEFAULT_LIMIT: u32 = 5;
}


fn default_results_page_url() -> String {
    tags::DEFAULT_RESULTS_URL.to_string()
}

/// Settings injected into the engine at construction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagsConfig {
    /// Base URL of the tag results page, only used to build display links
    #[serde(default = "default_results_page_url")]
    pub results_page_url: String,

    /// Allow double-quoted tag names in tag lists
    #[serde(default)]
    pub complex_strings: bool,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            results_page_url: default_results_page_url(),
            complex_strings: false,
        }
    }
}

impl TagsConfig {
    /// Read settings from the host's key-value store. Blank values fall back to defaults.
    pub fn from_settings(settings: &HashMap<String, String>) -> TagResult<Self> {
        let mut config = Self::default();

        if let Some(url) = settings
            .get(tags::RESULTS_PAGE_URL_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
        {
            config.results_page_url = url.to_string();
        }

        if let Some(flag) = settings
            .get(tags::COMPLEX_STRINGS_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
        {
            config.complex_strings = match flag.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    return Err(TagError::config(format!(
                        "{} must be true or false, got {other}",
                        tags::COMPLEX_STRINGS_KEY
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> TagResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> TagResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> TagResult<()> {
        if !self.results_page_url.starts_with('/') {
            return Err(TagError::config(format!(
                "results page url must be an absolute path, got {}",
                self.results_page_url
            )));
        }
        Ok(())
    }
}
