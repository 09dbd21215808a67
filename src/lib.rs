use log::info;
use std::collections::HashMap;
use std::path::Path;

pub mod config;
pub mod database;
pub mod errors;
pub mod links;
pub mod related;
pub mod repositories;
pub mod tag_cloud;
pub mod tag_query;
pub mod tag_search;
pub mod tag_validator;

pub use config::TagsConfig;
pub use database::{Database, NewPage, Page, PageId, Status, Tag, TagCount};
pub use errors::{ErrorCategory, TagError, TagResult};
pub use related::{RelatedOptions, RelatedPage};
pub use repositories::{
    PageRepository, SqlitePageRepository, TagCountOptions, TagCountOrder, TagRepository,
    TaggingRepository,
};
pub use tag_cloud::{bucketize, AllTagsOptions, AllTagsOrder, CloudItem, TagCloudOptions};
pub use tag_query::{
    MatchMode, OrderDirection, OrderField, Pagination, Scope, StatusFilter, TagAttributes,
    TagQuery, TagQueryEngine,
};
pub use tag_search::{SearchOptions, TagSearch};

/// The tagging extension as a host activates it: one database and the
/// settings resolved at activation.
pub struct TagsExtension {
    db: Database,
    config: TagsConfig,
}

impl TagsExtension {
    /// Open (and migrate) the database at `db_path` and resolve host settings
    pub fn activate(db_path: impl AsRef<Path>, settings: &HashMap<String, String>) -> TagResult<Self> {
        let config = TagsConfig::from_settings(settings)?;
        let db = Database::open(db_path.as_ref())?;
        info!(
            "Tags extension activated: database={}, results_page={}",
            db_path.as_ref().display(),
            config.results_page_url
        );
        Ok(Self { db, config })
    }

    pub fn with_database(db: Database, config: TagsConfig) -> TagResult<Self> {
        config.validate()?;
        Ok(Self { db, config })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &TagsConfig {
        &self.config
    }

    /// A query engine over this extension's pages
    pub fn engine(&self) -> TagQueryEngine<SqlitePageRepository<'_>> {
        TagQueryEngine::new(self.db.pages(), self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tags;
    use crate::config::test_values::*;
    use crate::database::test_support::timestamp;
    use tempfile::NamedTempFile;

    #[test]
    fn test_activate_with_settings() {
        let db_file = NamedTempFile::new().unwrap();
        let settings = HashMap::from([
            (tags::RESULTS_PAGE_URL_KEY.to_string(), "/labels".to_string()),
            (tags::COMPLEX_STRINGS_KEY.to_string(), "true".to_string()),
        ]);

        let extension = TagsExtension::activate(db_file.path(), &settings).unwrap();
        assert_eq!(extension.config().results_page_url, "/labels");
        assert!(extension.config().complex_strings);
    }

    #[test]
    fn test_activate_rejects_bad_results_url() {
        let db_file = NamedTempFile::new().unwrap();
        let settings = HashMap::from([(
            tags::RESULTS_PAGE_URL_KEY.to_string(),
            "labels".to_string(),
        )]);

        let err = TagsExtension::activate(db_file.path(), &settings)
            .err()
            .unwrap();
        assert_eq!(err.category(), ErrorCategory::ConfigError);
    }

    #[test]
    fn test_engine_end_to_end() {
        let db = Database::open_in_memory().unwrap();
        let extension = TagsExtension::with_database(db, TagsConfig::default()).unwrap();

        let pages = extension.database().pages();
        let id = pages
            .insert(&NewPage::new("Boots", "/fashion/boots/").published_at(timestamp(TEST_PUBLISHED_AT)))
            .unwrap();
        extension
            .database()
            .taggings()
            .set_tag_list(id, &[TEST_TAG_SHOES.to_string(), TEST_TAG_LEATHER.to_string()])
            .unwrap();

        let engine = extension.engine();
        let found = engine
            .find_pages_with(&TagAttributes::new().with("with", "shoes, leather"), None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Boots");

        let cloud = engine.tag_cloud_list(None, None).unwrap();
        assert_eq!(cloud.len(), 2);
        assert!(cloud.iter().all(|item| item.css_class == "size1"));
    }
}
