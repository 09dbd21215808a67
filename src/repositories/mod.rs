// Repository pattern: the page store is read through PageRepository,
// tags and taggings are written by the host through the other two

pub mod page_repository;
pub mod tag_repository;
pub mod tagging_repository;

pub use page_repository::{
    clean_url, PageFilter, PageOrder, PageRepository, SqlitePageRepository, TagCountOptions,
    TagCountOrder,
};
pub use tag_repository::{SqliteTagRepository, TagRepository};
pub use tagging_repository::{SqliteTaggingRepository, TaggingRepository};
