use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::database;
use crate::errors::TagResult;
use crate::repositories::{SqlitePageRepository, SqliteTagRepository, SqliteTaggingRepository};

pub type PageId = i64;

/// Page lifecycle status, with the host's numeric ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Draft,
    Reviewed,
    Scheduled,
    Published,
    Hidden,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Draft,
        Status::Reviewed,
        Status::Scheduled,
        Status::Published,
        Status::Hidden,
    ];

    pub fn id(self) -> i64 {
        match self {
            Status::Draft => 1,
            Status::Reviewed => 50,
            Status::Scheduled => 90,
            Status::Published => 100,
            Status::Hidden => 101,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Reviewed => "reviewed",
            Status::Scheduled => "scheduled",
            Status::Published => "published",
            Status::Hidden => "hidden",
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.id() == id)
    }

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(name))
    }
}

/// A page as seen by the tag queries. Never modified by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub parent_id: Option<PageId>,
    pub title: String,
    pub slug: String,
    pub breadcrumb: String,
    pub url: String,
    pub class_name: Option<String>,
    pub status_id: i64,
    pub virtual_page: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn status(&self) -> Option<Status> {
        Status::from_id(self.status_id)
    }

    pub fn is_published(&self) -> bool {
        self.status() == Some(Status::Published)
    }

    /// True for the host's "page not found" placeholder
    pub fn is_not_found_placeholder(&self) -> bool {
        self.class_name.as_deref() == Some(database::NOT_FOUND_PAGE_CLASS)
    }
}

/// Fields for inserting a page into the SQLite store
#[derive(Debug, Clone)]
pub struct NewPage {
    pub parent_id: Option<PageId>,
    pub title: String,
    pub slug: String,
    pub breadcrumb: Option<String>,
    pub url: String,
    pub class_name: Option<String>,
    pub status: Status,
    pub virtual_page: bool,
    pub published_at: Option<DateTime<Utc>>,
}

impl NewPage {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let title = title.into();
        let url = url.into();
        let slug = url
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            parent_id: None,
            title,
            slug,
            breadcrumb: None,
            url,
            class_name: None,
            status: Status::Draft,
            virtual_page: false,
            published_at: None,
        }
    }

    pub fn child_of(mut self, parent_id: PageId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.status = Status::Published;
        self.published_at = Some(at);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn virtual_page(mut self) -> Self {
        self.virtual_page = true;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub name: String,
    pub private: bool,
}

/// A tag name with the number of pages carrying it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: u64,
}

impl TagCount {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: impl AsRef<Path>) -> TagResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> TagResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> TagResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        db.initialize_schema()?;
        db.migrate_private_tags()?;
        Ok(db)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn pages(&self) -> SqlitePageRepository<'_> {
        SqlitePageRepository::new(&self.conn)
    }

    pub fn tags(&self) -> SqliteTagRepository<'_> {
        SqliteTagRepository::new(&self.conn)
    }

    pub fn taggings(&self) -> SqliteTaggingRepository<'_> {
        SqliteTaggingRepository::new(&self.conn)
    }

    fn initialize_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                breadcrumb TEXT NOT NULL DEFAULT '',
                url TEXT UNIQUE NOT NULL,
                class_name TEXT,
                status_id INTEGER NOT NULL DEFAULT 1,
                virtual INTEGER NOT NULL DEFAULT 0,
                published_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES pages (id)
            )",
            [],
        )?;

        // private is added by migrate_private_tags
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL COLLATE NOCASE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS taggings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tag_id INTEGER NOT NULL,
                taggable_id INTEGER NOT NULL,
                taggable_type TEXT NOT NULL,
                context TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (tag_id) REFERENCES tags (id) ON DELETE CASCADE,
                UNIQUE(tag_id, taggable_id, taggable_type, context)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS index_taggings_on_taggable
             ON taggings (taggable_id, taggable_type, context)",
            [],
        )?;

        Ok(())
    }

    /// Adds tags.private to databases created before private tags existed.
    /// Returns true when the column was added.
    fn migrate_private_tags(&self) -> rusqlite::Result<bool> {
        let has_private = {
            let mut stmt = self.conn.prepare("PRAGMA table_info(tags)")?;
            let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
            let mut found = false;
            for column in columns {
                if column? == "private" {
                    found = true;
                }
            }
            found
        };

        if !has_private {
            self.conn.execute(
                "ALTER TABLE tags ADD COLUMN private INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            info!("Added private column to {}", database::TAGS_TABLE);
        }

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS index_tags_on_private ON tags (private)",
            [],
        )?;

        Ok(!has_private)
    }
}
