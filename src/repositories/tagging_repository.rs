// TaggingRepository - page/tag join rows
// Hosts call this when an editor saves a page's tag list

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::config::database;
use crate::database::{PageId, Tag};
use crate::repositories::tag_repository::{SqliteTagRepository, TagRepository};

pub trait TaggingRepository {
    /// Tag a page, creating the tag on first use. Re-tagging is a no-op.
    fn tag_page(&self, page_id: PageId, tag_name: &str) -> Result<Tag>;
    fn untag_page(&self, page_id: PageId, tag_name: &str) -> Result<()>;
    fn tags_for_page(&self, page_id: PageId) -> Result<Vec<Tag>>;
    /// Replace the page's whole tag list
    fn set_tag_list(&self, page_id: PageId, tag_names: &[String]) -> Result<()>;
}

/// SQLite implementation of TaggingRepository
pub struct SqliteTaggingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTaggingRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn insert_tagging(&self, conn: &Connection, page_id: PageId, tag_id: i64) -> Result<usize> {
        let affected_rows = conn.execute(
            "INSERT OR IGNORE INTO taggings (tag_id, taggable_id, taggable_type, context, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tag_id,
                page_id,
                database::PAGE_TAGGABLE_TYPE,
                database::CATEGORY_CONTEXT,
                Utc::now(),
            ],
        )?;
        Ok(affected_rows)
    }
}

impl<'a> TaggingRepository for SqliteTaggingRepository<'a> {
    fn tag_page(&self, page_id: PageId, tag_name: &str) -> Result<Tag> {
        let tag = SqliteTagRepository::new(self.conn).get_or_create(tag_name)?;
        let tag_id = tag
            .id
            .ok_or_else(|| anyhow::anyhow!("Tag {} has no id", tag.name))?;

        self.insert_tagging(self.conn, page_id, tag_id)?;
        Ok(tag)
    }

    fn untag_page(&self, page_id: PageId, tag_name: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM taggings
             WHERE taggable_id = ?1 AND taggable_type = ?2 AND context = ?3
               AND tag_id IN (SELECT id FROM tags WHERE name = ?4)",
            params![
                page_id,
                database::PAGE_TAGGABLE_TYPE,
                database::CATEGORY_CONTEXT,
                tag_name.trim(),
            ],
        )?;
        Ok(())
    }

    fn tags_for_page(&self, page_id: PageId) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.private
             FROM tags t
             INNER JOIN taggings tg ON t.id = tg.tag_id
             WHERE tg.taggable_id = ?1 AND tg.taggable_type = ?2 AND tg.context = ?3
             ORDER BY tg.id ASC",
        )?;

        let tag_iter = stmt.query_map(
            params![page_id, database::PAGE_TAGGABLE_TYPE, database::CATEGORY_CONTEXT],
            |row| {
                Ok(Tag {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    private: row.get(2)?,
                })
            },
        )?;

        let mut tags = Vec::new();
        for tag in tag_iter {
            tags.push(tag?);
        }
        Ok(tags)
    }

    fn set_tag_list(&self, page_id: PageId, tag_names: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM taggings WHERE taggable_id = ?1 AND taggable_type = ?2 AND context = ?3",
            params![page_id, database::PAGE_TAGGABLE_TYPE, database::CATEGORY_CONTEXT],
        )?;

        let tags = SqliteTagRepository::new(&tx);
        for name in tag_names {
            let tag = tags.get_or_create(name)?;
            let tag_id = tag
                .id
                .ok_or_else(|| anyhow::anyhow!("Tag {} has no id", tag.name))?;
            self.insert_tagging(&tx, page_id, tag_id)?;
        }

        tx.commit()?;
        Ok(())
    }
}
