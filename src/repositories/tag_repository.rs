// TagRepository - tag rows, unique by name case-insensitively

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Tag;
use crate::tag_validator::is_valid_tag;

pub trait TagRepository {
    fn insert(&self, tag: &Tag) -> Result<i64>;
    fn find_by_name(&self, name: &str) -> Result<Option<Tag>>;
    fn find_all(&self) -> Result<Vec<Tag>>;
    fn get_or_create(&self, name: &str) -> Result<Tag>;
    fn set_private(&self, name: &str, private: bool) -> Result<()>;
}

/// SQLite implementation of TagRepository
pub struct SqliteTagRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTagRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> TagRepository for SqliteTagRepository<'a> {
    fn insert(&self, tag: &Tag) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO tags (name, private) VALUES (?1, ?2)",
            params![tag.name, tag.private],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, private FROM tags WHERE name = ?1",
                [name.trim()],
                |row| {
                    Ok(Tag {
                        id: Some(row.get(0)?),
                        name: row.get(1)?,
                        private: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(tag)
    }

    fn find_all(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, private FROM tags ORDER BY name ASC")?;

        let tag_iter = stmt.query_map([], |row| {
            Ok(Tag {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                private: row.get(2)?,
            })
        })?;

        let mut tags = Vec::new();
        for tag in tag_iter {
            tags.push(tag?);
        }
        Ok(tags)
    }

    fn get_or_create(&self, name: &str) -> Result<Tag> {
        let name = name.trim();
        if !is_valid_tag(name) {
            return Err(anyhow::anyhow!("Invalid tag name: {:?}", name));
        }

        // Existing spelling wins: "Shoes" and "shoes" are the same tag
        if let Some(existing_tag) = self.find_by_name(name)? {
            return Ok(existing_tag);
        }

        let new_tag = Tag {
            id: None,
            name: name.to_string(),
            private: false,
        };
        let id = self.insert(&new_tag)?;

        Ok(Tag {
            id: Some(id),
            ..new_tag
        })
    }

    fn set_private(&self, name: &str, private: bool) -> Result<()> {
        let affected_rows = self.conn.execute(
            "UPDATE tags SET private = ?1 WHERE name = ?2",
            params![private, name.trim()],
        )?;

        if affected_rows == 0 {
            return Err(anyhow::anyhow!("Tag not found: {}", name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::create_test_db;

    #[test]
    fn test_insert_and_find_by_name() {
        let (_db_file, db) = create_test_db();
        let repo = db.tags();

        let tag_id = repo
            .insert(&Tag {
                id: None,
                name: "Diesel".to_string(),
                private: false,
            })
            .expect("Failed to insert tag");
        assert!(tag_id > 0);

        // Lookup ignores case
        let tag = repo.find_by_name("diesel").unwrap().unwrap();
        assert_eq!(tag.id, Some(tag_id));
        assert_eq!(tag.name, "Diesel");
        assert!(!tag.private);
    }

    #[test]
    fn test_names_are_unique_case_insensitively() {
        let (_db_file, db) = create_test_db();
        let repo = db.tags();

        let first = repo.get_or_create("Shoes").unwrap();
        let second = repo.get_or_create("SHOES").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Shoes");

        let duplicate = repo.insert(&Tag {
            id: None,
            name: "shoes".to_string(),
            private: false,
        });
        assert!(duplicate.is_err());
        assert_eq!(repo.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_get_or_create_rejects_blank_names() {
        let (_db_file, db) = create_test_db();
        assert!(db.tags().get_or_create("   ").is_err());
        assert!(db.tags().find_all().unwrap().is_empty());
    }

    #[test]
    fn test_set_private() {
        let (_db_file, db) = create_test_db();
        let repo = db.tags();
        repo.get_or_create("drafts").unwrap();

        repo.set_private("Drafts", true).unwrap();
        assert!(repo.find_by_name("drafts").unwrap().unwrap().private);

        assert!(repo.set_private("missing", true).is_err());
    }
}
