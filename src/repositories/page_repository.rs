// PageRepository - read side of the page tree used by the tag queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashSet;

use crate::config::database;
use crate::database::{NewPage, Page, PageId, Status, TagCount};
use crate::tag_query::{MatchMode, OrderDirection, OrderField};

const PAGE_COLUMNS: &str = "p.id, p.parent_id, p.title, p.slug, p.breadcrumb, p.url, p.class_name,
     p.status_id, p.virtual, p.published_at, p.created_at, p.updated_at";

/// Sort key for page listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOrder {
    pub field: OrderField,
    pub direction: OrderDirection,
}

impl Default for PageOrder {
    fn default() -> Self {
        Self {
            field: OrderField::PublishedAt,
            direction: OrderDirection::Desc,
        }
    }
}

impl PageOrder {
    fn to_sql(self) -> String {
        let dir = self.direction.as_sql();
        format!("p.{} {dir}, p.id {dir}", self.field.column())
    }
}

/// Repository-level page filter. Virtual pages are always excluded.
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    /// Only pages with this status; None keeps every status
    pub status: Option<Status>,
    /// Only pages published at or before this instant
    pub published_before: Option<DateTime<Utc>>,
    pub exclude_id: Option<PageId>,
    /// Let private tags take part in tag matching
    pub include_private_tags: bool,
    /// Only pages whose URL starts with this prefix
    pub url_prefix: Option<String>,
    pub order: PageOrder,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Ordering of tag counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagCountOrder {
    #[default]
    CountDesc,
    CountAsc,
    NameAsc,
    NameDesc,
    /// Most recently applied tags first
    NewestTagging,
}

impl TagCountOrder {
    fn to_sql(self) -> &'static str {
        match self {
            TagCountOrder::CountDesc => "count DESC, t.name ASC",
            TagCountOrder::CountAsc => "count ASC, t.name ASC",
            TagCountOrder::NameAsc => "t.name ASC",
            TagCountOrder::NameDesc => "t.name DESC",
            TagCountOrder::NewestTagging => "MAX(tg.created_at) DESC, t.name ASC",
        }
    }
}

/// Restrictions applied when counting tag usage
#[derive(Debug, Clone, Default)]
pub struct TagCountOptions {
    /// Only taggings created at or after this instant
    pub start_at: Option<DateTime<Utc>>,
    /// Only taggings created at or before this instant
    pub end_at: Option<DateTime<Utc>>,
    /// Drop tags used fewer times than this
    pub at_least: Option<u64>,
    /// Drop tags used more times than this
    pub at_most: Option<u64>,
    pub limit: Option<u32>,
    pub order: TagCountOrder,
    /// Only these tag names (case-insensitive); empty keeps all
    pub names: Vec<String>,
    pub include_private: bool,
}

/// Page lookups the tag queries depend on
pub trait PageRepository {
    /// Pages carrying all (or any) of `tags`, filtered, ordered and paginated per `filter`
    fn find_by_tag_set(&self, tags: &[String], mode: MatchMode, filter: &PageFilter)
        -> Result<Vec<Page>>;
    fn find_by_url(&self, url: &str) -> Result<Option<Page>>;
    fn find_by_id(&self, id: PageId) -> Result<Option<Page>>;
    /// Ancestors from the parent up to the root
    fn ancestors_of(&self, page_id: PageId) -> Result<Vec<Page>>;
    /// Tag names of one page in the order they were applied
    fn tag_names_of(&self, page_id: PageId) -> Result<Vec<String>>;
    /// Pages sharing at least one tag with `page_id`, never the page itself.
    /// With `rank_by_shared` the most overlapping pages come first and `filter.order` breaks ties.
    fn find_related(&self, page_id: PageId, filter: &PageFilter, rank_by_shared: bool)
        -> Result<Vec<Page>>;
    /// Usage counts of page tags, restricted to tags used under `scope` when given
    fn tag_counts_of(&self, scope: Option<&str>, options: &TagCountOptions)
        -> Result<Vec<TagCount>>;
}

/// Normalise a page URL to the stored form: leading and trailing slash
pub fn clean_url(url: &str) -> String {
    let trimmed = url.trim().trim_matches('/');
    let mut cleaned = String::with_capacity(trimmed.len() + 2);
    cleaned.push('/');
    for segment in trimmed.split('/').filter(|segment| !segment.is_empty()) {
        cleaned.push_str(segment);
        cleaned.push('/');
    }
    cleaned
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        breadcrumb: row.get(4)?,
        url: row.get(5)?,
        class_name: row.get(6)?,
        status_id: row.get(7)?,
        virtual_page: row.get(8)?,
        published_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Distinct names, compared the way the tags.name column compares them
fn distinct_names(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_ascii_lowercase()))
        .map(str::to_string)
        .collect()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Appends the status/visibility conditions of `filter` for pages aliased `p`
fn push_page_conditions(filter: &PageFilter, sql: &mut String, params: &mut Vec<Box<dyn ToSql>>) {
    sql.push_str(" AND p.virtual = 0");

    if let Some(status) = filter.status {
        sql.push_str(" AND p.status_id = ?");
        params.push(Box::new(status.id()));
    }

    if let Some(before) = filter.published_before {
        sql.push_str(" AND p.published_at IS NOT NULL AND p.published_at <= ?");
        params.push(Box::new(before));
    }

    if let Some(exclude_id) = filter.exclude_id {
        sql.push_str(" AND p.id != ?");
        params.push(Box::new(exclude_id));
    }

    if let Some(prefix) = &filter.url_prefix {
        sql.push_str(" AND substr(p.url, 1, length(?)) = ?");
        params.push(Box::new(prefix.clone()));
        params.push(Box::new(prefix.clone()));
    }
}

fn push_pagination(limit: Option<u32>, offset: Option<u32>, sql: &mut String, params: &mut Vec<Box<dyn ToSql>>) {
    match (limit, offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Box::new(limit));
            params.push(Box::new(offset.unwrap_or(0)));
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(Box::new(offset));
        }
        (None, None) => {}
    }
}

/// SQLite implementation of PageRepository
pub struct SqlitePageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePageRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a page; the host owns pages, this exists for seeding and tests
    pub fn insert(&self, page: &NewPage) -> Result<PageId> {
        let now = Utc::now();
        let breadcrumb = page.breadcrumb.clone().unwrap_or_else(|| page.title.clone());

        self.conn.execute(
            "INSERT INTO pages (parent_id, title, slug, breadcrumb, url, class_name, status_id,
                                virtual, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                page.parent_id,
                page.title,
                page.slug,
                breadcrumb,
                clean_url(&page.url),
                page.class_name,
                page.status.id(),
                page.virtual_page,
                page.published_at,
                now,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn query_pages(&self, sql: &str, params: &[Box<dyn ToSql>]) -> Result<Vec<Page>> {
        debug!("page query: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let page_iter = stmt.query_map(params_from_iter(params.iter()), page_from_row)?;

        let mut pages = Vec::new();
        for page in page_iter {
            pages.push(page?);
        }
        Ok(pages)
    }
}

impl<'a> PageRepository for SqlitePageRepository<'a> {
    fn find_by_tag_set(
        &self,
        tags: &[String],
        mode: MatchMode,
        filter: &PageFilter,
    ) -> Result<Vec<Page>> {
        let names = distinct_names(tags);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(database::PAGE_TAGGABLE_TYPE),
            Box::new(database::CATEGORY_CONTEXT),
        ];

        let mut sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages p
             WHERE p.id IN (
                 SELECT tg.taggable_id FROM taggings tg
                 INNER JOIN tags t ON t.id = tg.tag_id
                 WHERE tg.taggable_type = ? AND tg.context = ?
                   AND t.name IN ({})",
            placeholders(names.len())
        );
        for name in &names {
            params.push(Box::new(name.clone()));
        }
        if !filter.include_private_tags {
            sql.push_str(" AND t.private = 0");
        }
        sql.push_str(" GROUP BY tg.taggable_id");
        if mode == MatchMode::All {
            sql.push_str(" HAVING COUNT(DISTINCT t.id) = ?");
            params.push(Box::new(names.len() as i64));
        }
        sql.push_str(")");

        push_page_conditions(filter, &mut sql, &mut params);
        sql.push_str(" ORDER BY ");
        sql.push_str(&filter.order.to_sql());
        push_pagination(filter.limit, filter.offset, &mut sql, &mut params);

        self.query_pages(&sql, &params)
    }

    fn find_by_url(&self, url: &str) -> Result<Option<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages p WHERE p.url = ?1");
        let page = self
            .conn
            .query_row(&sql, [clean_url(url)], page_from_row)
            .optional()?;
        Ok(page)
    }

    fn find_by_id(&self, id: PageId) -> Result<Option<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages p WHERE p.id = ?1");
        let page = self.conn.query_row(&sql, [id], page_from_row).optional()?;
        Ok(page)
    }

    fn ancestors_of(&self, page_id: PageId) -> Result<Vec<Page>> {
        let sql = format!(
            "WITH RECURSIVE chain(id, parent_id, depth) AS (
                 SELECT id, parent_id, 0 FROM pages WHERE id = ?
                 UNION ALL
                 SELECT parent.id, parent.parent_id, chain.depth + 1
                 FROM pages parent INNER JOIN chain ON parent.id = chain.parent_id
                 WHERE chain.depth < ?
             )
             SELECT {PAGE_COLUMNS} FROM pages p
             INNER JOIN chain ON chain.id = p.id
             WHERE chain.depth > 0
             ORDER BY chain.depth ASC"
        );
        let params: Vec<Box<dyn ToSql>> =
            vec![Box::new(page_id), Box::new(database::MAX_ANCESTOR_DEPTH)];
        self.query_pages(&sql, &params)
    }

    fn tag_names_of(&self, page_id: PageId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name FROM tags t
             INNER JOIN taggings tg ON tg.tag_id = t.id
             WHERE tg.taggable_id = ?1 AND tg.taggable_type = ?2 AND tg.context = ?3
             ORDER BY tg.id ASC",
        )?;

        let name_iter = stmt.query_map(
            params![page_id, database::PAGE_TAGGABLE_TYPE, database::CATEGORY_CONTEXT],
            |row| row.get::<_, String>(0),
        )?;

        let mut names = Vec::new();
        for name in name_iter {
            names.push(name?);
        }
        Ok(names)
    }

    fn find_related(
        &self,
        page_id: PageId,
        filter: &PageFilter,
        rank_by_shared: bool,
    ) -> Result<Vec<Page>> {
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(database::PAGE_TAGGABLE_TYPE),
            Box::new(database::CATEGORY_CONTEXT),
            Box::new(page_id),
            Box::new(database::PAGE_TAGGABLE_TYPE),
            Box::new(database::CATEGORY_CONTEXT),
        ];

        let mut sql = format!(
            "SELECT {PAGE_COLUMNS}, COUNT(DISTINCT t.id) AS shared FROM pages p
             INNER JOIN taggings tg ON tg.taggable_id = p.id
                 AND tg.taggable_type = ? AND tg.context = ?
             INNER JOIN tags t ON t.id = tg.tag_id
             WHERE t.id IN (
                 SELECT own.tag_id FROM taggings own
                 WHERE own.taggable_id = ? AND own.taggable_type = ? AND own.context = ?
             )
             AND p.id != ?"
        );
        params.push(Box::new(page_id));
        if !filter.include_private_tags {
            sql.push_str(" AND t.private = 0");
        }

        push_page_conditions(filter, &mut sql, &mut params);
        sql.push_str(" GROUP BY p.id ORDER BY ");
        if rank_by_shared {
            sql.push_str("shared DESC, ");
        }
        sql.push_str(&filter.order.to_sql());
        push_pagination(filter.limit, filter.offset, &mut sql, &mut params);

        self.query_pages(&sql, &params)
    }

    fn tag_counts_of(
        &self,
        scope: Option<&str>,
        options: &TagCountOptions,
    ) -> Result<Vec<TagCount>> {
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(database::PAGE_TAGGABLE_TYPE),
            Box::new(database::CATEGORY_CONTEXT),
        ];

        let mut sql = String::from(
            "SELECT t.name, COUNT(*) AS count FROM tags t
             INNER JOIN taggings tg ON tg.tag_id = t.id
             WHERE tg.taggable_type = ? AND tg.context = ?",
        );

        if !options.include_private {
            sql.push_str(" AND t.private = 0");
        }
        if let Some(start_at) = options.start_at {
            sql.push_str(" AND tg.created_at >= ?");
            params.push(Box::new(start_at));
        }
        if let Some(end_at) = options.end_at {
            sql.push_str(" AND tg.created_at <= ?");
            params.push(Box::new(end_at));
        }

        let names = distinct_names(&options.names);
        if !names.is_empty() {
            sql.push_str(&format!(" AND t.name IN ({})", placeholders(names.len())));
            for name in names {
                params.push(Box::new(name));
            }
        }

        if let Some(scope) = scope {
            sql.push_str(
                " AND EXISTS (
                     SELECT 1 FROM taggings scoped
                     INNER JOIN pages sp ON sp.id = scoped.taggable_id
                     WHERE scoped.tag_id = t.id
                       AND scoped.taggable_type = ? AND scoped.context = ?
                       AND substr(sp.url, 1, length(?)) = ?
                 )",
            );
            params.push(Box::new(database::PAGE_TAGGABLE_TYPE));
            params.push(Box::new(database::CATEGORY_CONTEXT));
            params.push(Box::new(scope.to_string()));
            params.push(Box::new(scope.to_string()));
        }

        sql.push_str(" GROUP BY t.id");

        let mut having = Vec::new();
        if let Some(at_least) = options.at_least {
            having.push("COUNT(*) >= ?");
            params.push(Box::new(i64::try_from(at_least).unwrap_or(i64::MAX)));
        }
        if let Some(at_most) = options.at_most {
            having.push("COUNT(*) <= ?");
            params.push(Box::new(i64::try_from(at_most).unwrap_or(i64::MAX)));
        }
        if !having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(options.order.to_sql());
        push_pagination(options.limit, None, &mut sql, &mut params);

        debug!("tag count query: {}", sql);
        let mut stmt = self.conn.prepare(&sql)?;
        let count_iter = stmt.query_map(params_from_iter(params.iter()), |row| {
            let count: i64 = row.get(1)?;
            Ok(TagCount {
                name: row.get(0)?,
                count: count.max(0) as u64,
            })
        })?;

        let mut counts = Vec::new();
        for count in count_iter {
            counts.push(count?);
        }
        Ok(counts)
    }
}
