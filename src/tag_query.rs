//! Tagged page lookups.
//!
//! [`TagQuery`] is the validated form of the attributes a template tag passes
//! in; [`TagQueryEngine`] runs it against a [`PageRepository`].

use chrono::Utc;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{query, TagsConfig};
use crate::database::{Page, PageId, Status};
use crate::errors::{TagError, TagResult};
use crate::repositories::{PageFilter, PageOrder, PageRepository};
use crate::tag_validator::parse_tag_list;

const INVALID_ORDER_FIELD: &str = "invalid order field";
const INVALID_ORDER_DIRECTION: &str = "invalid order direction";
const INVALID_NUMERIC_ATTRIBUTE: &str = "invalid numeric attribute";
const INVALID_STATUS: &str = "invalid status";
const SCOPE_NOT_FOUND: &str = "scope not found";
const MISSING_TAGS: &str = "tagged query requires at least one tag";

/// Whether a page needs every requested tag or just one of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// Page attributes results may be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    Id,
    Title,
    Slug,
    Breadcrumb,
    Url,
    ParentId,
    StatusId,
    CreatedAt,
    UpdatedAt,
    PublishedAt,
}

impl OrderField {
    pub const ALL: [OrderField; 10] = [
        OrderField::Id,
        OrderField::Title,
        OrderField::Slug,
        OrderField::Breadcrumb,
        OrderField::Url,
        OrderField::ParentId,
        OrderField::StatusId,
        OrderField::CreatedAt,
        OrderField::UpdatedAt,
        OrderField::PublishedAt,
    ];

    /// Column name in the pages table
    pub fn column(self) -> &'static str {
        match self {
            OrderField::Id => "id",
            OrderField::Title => "title",
            OrderField::Slug => "slug",
            OrderField::Breadcrumb => "breadcrumb",
            OrderField::Url => "url",
            OrderField::ParentId => "parent_id",
            OrderField::StatusId => "status_id",
            OrderField::CreatedAt => "created_at",
            OrderField::UpdatedAt => "updated_at",
            OrderField::PublishedAt => "published_at",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|field| field.column() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    /// `asc` or `desc`, any case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(OrderDirection::Asc),
            "desc" => Some(OrderDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    /// Pages with this status; `Only(Published)` also hides future publish dates
    Only(Status),
    All,
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::Only(Status::Published)
    }
}

impl StatusFilter {
    /// `all` or a status name
    pub fn from_name(name: &str) -> Option<Self> {
        if name.trim().eq_ignore_ascii_case(query::ALL_STATUSES) {
            return Some(StatusFilter::All);
        }
        Status::from_name(name).map(StatusFilter::Only)
    }
}

/// Subtree a query is restricted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Url(String),
    Page(PageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<u16>,
    pub offset: Option<u16>,
}

impl Pagination {
    pub(crate) fn validate(self) -> TagResult<()> {
        for (field, value) in [("limit", self.limit), ("offset", self.offset)] {
            if value.is_some_and(|v| v > query::MAX_NUMERIC_ATTRIBUTE) {
                return Err(TagError::validation(field, INVALID_NUMERIC_ATTRIBUTE));
            }
        }
        Ok(())
    }

    pub(crate) fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map(usize::from).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

/// Raw string attributes as they arrive from a template tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagAttributes(HashMap<String, String>);

impl TagAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Trimmed value; blank values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// `limit`/`offset` style attribute: 1 to 4 decimal digits
pub(crate) fn parse_numeric(attrs: &TagAttributes, field: &str) -> TagResult<Option<u16>> {
    let Some(raw) = attrs.get(field) else {
        return Ok(None);
    };

    let pattern = Regex::new(query::NUMERIC_ATTRIBUTE_PATTERN)
        .map_err(|e| TagError::config(format!("bad numeric pattern: {e}")))?;
    if !pattern.is_match(raw) {
        return Err(TagError::validation(field, INVALID_NUMERIC_ATTRIBUTE));
    }

    raw.parse::<u16>()
        .map(Some)
        .map_err(|_| TagError::validation(field, INVALID_NUMERIC_ATTRIBUTE))
}

pub(crate) fn parse_pagination(attrs: &TagAttributes) -> TagResult<Pagination> {
    Ok(Pagination {
        limit: parse_numeric(attrs, "limit")?,
        offset: parse_numeric(attrs, "offset")?,
    })
}

/// `by` and `order` attributes, falling back to `published_at desc`
pub(crate) fn parse_order(attrs: &TagAttributes) -> TagResult<PageOrder> {
    let by = attrs.get("by").unwrap_or(query::DEFAULT_ORDER_FIELD);
    let field =
        OrderField::from_name(by).ok_or_else(|| TagError::validation("by", INVALID_ORDER_FIELD))?;

    let order = attrs.get("order").unwrap_or(query::DEFAULT_ORDER_DIRECTION);
    let direction = OrderDirection::from_name(order)
        .ok_or_else(|| TagError::validation("order", INVALID_ORDER_DIRECTION))?;

    Ok(PageOrder { field, direction })
}

/// A validated tagged-pages request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagQuery {
    pub tags: Vec<String>,
    pub match_mode: MatchMode,
    pub scope: Option<Scope>,
    pub status_filter: StatusFilter,
    pub exclude_id: Option<PageId>,
    pub order_by: OrderField,
    pub order_dir: OrderDirection,
    pub pagination: Pagination,
    /// Let private tags match
    pub include_private: bool,
}

impl Default for TagQuery {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            match_mode: MatchMode::All,
            scope: None,
            status_filter: StatusFilter::default(),
            exclude_id: None,
            order_by: OrderField::PublishedAt,
            order_dir: OrderDirection::Desc,
            pagination: Pagination::default(),
            include_private: false,
        }
    }
}

impl TagQuery {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn any(mut self) -> Self {
        self.match_mode = MatchMode::Any;
        self
    }

    pub fn scoped(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn status(mut self, status_filter: StatusFilter) -> Self {
        self.status_filter = status_filter;
        self
    }

    pub fn excluding(mut self, page_id: PageId) -> Self {
        self.exclude_id = Some(page_id);
        self
    }

    pub fn order(mut self, field: OrderField, direction: OrderDirection) -> Self {
        self.order_by = field;
        self.order_dir = direction;
        self
    }

    pub fn limit(mut self, limit: u16) -> Self {
        self.pagination.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u16) -> Self {
        self.pagination.offset = Some(offset);
        self
    }

    pub fn include_private(mut self, include: bool) -> Self {
        self.include_private = include;
        self
    }

    /// Build a query from template attributes: `with`, `with_any`, `scope`,
    /// `limit`, `offset`, `by`, `order`, `status`, `exclude_id`, `private`.
    /// `scope="current_page"` scopes to `current`, the page being rendered.
    pub fn from_attributes(
        attrs: &TagAttributes,
        config: &TagsConfig,
        current: Option<PageId>,
    ) -> TagResult<Self> {
        let order = parse_order(attrs)?;
        let pagination = parse_pagination(attrs)?;

        let status = attrs.get("status").unwrap_or(query::DEFAULT_STATUS);
        let status_filter = StatusFilter::from_name(status)
            .ok_or_else(|| TagError::validation("status", INVALID_STATUS))?;

        let exclude_id = attrs
            .get("exclude_id")
            .map(|raw| {
                raw.parse::<PageId>()
                    .map_err(|_| TagError::validation("exclude_id", INVALID_NUMERIC_ATTRIBUTE))
            })
            .transpose()?;

        let scope = match attrs.get("scope") {
            Some(url) if url.eq_ignore_ascii_case(query::CURRENT_PAGE_SCOPE) => {
                let id = current.ok_or_else(|| TagError::validation("scope", SCOPE_NOT_FOUND))?;
                Some(Scope::Page(id))
            }
            Some(url) => Some(Scope::Url(url.to_string())),
            None => None,
        };

        let match_mode = if attrs.flag("with_any") {
            MatchMode::Any
        } else {
            MatchMode::All
        };

        Ok(Self {
            tags: attrs
                .get("with")
                .map(|raw| parse_tag_list(raw, config.complex_strings))
                .unwrap_or_default(),
            match_mode,
            scope,
            status_filter,
            exclude_id,
            order_by: order.field,
            order_dir: order.direction,
            pagination,
            include_private: attrs.flag("private"),
        })
    }

    fn page_order(&self) -> PageOrder {
        PageOrder {
            field: self.order_by,
            direction: self.order_dir,
        }
    }
}

/// Runs tag queries against a page repository
pub struct TagQueryEngine<R> {
    repo: R,
    config: TagsConfig,
}

impl<R: PageRepository> TagQueryEngine<R> {
    pub fn new(repo: R, config: TagsConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &TagsConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Pages matching `query`, ordered and paginated. No match is an empty vec.
    pub fn find_pages(&self, query: &TagQuery) -> TagResult<Vec<Page>> {
        if query.tags.iter().all(|tag| tag.trim().is_empty()) {
            return Err(TagError::validation("with", MISSING_TAGS));
        }
        query.pagination.validate()?;

        let mut filter = status_filter(query.status_filter, query.include_private);
        filter.exclude_id = query.exclude_id;
        filter.order = query.page_order();

        debug!(
            "find_pages tags={:?} mode={:?} scope={:?} status={:?}",
            query.tags, query.match_mode, query.scope, query.status_filter
        );

        let Some(scope) = &query.scope else {
            filter.limit = query.pagination.limit.map(u32::from);
            filter.offset = query.pagination.offset.map(u32::from);
            return Ok(self
                .repo
                .find_by_tag_set(&query.tags, query.match_mode, &filter)?);
        };

        // Paginate after the subtree filter so a page of results is never short
        let scope_page = self.resolve_scope(scope)?;
        let matched = self
            .repo
            .find_by_tag_set(&query.tags, query.match_mode, &filter)?;

        let mut in_scope = Vec::with_capacity(matched.len());
        for page in matched {
            if self.is_within(&page, &scope_page)? {
                in_scope.push(page);
            }
        }

        Ok(query.pagination.apply(in_scope))
    }

    /// Parse template attributes and run the query. `current` is the page
    /// being rendered, if any.
    pub fn find_pages_with(
        &self,
        attrs: &TagAttributes,
        current: Option<&Page>,
    ) -> TagResult<Vec<Page>> {
        let current_id = current.map(|page| page.id);
        let query = TagQuery::from_attributes(attrs, &self.config, current_id).inspect_err(|e| {
            warn!("Rejected tag query attributes: {e}");
        })?;
        self.find_pages(&query)
    }

    /// Whether `find_pages` would return anything
    pub fn any_tagged(&self, query: &TagQuery) -> TagResult<bool> {
        Ok(!self.find_pages(query)?.is_empty())
    }

    pub fn page_has_tags(&self, page: &Page) -> TagResult<bool> {
        Ok(!self.tags_of(page)?.is_empty())
    }

    /// The page's own tag names, unfiltered
    pub fn tags_of(&self, page: &Page) -> TagResult<Vec<String>> {
        Ok(self.repo.tag_names_of(page.id)?)
    }

    /// Pages carrying one tag, using the rest of `base` for filtering and order
    pub fn pages_tagged_with(&self, name: &str, base: &TagQuery) -> TagResult<Vec<Page>> {
        let query = TagQuery {
            tags: vec![name.to_string()],
            match_mode: MatchMode::All,
            ..base.clone()
        };
        self.find_pages(&query)
    }

    fn resolve_scope(&self, scope: &Scope) -> TagResult<Page> {
        let page = match scope {
            Scope::Url(url) => self.repo.find_by_url(url)?,
            Scope::Page(id) => self.repo.find_by_id(*id)?,
        };

        match page {
            Some(page) if !page.is_not_found_placeholder() => Ok(page),
            _ => {
                warn!("Tag query scope {:?} does not resolve to a page", scope);
                Err(TagError::validation("scope", SCOPE_NOT_FOUND))
            }
        }
    }

    fn is_within(&self, page: &Page, scope_page: &Page) -> TagResult<bool> {
        if page.id == scope_page.id {
            return Ok(true);
        }
        let ancestors = self.repo.ancestors_of(page.id)?;
        Ok(ancestors.iter().any(|ancestor| ancestor.id == scope_page.id))
    }
}

/// Repository filter for a status choice. Published pages must also have a
/// publish date that is not in the future.
pub(crate) fn status_filter(status: StatusFilter, include_private: bool) -> PageFilter {
    let mut filter = PageFilter {
        include_private_tags: include_private,
        ..PageFilter::default()
    };

    if let StatusFilter::Only(status) = status {
        filter.status = Some(status);
        if status == Status::Published {
            filter.published_before = Some(Utc::now());
        }
    }

    filter
}
