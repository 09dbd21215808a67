// Pages related to a page through shared tags

use serde::Serialize;

use crate::database::Page;
use crate::errors::TagResult;
use crate::repositories::{PageOrder, PageRepository};
use crate::tag_query::{
    parse_order, parse_pagination, status_filter, Pagination, StatusFilter, TagAttributes,
    TagQueryEngine,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedOptions {
    /// Keep only pages whose URL starts with this prefix
    pub url_prefix: Option<String>,
    /// Explicit order; None ranks by number of shared tags
    pub order: Option<PageOrder>,
    pub pagination: Pagination,
    pub status_filter: StatusFilter,
    pub include_private: bool,
}

impl RelatedOptions {
    /// From `scope`, `limit`, `offset`, `by` and `order` attributes
    pub fn from_attributes(attrs: &TagAttributes) -> TagResult<Self> {
        let order = if attrs.get("by").is_some() || attrs.get("order").is_some() {
            Some(parse_order(attrs)?)
        } else {
            None
        };

        Ok(Self {
            url_prefix: attrs.get("scope").map(str::to_string),
            order,
            pagination: parse_pagination(attrs)?,
            status_filter: StatusFilter::default(),
            include_private: attrs.flag("private"),
        })
    }
}

/// A related page and whether it heads the list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedPage {
    pub page: Page,
    pub is_first: bool,
}

impl<R: PageRepository> TagQueryEngine<R> {
    /// Pages sharing at least one tag with `page`. A page without tags has no relations.
    pub fn related_pages(&self, page: &Page, options: &RelatedOptions) -> TagResult<Vec<RelatedPage>> {
        options.pagination.validate()?;

        let mut filter = status_filter(options.status_filter, options.include_private);
        filter.url_prefix = options.url_prefix.clone();
        filter.limit = options.pagination.limit.map(u32::from);
        filter.offset = options.pagination.offset.map(u32::from);
        filter.order = options.order.unwrap_or_default();

        let related = self
            .repository()
            .find_related(page.id, &filter, options.order.is_none())?;

        Ok(related
            .into_iter()
            .enumerate()
            .map(|(index, page)| RelatedPage {
                page,
                is_first: index == 0,
            })
            .collect())
    }

    pub fn has_related(&self, page: &Page, options: &RelatedOptions) -> TagResult<bool> {
        Ok(!self.related_pages(page, options)?.is_empty())
    }
}
