// Tag results page: /t/<tag> lists the published pages carrying <tag>

use log::debug;
use serde::Serialize;

use crate::config::TagsConfig;
use crate::database::Page;
use crate::errors::TagResult;
use crate::links::decode_tag_segment;
use crate::repositories::{clean_url, PageOrder, PageRepository};
use crate::tag_query::{
    parse_order, parse_pagination, Pagination, StatusFilter, TagAttributes, TagQuery,
    TagQueryEngine,
};
use crate::tag_validator::parse_tag_list;

/// The tag named by the path below `results_url`, if the path is under it.
///
/// `/t/cult+update` under `/t` gives `cult update`. The results page itself,
/// or a segment that does not decode, gives `None`.
pub fn requested_tag_from_path(results_url: &str, path: &str) -> Option<String> {
    let base = clean_url(results_url);
    let path = clean_url(path);

    let rest = path.strip_prefix(&base)?.trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }

    decode_tag_segment(rest)
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchOptions {
    pub order: PageOrder,
    pub pagination: Pagination,
}

impl SearchOptions {
    /// From `by`, `order`, `limit` and `offset` attributes
    pub fn from_attributes(attrs: &TagAttributes) -> TagResult<Self> {
        Ok(Self {
            order: parse_order(attrs)?,
            pagination: parse_pagination(attrs)?,
        })
    }
}

/// One visit to the tag results page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSearch {
    pub requested: Option<String>,
}

impl TagSearch {
    pub fn new(requested: impl Into<String>) -> Self {
        let requested = requested.into().trim().to_string();
        Self {
            requested: (!requested.is_empty()).then_some(requested),
        }
    }

    pub fn from_path(config: &TagsConfig, path: &str) -> Self {
        Self {
            requested: requested_tag_from_path(&config.results_page_url, path),
        }
    }

    pub fn title(&self) -> String {
        match &self.requested {
            Some(tag) => format!("Tagged with {tag}"),
            None => "Tagged with".to_string(),
        }
    }

    /// The names to match. A comma makes the request a tag list; otherwise
    /// the whole request is one name, so `cult update` stays a single tag.
    fn requested_names(&self, config: &TagsConfig) -> Vec<String> {
        match &self.requested {
            Some(raw) if raw.contains(',') => parse_tag_list(raw, config.complex_strings),
            Some(raw) => vec![raw.clone()],
            None => Vec::new(),
        }
    }

    /// Published pages carrying every requested tag. Nothing requested is an empty list.
    pub fn found_pages<R: PageRepository>(
        &self,
        engine: &TagQueryEngine<R>,
        options: &SearchOptions,
    ) -> TagResult<Vec<Page>> {
        let names = self.requested_names(engine.config());
        if names.is_empty() {
            return Ok(Vec::new());
        }
        debug!("tag search for {:?}", names);

        let mut query = TagQuery::new(names)
            .status(StatusFilter::default())
            .order(options.order.field, options.order.direction);
        query.pagination = options.pagination;

        engine.find_pages(&query)
    }
}
