//! Tag clouds: usage counts split into display size buckets.
//!
//! [`bucketize`] partitions the frequency range linearly, so tags with equal
//! or near-equal counts share a bucket and one very popular tag pushes the
//! rest towards the small end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::num::NonZeroUsize;

use crate::config::cloud;
use crate::database::TagCount;
use crate::errors::{TagError, TagResult};
use crate::links::{results_base, results_page_link};
use crate::repositories::{PageRepository, TagCountOptions, TagCountOrder};
use crate::tag_query::{parse_numeric, TagAttributes, TagQueryEngine};

const CLOUD_BUCKETS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(cloud::STYLES.len() - 1);

/// A cloud entry and the bucket it landed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucketed {
    pub entry: TagCount,
    pub bucket: usize,
}

/// Assign each entry a bucket in `0..buckets`.
///
/// `divisor = (max - min) / buckets + 1`, `bucket = (count - min) / divisor`.
/// The minimum count always lands in bucket 0.
pub fn bucketize(entries: &[TagCount], buckets: NonZeroUsize) -> Vec<Bucketed> {
    let Some(min) = entries.iter().map(|entry| entry.count).min() else {
        return Vec::new();
    };
    let max = entries
        .iter()
        .map(|entry| entry.count)
        .max()
        .unwrap_or(min);

    // u128 so a full u64 range with one bucket cannot overflow the divisor
    let divisor = u128::from(max - min) / buckets.get() as u128 + 1;
    let last = buckets.get() - 1;

    entries
        .iter()
        .map(|entry| {
            let index = u128::from(entry.count - min) / divisor;
            Bucketed {
                entry: entry.clone(),
                bucket: usize::try_from(index).unwrap_or(last).min(last),
            }
        })
        .collect()
}

/// What a template needs to draw one cloud entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudItem {
    pub name: String,
    pub count: u64,
    pub bucket: usize,
    pub css_class: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct TagCloudOptions {
    pub counts: TagCountOptions,
    /// Keep tags used on at least one page under this URL
    pub scope: Option<String>,
    /// Overrides the configured results page in links
    pub results_page: Option<String>,
}

/// Non-negative count that still fits the database's signed integers
fn parse_count(attrs: &TagAttributes, field: &str) -> TagResult<Option<u64>> {
    attrs
        .get(field)
        .map(|raw| {
            raw.parse::<i64>()
                .ok()
                .and_then(|count| u64::try_from(count).ok())
                .ok_or_else(|| TagError::validation(field, "invalid numeric attribute"))
        })
        .transpose()
}

fn parse_timestamp(attrs: &TagAttributes, field: &str) -> TagResult<Option<DateTime<Utc>>> {
    attrs
        .get(field)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|_| TagError::validation(field, "invalid timestamp"))
        })
        .transpose()
}

/// `count desc`, `name asc`, `taggings.created_at desc`, ...
fn parse_count_order(raw: &str) -> TagResult<TagCountOrder> {
    let mut parts = raw.split_whitespace();
    let field = parts.next().unwrap_or_default().to_ascii_lowercase();
    let direction = parts.next().unwrap_or("asc").to_ascii_lowercase();
    let field = field
        .trim_start_matches("tags.")
        .trim_start_matches("taggings.");

    let order = match (field, direction.as_str()) {
        ("count", "desc") => TagCountOrder::CountDesc,
        ("count", "asc") => TagCountOrder::CountAsc,
        ("name", "asc") => TagCountOrder::NameAsc,
        ("name", "desc") => TagCountOrder::NameDesc,
        ("created_at", "desc") | ("newest", _) => TagCountOrder::NewestTagging,
        _ => return Err(TagError::validation("order", "invalid tag order")),
    };

    if parts.next().is_some() {
        return Err(TagError::validation("order", "invalid tag order"));
    }
    Ok(order)
}

impl TagCloudOptions {
    /// From `limit`, `at_least`, `at_most`, `start_at`, `end_at`, `order`,
    /// `scope`, `results_page` and `private` attributes
    pub fn from_attributes(attrs: &TagAttributes) -> TagResult<Self> {
        let order = attrs
            .get("order")
            .map(parse_count_order)
            .transpose()?
            .unwrap_or_default();

        let counts = TagCountOptions {
            start_at: parse_timestamp(attrs, "start_at")?,
            end_at: parse_timestamp(attrs, "end_at")?,
            at_least: parse_count(attrs, "at_least")?,
            at_most: parse_count(attrs, "at_most")?,
            limit: parse_numeric(attrs, "limit")?.map(u32::from),
            order,
            names: Vec::new(),
            include_private: attrs.flag("private"),
        };

        Ok(Self {
            counts,
            scope: attrs.get("scope").map(str::to_string),
            results_page: attrs.get("results_page").map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllTagsOrder {
    #[default]
    Name,
    Popularity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllTagsOptions {
    pub order: AllTagsOrder,
    pub limit: u32,
    /// Restrict to these names; empty keeps every tag
    pub names: Vec<String>,
    pub include_private: bool,
}

impl Default for AllTagsOptions {
    fn default() -> Self {
        Self {
            order: AllTagsOrder::Name,
            limit: cloud::ALL_TAGS_DEFAULT_LIMIT,
            names: Vec::new(),
            include_private: false,
        }
    }
}

impl AllTagsOptions {
    /// From `order` (`name` or `popularity`), `limit` and comma-separated `names`
    pub fn from_attributes(attrs: &TagAttributes) -> TagResult<Self> {
        let order = match attrs.get("order").map(str::to_ascii_lowercase).as_deref() {
            None | Some("name") => AllTagsOrder::Name,
            Some("popularity") => AllTagsOrder::Popularity,
            Some(_) => return Err(TagError::validation("order", "invalid tag order")),
        };

        let names = attrs
            .get("names")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            order,
            limit: parse_numeric(attrs, "limit")?
                .map(u32::from)
                .unwrap_or(cloud::ALL_TAGS_DEFAULT_LIMIT),
            names,
            include_private: attrs.flag("private"),
        })
    }
}

impl<R: PageRepository> TagQueryEngine<R> {
    /// Tag counts matching `options`, bucketed into the cloud styles
    pub fn tag_cloud(&self, options: &TagCloudOptions) -> TagResult<Vec<CloudItem>> {
        let counts = self
            .repository()
            .tag_counts_of(options.scope.as_deref(), &options.counts)?;
        Ok(self.cloud_items(&counts, options.results_page.as_deref()))
    }

    /// Every tag, most used first, bucketed into the cloud styles
    pub fn tag_cloud_list(
        &self,
        scope: Option<&str>,
        results_page: Option<&str>,
    ) -> TagResult<Vec<CloudItem>> {
        let options = TagCountOptions {
            order: TagCountOrder::CountDesc,
            ..TagCountOptions::default()
        };
        let counts = self.repository().tag_counts_of(scope, &options)?;
        Ok(self.cloud_items(&counts, results_page))
    }

    pub fn all_tags(&self, options: &AllTagsOptions) -> TagResult<Vec<TagCount>> {
        let counts = TagCountOptions {
            order: match options.order {
                AllTagsOrder::Name => TagCountOrder::NameAsc,
                AllTagsOrder::Popularity => TagCountOrder::CountDesc,
            },
            limit: Some(options.limit),
            names: options.names.clone(),
            include_private: options.include_private,
            ..TagCountOptions::default()
        };
        Ok(self.repository().tag_counts_of(None, &counts)?)
    }

    fn cloud_items(&self, counts: &[TagCount], results_page: Option<&str>) -> Vec<CloudItem> {
        let base = results_base(self.config(), results_page);
        let largest = cloud::STYLES[cloud::STYLES.len() - 1];

        bucketize(counts, CLOUD_BUCKETS)
            .into_iter()
            .map(|bucketed| CloudItem {
                url: results_page_link(base, &bucketed.entry.name),
                css_class: cloud::STYLES
                    .get(bucketed.bucket)
                    .copied()
                    .unwrap_or(largest)
                    .to_string(),
                bucket: bucketed.bucket,
                count: bucketed.entry.count,
                name: bucketed.entry.name,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_values::*;
    use crate::config::TagsConfig;
    use crate::database::test_support::{create_test_db, timestamp};
    use crate::database::{Database, NewPage};
    use crate::repositories::TaggingRepository;

    fn buckets(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn entries(counts: &[(&str, u64)]) -> Vec<TagCount> {
        counts
            .iter()
            .map(|(name, count)| TagCount::new(*name, *count))
            .collect()
    }

    fn bucket_of(result: &[Bucketed]) -> Vec<usize> {
        result.iter().map(|b| b.bucket).collect()
    }

    #[test]
    fn test_bucketize_empty() {
        for n in [1, 3, 9] {
            assert!(bucketize(&[], buckets(n)).is_empty());
        }
    }

    #[test]
    fn test_bucketize_single_frequency() {
        let result = bucketize(&entries(&[("a", 4), ("b", 4), ("c", 4)]), buckets(9));
        assert_eq!(bucket_of(&result), vec![0, 0, 0]);
    }

    #[test]
    fn test_bucketize_linear_partition() {
        // min=1, max=10, divisor = 9/3 + 1 = 4
        let result = bucketize(&entries(&[("x", 1), ("y", 5), ("z", 10)]), buckets(3));
        assert_eq!(bucket_of(&result), vec![0, 1, 2]);
        assert_eq!(result[1].entry, TagCount::new("y", 5));
    }

    #[test]
    fn test_bucketize_monotonic_and_in_range() {
        let counts: Vec<(String, u64)> = [0u64, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144]
            .iter()
            .map(|count| (format!("t{count}"), *count))
            .collect();
        let input: Vec<TagCount> = counts
            .iter()
            .map(|(name, count)| TagCount::new(name.clone(), *count))
            .collect();

        for n in 1..=12 {
            let result = bucketize(&input, buckets(n));
            let indices = bucket_of(&result);
            assert!(indices.windows(2).all(|pair| pair[0] <= pair[1]), "n={n}");
            assert!(indices.iter().all(|index| *index < n), "n={n}");
            assert_eq!(indices[0], 0);
        }
    }

    #[test]
    fn test_bucketize_outlier_compresses_the_rest() {
        let result = bucketize(
            &entries(&[("a", 1), ("b", 2), ("c", 3), ("d", 100)]),
            buckets(9),
        );
        assert_eq!(bucket_of(&result), vec![0, 0, 0, 8]);
    }

    #[test]
    fn test_bucketize_full_count_range() {
        let wide = entries(&[("a", 0), ("b", u64::MAX)]);
        assert_eq!(bucket_of(&bucketize(&wide, buckets(1))), vec![0, 0]);
        assert_eq!(bucket_of(&bucketize(&wide, buckets(9))), vec![0, 8]);

        let near_top = entries(&[("a", u64::MAX - 1), ("b", u64::MAX)]);
        assert_eq!(bucket_of(&bucketize(&near_top, buckets(2))), vec![0, 1]);
    }

    #[test]
    fn test_parse_count_order() {
        assert_eq!(parse_count_order("count desc").unwrap(), TagCountOrder::CountDesc);
        assert_eq!(parse_count_order("tags.count ASC").unwrap(), TagCountOrder::CountAsc);
        // A bare field sorts ascending, as it would in ORDER BY
        assert_eq!(parse_count_order("name").unwrap(), TagCountOrder::NameAsc);
        assert_eq!(parse_count_order("count").unwrap(), TagCountOrder::CountAsc);
        assert_eq!(
            parse_count_order("size asc").unwrap_err().validation_message(),
            Some("invalid tag order")
        );
        assert_eq!(
            parse_count_order("taggings.created_at desc").unwrap(),
            TagCountOrder::NewestTagging
        );
        assert!(parse_count_order("count desc; DELETE FROM tags").is_err());
    }

    #[test]
    fn test_cloud_options_from_attributes() {
        let attrs = TagAttributes::new()
            .with("limit", "20")
            .with("at_least", "2")
            .with("start_at", "2024-01-01T00:00:00Z")
            .with("order", "name asc")
            .with("scope", TEST_SECTION_URL)
            .with("results_page", "/labels");
        let options = TagCloudOptions::from_attributes(&attrs).unwrap();

        assert_eq!(options.counts.limit, Some(20));
        assert_eq!(options.counts.at_least, Some(2));
        assert_eq!(options.counts.start_at, Some(timestamp("2024-01-01T00:00:00Z")));
        assert_eq!(options.counts.order, TagCountOrder::NameAsc);
        assert_eq!(options.scope.as_deref(), Some(TEST_SECTION_URL));
        assert_eq!(options.results_page.as_deref(), Some("/labels"));

        let bad = TagAttributes::new().with("end_at", "yesterday");
        let err = TagCloudOptions::from_attributes(&bad).unwrap_err();
        assert_eq!(err.validation_message(), Some("invalid timestamp"));
    }

    #[test]
    fn test_all_tags_options_from_attributes() {
        let defaults = AllTagsOptions::from_attributes(&TagAttributes::new()).unwrap();
        assert_eq!(defaults, AllTagsOptions::default());
        assert_eq!(defaults.limit, 5);

        let attrs = TagAttributes::new()
            .with("order", "Popularity")
            .with("names", "shoes, diesel ,");
        let options = AllTagsOptions::from_attributes(&attrs).unwrap();
        assert_eq!(options.order, AllTagsOrder::Popularity);
        assert_eq!(options.names, vec!["shoes", "diesel"]);

        let bad = TagAttributes::new().with("order", "random");
        assert!(AllTagsOptions::from_attributes(&bad).is_err());
    }

    fn seed(db: &Database) {
        let published_at = timestamp(TEST_PUBLISHED_AT);
        let fashion = db
            .pages()
            .insert(&NewPage::new("Fashion", TEST_SECTION_URL).published_at(published_at))
            .unwrap();
        let boots = db
            .pages()
            .insert(&NewPage::new("Boots", "/fashion/boots/").published_at(published_at))
            .unwrap();
        let news = db
            .pages()
            .insert(&NewPage::new("News", TEST_OTHER_SECTION_URL).published_at(published_at))
            .unwrap();

        let taggings = db.taggings();
        for page in [fashion, boots, news] {
            taggings.tag_page(page, TEST_TAG_SHOES).unwrap();
        }
        taggings.tag_page(boots, TEST_TAG_LEATHER).unwrap();
        taggings.tag_page(news, "cult update").unwrap();
    }

    #[test]
    fn test_tag_cloud_list() {
        let (_db_file, db) = create_test_db();
        seed(&db);
        let engine = TagQueryEngine::new(db.pages(), TagsConfig::default());

        let items = engine.tag_cloud_list(None, None).unwrap();
        let summary: Vec<(&str, u64, &str)> = items
            .iter()
            .map(|item| (item.name.as_str(), item.count, item.css_class.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                // min=1, max=3: divisor 1, so shoes lands in bucket 2
                (TEST_TAG_SHOES, 3, "size3"),
                ("cult update", 1, "size1"),
                (TEST_TAG_LEATHER, 1, "size1"),
            ]
        );
        assert_eq!(items[1].url, "/t/cult+update");

        let scoped = engine
            .tag_cloud_list(Some(TEST_SECTION_URL), Some("/labels"))
            .unwrap();
        let names: Vec<&str> = scoped.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec![TEST_TAG_SHOES, TEST_TAG_LEATHER]);
        assert_eq!(scoped[0].url, "/labels/shoes");
    }

    #[test]
    fn test_tag_cloud_with_options() {
        let (_db_file, db) = create_test_db();
        seed(&db);
        let engine = TagQueryEngine::new(db.pages(), TagsConfig::default());

        let options = TagCloudOptions::from_attributes(
            &TagAttributes::new().with("at_most", "1").with("order", "name desc"),
        )
        .unwrap();
        let names: Vec<String> = engine
            .tag_cloud(&options)
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec![TEST_TAG_LEATHER, "cult update"]);

        // Nothing tagged after the far future
        let future = TagCloudOptions::from_attributes(
            &TagAttributes::new().with("start_at", TEST_FUTURE_PUBLISHED_AT),
        )
        .unwrap();
        assert!(engine.tag_cloud(&future).unwrap().is_empty());
    }

    #[test]
    fn test_tag_cloud_count_bounds_out_of_range() {
        let (_db_file, db) = create_test_db();
        seed(&db);
        let engine = TagQueryEngine::new(db.pages(), TagsConfig::default());

        for (field, raw) in [
            ("at_most", "18446744073709551615"),
            ("at_least", "9223372036854775808"),
            ("at_least", "-1"),
        ] {
            let err = TagCloudOptions::from_attributes(&TagAttributes::new().with(field, raw))
                .unwrap_err();
            assert_eq!(err.validation_message(), Some("invalid numeric attribute"), "{field}={raw}");
        }

        // Typed bounds past the database range saturate instead of wrapping
        let mut options = TagCloudOptions::default();
        options.counts.at_most = Some(u64::MAX);
        assert_eq!(engine.tag_cloud(&options).unwrap().len(), 3);

        options.counts.at_most = None;
        options.counts.at_least = Some(u64::MAX);
        assert!(engine.tag_cloud(&options).unwrap().is_empty());
    }

    #[test]
    fn test_all_tags() {
        let (_db_file, db) = create_test_db();
        seed(&db);
        let engine = TagQueryEngine::new(db.pages(), TagsConfig::default());

        let by_name = engine.all_tags(&AllTagsOptions::default()).unwrap();
        let names: Vec<&str> = by_name.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cult update", TEST_TAG_LEATHER, TEST_TAG_SHOES]);

        let popular = engine
            .all_tags(&AllTagsOptions {
                order: AllTagsOrder::Popularity,
                limit: 1,
                ..AllTagsOptions::default()
            })
            .unwrap();
        assert_eq!(popular, vec![TagCount::new(TEST_TAG_SHOES, 3)]);
    }
}
