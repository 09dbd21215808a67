// Results-page links for tag names

use crate::config::TagsConfig;

/// `<base>/<tag>` with spaces as `+` and other reserved characters percent-encoded
pub fn results_page_link(base: &str, tag: &str) -> String {
    let encoded = tag
        .trim()
        .split(' ')
        .map(|word| urlencoding::encode(word).into_owned())
        .collect::<Vec<_>>()
        .join("+");

    format!("{}/{}", base.trim_end_matches('/'), encoded)
}

/// Link base: an explicit `results_page` attribute wins over the configured page
pub fn results_base<'a>(config: &'a TagsConfig, results_page: Option<&'a str>) -> &'a str {
    results_page
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .unwrap_or(config.results_page_url.as_str())
}

/// Inverse of the tag part of [`results_page_link`]
pub fn decode_tag_segment(segment: &str) -> Option<String> {
    let spaced = segment.replace('+', " ");
    urlencoding::decode(&spaced)
        .ok()
        .map(|decoded| decoded.into_owned())
}
