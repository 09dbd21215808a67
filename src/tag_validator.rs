// Tag name validation and tag list parsing

use std::collections::HashSet;

use crate::config::tags;

pub fn is_valid_tag(tag_text: &str) -> bool {
    let trimmed = tag_text.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= tags::MAX_TAG_LENGTH
}

/// Split a tag list attribute into names.
///
/// Names are separated by commas; a list without any comma is separated by
/// whitespace instead, so `"shoes diesel"` and `"shoes, diesel"` agree. With
/// `complex_strings`, a double-quoted name may contain commas and spaces.
/// Duplicates are dropped case-insensitively, keeping the first spelling.
pub fn parse_tag_list(raw: &str, complex_strings: bool) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = String::with_capacity(raw.len());

    if complex_strings {
        let mut quoted = String::new();
        let mut in_quotes = false;
        for ch in raw.chars() {
            match (ch, in_quotes) {
                ('"', false) => {
                    in_quotes = true;
                    rest.push(' ');
                }
                ('"', true) => {
                    in_quotes = false;
                    rest.push(' ');
                    names.push(std::mem::take(&mut quoted));
                }
                (ch, true) => quoted.push(ch),
                (ch, false) => rest.push(ch),
            }
        }
        // Unterminated quote: treat the remainder as plain text
        if in_quotes {
            rest.push_str(&quoted);
        }
    } else {
        rest.push_str(raw);
    }

    if rest.contains(',') {
        names.extend(rest.split(',').map(str::to_string));
    } else {
        names.extend(rest.split_whitespace().map(str::to_string));
    }

    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| is_valid_tag(name))
        .filter(|name| seen.insert(name.to_ascii_lowercase()))
        .collect()
}
