use regex::Regex;
use std::ops::Range;

use super::markup::is_word;

/// Zero-pad the numeric suffix so that string order follows creation order.
///
/// `PROJ-12` becomes `PROJ-000012`, so `PROJ-2` sorts before `PROJ-10`.
/// Keys without a numeric suffix are returned unchanged.
pub fn sort_key(key: &str) -> String {
    let prefix_len = key.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (prefix, number) = key.split_at(prefix_len);
    if number.is_empty() {
        return key.to_string();
    }
    format!("{prefix}{number:0>6}")
}

pub fn sort_keys(keys: &mut [String]) {
    keys.sort_by_cached_key(|key| sort_key(key));
}

/// Finds references to source-system keys such as `PROJ-123` in free text.
///
/// A reference must not be glued to a word character on either side, nor follow `[`
/// (which marks a reference that is already link text).
pub struct KeyMatcher {
    regex: Option<Regex>,
}

impl KeyMatcher {
    pub fn new(prefixes: &[String]) -> Result<Self, regex::Error> {
        if prefixes.is_empty() {
            return Ok(Self { regex: None });
        }
        let alternatives = prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!(r"(?:{alternatives})-\d+"))?;
        Ok(Self { regex: Some(regex) })
    }

    /// Byte range of the first reference starting at or after `from`.
    pub fn find_at(&self, text: &str, from: usize) -> Option<Range<usize>> {
        let regex = self.regex.as_ref()?;
        let mut at = from;
        while let Some(m) = regex.find_at(text, at) {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            let clean_start = before.map_or(true, |c| !is_word(c) && c != '[');
            let clean_end = after.map_or(true, |c| !is_word(c));
            if clean_start && clean_end {
                return Some(m.range());
            }
            at = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }
}
