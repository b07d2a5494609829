//! Query string dictionary for HTTP request parameters.
//!
//! [`QueryDict`] wraps [`MultiValueDict`] so repeated keys
//! (`tags__in=1&tags__in=2`) keep every value in the order they were sent.
//! Dictionaries parsed from a request are immutable; [`QueryDict::copy`]
//! returns a mutable clone for building pagination and filter links.

use flex_report_core::utils::MultiValueDict;
use flex_report_core::{ReportError, ReportResult};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped when encoding query components.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// An immutable-by-default dictionary for query string data.
///
/// # Examples
///
/// ```
/// use flex_report_http::QueryDict;
///
/// let qd = QueryDict::parse("color=red&color=blue&size=large");
/// assert_eq!(qd.get("color"), Some("blue"));
/// assert_eq!(qd.get_list("color"), Some(&vec!["red".to_string(), "blue".to_string()]));
///
/// let mut mutable = qd.copy();
/// mutable.set("color", "green").unwrap();
/// assert_eq!(mutable.urlencode(), "color=green&size=large");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    data: MultiValueDict<String, String>,
    mutable: bool,
}

impl QueryDict {
    /// Creates a new, empty, immutable `QueryDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, empty, mutable `QueryDict`.
    pub fn new_mutable() -> Self {
        Self {
            data: MultiValueDict::new(),
            mutable: true,
        }
    }

    /// Parses a URL query string (e.g., `"key1=val1&key2=val2"`) into an immutable `QueryDict`.
    ///
    /// Handles percent-encoding and `+` as space, and supports multiple
    /// values per key.
    pub fn parse(query_string: &str) -> Self {
        let mut data = MultiValueDict::new();
        for pair in query_string.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            data.append(percent_decode(key), percent_decode(value));
        }
        Self { data, mutable: false }
    }

    /// Returns the last value for the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Returns all values for the given key.
    pub fn get_list(&self, key: &str) -> Option<&Vec<String>> {
        self.data.get_list(key)
    }

    fn ensure_mutable(&self) -> ReportResult<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(ReportError::BadRequest(
                "This QueryDict instance is immutable".to_string(),
            ))
        }
    }

    /// Sets a single value for the given key, replacing any existing values.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if this `QueryDict` is immutable.
    pub fn set(&mut self, key: &str, value: &str) -> ReportResult<()> {
        self.ensure_mutable()?;
        self.data.set(key.to_string(), value.to_string());
        Ok(())
    }

    /// Replaces every value of the given key.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if this `QueryDict` is immutable.
    pub fn set_list(&mut self, key: &str, values: Vec<String>) -> ReportResult<()> {
        self.ensure_mutable()?;
        self.data.set_list(key.to_string(), values);
        Ok(())
    }

    /// Appends a value to the list for the given key.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if this `QueryDict` is immutable.
    pub fn append(&mut self, key: &str, value: &str) -> ReportResult<()> {
        self.ensure_mutable()?;
        self.data.append(key.to_string(), value.to_string());
        Ok(())
    }

    /// Removes a key and returns its values.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if this `QueryDict` is immutable.
    pub fn remove(&mut self, key: &str) -> ReportResult<Option<Vec<String>>> {
        self.ensure_mutable()?;
        Ok(self.data.remove(key))
    }

    /// Returns a mutable copy of this `QueryDict`.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            data: self.data.clone(),
            mutable: true,
        }
    }

    /// Encodes this `QueryDict` as a URL query string, keys in insertion order.
    pub fn urlencode(&self) -> String {
        self.data
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| format!("{}={}", percent_encode(key), percent_encode(value)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Returns `true` if this `QueryDict` is mutable.
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the `QueryDict` contains no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the specified key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns an iterator over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Iterates over `(key, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.data.iter()
    }

    /// Returns a reference to the underlying `MultiValueDict`.
    pub const fn data(&self) -> &MultiValueDict<String, String> {
        &self.data
    }
}

fn percent_decode(input: &str) -> String {
    let plus_decoded = input.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn percent_encode(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, QUERY_COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let qd = QueryDict::new();
        assert!(qd.is_empty());
        assert!(!qd.is_mutable());
    }

    #[test]
    fn test_parse_multiple_values() {
        let qd = QueryDict::parse("tags__in=1&tags__in=2&name=x");
        assert_eq!(qd.get("tags__in"), Some("2"));
        assert_eq!(qd.get_list("tags__in").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert_eq!(qd.len(), 2);
        let keys: Vec<_> = qd.keys().cloned().collect();
        assert_eq!(keys, vec!["tags__in", "name"]);
    }

    #[test]
    fn test_parse_edge_cases() {
        assert!(QueryDict::parse("").is_empty());
        assert_eq!(QueryDict::parse("?a=1").get("a"), Some("1"));
        assert_eq!(QueryDict::parse("flag").get("flag"), Some(""));
        assert_eq!(QueryDict::parse("empty=").get("empty"), Some(""));
        assert_eq!(QueryDict::parse("a=&&b=2").get("b"), Some("2"));
    }

    #[test]
    fn test_parse_percent_encoded_and_plus() {
        let qd = QueryDict::parse("name=hello%20world&city=new+york&fa=%D8%B3%D9%84%D8%A7%D9%85");
        assert_eq!(qd.get("name"), Some("hello world"));
        assert_eq!(qd.get("city"), Some("new york"));
        assert_eq!(qd.get("fa"), Some("سلام"));
    }

    #[test]
    fn test_immutable_mutations_fail() {
        let mut qd = QueryDict::parse("a=1");
        assert!(matches!(qd.set("a", "2"), Err(ReportError::BadRequest(_))));
        assert!(qd.append("a", "2").is_err());
        assert!(qd.remove("a").is_err());
    }

    #[test]
    fn test_copy_returns_mutable() {
        let qd = QueryDict::parse("a=1");
        let mut copy = qd.copy();
        assert!(copy.is_mutable());
        copy.append("a", "2").unwrap();
        copy.set_list("b", vec!["x".into(), "y".into()]).unwrap();
        assert_eq!(copy.remove("missing").unwrap(), None);
        assert_eq!(copy.urlencode(), "a=1&a=2&b=x&b=y");
        assert_eq!(qd.get_list("a").unwrap().len(), 1);
    }

    #[test]
    fn test_urlencode_round_trip_special_chars() {
        let mut qd = QueryDict::new_mutable();
        qd.set("q", "a b&c=d").unwrap();
        qd.set("date", "2024/01/02").unwrap();
        let encoded = qd.urlencode();
        assert_eq!(encoded, "q=a%20b%26c%3Dd&date=2024%2F01%2F02");
        assert_eq!(QueryDict::parse(&encoded).get("q"), Some("a b&c=d"));
    }
}
