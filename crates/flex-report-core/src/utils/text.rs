//! String utility functions.

use regex::Regex;
use std::sync::OnceLock;

/// Converts a string to a URL-friendly slug.
///
/// Lowercases, drops everything except word characters, hyphens and
/// whitespace, and collapses whitespace/hyphen runs into single hyphens.
/// Non-ASCII letters are kept, so Persian titles produce usable slugs.
///
/// # Examples
///
/// ```
/// use flex_report_core::utils::text::slugify;
///
/// assert_eq!(slugify("Hello World!"), "hello-world");
/// assert_eq!(slugify("  Spaced  Out  "), "spaced-out");
/// assert_eq!(slugify("already-slugged"), "already-slugged");
/// ```
pub fn slugify(s: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();

    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap());
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[-\s]+").unwrap());

    let s = s.to_lowercase();
    let s = non_word.replace_all(&s, "");
    let s = separators.replace_all(&s, "-");
    s.trim_matches('-').to_string()
}

/// Increments the numeric suffix of a string, keeping zero padding.
///
/// Strings without a numeric suffix get `1` appended. Used to title cloned
/// templates.
///
/// # Examples
///
/// ```
/// use flex_report_core::utils::text::increment_string_suffix;
///
/// assert_eq!(increment_string_suffix("Report"), "Report1");
/// assert_eq!(increment_string_suffix("Report9"), "Report10");
/// assert_eq!(increment_string_suffix("Report009"), "Report010");
/// ```
pub fn increment_string_suffix(s: &str) -> String {
    static TRAILING_DIGITS: OnceLock<Regex> = OnceLock::new();
    let trailing = TRAILING_DIGITS.get_or_init(|| Regex::new(r"[0-9]+$").unwrap());

    match trailing.find(s) {
        Some(m) => format!("{}{}", &s[..m.start()], increment_digits(m.as_str())),
        None => format!("{s}1"),
    }
}

/// Adds one to a run of ASCII digits without parsing it, so any length
/// works and the width never shrinks.
fn increment_digits(digits: &str) -> String {
    let mut out: Vec<char> = digits.chars().collect();
    for c in out.iter_mut().rev() {
        if *c == '9' {
            *c = '0';
        } else {
            *c = char::from(*c as u8 + 1);
            return out.into_iter().collect();
        }
    }
    std::iter::once('1').chain(out).collect()
}

/// Truncates a string to at most `n` characters, ending with `…`.
///
/// # Examples
///
/// ```
/// use flex_report_core::utils::text::truncate_chars;
///
/// assert_eq!(truncate_chars("open_invoice_modal", 10), "open_invo…");
/// assert_eq!(truncate_chars("Hi", 10), "Hi");
/// ```
pub fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    if n == 0 {
        return String::new();
    }
    let mut result: String = s.chars().take(n - 1).collect();
    result.push('…');
    result
}

/// Capitalizes the first character of a string.
pub fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        let mut result = c.to_uppercase().to_string();
        result.extend(chars);
        result
    })
}

/// Escapes the HTML special characters of a string.
///
/// # Examples
///
/// ```
/// use flex_report_core::utils::text::escape_html;
///
/// assert_eq!(escape_html(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
/// ```
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("--edge--"), "edge");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_keeps_unicode_letters() {
        assert_eq!(slugify("گزارش ماهانه"), "گزارش-ماهانه");
    }

    #[test]
    fn test_increment_string_suffix() {
        assert_eq!(increment_string_suffix("abc"), "abc1");
        assert_eq!(increment_string_suffix("abc9"), "abc10");
        assert_eq!(increment_string_suffix("a009"), "a010");
        assert_eq!(increment_string_suffix("v1.2"), "v1.3");
        assert_eq!(increment_string_suffix("99"), "100");
        assert_eq!(increment_string_suffix(""), "1");
    }

    #[test]
    fn test_increment_long_suffix_carries() {
        assert_eq!(
            increment_string_suffix("Copy99999999999999999999999999"),
            "Copy100000000000000000000000000"
        );
        assert_eq!(
            increment_string_suffix("Copy00000000000000000000000009"),
            "Copy00000000000000000000000010"
        );
        assert_eq!(increment_string_suffix("۱۲"), "۱۲1");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("abcd", 4), "abcd");
        assert_eq!(truncate_chars("abcd", 0), "");
    }

    #[test]
    fn test_capfirst() {
        assert_eq!(capfirst("hello"), "Hello");
        assert_eq!(capfirst(""), "");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b"), "a &lt; b");
        assert_eq!(escape_html("plain"), "plain");
    }
}
