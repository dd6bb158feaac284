//! HTML compaction before a document is embedded in a prompt.
//!
//! Rules, in order:
//! 1. drop `<!-- … -->` comments (multi-line included);
//! 2. collapse every whitespace run to one space;
//! 3. remove whitespace that sits directly between `>` and `<`;
//! 4. trim the ends.
//!
//! Text nodes keep one space where they had any, so rendered text and
//! placeholder tokens are unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_INTER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());

/// Compact `html`. Empty input yields empty output.
pub fn compact_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let s = RE_COMMENT.replace_all(html, "");
    let s = RE_WHITESPACE.replace_all(&s, " ");
    let s = RE_INTER_TAG.replace_all(&s, "><");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comment_and_collapses() {
        assert_eq!(compact_html("<!-- c -->  <p>  x  </p>  "), "<p> x </p>");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(compact_html(""), "");
        assert_eq!(compact_html("   \n\t "), "");
    }

    #[test]
    fn removes_whitespace_between_tags() {
        let input = "<div>\n    <h1>Title</h1>\n\n    <p>Body</p>\n</div>";
        assert_eq!(compact_html(input), "<div><h1>Title</h1><p>Body</p></div>");
    }

    #[test]
    fn collapses_mixed_runs_inside_text() {
        assert_eq!(
            compact_html("<p>a \t\n b\r\n\r\nc</p>"),
            "<p>a b c</p>"
        );
    }

    #[test]
    fn multiline_comments_are_removed() {
        let input = "<p>keep</p><!--\n multi\n line\n--><p>also</p>";
        assert_eq!(compact_html(input), "<p>keep</p><p>also</p>");
    }

    #[test]
    fn placeholders_survive() {
        let input = "<p>Between  xxxx_CLIENT_NAME\n and xxxx_PROVIDER_NAME</p>";
        assert_eq!(
            compact_html(input),
            "<p>Between xxxx_CLIENT_NAME and xxxx_PROVIDER_NAME</p>"
        );
    }
}
