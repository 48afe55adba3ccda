//! Whitelist HTML sanitiser for incident descriptions.
//!
//! Allowed tags are kept without attributes, everything else is stripped.
//! Comments and the bodies of `script`/`style` elements are removed entirely.
//! Text between tags is re-escaped so stray `<` or `>` cannot form markup.

use regex::Regex;
use std::sync::OnceLock;

pub const ALLOWED_TAGS: &[&str] = &["b", "i", "u", "em", "strong", "p", "ul", "ol", "li", "br"];

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?(-->|$)").expect("Invalid regex"))
}

fn script_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?(</script\s*>|$)").expect("Invalid regex")
    })
}

fn style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<style\b[^>]*>.*?(</style\s*>|$)").expect("Invalid regex")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)\b[^>]*>").expect("Invalid regex")
    })
}

fn escape_text(out: &mut String, text: &str) {
    let decoded = html_escape::decode_html_entities(text);
    html_escape::encode_text_minimal_to_string(decoded, out);
}

#[must_use]
pub fn clean_html(raw: &str) -> String {
    let without_comments = comment_regex().replace_all(raw, "");
    let without_scripts = script_regex().replace_all(&without_comments, "");
    let input = style_regex().replace_all(&without_scripts, "");

    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for caps in tag_regex().captures_iter(&input) {
        let Some(whole) = caps.get(0) else { continue };
        escape_text(&mut out, &input[last..whole.start()]);
        last = whole.end();

        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }

        if name == "br" {
            out.push_str("<br>");
        } else if caps[1].is_empty() {
            out.push('<');
            out.push_str(&name);
            out.push('>');
        } else {
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
        }
    }

    escape_text(&mut out, &input[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_whitelisted_tags() {
        assert_eq!(
            clean_html("<p>Disk <b>full</b> on <em>db-1</em></p>"),
            "<p>Disk <b>full</b> on <em>db-1</em></p>"
        );
        assert_eq!(clean_html("line<br/>next"), "line<br>next");
        assert_eq!(
            clean_html("<UL><LI>one</LI></UL>"),
            "<ul><li>one</li></ul>"
        );
    }

    #[test]
    fn test_strips_attributes_and_unknown_tags() {
        assert_eq!(
            clean_html(r#"<p onclick="steal()" class="x">hi</p>"#),
            "<p>hi</p>"
        );
        assert_eq!(
            clean_html(r#"<a href="javascript:alert(1)">link</a>"#),
            "link"
        );
        assert_eq!(clean_html(r#"<img src=x onerror=alert(1)>"#), "");
    }

    #[test]
    fn test_removes_scripts_styles_and_comments() {
        assert_eq!(
            clean_html("before<script>alert('x')</script>after"),
            "beforeafter"
        );
        assert_eq!(
            clean_html("a<STYLE type='text/css'>body{}</STYLE>b"),
            "ab"
        );
        assert_eq!(clean_html("x<!-- hidden -->y"), "xy");
        assert_eq!(clean_html("x<script>never closed"), "x");
    }

    #[test]
    fn test_escapes_stray_brackets() {
        assert_eq!(clean_html("load > 90% & rising"), "load &gt; 90% &amp; rising");
        assert_eq!(clean_html("a &amp; b"), "a &amp; b");
        assert_eq!(clean_html("1 < 2"), "1 &lt; 2");
    }
}
