//! Document-level HTML allowlist.
//!
//! Applied once to a fully compiled document, never per block.

use std::collections::{HashMap, HashSet};

const ALLOWED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "pre", "code", "blockquote", "hr",
    "br", "img", "a", "table", "thead", "tbody", "tr", "th", "td", "iframe", "div", "span",
    "strong", "em", "u", "s", "mark",
];

const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "rel", "target"]),
    ("img", &["src", "alt", "title", "width", "height", "loading"]),
    ("iframe", &["src", "title", "height", "width", "allow", "loading"]),
];

const GENERIC_ATTRIBUTES: &[&str] = &["class", "style", "colspan", "rowspan", "id"];

const URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

fn builder() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(
            TAG_ATTRIBUTES
                .iter()
                .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect::<HashSet<_>>()))
                .collect::<HashMap<_, _>>(),
        )
        .generic_attributes(GENERIC_ATTRIBUTES.iter().copied().collect())
        .url_schemes(URL_SCHEMES.iter().copied().collect())
        // `rel` is authored by the compiler and kept as written.
        .link_rel(None);
    builder
}

/// Strip everything outside the allowlist: unknown tags, event handler
/// attributes, and URLs with other schemes.
pub fn sanitize_html(html: &str) -> String {
    builder().clean(html).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_script_and_handlers() {
        let dirty = r#"<p onclick="steal()">hi<script>alert(1)</script></p><img src="https://x.test/a.png" onerror="boom()" loading="lazy">"#;
        let clean = sanitize_html(dirty);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("alert"));
        assert!(!clean.contains("onclick"));
        assert!(!clean.contains("onerror"));
        assert!(clean.contains("<p>hi</p>"));
        assert!(clean.contains(r#"src="https://x.test/a.png""#));
        assert!(clean.contains(r#"loading="lazy""#));
    }

    #[test]
    fn test_keeps_allowlisted_markup() {
        let html = r#"<h2 id="intro">Intro</h2><p><a href="https://example.com" target="_blank" rel="noreferrer"><strong>x</strong></a> <mark>y</mark></p><table><tr><th colspan="2">h</th></tr></table>"#;
        let clean = sanitize_html(html);
        assert!(clean.contains(r#"<h2 id="intro">Intro</h2>"#));
        assert!(clean.contains(
            r#"<a href="https://example.com" target="_blank" rel="noreferrer"><strong>x</strong></a>"#
        ));
        assert!(clean.contains("<mark>y</mark>"));
        assert!(clean.contains(r#"<th colspan="2">h</th>"#));
    }

    #[test]
    fn test_rejects_foreign_schemes() {
        let clean = sanitize_html(r#"<a href="javascript:alert(1)">x</a><a href="mailto:a@b.test">m</a>"#);
        assert!(!clean.contains("javascript"));
        assert!(clean.contains(r#"href="mailto:a@b.test""#));
    }

    #[test]
    fn test_iframe_attributes() {
        let clean = sanitize_html(
            r#"<iframe src="https://player.example/v" title="v" allow="fullscreen" loading="lazy" srcdoc="<b>x</b>"></iframe>"#,
        );
        assert!(clean.contains(r#"src="https://player.example/v""#));
        assert!(clean.contains(r#"allow="fullscreen""#));
        assert!(!clean.contains("srcdoc"));
    }

    #[test]
    fn test_unknown_tags_unwrapped() {
        let clean = sanitize_html("<section><p>kept</p><form><input></form></section>");
        assert!(clean.contains("<p>kept</p>"));
        assert!(!clean.contains("section"));
        assert!(!clean.contains("input"));
    }
}
