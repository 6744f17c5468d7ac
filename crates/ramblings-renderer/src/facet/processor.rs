use super::html_output::escape_html;
use super::markdown::apply_inline_markdown;
use super::slice::byte_slice;
use super::types::{Facet, SocialFeature};
use super::Feature;

/// Render `text` with its facets as escaped HTML.
///
/// Facets are consumed in `byte_start` order (stable for equal starts) and
/// are never merged: each one renders its own slice, and the cursor jumps to
/// its end, so overlapping ranges repeat text rather than nest.
pub fn render_rich_text<F: Feature>(text: &str, facets: &[Facet<F>]) -> String {
    if facets.is_empty() {
        return escape_html(text);
    }

    let total = text.len() as i64;
    let mut sorted: Vec<&Facet<F>> = facets.iter().collect();
    sorted.sort_by_key(|facet| facet.index.start());

    let mut html = String::with_capacity(text.len());
    let mut cursor = 0;

    for facet in sorted {
        let start = facet.index.start();
        let end = facet.index.end();

        if cursor < start {
            html.push_str(&escape_html(byte_slice(text, cursor, start)));
        }
        html.push_str(&render_facet_text(
            byte_slice(text, start, end),
            &facet.features,
        ));
        cursor = end;
    }

    if cursor < total {
        html.push_str(&escape_html(byte_slice(text, cursor, total)));
    }

    html
}

/// Escape `segment` and wrap it in each feature in turn, so the last
/// feature ends up outermost.
pub fn render_facet_text<F: Feature>(segment: &str, features: &[F]) -> String {
    features
        .iter()
        .fold(escape_html(segment), |inner, feature| feature.wrap(inner))
}

/// Social-post variant: facet rendering followed by the inline markdown
/// pass. Text without facets is only escaped.
pub fn render_social_text(text: &str, facets: &[Facet<SocialFeature>]) -> String {
    if facets.is_empty() {
        return escape_html(text);
    }
    apply_inline_markdown(&render_rich_text(text, facets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::types::{ByteRange, DocumentFeature};
    use proptest::prelude::*;

    fn facet(start: i64, end: i64, features: Vec<DocumentFeature>) -> Facet<DocumentFeature> {
        Facet {
            index: ByteRange::new(start, end),
            features,
        }
    }

    fn link(uri: &str) -> DocumentFeature {
        DocumentFeature::Link {
            uri: Some(uri.into()),
            url: None,
        }
    }

    #[test]
    fn test_no_facets_escapes() {
        let html = render_rich_text::<DocumentFeature>("a < b & c", &[]);
        assert_eq!(html, "a &lt; b &amp; c");
    }

    #[test]
    fn test_simple_bold() {
        let facets = vec![facet(0, 5, vec![DocumentFeature::Bold])];
        assert_eq!(
            render_rich_text("hello world", &facets),
            "<strong>hello</strong> world"
        );
    }

    #[test]
    fn test_features_wrap_in_order() {
        let facets = vec![facet(
            0,
            4,
            vec![DocumentFeature::Bold, link("https://example.com")],
        )];
        insta::assert_snapshot!(
            render_rich_text("link text", &facets),
            @r#"<a href="https://example.com" target="_blank" rel="noreferrer"><strong>link</strong></a> text"#
        );
    }

    #[test]
    fn test_unsorted_facets_are_sorted() {
        let facets = vec![
            facet(6, 11, vec![DocumentFeature::Italic]),
            facet(0, 5, vec![DocumentFeature::Bold]),
        ];
        assert_eq!(
            render_rich_text("hello world", &facets),
            "<strong>hello</strong> <em>world</em>"
        );
    }

    #[test]
    fn test_multibyte_offsets() {
        // "café " is six bytes.
        let facets = vec![facet(6, 10, vec![DocumentFeature::Code])];
        assert_eq!(render_rich_text("café 👋!", &facets), "café <code>👋</code>!");
    }

    #[test]
    fn test_overlapping_facets_render_independently() {
        let facets = vec![
            facet(0, 5, vec![DocumentFeature::Bold]),
            facet(3, 8, vec![DocumentFeature::Italic]),
        ];
        assert_eq!(
            render_rich_text("abcdefghij", &facets),
            "<strong>abcde</strong><em>defgh</em>ij"
        );
    }

    #[test]
    fn test_unknown_feature_leaves_text() {
        let facets = vec![facet(0, 3, vec![DocumentFeature::Unknown])];
        assert_eq!(render_rich_text("a&b c", &facets), "a&amp;b c");
    }

    #[test]
    fn test_social_text_applies_markdown_outside_tags() {
        let facets = vec![Facet {
            index: ByteRange::new(0, 5),
            features: vec![SocialFeature::Tag {
                tag: Some("a_b_c".into()),
            }],
        }];
        insta::assert_snapshot!(
            render_social_text("#a_b_ is **great**", &facets),
            @r#"<a href="https://bsky.app/hashtag/a_b_c" target="_blank" rel="noreferrer">#a<em>b</em></a> is <strong>great</strong>"#
        );
    }

    #[test]
    fn test_social_text_without_facets_is_plain() {
        assert_eq!(render_social_text("**not bold**", &[]), "**not bold**");
    }

    proptest! {
        #[test]
        fn prop_input_order_does_not_matter(
            text in "\\PC{0,40}",
            spans in proptest::collection::btree_map(0i64..48, 0i64..12, 0..6),
            rotate in 0usize..6,
        ) {
            let facets: Vec<_> = spans
                .into_iter()
                .enumerate()
                .map(|(i, (start, len))| {
                    let feature = if i % 2 == 0 {
                        DocumentFeature::Bold
                    } else {
                        link("https://example.com")
                    };
                    facet(start, start + len, vec![feature])
                })
                .collect();

            let expected = render_rich_text(&text, &facets);

            let mut reversed = facets.clone();
            reversed.reverse();
            prop_assert_eq!(&render_rich_text(&text, &reversed), &expected);

            let mut rotated = facets;
            if !rotated.is_empty() {
                let by = rotate % rotated.len();
                rotated.rotate_left(by);
            }
            prop_assert_eq!(&render_rich_text(&text, &rotated), &expected);
        }
    }
}
