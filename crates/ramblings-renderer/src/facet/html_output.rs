use super::Feature;
use super::types::{DocumentFeature, SocialFeature, present};

/// Escape text for use in element content or a double-quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_html_into(&mut out, text);
    out
}

pub fn escape_html_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
}

/// `<a>` opening in a new tab.
pub(crate) fn external_link(href: &str, inner: &str) -> String {
    format!(
        "<a href=\"{}\" target=\"_blank\" rel=\"noreferrer\">{inner}</a>",
        escape_html(href)
    )
}

pub(crate) fn profile_url(actor: &str) -> String {
    format!("https://bsky.app/profile/{actor}")
}

fn wrap_tag(tag: &str, inner: String) -> String {
    format!("<{tag}>{inner}</{tag}>")
}

impl Feature for DocumentFeature {
    fn wrap(&self, inner: String) -> String {
        match self {
            DocumentFeature::Link { uri, url } => match present(uri).or(present(url)) {
                Some(href) => external_link(href, &inner),
                None => inner,
            },
            DocumentFeature::Bold => wrap_tag("strong", inner),
            DocumentFeature::Italic => wrap_tag("em", inner),
            DocumentFeature::Underline => wrap_tag("u", inner),
            DocumentFeature::Strikethrough => wrap_tag("s", inner),
            DocumentFeature::Code => wrap_tag("code", inner),
            DocumentFeature::Highlight => wrap_tag("mark", inner),
            DocumentFeature::Id { id } => match present(id) {
                Some(id) => format!("<span id=\"{}\">{inner}</span>", escape_html(id)),
                None => inner,
            },
            DocumentFeature::DidMention { did: actor } | DocumentFeature::AtMention { handle: actor } => {
                match present(actor) {
                    Some(actor) => external_link(&profile_url(actor), &inner),
                    None => inner,
                }
            }
            DocumentFeature::Unknown => inner,
        }
    }
}

impl Feature for SocialFeature {
    fn wrap(&self, inner: String) -> String {
        match self {
            SocialFeature::Link { uri } => match present(uri) {
                Some(href) => external_link(href, &inner),
                None => inner,
            },
            SocialFeature::Mention { did } => match present(did) {
                Some(did) => external_link(&profile_url(did), &inner),
                None => inner,
            },
            SocialFeature::Tag { tag } => match present(tag) {
                Some(tag) => external_link(&format!("https://bsky.app/hashtag/{tag}"), &inner),
                None => inner,
            },
            SocialFeature::Unknown => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_link_prefers_uri_over_url() {
        let feature = DocumentFeature::Link {
            uri: Some(SmolStr::new("https://a.example")),
            url: Some(SmolStr::new("https://b.example")),
        };
        assert_eq!(
            feature.wrap("x".into()),
            r#"<a href="https://a.example" target="_blank" rel="noreferrer">x</a>"#
        );
    }

    #[test]
    fn test_payloadless_features_pass_through() {
        let link = DocumentFeature::Link { uri: Some(SmolStr::default()), url: None };
        assert_eq!(link.wrap("x".into()), "x");
        assert_eq!(DocumentFeature::Id { id: None }.wrap("x".into()), "x");
        assert_eq!(SocialFeature::Tag { tag: None }.wrap("x".into()), "x");
    }

    #[test]
    fn test_mentions_link_to_profiles() {
        let at = DocumentFeature::AtMention { handle: Some("alice.test".into()) };
        assert_eq!(
            at.wrap("@alice".into()),
            r#"<a href="https://bsky.app/profile/alice.test" target="_blank" rel="noreferrer">@alice</a>"#
        );
        let tag = SocialFeature::Tag { tag: Some("rust".into()) };
        assert_eq!(
            tag.wrap("#rust".into()),
            r#"<a href="https://bsky.app/hashtag/rust" target="_blank" rel="noreferrer">#rust</a>"#
        );
    }
}
