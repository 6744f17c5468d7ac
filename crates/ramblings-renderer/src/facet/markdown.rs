//! Inline markdown pass for social-post text.
//!
//! Runs over already-rendered facet HTML and only touches the text between
//! tags. Code spans are cut out first so their contents are never
//! reinterpreted by the later rules.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex should compile"));

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("code regex should compile"));

/// Substitutions applied after code spans, in priority order.
static EMPHASIS_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\*\*\*([^*]+)\*\*\*", "<strong><em>${1}</em></strong>"),
        (r"___([^_]+)___", "<strong><em>${1}</em></strong>"),
        (r"\*\*([^*]+)\*\*", "<strong>${1}</strong>"),
        (r"__([^_]+)__", "<strong>${1}</strong>"),
        (r"\*([^*]+)\*", "<em>${1}</em>"),
        (r"_([^_]+)_", "<em>${1}</em>"),
        (r"~~([^~]+)~~", "<s>${1}</s>"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("emphasis regex should compile"),
            replacement,
        )
    })
    .collect()
});

pub fn apply_inline_markdown(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for tag in TAG_RE.find_iter(html) {
        out.push_str(&apply_to_text(&html[last..tag.start()]));
        out.push_str(tag.as_str());
        last = tag.end();
    }
    out.push_str(&apply_to_text(&html[last..]));

    out
}

fn apply_to_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in CODE_RE.captures_iter(text) {
        let (Some(whole), Some(code)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&apply_emphasis(&text[last..whole.start()]));
        out.push_str("<code>");
        out.push_str(code.as_str());
        out.push_str("</code>");
        last = whole.end();
    }
    out.push_str(&apply_emphasis(&text[last..]));

    out
}

fn apply_emphasis(text: &str) -> String {
    EMPHASIS_RULES
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}
