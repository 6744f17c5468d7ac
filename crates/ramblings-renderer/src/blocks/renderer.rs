use ramblings_common::AtUri;

use super::{Block, IframeBlock, ImageBlock, RichText};
use crate::facet::{escape_html, escape_html_into, external_link, profile_url};

/// Where a document's blobs live.
#[derive(Debug, Clone)]
pub struct BlockRenderContext {
    pub did: String,
    pub pds_url: String,
}

impl BlockRenderContext {
    pub fn new(did: impl Into<String>, pds_url: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            pds_url: pds_url.into(),
        }
    }

    fn blob_url(&self, cid: &str) -> Option<String> {
        ramblings_common::blob_url(&self.pds_url, &self.did, cid).map(String::from)
    }
}

/// Compile sibling blocks in document order.
///
/// Each block renders into its own buffer and the results are joined in
/// input order; nothing here fails, malformed blocks just render less.
pub fn compile(blocks: &[Block], ctx: &BlockRenderContext) -> String {
    blocks
        .iter()
        .map(|block| render_block(block, ctx))
        .collect::<Vec<_>>()
        .concat()
}

pub fn render_block(block: &Block, ctx: &BlockRenderContext) -> String {
    let mut html = String::new();

    match block {
        Block::Heading { level, content, .. } => {
            html.push_str(&format!("<h{level}>{}</h{level}>", content.to_html()));
        }
        Block::Text(content) => {
            html.push_str("<p>");
            html.push_str(&content.to_html());
            html.push_str("</p>");
        }
        Block::Blockquote { children, content } => {
            html.push_str("<blockquote>");
            html.push_str(&children_or_text(children, content, ctx));
            html.push_str("</blockquote>");
        }
        Block::BulletList(items) => {
            html.push_str("<ul>");
            html.push_str(&compile(items, ctx));
            html.push_str("</ul>");
        }
        Block::OrderedList { start, items } => {
            html.push_str("<ol");
            push_attr(&mut html, "start", start.as_deref());
            html.push('>');
            html.push_str(&compile(items, ctx));
            html.push_str("</ol>");
        }
        Block::ListItem { children, content } => {
            html.push_str("<li>");
            match children.as_slice() {
                // A lone paragraph goes straight into the item.
                [Block::Text(text)] => html.push_str(&text.to_html()),
                _ => html.push_str(&children_or_text(children, content, ctx)),
            }
            html.push_str("</li>");
        }
        Block::CodeBlock { code, language } => {
            html.push_str("<pre><code");
            if let Some(language) = language {
                html.push_str(" class=\"language-");
                escape_html_into(&mut html, language);
                html.push('"');
            }
            html.push('>');
            escape_html_into(&mut html, code);
            html.push_str("</code></pre>");
        }
        Block::HorizontalRule => html.push_str("<hr />"),
        Block::HardBreak => html.push_str("<br />"),
        Block::Image(image) => render_image_block(&mut html, image, ctx),
        Block::Website {
            href,
            title,
            description,
        } => render_website_block(
            &mut html,
            href.as_deref(),
            title.as_deref(),
            description.as_deref(),
        ),
        Block::Iframe(iframe) => render_iframe_block(&mut html, iframe),
        Block::SocialEmbed { uri } => render_social_embed(&mut html, uri.as_deref()),
        Block::Gallery { items } => render_gallery_block(&mut html, items.as_deref(), ctx),
        Block::TaskList(items) => {
            html.push_str("<ul class=\"task-list\">");
            html.push_str(&compile(items, ctx));
            html.push_str("</ul>");
        }
        Block::TaskItem { checked, content } => {
            let status = if *checked { "[x] " } else { "[ ] " };
            html.push_str("<li><span class=\"task-status\">");
            html.push_str(status);
            html.push_str("</span>");
            html.push_str(&content.to_html());
            html.push_str("</li>");
        }
        Block::Table(rows) => {
            html.push_str("<table>");
            html.push_str(&compile(rows, ctx));
            html.push_str("</table>");
        }
        Block::TableRow(cells) => {
            html.push_str("<tr>");
            html.push_str(&compile(cells, ctx));
            html.push_str("</tr>");
        }
        Block::TableCell {
            header,
            children,
            content,
            colspan,
            rowspan,
        } => {
            let tag = if *header { "th" } else { "td" };
            html.push('<');
            html.push_str(tag);
            if let Some(colspan) = colspan {
                html.push_str(&format!(" colspan=\"{colspan}\""));
            }
            if let Some(rowspan) = rowspan {
                html.push_str(&format!(" rowspan=\"{rowspan}\""));
            }
            html.push('>');
            html.push_str(&children_or_text(children, content, ctx));
            html.push_str(&format!("</{tag}>"));
        }
        Block::Mention {
            did,
            handle,
            content,
        } => render_mention(&mut html, did.as_deref(), handle.as_deref(), content),
        Block::Unknown(kind) => {
            tracing::debug!(%kind, "skipping unknown block type");
        }
    }

    html
}

fn children_or_text(children: &[Block], content: &RichText, ctx: &BlockRenderContext) -> String {
    if children.is_empty() {
        content.to_html()
    } else {
        compile(children, ctx)
    }
}

/// ` name="value"` when the value is present.
fn push_attr(html: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        html.push(' ');
        html.push_str(name);
        html.push_str("=\"");
        escape_html_into(html, value);
        html.push('"');
    }
}

fn render_image_block(html: &mut String, image: &ImageBlock, ctx: &BlockRenderContext) {
    let Some(src) = image
        .src
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| image.blob.as_deref().and_then(|cid| ctx.blob_url(cid)))
    else {
        return;
    };

    html.push_str("<img");
    push_attr(html, "src", Some(&src));
    push_attr(html, "alt", image.alt.as_deref());
    push_attr(html, "title", image.title.as_deref());
    push_attr(html, "width", image.width.as_deref());
    push_attr(html, "height", image.height.as_deref());
    html.push_str(" loading=\"lazy\" />");
}

fn render_website_block(
    html: &mut String,
    href: Option<&str>,
    title: Option<&str>,
    description: Option<&str>,
) {
    let Some(href) = href.filter(|h| !h.is_empty()) else {
        return;
    };

    let mut inner = String::new();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        inner.push_str("<strong>");
        escape_html_into(&mut inner, title);
        inner.push_str("</strong>");
    }
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        inner.push_str("<br /><span>");
        escape_html_into(&mut inner, description);
        inner.push_str("</span>");
    }

    html.push_str("<div class=\"pckt-website\">");
    html.push_str(&external_link(href, &inner));
    html.push_str("</div>");
}

fn render_iframe_block(html: &mut String, iframe: &IframeBlock) {
    let Some(src) = iframe.src.as_deref().filter(|s| !s.is_empty()) else {
        return;
    };

    html.push_str("<iframe");
    push_attr(html, "src", Some(src));
    push_attr(html, "title", iframe.title.as_deref());
    push_attr(html, "height", iframe.height.as_deref());
    push_attr(html, "width", iframe.width.as_deref());
    push_attr(html, "allow", iframe.allow.as_deref());
    html.push_str(" loading=\"lazy\"></iframe>");
}

/// Post links: `at://` post URIs become their bsky.app permalink, web URLs
/// are linked as they are. Anything else has no safe href.
fn render_social_embed(html: &mut String, uri: Option<&str>) {
    let Some(uri) = uri.filter(|u| !u.is_empty()) else {
        return;
    };

    let href = if uri.starts_with("at://") {
        match AtUri::parse(uri) {
            Some(at) => format!("{}/post/{}", profile_url(at.repo), at.rkey),
            None => return,
        }
    } else if uri.starts_with("https://") || uri.starts_with("http://") {
        uri.to_string()
    } else {
        return;
    };

    html.push_str("<p>");
    html.push_str(&external_link(&href, "View on Bluesky"));
    html.push_str("</p>");
}

fn render_gallery_block(
    html: &mut String,
    items: Option<&[Option<String>]>,
    ctx: &BlockRenderContext,
) {
    let images: String = items
        .unwrap_or_default()
        .iter()
        .filter_map(|cid| cid.as_deref().and_then(|cid| ctx.blob_url(cid)))
        .map(|src| format!("<img src=\"{}\" loading=\"lazy\" />", escape_html(&src)))
        .collect();

    html.push_str("<div class=\"pckt-gallery\">");
    if images.is_empty() {
        html.push_str("Gallery unavailable.");
    } else {
        html.push_str(&images);
    }
    html.push_str("</div>");
}

fn render_mention(
    html: &mut String,
    did: Option<&str>,
    handle: Option<&str>,
    content: &RichText,
) {
    let label = handle
        .or(did)
        .or(Some(content.text.as_str()).filter(|t| !t.is_empty()));
    let Some(label) = label else {
        return;
    };

    let href = match did.or(handle) {
        Some(actor) => profile_url(actor),
        None => "#".to_string(),
    };
    html.push_str(&external_link(&href, &escape_html(label)));
}
